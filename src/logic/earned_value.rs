use std::collections::HashMap;

use crate::model::TemplateMilestone;

/// Weighted percent complete of a component, rounded half-up to two decimals.
///
/// Milestones missing from `milestones` count as not started. Values are read
/// on the 0-100 scale and clamped into it. A template without weight yields 0.
pub fn compute_percent_complete(
    milestones: &HashMap<String, f64>,
    template: &[TemplateMilestone],
) -> f64 {
    let mut weighted_sum = 0.0_f64;
    let mut weight_total = 0.0_f64;

    for milestone in template {
        let weight = f64::from(milestone.weight);
        let value = milestones
            .get(&milestone.milestone_name)
            .copied()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
            .clamp(0.0, 100.0);

        weighted_sum += weight * value / 100.0;
        weight_total += weight;
    }

    if weight_total <= 0.0 {
        return 0.0;
    }

    round_half_up(weighted_sum / weight_total * 100.0)
}

/// Round a non-negative percentage to two decimals, ties upward.
fn round_half_up(value: f64) -> f64 {
    // The nudge absorbs representation error such as 12.345 stored as 12.34499..
    (value * 100.0 + 0.5 + 1e-9).floor() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(weights: &[(&str, i32)]) -> Vec<TemplateMilestone> {
        weights
            .iter()
            .enumerate()
            .map(|(i, (name, weight))| TemplateMilestone {
                milestone_name: name.to_string(),
                weight: *weight,
                order: i as i32 + 1,
                is_partial: false,
            })
            .collect()
    }

    fn values(values: &[(&str, f64)]) -> HashMap<String, f64> {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_weighted_example() {
        let template = template(&[("Receive", 20), ("Install", 50), ("Test", 30)]);
        let milestones = values(&[("Receive", 100.0), ("Install", 40.0), ("Test", 0.0)]);
        assert_eq!(compute_percent_complete(&milestones, &template), 40.00);
    }

    #[test]
    fn test_absent_milestones_count_as_zero() {
        let template = template(&[("A", 50), ("B", 50)]);
        assert_eq!(compute_percent_complete(&HashMap::new(), &template), 0.00);
    }

    #[test]
    fn test_empty_template_is_zero() {
        let milestones = values(&[("A", 100.0)]);
        assert_eq!(compute_percent_complete(&milestones, &[]), 0.0);
        let zero_weights = template(&[("A", 0)]);
        assert_eq!(compute_percent_complete(&milestones, &zero_weights), 0.0);
    }

    #[test]
    fn test_unknown_milestones_are_ignored() {
        let template = template(&[("Receive", 100)]);
        let milestones = values(&[("Receive", 100.0), ("Legacy", 100.0)]);
        assert_eq!(compute_percent_complete(&milestones, &template), 100.0);
    }

    #[test]
    fn test_rounds_half_up_to_two_decimals() {
        // 1/3 of 100 -> 33.333.. -> 33.33
        let template_thirds = template(&[("A", 1), ("B", 1), ("C", 1)]);
        let milestones = values(&[("A", 100.0)]);
        assert_eq!(compute_percent_complete(&milestones, &template_thirds), 33.33);

        // 12.345 rounds up to 12.35
        let template_single = template(&[("A", 100)]);
        let milestones = values(&[("A", 12.345)]);
        assert_eq!(compute_percent_complete(&milestones, &template_single), 12.35);

        // 2/3 -> 66.666.. -> 66.67
        let milestones = values(&[("A", 100.0), ("B", 100.0)]);
        assert_eq!(compute_percent_complete(&milestones, &template_thirds), 66.67);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let template = template(&[("A", 50), ("B", 50)]);
        let milestones = values(&[("A", 250.0), ("B", -10.0)]);
        assert_eq!(compute_percent_complete(&milestones, &template), 50.0);
    }

    #[test]
    fn test_is_deterministic() {
        let template = template(&[("Fit-up", 10), ("Weld Made", 60), ("Punch", 10), ("Test", 15), ("Restore", 5)]);
        let milestones = values(&[("Fit-up", 100.0), ("Weld Made", 37.5), ("Punch", 100.0)]);
        let first = compute_percent_complete(&milestones, &template);
        let second = compute_percent_complete(&milestones, &template);
        assert_eq!(first.to_bits(), second.to_bits());
        assert_eq!(first, 42.5);
    }
}
