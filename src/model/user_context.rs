use serde::{Deserialize, Serialize};

/// Reserved for in-process callers; never accepted from a request.
pub const SYSTEM_USER_ID: &str = "system";

/// Acting user extracted from request headers, recorded in the change log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserContext {
    /// Create a new UserContext with just a user ID
    pub fn new(user_id: String) -> Self {
        Self {
            user_id,
            user_email: None,
            user_name: None,
            roles: Vec::new(),
        }
    }

    /// Create a UserContext with full user information
    pub fn with_details(user_id: String, email: Option<String>, name: Option<String>) -> Self {
        Self {
            user_id,
            user_email: email,
            user_name: name,
            roles: Vec::new(),
        }
    }

    pub fn with_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    /// Create a system user context for internal operations
    pub fn system() -> Self {
        Self {
            user_id: SYSTEM_USER_ID.to_string(),
            user_email: Some("system@progress-engine.internal".to_string()),
            user_name: Some("System".to_string()),
            roles: Vec::new(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.user_id == SYSTEM_USER_ID
    }

    /// Anonymous caller used when no identity headers are present
    pub fn anonymous() -> Self {
        Self::new("anonymous".to_string())
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::anonymous()
    }
}
