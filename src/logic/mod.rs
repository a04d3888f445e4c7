pub mod authorization;
pub mod earned_value;
pub mod progress;
pub mod recalculate;
pub mod resolve;
pub mod template_service;
pub mod validate;

pub use authorization::*;
pub use earned_value::*;
pub use progress::*;
pub use recalculate::*;
pub use resolve::*;
pub use template_service::*;
pub use validate::*;
