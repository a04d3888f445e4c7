pub mod change;
pub mod common;
pub mod component;
pub mod milestone;
pub mod user_context;

pub use change::*;
pub use common::*;
pub use component::*;
pub use milestone::*;
pub use user_context::*;
