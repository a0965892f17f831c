//! Database models split into domain-specific modules.

pub mod report;
pub mod session;
pub mod sport;
pub mod user;

pub use report::*;
pub use session::*;
pub use sport::*;
pub use user::*;
