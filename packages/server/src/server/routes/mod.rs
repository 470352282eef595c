// HTTP routes
pub mod backup;
pub mod health;

pub use backup::*;
pub use health::*;
