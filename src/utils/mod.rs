// Utility functions
pub mod cache;
pub mod error;
pub mod key_rotator;
pub mod pagination;
pub mod password;
pub mod validation;

pub use error::AppError;
