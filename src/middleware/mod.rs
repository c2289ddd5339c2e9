pub mod auth;
pub mod security_headers;

pub use auth::{AuthMiddleware, AuthUser, OptionalAuthUser};
pub use security_headers::SecurityHeaders;
