// HTTP middleware
pub mod session_auth;
pub mod shared_secret;

pub use session_auth::{attach_session, AuthContext, RequireSession};
pub use shared_secret::require_shared_secret;
