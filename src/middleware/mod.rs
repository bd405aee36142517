/// Middleware module
///
/// Bearer-token guard for the authenticated scope.

mod bearer_auth;

pub use bearer_auth::{bearer_token, BearerAuth};
