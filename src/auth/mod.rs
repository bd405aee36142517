/// Authentication module
///
/// Access-token issuance and verification, password hashing, refresh-token
/// records, and `AuthService`, which ties them to the stores.

mod claims;
mod jwt;
mod password;
mod refresh_token;
mod service;

pub use claims::AccessClaims;
pub use jwt::{IssuedToken, TokenError, TokenIssuer};
pub use password::{PasswordError, PasswordHasher};
pub use refresh_token::{generate_refresh_token, hash_token, RefreshTokenRecord, REFRESH_TOKEN_LENGTH};
pub use service::{AuthService, TokenPair};
