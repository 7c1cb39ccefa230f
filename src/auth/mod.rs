mod middleware;
mod token;

pub use middleware::{AuthError, Identity, RequireToken, extract_bearer_token};
pub use token::{BearerToken, IssuedToken, TOKEN_LIFETIME_WEEKS, TokenHasher};
