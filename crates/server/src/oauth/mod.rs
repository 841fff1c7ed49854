//! OAuth 1.0a three-legged flow against the accounting API.
//!
//! - `credentials` - the credential state carried between the three stages
//! - `signing` - HMAC-SHA1 request signing
//! - `provider` - request token and access token exchange
//! - `store` - the process-wide token store

pub mod credentials;
pub mod provider;
pub mod signing;
pub mod store;

pub use credentials::CredentialState;
pub use provider::OAuthProvider;
pub use store::TokenStore;
