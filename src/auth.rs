//! Login-with-Amazon credentials, access tokens, and the token cache.
//!
//! [`TokenProvider`] is the entry point: it derives a [`CacheKey`] from the
//! [`Credentials`], serves fresh tokens from the shared [`TokenCache`], and otherwise performs
//! the `refresh_token` or `client_credentials` exchange against the token endpoint. Concurrent
//! callers racing on an absent or expired token share one upstream fetch.

pub mod cache;
pub mod credentials;
pub mod provider;
pub mod scope;
pub mod secret;
pub mod token;

mod exchange;

pub use cache::*;
pub use credentials::*;
pub use provider::*;
pub use scope::*;
pub use secret::*;
pub use token::*;
