//! Request governance for Selling Partner API clients: LWA token caching, multi-dimensional rate
//! budgets, and retrying middleware pipelines sitting between generated endpoint wrappers and the
//! wire.
//!
//! The crate is organized leaves first:
//!
//! - [`rate_limit`] provides the lazily refilled [`rate_limit::TokenBucket`], the cancellable
//!   [`rate_limit::RateLimiter`], and the [`rate_limit::RateLimitManager`] registry keyed by
//!   [`rate_limit::DimensionKey`].
//! - [`auth`] fetches and caches Login-with-Amazon access tokens for the refresh-token and
//!   client-credentials grants.
//! - [`sign`] chains request signers (bearer token, restricted data token).
//! - [`transport`] runs requests through an onion-style middleware pipeline (logging, request id,
//!   retry, timeout, rate limiting, signing, user agent, date header) before the terminal
//!   `reqwest` call.
//! - [`client`] wires everything together behind a validated builder.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod obs;
pub mod rate_limit;
pub mod sign;
pub mod transport;

mod _prelude {
	pub use std::{
		collections::{BTreeSet, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::{Duration, Instant},
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::{
		context::{Cancellation, Context},
		error::{Error, Result},
	};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
