//! Governance-level error types shared across auth, rate limiting, and transport.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem, raised only while constructing clients.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The authorization server refused to issue a usable token.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Transport failure (DNS, TCP, TLS, timeouts).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Rate budget configuration or server hint was invalid.
	#[error(transparent)]
	RateLimit(#[from] crate::rate_limit::RateLimitError),
	/// The caller's context was cancelled or its deadline passed.
	#[error(transparent)]
	Cancelled(#[from] Cancellation),

	/// Request body could not be serialized to JSON.
	#[error("Request body could not be encoded.")]
	Encode {
		/// Structured encoding failure including the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Response body did not match the expected JSON shape.
	#[error("Response body could not be decoded.")]
	Decode {
		/// Structured decoding failure including the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Non-success HTTP status surfaced through [`ApiResponse::error_for_status`](crate::transport::ApiResponse::error_for_status).
	#[error("Request failed with HTTP status {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Truncated response body.
		body: String,
	},
}
impl Error {
	/// Returns `true` for failures that the default retry predicate re-sends.
	///
	/// Only transport failures qualify; authentication, configuration, and cancellation errors
	/// never heal by repeating the same request.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transport(_))
	}

	/// Returns the cancellation cause when the error came from the caller's context.
	pub fn cancellation(&self) -> Option<Cancellation> {
		match self {
			Self::Cancelled(cause) => Some(*cause),
			_ => None,
		}
	}
}

/// Configuration and validation failures raised while building clients.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A URL could not be parsed or joined.
	#[error("URL `{value}` is invalid.")]
	InvalidUrl {
		/// Offending input.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A header name or value contains characters HTTP does not allow.
	#[error("Header `{name}` has an invalid name or value.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},

	/// Credentials omitted the client identifier.
	#[error("Credentials are missing the client id.")]
	MissingClientId,
	/// Credentials omitted the client secret.
	#[error("Credentials are missing the client secret.")]
	MissingClientSecret,
	/// Both the refresh token and the scopes were supplied.
	#[error("Credentials must set either a refresh token or scopes, not both.")]
	ConflictingGrant,
	/// Neither the refresh token nor the scopes were supplied.
	#[error("Credentials must set a refresh token or at least one scope.")]
	MissingGrant,
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Retry policy values are out of range.
	#[error("Retry policy is invalid: {reason}.")]
	InvalidRetryPolicy {
		/// Which constraint was violated.
		reason: &'static str,
	},
	/// A timeout must be non-zero.
	#[error("Timeout must be greater than zero.")]
	InvalidTimeout,
	/// Region name is not one of `na`, `eu`, or `fe`.
	#[error("Region `{value}` is unknown.")]
	UnknownRegion {
		/// Offending input.
		value: String,
	},
	/// Restricted data tokens need credentials to authenticate the token request.
	#[error("Restricted resources are configured but no credentials were supplied.")]
	RestrictedWithoutCredentials,
	/// Connection pool limits are out of range.
	#[error("Connection pool configuration is invalid: {reason}.")]
	InvalidPool {
		/// Which constraint was violated.
		reason: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Authentication failures reported by the token endpoint or the restricted data token API.
///
/// These are surfaced separately from [`TransportError`] so retry logic never loops on a bad
/// credential.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// The token endpoint answered with an OAuth error.
	#[error("Token endpoint rejected the request: {error}.")]
	Rejected {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// OAuth `error` code.
		error: String,
		/// OAuth `error_description`, if supplied.
		description: Option<String>,
	},
	/// The token endpoint answered 2xx without an access token.
	#[error("Token endpoint returned an empty access token.")]
	EmptyAccessToken,
	/// The token endpoint omitted `expires_in` or returned a non-positive value.
	#[error("Token endpoint returned a missing or non-positive expires_in.")]
	InvalidExpiry,
	/// The token endpoint responded with a body that is not a token response.
	#[error("Token endpoint returned malformed JSON.")]
	MalformedResponse {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The token endpoint responded in a way the OAuth client could not interpret.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	UnexpectedResponse {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Summary from the OAuth client.
		message: String,
	},
	/// The restricted data token API refused to mint a token.
	#[error("Restricted data token request failed with HTTP status {status}.")]
	RestrictedDataToken {
		/// HTTP status code.
		status: u16,
		/// Truncated response body.
		body: String,
	},
}
impl AuthError {
	/// HTTP status associated with the failure, when one was observed.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. }
			| Self::MalformedResponse { status, .. }
			| Self::UnexpectedResponse { status, .. } => *status,
			Self::RestrictedDataToken { status, .. } => Some(*status),
			Self::EmptyAccessToken | Self::InvalidExpiry => None,
		}
	}
}

/// Transport-level failures (network, IO, timeouts), tagged with the step that failed.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred during {operation}.")]
	Network {
		/// Step that failed (`send`, `token_exchange`, `restricted_data_token`, ...).
		operation: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The per-request deadline passed before the step completed.
	#[error("Timed out during {operation}.")]
	Timeout {
		/// Step that timed out.
		operation: &'static str,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		operation: &'static str,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { operation, source: Box::new(src) }
	}

	/// Maps a reqwest failure, keeping timeouts distinguishable from connection errors.
	pub fn from_reqwest(operation: &'static str, e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout { operation } } else { Self::network(operation, e) }
	}
}

/// Truncates response bodies before they are embedded into error values.
pub(crate) fn body_preview(body: &[u8]) -> String {
	const LIMIT: usize = 256;

	let text = String::from_utf8_lossy(body);

	if text.chars().count() <= LIMIT {
		return text.into_owned();
	}

	let mut buf = text.chars().take(LIMIT).collect::<String>();

	buf.push('…');

	buf
}
