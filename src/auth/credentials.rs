//! Application credentials and the grant flow they select.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, Secret},
	error::ConfigError,
};

/// Login-with-Amazon token endpoint used when none is configured.
pub const LWA_TOKEN_ENDPOINT: &str = "https://api.amazon.com/auth/o2/token";

/// Grant flows supported by the token exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
	/// Seller-authorized calls exchanging a long-lived refresh token.
	RefreshToken,
	/// Grantless calls authenticated by client id, secret, and scopes.
	ClientCredentials,
}
impl GrantKind {
	/// Stable label used in the `grant_type` field, metrics, and spans.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::RefreshToken => "refresh_token",
			Self::ClientCredentials => "client_credentials",
		}
	}
}
impl Display for GrantKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// The grant material carried by [`Credentials`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrantFlow {
	/// Exchange this refresh token.
	RefreshToken(Secret),
	/// Request a grantless token for these scopes.
	ClientCredentials(ScopeSet),
}
impl GrantFlow {
	/// Returns the grant kind.
	pub fn kind(&self) -> GrantKind {
		match self {
			Self::RefreshToken(_) => GrantKind::RefreshToken,
			Self::ClientCredentials(_) => GrantKind::ClientCredentials,
		}
	}
}

/// Deterministic identity of a credential set inside a [`TokenCache`](crate::auth::TokenCache).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);
impl CacheKey {
	/// Hashes the grant kind, client id, and refresh token or canonical scopes.
	pub fn for_credentials(credentials: &Credentials) -> Self {
		let mut hasher = Sha256::new();

		hasher.update(credentials.grant.kind().as_str().as_bytes());
		hasher.update([0_u8]);
		hasher.update(credentials.client_id.as_bytes());
		hasher.update([0_u8]);

		match &credentials.grant {
			GrantFlow::RefreshToken(token) => hasher.update(token.expose().as_bytes()),
			GrantFlow::ClientCredentials(scopes) => hasher.update(scopes.normalized().as_bytes()),
		}

		Self(STANDARD_NO_PAD.encode(hasher.finalize()))
	}

	/// Encoded digest.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Validated application credentials.
#[derive(Clone, Debug)]
pub struct Credentials {
	client_id: String,
	client_secret: Secret,
	grant: GrantFlow,
	token_endpoint: Url,
}
impl Credentials {
	/// Starts a builder.
	pub fn builder() -> CredentialsBuilder {
		CredentialsBuilder::default()
	}

	/// Shorthand for the refresh-token flow against the default endpoint.
	pub fn refresh_token(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		refresh_token: impl Into<String>,
	) -> Result<Self, ConfigError> {
		Self::builder()
			.client_id(client_id)
			.client_secret(client_secret)
			.refresh_token(refresh_token)
			.build()
	}

	/// Shorthand for the client-credentials flow against the default endpoint.
	pub fn client_credentials<I, S>(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		scopes: I,
	) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self::builder().client_id(client_id).client_secret(client_secret).scopes(scopes).build()
	}

	/// LWA client identifier.
	pub fn client_id(&self) -> &str {
		&self.client_id
	}

	/// LWA client secret.
	pub fn client_secret(&self) -> &Secret {
		&self.client_secret
	}

	/// Selected grant flow.
	pub fn grant(&self) -> &GrantFlow {
		&self.grant
	}

	/// Token endpoint.
	pub fn token_endpoint(&self) -> &Url {
		&self.token_endpoint
	}

	/// Cache identity of these credentials.
	pub fn cache_key(&self) -> CacheKey {
		CacheKey::for_credentials(self)
	}
}

/// Builder for [`Credentials`].
#[derive(Clone, Debug, Default)]
pub struct CredentialsBuilder {
	client_id: Option<String>,
	client_secret: Option<Secret>,
	refresh_token: Option<Secret>,
	scopes: Vec<String>,
	token_endpoint: Option<Url>,
}
impl CredentialsBuilder {
	/// Sets the client identifier.
	pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());

		self
	}

	/// Sets the client secret.
	pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
		self.client_secret = Some(Secret::new(client_secret));

		self
	}

	/// Selects the refresh-token flow.
	pub fn refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
		self.refresh_token = Some(Secret::new(refresh_token));

		self
	}

	/// Adds one scope, selecting the client-credentials flow.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scopes.push(scope.into());

		self
	}

	/// Adds several scopes, selecting the client-credentials flow.
	pub fn scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes.extend(scopes.into_iter().map(Into::into));

		self
	}

	/// Overrides the token endpoint.
	pub fn token_endpoint(mut self, endpoint: Url) -> Self {
		self.token_endpoint = Some(endpoint);

		self
	}

	/// Validates and builds the credentials.
	///
	/// Exactly one of refresh token or scopes must be set; blank values count as unset.
	pub fn build(self) -> Result<Credentials, ConfigError> {
		let client_id = self
			.client_id
			.map(|id| id.trim().to_owned())
			.filter(|id| !id.is_empty())
			.ok_or(ConfigError::MissingClientId)?;
		let client_secret = self
			.client_secret
			.filter(|secret| !secret.is_blank())
			.ok_or(ConfigError::MissingClientSecret)?;
		let refresh_token = self.refresh_token.filter(|token| !token.is_blank());
		let grant = match (refresh_token, self.scopes.is_empty()) {
			(Some(_), false) => return Err(ConfigError::ConflictingGrant),
			(None, true) => return Err(ConfigError::MissingGrant),
			(Some(token), true) => GrantFlow::RefreshToken(token),
			(None, false) => GrantFlow::ClientCredentials(ScopeSet::new(self.scopes)?),
		};
		let token_endpoint = match self.token_endpoint {
			Some(endpoint) => endpoint,
			None => Url::parse(LWA_TOKEN_ENDPOINT).map_err(|source| ConfigError::InvalidUrl {
				value: LWA_TOKEN_ENDPOINT.into(),
				source,
			})?,
		};

		Ok(Credentials { client_id, client_secret, grant, token_endpoint })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn builder_selects_exactly_one_grant() {
		let refresh = Credentials::refresh_token("amzn1.app", "shh", "Atzr|token")
			.expect("Refresh-token credentials should build.");

		assert_eq!(refresh.grant().kind(), GrantKind::RefreshToken);
		assert_eq!(refresh.token_endpoint().as_str(), LWA_TOKEN_ENDPOINT);

		let grantless =
			Credentials::client_credentials("amzn1.app", "shh", ["sellingpartnerapi::notifications"])
				.expect("Client-credentials credentials should build.");

		assert_eq!(grantless.grant().kind(), GrantKind::ClientCredentials);
		assert!(matches!(
			Credentials::builder()
				.client_id("id")
				.client_secret("secret")
				.refresh_token("r")
				.scope("s")
				.build(),
			Err(ConfigError::ConflictingGrant)
		));
		assert!(matches!(
			Credentials::builder().client_id("id").client_secret("secret").refresh_token("  ").build(),
			Err(ConfigError::MissingGrant)
		));
	}

	#[test]
	fn builder_requires_client_identity() {
		assert!(matches!(
			Credentials::builder().client_secret("secret").refresh_token("r").build(),
			Err(ConfigError::MissingClientId)
		));
		assert!(matches!(
			Credentials::builder().client_id("id").client_secret("").refresh_token("r").build(),
			Err(ConfigError::MissingClientSecret)
		));
		assert!(matches!(
			Credentials::builder().client_id("id").client_secret("s").scope("bad scope").build(),
			Err(ConfigError::InvalidScope(_))
		));
	}

	#[test]
	fn cache_key_is_stable_and_identity_sensitive() {
		let lhs = Credentials::client_credentials("id", "secret", ["b", "a", "a"])
			.expect("Left-hand credentials should build.");
		let rhs = Credentials::client_credentials("id", "other-secret", ["a", "b"])
			.expect("Right-hand credentials should build.");
		let other_client = Credentials::client_credentials("id2", "secret", ["a", "b"])
			.expect("Other client credentials should build.");
		let refresh = Credentials::refresh_token("id", "secret", "a b")
			.expect("Refresh credentials should build.");

		assert_eq!(lhs.cache_key(), rhs.cache_key());
		assert_ne!(lhs.cache_key(), other_client.cache_key());
		assert_ne!(lhs.cache_key(), refresh.cache_key());
		assert!(!lhs.cache_key().as_str().ends_with('='));
		assert_eq!(lhs.cache_key().as_str().len(), 43);
	}

	#[test]
	fn debug_output_redacts_secrets() {
		let credentials = Credentials::refresh_token("id", "client-secret-value", "Atzr|value")
			.expect("Credentials should build.");
		let rendered = format!("{credentials:?}");

		assert!(!rendered.contains("client-secret-value"));
		assert!(!rendered.contains("Atzr|value"));
	}
}
