//! Restricted data token substitution for sensitive resources.

// crates.io
use reqwest::Method;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, AccessTokenSource, Secret},
	error::{AuthError, ConfigError, body_preview},
	sign::{ACCESS_TOKEN_HEADER, RequestSigner, SignFuture},
	transport::{ApiRequest, Handler},
};

/// Path of the Tokens API operation that mints restricted data tokens.
pub const RESTRICTED_DATA_TOKEN_PATH: &str = "/tokens/2021-03-01/restrictedDataToken";

/// Paths that require a restricted data token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RestrictedResources {
	/// Paths matched exactly.
	pub exact: BTreeSet<String>,
	/// Path prefixes.
	pub prefixes: BTreeSet<String>,
}
impl RestrictedResources {
	/// Empty set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Operations that return personally identifiable information.
	pub fn sp_api_defaults() -> Self {
		Self::new()
			.with_prefix("/orders/v0/orders")
			.with_prefix("/mfn/v0/shipments")
			.with_prefix("/reports/2021-06-30/documents")
			.with_prefix("/fba/outbound/2020-07-01/fulfillmentOrders")
			.with_prefix("/vendor/directFulfillment/orders")
			.with_prefix("/vendor/directFulfillment/shipping")
	}

	/// Adds an exact path.
	pub fn with_exact(mut self, path: impl Into<String>) -> Self {
		self.exact.insert(path.into());

		self
	}

	/// Adds a path prefix.
	pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.prefixes.insert(prefix.into());

		self
	}

	/// Returns true when nothing is configured.
	pub fn is_empty(&self) -> bool {
		self.exact.is_empty() && self.prefixes.is_empty()
	}

	/// Returns true if `path` is an exact entry or starts with a prefix.
	pub fn matches(&self, path: &str) -> bool {
		self.exact.contains(path)
			|| self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
	}
}

/// Mints restricted data tokens for one `(method, path)` pair.
pub trait RestrictedTokenSource: Send + Sync {
	/// Returns a token scoped to `method` on `path`.
	fn restricted_token<'a>(
		&'a self,
		ctx: &'a Context,
		method: &'a Method,
		path: &'a str,
	) -> Pin<Box<dyn Future<Output = Result<AccessToken>> + 'a + Send>>;
}

/// Replaces the access token with a restricted data token on restricted requests.
///
/// A request qualifies when its `restricted` flag is set or its path matches the configured
/// [`RestrictedResources`]. Other requests pass through untouched.
pub struct RestrictedDataSigner {
	resources: RestrictedResources,
	source: Arc<dyn RestrictedTokenSource>,
}
impl RestrictedDataSigner {
	/// Creates the signer.
	pub fn new(resources: RestrictedResources, source: Arc<dyn RestrictedTokenSource>) -> Self {
		Self { resources, source }
	}

	/// Configured resources.
	pub fn resources(&self) -> &RestrictedResources {
		&self.resources
	}

	/// Returns true if `request` needs a restricted data token.
	pub fn applies_to(&self, request: &ApiRequest) -> bool {
		request.restricted || self.resources.matches(request.path())
	}
}
impl RequestSigner for RestrictedDataSigner {
	fn sign<'a>(&'a self, ctx: &'a Context, request: &'a mut ApiRequest) -> SignFuture<'a> {
		Box::pin(async move {
			if !self.applies_to(request) {
				return Ok(());
			}

			let method = request.method.clone();
			let path = request.path().to_owned();
			let token = self.source.restricted_token(ctx, &method, &path).await?;

			request.set_sensitive_header(ACCESS_TOKEN_HEADER, token.secret.expose())?;

			Ok(())
		})
	}
}
impl Debug for RestrictedDataSigner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RestrictedDataSigner")
			.field("resources", &self.resources)
			.finish_non_exhaustive()
	}
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRestrictedDataTokenRequest<'a> {
	restricted_resources: [RestrictedResource<'a>; 1],
}

#[derive(Serialize)]
struct RestrictedResource<'a> {
	method: &'a str,
	path: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRestrictedDataTokenResponse {
	restricted_data_token: String,
	expires_in: u64,
}

type ResourceKey = (Method, String);

/// [`RestrictedTokenSource`] backed by the Tokens API.
///
/// Tokens are cached per `(method, path)` and reused until they come within the access-token
/// expiry margin. Stale entries are dropped when read and pruned whenever a new token is stored,
/// so the cache only holds tokens that can still be served. Concurrent misses on one resource
/// share a single mint.
pub struct TokensApi {
	handler: Arc<dyn Handler>,
	url: Url,
	source: Arc<dyn AccessTokenSource>,
	cache: RwLock<HashMap<ResourceKey, AccessToken>>,
	guards: Mutex<HashMap<ResourceKey, Arc<AsyncMutex<()>>>>,
}
impl TokensApi {
	/// Calls the Tokens API under `endpoint` through `handler`, authenticating with tokens from
	/// `source`.
	pub fn new(
		handler: Arc<dyn Handler>,
		endpoint: &Url,
		source: Arc<dyn AccessTokenSource>,
	) -> Result<Self, ConfigError> {
		let url = endpoint.join(RESTRICTED_DATA_TOKEN_PATH).map_err(|source| {
			ConfigError::InvalidUrl { value: endpoint.to_string(), source }
		})?;

		Ok(Self { handler, url, source, cache: Default::default(), guards: Default::default() })
	}

	/// Number of cached tokens.
	pub fn cached(&self) -> usize {
		self.cache.read().len()
	}

	/// Drops the token cached for `method` on `path`.
	pub fn evict(&self, method: &Method, path: &str) -> Option<AccessToken> {
		self.cache.write().remove(&(method.clone(), path.to_owned()))
	}

	/// Drops every cached token.
	pub fn clear(&self) {
		self.cache.write().clear();
	}

	/// Returns a cached or newly minted token for `method` on `path`.
	pub async fn get(&self, ctx: &Context, method: &Method, path: &str) -> Result<AccessToken> {
		let key = (method.clone(), path.to_owned());

		if let Some(token) = self.fresh_at(&key, OffsetDateTime::now_utc()) {
			return Ok(token);
		}

		let guard = self.guard(&key);
		let result = self.mint_coalesced(ctx, &guard, key, method, path).await;

		drop(guard);
		// Keep only guards some caller still holds.
		self.guards.lock().retain(|_, guard| Arc::strong_count(guard) > 1);

		result
	}

	async fn mint_coalesced(
		&self,
		ctx: &Context,
		guard: &AsyncMutex<()>,
		key: ResourceKey,
		method: &Method,
		path: &str,
	) -> Result<AccessToken> {
		let _singleflight = ctx.run(guard.lock()).await?;

		// The previous guard holder may have minted this token while this caller waited.
		if let Some(token) = self.fresh_at(&key, OffsetDateTime::now_utc()) {
			return Ok(token);
		}

		let token = self.fetch(ctx, method, path).await?;

		self.store_at(key, token.clone(), OffsetDateTime::now_utc());

		Ok(token)
	}

	fn fresh_at(&self, key: &ResourceKey, now: OffsetDateTime) -> Option<AccessToken> {
		match self.cache.read().get(key) {
			Some(token) if !token.is_expired_at(now) => return Some(token.clone()),
			Some(_) => {},
			None => return None,
		}

		let mut cache = self.cache.write();

		match cache.get(key) {
			Some(token) if !token.is_expired_at(now) => Some(token.clone()),
			Some(_) => {
				cache.remove(key);

				None
			},
			None => None,
		}
	}

	fn store_at(&self, key: ResourceKey, token: AccessToken, now: OffsetDateTime) {
		let mut cache = self.cache.write();

		cache.retain(|_, cached| !cached.is_expired_at(now));
		cache.insert(key, token);
	}

	fn guard(&self, key: &ResourceKey) -> Arc<AsyncMutex<()>> {
		self.guards.lock().entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	async fn fetch(&self, ctx: &Context, method: &Method, path: &str) -> Result<AccessToken> {
		let bearer = self.source.access_token(ctx).await?;
		let body = CreateRestrictedDataTokenRequest {
			restricted_resources: [RestrictedResource { method: method.as_str(), path }],
		};
		let mut request = ApiRequest::post(self.url.clone()).json(&body)?;

		request.set_sensitive_header(ACCESS_TOKEN_HEADER, bearer.secret.expose())?;

		let response = self.handler.call(ctx, request).await?;

		if !response.is_success() {
			return Err(AuthError::RestrictedDataToken {
				status: response.status.as_u16(),
				body: body_preview(&response.body),
			}
			.into());
		}

		let mut deserializer = serde_json::Deserializer::from_slice(&response.body);
		let parsed: CreateRestrictedDataTokenResponse =
			serde_path_to_error::deserialize(&mut deserializer)
				.map_err(|source| Error::Decode { source })?;

		if parsed.restricted_data_token.trim().is_empty() {
			return Err(AuthError::EmptyAccessToken.into());
		}
		if parsed.expires_in == 0 {
			return Err(AuthError::InvalidExpiry.into());
		}

		Ok(AccessToken::new(
			Secret::new(parsed.restricted_data_token),
			"restricted_data_token",
			parsed.expires_in,
			OffsetDateTime::now_utc(),
		))
	}
}
impl RestrictedTokenSource for TokensApi {
	fn restricted_token<'a>(
		&'a self,
		ctx: &'a Context,
		method: &'a Method,
		path: &'a str,
	) -> Pin<Box<dyn Future<Output = Result<AccessToken>> + 'a + Send>> {
		Box::pin(self.get(ctx, method, path))
	}
}
impl Debug for TokensApi {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokensApi")
			.field("url", &self.url.as_str())
			.field("cached", &self.cached())
			.finish_non_exhaustive()
	}
}
