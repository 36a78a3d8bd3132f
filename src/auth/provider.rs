//! Cached access-token provider.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, CacheKey, Credentials, TokenCache, exchange::TokenExchange},
	http::{ReqwestHttpClient, TokenHttpClient},
	obs::{self, Outcome, Recorder},
};

/// Boxed future returned by [`AccessTokenSource`].
pub type AccessTokenFuture<'a> = Pin<Box<dyn Future<Output = Result<AccessToken>> + 'a + Send>>;

/// Object-safe view of a token provider used by signers.
pub trait AccessTokenSource: Send + Sync {
	/// Returns a fresh token, fetching one if needed.
	fn access_token<'a>(&'a self, ctx: &'a Context) -> AccessTokenFuture<'a>;
}

/// Issues access tokens for one set of [`Credentials`].
///
/// Fresh tokens come from the [`TokenCache`]. On a miss the provider takes the key's
/// singleflight guard, re-checks the cache, and only then calls the token endpoint, so
/// concurrent callers on the same credentials trigger one exchange.
pub struct TokenProvider<C = ReqwestHttpClient>
where
	C: ?Sized + TokenHttpClient,
{
	credentials: Credentials,
	key: CacheKey,
	cache: Arc<TokenCache>,
	exchange: TokenExchange<C>,
	recorder: Arc<dyn Recorder>,
}
impl TokenProvider<ReqwestHttpClient> {
	/// Creates a provider backed by a default reqwest client and a private cache.
	pub fn new(credentials: Credentials) -> Self {
		Self::with_http_client(credentials, ReqwestHttpClient::default())
	}
}
impl<C> TokenProvider<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Creates a provider using a custom token transport.
	pub fn with_http_client(credentials: Credentials, http_client: impl Into<Arc<C>>) -> Self {
		let key = credentials.cache_key();
		let exchange = TokenExchange::new(&credentials, http_client.into());

		Self {
			credentials,
			key,
			cache: Default::default(),
			exchange,
			recorder: obs::noop_recorder(),
		}
	}

	/// Shares `cache` with other providers.
	pub fn with_cache(mut self, cache: Arc<TokenCache>) -> Self {
		self.cache = cache;

		self
	}

	/// Reports token fetches to `recorder`.
	pub fn with_recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
		self.recorder = recorder;

		self
	}

	/// Credentials this provider authenticates with.
	pub fn credentials(&self) -> &Credentials {
		&self.credentials
	}

	/// Cache identity of the credentials.
	pub fn cache_key(&self) -> &CacheKey {
		&self.key
	}

	/// Backing cache.
	pub fn cache(&self) -> &Arc<TokenCache> {
		&self.cache
	}

	/// Returns a token that stays valid for at least the expiry margin.
	pub async fn get_access_token(&self, ctx: &Context) -> Result<AccessToken> {
		if let Some(token) = self.cache.get_fresh(&self.key) {
			return Ok(token);
		}

		let guard = self.cache.guard(&self.key);
		let _singleflight = ctx.run(guard.lock()).await?;

		// The previous guard holder may have stored a token while this caller waited.
		if let Some(token) = self.cache.get_fresh(&self.key) {
			return Ok(token);
		}

		self.fetch_locked(ctx).await
	}

	/// Discards the cached token and fetches a new one.
	///
	/// Use this when the API rejected a token the cache still considered fresh.
	pub async fn refresh_token(&self, ctx: &Context) -> Result<AccessToken> {
		let guard = self.cache.guard(&self.key);
		let _singleflight = ctx.run(guard.lock()).await?;

		self.cache.evict(&self.key);
		self.fetch_locked(ctx).await
	}

	/// Discards the cached token without fetching.
	pub fn invalidate(&self) {
		self.cache.evict(&self.key);
	}

	async fn fetch_locked(&self, ctx: &Context) -> Result<AccessToken> {
		let grant = self.credentials.grant().kind();
		let result = ctx.run(self.exchange.fetch(self.credentials.grant())).await?;
		let outcome = if result.is_ok() { Outcome::Success } else { Outcome::Failure };

		obs::token_fetched(grant, outcome);
		self.recorder.record_token_fetch(grant, outcome);

		let token = result?;

		self.cache.insert(self.key.clone(), token.clone());

		Ok(token)
	}
}
impl<C> AccessTokenSource for TokenProvider<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn access_token<'a>(&'a self, ctx: &'a Context) -> AccessTokenFuture<'a> {
		Box::pin(self.get_access_token(ctx))
	}
}
impl<C> Debug for TokenProvider<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenProvider")
			.field("client_id", &self.credentials.client_id())
			.field("grant", &self.credentials.grant().kind())
			.field("cache_key", &self.key)
			.finish_non_exhaustive()
	}
}
