//! Validated entry point that wires tokens, rate budgets, retries, and signing together.

// crates.io
use reqwest::Method;
// self
use crate::{
	_prelude::*,
	auth::{AccessTokenSource, Credentials, TokenCache, TokenProvider},
	config::{PoolConfig, Region},
	error::ConfigError,
	http::ReqwestHttpClient,
	obs::{self, Recorder},
	rate_limit::{RateBudget, RateLimitManager},
	sign::{BearerSigner, RestrictedDataSigner, RestrictedResources, SignerChain, TokensApi},
	transport::{
		ApiRequest, ApiResponse, DateHeaderMiddleware, LoggingMiddleware, Middleware,
		RateLimitMiddleware, ReqwestHandler, RequestIdMiddleware, RetryMiddleware, RetryPolicy,
		SigningMiddleware, TimeoutMiddleware, TransportClient, UserAgentMiddleware,
	},
};

/// Fully assembled governance pipeline for one application.
///
/// Cloning is cheap; clones share the connection pool, token cache, and rate budgets.
#[derive(Clone, Debug)]
pub struct Client {
	endpoint: Url,
	transport: TransportClient,
	rate_limits: Arc<RateLimitManager>,
	tokens: Option<Arc<TokenProvider>>,
}
impl Client {
	/// Starts a [`ClientBuilder`].
	pub fn builder() -> ClientBuilder {
		ClientBuilder::default()
	}

	/// Base URL every relative path is joined onto.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Shared rate budget registry.
	pub fn rate_limits(&self) -> &Arc<RateLimitManager> {
		&self.rate_limits
	}

	/// Access-token provider, when credentials were configured.
	pub fn tokens(&self) -> Option<&Arc<TokenProvider>> {
		self.tokens.as_ref()
	}

	/// Underlying pipeline.
	pub fn transport(&self) -> &TransportClient {
		&self.transport
	}

	/// Creates a request for `path` relative to the endpoint.
	pub fn request(&self, method: Method, path: &str) -> Result<ApiRequest, ConfigError> {
		let url = self
			.endpoint
			.join(path)
			.map_err(|source| ConfigError::InvalidUrl { value: path.to_owned(), source })?;

		Ok(ApiRequest::new(method, url))
	}

	/// Runs `request` through the pipeline.
	pub async fn execute(&self, ctx: &Context, request: ApiRequest) -> Result<ApiResponse> {
		self.transport.execute(ctx, request).await
	}
}

/// Builder for [`Client`]; every value is validated in [`build`](Self::build).
pub struct ClientBuilder {
	endpoint: Option<Url>,
	region: Region,
	sandbox: bool,
	credentials: Option<Credentials>,
	default_budget: (f64, u32),
	operation_budgets: Vec<(String, f64, u32)>,
	rate_limits: Option<Arc<RateLimitManager>>,
	retry: RetryPolicy,
	timeout: Option<Duration>,
	pool: PoolConfig,
	user_agent: Option<String>,
	restricted: RestrictedResources,
	recorder: Arc<dyn Recorder>,
	token_cache: Option<Arc<TokenCache>>,
	middlewares: Vec<Arc<dyn Middleware>>,
	http_client: Option<ReqwestClient>,
}
impl ClientBuilder {
	/// Requests per second given to limiters without an operation default.
	pub const DEFAULT_RATE: f64 = 1.0;
	/// Burst given to limiters without an operation default.
	pub const DEFAULT_BURST: u32 = 5;
	/// Per-attempt timeout applied unless overridden.
	pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

	/// Uses a region's production endpoint (the default is North America).
	pub fn region(mut self, region: Region) -> Self {
		self.region = region;

		self
	}

	/// Switches the region endpoint to its sandbox.
	pub fn sandbox(mut self, sandbox: bool) -> Self {
		self.sandbox = sandbox;

		self
	}

	/// Uses a custom base URL instead of a region endpoint.
	pub fn endpoint(mut self, endpoint: Url) -> Self {
		self.endpoint = Some(endpoint);

		self
	}

	/// Enables bearer and restricted data token signing.
	pub fn credentials(mut self, credentials: Credentials) -> Self {
		self.credentials = Some(credentials);

		self
	}

	/// Budget for limiters created without an operation default.
	pub fn default_rate_limit(mut self, rate: f64, burst: u32) -> Self {
		self.default_budget = (rate, burst);

		self
	}

	/// Published budget for one operation.
	pub fn operation_rate_limit(
		mut self,
		operation: impl Into<String>,
		rate: f64,
		burst: u32,
	) -> Self {
		self.operation_budgets.push((operation.into(), rate, burst));

		self
	}

	/// Shares an existing rate budget registry; default and operation budgets are then ignored.
	pub fn rate_limits(mut self, manager: Arc<RateLimitManager>) -> Self {
		self.rate_limits = Some(manager);

		self
	}

	/// Retry policy (defaults to [`RetryPolicy::default`]).
	pub fn retry(mut self, policy: RetryPolicy) -> Self {
		self.retry = policy;

		self
	}

	/// Per-attempt timeout covering signing and the network exchange, not rate-limit waits.
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Disables the per-attempt timeout; the caller's context still applies.
	pub fn no_timeout(mut self) -> Self {
		self.timeout = None;

		self
	}

	/// Connection pool settings.
	pub fn pool(mut self, pool: PoolConfig) -> Self {
		self.pool = pool;

		self
	}

	/// Overrides the `user-agent` header.
	pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = Some(user_agent.into());

		self
	}

	/// Paths that require a restricted data token.
	pub fn restricted_resources(mut self, resources: RestrictedResources) -> Self {
		self.restricted = resources;

		self
	}

	/// Measurement sink shared by every layer.
	pub fn recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
		self.recorder = recorder;

		self
	}

	/// Shares an access-token cache with other clients.
	pub fn token_cache(mut self, cache: Arc<TokenCache>) -> Self {
		self.token_cache = Some(cache);

		self
	}

	/// Adds a custom layer between the request-id and logging layers.
	pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
		self.middlewares.push(Arc::new(middleware));

		self
	}

	/// Uses a preconfigured HTTP client instead of building one from the pool settings.
	pub fn http_client(mut self, client: ReqwestClient) -> Self {
		self.http_client = Some(client);

		self
	}

	/// Validates the configuration and assembles the pipeline.
	///
	/// Layers from innermost to outermost: date, user agent, signing, timeout, rate limit,
	/// retry, request id, custom middleware, logging.
	pub fn build(self) -> Result<Client> {
		if !self.restricted.is_empty() && self.credentials.is_none() {
			return Err(ConfigError::RestrictedWithoutCredentials.into());
		}

		self.pool.validate()?;

		let http = match self.http_client {
			Some(client) => client,
			None => self.pool.build_client()?,
		};
		let endpoint = match self.endpoint {
			Some(endpoint) => endpoint,
			None => self.region.url(self.sandbox)?,
		};
		let rate_limits = match self.rate_limits {
			Some(manager) => manager,
			None => {
				let (rate, burst) = self.default_budget;
				let mut manager = RateLimitManager::new(rate, burst)?;

				for (operation, rate, burst) in self.operation_budgets {
					manager =
						manager.with_operation_default(operation, RateBudget::new(rate, burst)?);
				}

				Arc::new(manager)
			},
		};
		let user_agent = match &self.user_agent {
			Some(value) => UserAgentMiddleware::new(value)?,
			None => UserAgentMiddleware::default(),
		};
		let handler = Arc::new(
			ReqwestHandler::new(http.clone(), self.pool.max_connections_per_host)
				.with_recorder(self.recorder.clone()),
		);
		let mut signers = SignerChain::new();
		let tokens = match self.credentials {
			Some(credentials) => {
				let mut provider = TokenProvider::with_http_client(
					credentials,
					ReqwestHttpClient::with_client(http.clone()),
				)
				.with_recorder(self.recorder.clone());

				if let Some(cache) = self.token_cache {
					provider = provider.with_cache(cache);
				}

				let provider = Arc::new(provider);
				let source: Arc<dyn AccessTokenSource> = provider.clone();
				let tokens_api = TokensApi::new(handler.clone(), &endpoint, source.clone())?;

				signers.push(Arc::new(BearerSigner::new(source)));
				signers.push(Arc::new(RestrictedDataSigner::new(
					self.restricted,
					Arc::new(tokens_api),
				)));

				Some(provider)
			},
			None => None,
		};
		let mut transport = TransportClient::with_handler(handler);

		transport.use_middleware(DateHeaderMiddleware).use_middleware(user_agent);

		if !signers.is_empty() {
			transport.use_middleware(SigningMiddleware::new(signers));
		}
		// Inside the limiter: a throttled wait is never cut short by the attempt timeout.
		if let Some(timeout) = self.timeout {
			transport.use_middleware(TimeoutMiddleware::new(timeout)?);
		}

		transport
			.use_middleware(
				RateLimitMiddleware::new(rate_limits.clone()).with_recorder(self.recorder.clone()),
			)
			.use_middleware(RetryMiddleware::new(self.retry).with_recorder(self.recorder.clone()))
			.use_middleware(RequestIdMiddleware);

		for middleware in self.middlewares {
			transport.use_shared(middleware);
		}

		transport.use_middleware(LoggingMiddleware::new(self.recorder));

		Ok(Client { endpoint, transport, rate_limits, tokens })
	}
}
impl Default for ClientBuilder {
	fn default() -> Self {
		Self {
			endpoint: None,
			region: Region::NorthAmerica,
			sandbox: false,
			credentials: None,
			default_budget: (Self::DEFAULT_RATE, Self::DEFAULT_BURST),
			operation_budgets: Vec::new(),
			rate_limits: None,
			retry: RetryPolicy::default(),
			timeout: Some(Self::DEFAULT_TIMEOUT),
			pool: PoolConfig::default(),
			user_agent: None,
			restricted: RestrictedResources::default(),
			recorder: obs::noop_recorder(),
			token_cache: None,
			middlewares: Vec::new(),
			http_client: None,
		}
	}
}
impl Debug for ClientBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientBuilder")
			.field("endpoint", &self.endpoint.as_ref().map(Url::as_str))
			.field("region", &self.region)
			.field("sandbox", &self.sandbox)
			.field("credentials", &self.credentials.is_some())
			.field("retry", &self.retry)
			.field("timeout", &self.timeout)
			.field("pool", &self.pool)
			.finish_non_exhaustive()
	}
}
