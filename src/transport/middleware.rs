//! Built-in middleware layers.

// crates.io
use reqwest::header::{HeaderValue, USER_AGENT};
use time::macros::format_description;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
	obs::{self, CallSpan, Recorder, RequestSample},
	rate_limit::RateLimitManager,
	sign::SignerChain,
	transport::{
		ApiRequest, DATE_HEADER, Middleware, MiddlewareFuture, Next, REQUEST_ID_HEADER,
	},
};

/// Default `user-agent` value.
pub const DEFAULT_USER_AGENT: &str =
	concat!("spapi-governor/", env!("CARGO_PKG_VERSION"), " (Language=Rust)");

/// Sets `user-agent` unless the request already carries one.
#[derive(Clone, Debug)]
pub struct UserAgentMiddleware {
	value: HeaderValue,
}
impl UserAgentMiddleware {
	/// Validates `user_agent` as a header value.
	pub fn new(user_agent: &str) -> Result<Self, ConfigError> {
		let value = HeaderValue::from_str(user_agent)
			.map_err(|_| ConfigError::InvalidHeader { name: USER_AGENT.as_str().into() })?;

		Ok(Self { value })
	}
}
impl Default for UserAgentMiddleware {
	fn default() -> Self {
		Self { value: HeaderValue::from_static(DEFAULT_USER_AGENT) }
	}
}
impl Middleware for UserAgentMiddleware {
	fn handle<'a>(
		&'a self,
		ctx: &'a Context,
		mut request: ApiRequest,
		next: Next<'a>,
	) -> MiddlewareFuture<'a> {
		if !request.headers.contains_key(USER_AGENT) {
			request.headers.insert(USER_AGENT, self.value.clone());
		}

		next.run(ctx, request)
	}
}

/// Stamps `x-amz-date` (`YYYYMMDDTHHMMSSZ`, UTC) on every attempt.
#[derive(Clone, Copy, Debug, Default)]
pub struct DateHeaderMiddleware;
impl DateHeaderMiddleware {
	/// Formats `now` the way `x-amz-date` expects.
	pub fn format(now: OffsetDateTime) -> Result<String, ConfigError> {
		now.to_offset(time::UtcOffset::UTC)
			.format(format_description!("[year][month][day]T[hour][minute][second]Z"))
			.map_err(|_| ConfigError::InvalidHeader { name: DATE_HEADER.into() })
	}
}
impl Middleware for DateHeaderMiddleware {
	fn handle<'a>(
		&'a self,
		ctx: &'a Context,
		mut request: ApiRequest,
		next: Next<'a>,
	) -> MiddlewareFuture<'a> {
		let stamped = Self::format(OffsetDateTime::now_utc())
			.and_then(|value| request.set_header(DATE_HEADER, &value));

		match stamped {
			Ok(()) => next.run(ctx, request),
			Err(e) => Box::pin(async move { Err(e.into()) }),
		}
	}
}

/// Adds a random `x-request-id` when absent.
///
/// Registered outside the retry layer, the id stays the same for every attempt of one call.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestIdMiddleware;
impl RequestIdMiddleware {
	/// Generates a 128-bit hex identifier.
	pub fn generate() -> String {
		format!("{:032x}", rand::random::<u128>())
	}
}
impl Middleware for RequestIdMiddleware {
	fn handle<'a>(
		&'a self,
		ctx: &'a Context,
		mut request: ApiRequest,
		next: Next<'a>,
	) -> MiddlewareFuture<'a> {
		if !request.headers.contains_key(REQUEST_ID_HEADER) {
			// Hex digits always form a valid header value.
			if let Ok(value) = HeaderValue::from_str(&Self::generate()) {
				request.headers.insert(REQUEST_ID_HEADER, value);
			}
		}

		next.run(ctx, request)
	}
}

/// Observes each call: opens a [`CallSpan`], logs the outcome, and reports a [`RequestSample`].
///
/// Never alters the request or the result.
pub struct LoggingMiddleware {
	recorder: Arc<dyn Recorder>,
}
impl LoggingMiddleware {
	/// Creates the layer reporting to `recorder`.
	pub fn new(recorder: Arc<dyn Recorder>) -> Self {
		Self { recorder }
	}
}
impl Default for LoggingMiddleware {
	fn default() -> Self {
		Self::new(obs::noop_recorder())
	}
}
impl Debug for LoggingMiddleware {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("LoggingMiddleware")
	}
}
impl Middleware for LoggingMiddleware {
	fn handle<'a>(
		&'a self,
		ctx: &'a Context,
		request: ApiRequest,
		next: Next<'a>,
	) -> MiddlewareFuture<'a> {
		Box::pin(async move {
			let started = Instant::now();
			let method = request.method.clone();
			let host = request.url.host_str().map(str::to_owned);
			let path = request.path().to_owned();
			let span = CallSpan::new(&method, &path);
			let result = span.instrument(next.run(ctx, request)).await;
			let status = result.as_ref().ok().map(|response| response.status.as_u16());
			let sample = RequestSample { method, host, path, status, elapsed: started.elapsed() };

			span.record_status(status);
			obs::call_finished(&sample, result.as_ref().err());
			self.recorder.record_call(&sample);

			result
		})
	}
}

/// Bounds everything below it with a deadline.
///
/// Expiry of this layer's own deadline becomes [`TransportError::Timeout`]; cancellation or an
/// earlier deadline of the caller's context stays [`Error::Cancelled`].
#[derive(Clone, Copy, Debug)]
pub struct TimeoutMiddleware {
	timeout: Duration,
}
impl TimeoutMiddleware {
	/// Creates the layer; `timeout` must be non-zero and representable as a deadline.
	pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
		if timeout.is_zero() || Instant::now().checked_add(timeout).is_none() {
			return Err(ConfigError::InvalidTimeout);
		}

		Ok(Self { timeout })
	}

	/// Configured timeout.
	pub fn timeout(&self) -> Duration {
		self.timeout
	}
}
impl Middleware for TimeoutMiddleware {
	fn handle<'a>(
		&'a self,
		ctx: &'a Context,
		request: ApiRequest,
		next: Next<'a>,
	) -> MiddlewareFuture<'a> {
		Box::pin(async move {
			let scoped = ctx.with_timeout(self.timeout);
			let result = next.run(&scoped, request).await;

			match result {
				Err(Error::Cancelled(Cancellation::DeadlineExceeded)) if ctx.err().is_none() =>
					Err(TransportError::Timeout { operation: "request" }.into()),
				other => other,
			}
		})
	}
}

/// Runs a [`SignerChain`] before forwarding.
#[derive(Clone, Debug)]
pub struct SigningMiddleware {
	chain: SignerChain,
}
impl SigningMiddleware {
	/// Creates the layer.
	pub fn new(chain: SignerChain) -> Self {
		Self { chain }
	}
}
impl Middleware for SigningMiddleware {
	fn handle<'a>(
		&'a self,
		ctx: &'a Context,
		mut request: ApiRequest,
		next: Next<'a>,
	) -> MiddlewareFuture<'a> {
		Box::pin(async move {
			self.chain.sign(ctx, &mut request).await?;

			next.run(ctx, request).await
		})
	}
}

/// Waits on the request's dimension limiter, then feeds the server's rate hint back.
///
/// Requests without a [`DimensionKey`](crate::rate_limit::DimensionKey) pass straight through.
/// Unparseable hints are logged and ignored.
pub struct RateLimitMiddleware {
	manager: Arc<RateLimitManager>,
	recorder: Arc<dyn Recorder>,
}
impl RateLimitMiddleware {
	/// Creates the layer over a shared manager.
	pub fn new(manager: Arc<RateLimitManager>) -> Self {
		Self { manager, recorder: obs::noop_recorder() }
	}

	/// Reports wait times to `recorder`.
	pub fn with_recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
		self.recorder = recorder;

		self
	}
}
impl Debug for RateLimitMiddleware {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimitMiddleware").field("manager", &self.manager).finish_non_exhaustive()
	}
}
impl Middleware for RateLimitMiddleware {
	fn handle<'a>(
		&'a self,
		ctx: &'a Context,
		request: ApiRequest,
		next: Next<'a>,
	) -> MiddlewareFuture<'a> {
		Box::pin(async move {
			let Some(key) = request.rate_limit_key.clone() else {
				return next.run(ctx, request).await;
			};
			let started = Instant::now();

			self.manager.wait(ctx, &key).await?;

			let waited = started.elapsed();

			if waited >= crate::rate_limit::MIN_WAIT {
				obs::throttled(&key, waited);
			}

			self.recorder.record_rate_limit_wait(&key, waited);

			let response = next.run(ctx, request).await?;

			if let Err(e) = self.manager.update_from_server_hint(&key, response.rate_limit_hint()) {
				obs::hint_rejected(&key, &e);
			}

			Ok(response)
		})
	}
}
