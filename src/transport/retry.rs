//! Exponential backoff retry policy and middleware.

// crates.io
use reqwest::StatusCode;
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	obs::{self, Recorder},
	transport::{ApiRequest, ApiResponse, Middleware, MiddlewareFuture, Next},
};

/// Decides whether an attempt's outcome should be retried.
///
/// Exactly one of the response or the error is `Some`.
pub type RetryPredicate =
	Arc<dyn Fn(Option<&ApiResponse>, Option<&Error>) -> bool + Send + Sync>;

/// Retries transport failures, 5xx responses, and 429 responses.
pub fn default_retry_predicate(response: Option<&ApiResponse>, error: Option<&Error>) -> bool {
	if let Some(error) = error {
		return error.is_retryable();
	}

	response.is_some_and(|response| {
		response.status.is_server_error() || response.status == StatusCode::TOO_MANY_REQUESTS
	})
}

/// Bounded exponential backoff.
///
/// The delay before retry `n` (0-based) is `initial_backoff * multiplier^n`, capped at
/// `max_backoff`.
#[derive(Clone)]
pub struct RetryPolicy {
	max_attempts: u32,
	initial_backoff: Duration,
	max_backoff: Duration,
	multiplier: f64,
	predicate: RetryPredicate,
}
impl RetryPolicy {
	/// Attempts made by [`RetryPolicy::default`].
	pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
	/// First delay used by [`RetryPolicy::default`].
	pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);
	/// Delay cap used by [`RetryPolicy::default`].
	pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(20);
	/// Growth factor used by [`RetryPolicy::default`].
	pub const DEFAULT_MULTIPLIER: f64 = 2.0;

	/// Creates a validated policy using [`default_retry_predicate`].
	pub fn new(
		max_attempts: u32,
		initial_backoff: Duration,
		max_backoff: Duration,
		multiplier: f64,
	) -> Result<Self, ConfigError> {
		if max_attempts == 0 {
			return Err(ConfigError::InvalidRetryPolicy { reason: "max_attempts must be at least 1" });
		}
		if initial_backoff > max_backoff {
			return Err(ConfigError::InvalidRetryPolicy {
				reason: "initial_backoff must not exceed max_backoff",
			});
		}
		if !multiplier.is_finite() || multiplier < 1.0 {
			return Err(ConfigError::InvalidRetryPolicy {
				reason: "multiplier must be finite and at least 1",
			});
		}

		Ok(Self {
			max_attempts,
			initial_backoff,
			max_backoff,
			multiplier,
			predicate: Arc::new(default_retry_predicate),
		})
	}

	/// Policy that makes exactly one attempt.
	pub fn disabled() -> Self {
		Self { max_attempts: 1, ..Self::default() }
	}

	/// Replaces the retry predicate.
	pub fn with_predicate<F>(mut self, predicate: F) -> Self
	where
		F: 'static + Send + Sync + Fn(Option<&ApiResponse>, Option<&Error>) -> bool,
	{
		self.predicate = Arc::new(predicate);

		self
	}

	/// Total attempts including the first.
	pub fn max_attempts(&self) -> u32 {
		self.max_attempts
	}

	/// Delay before the first retry.
	pub fn initial_backoff(&self) -> Duration {
		self.initial_backoff
	}

	/// Upper bound for any delay.
	pub fn max_backoff(&self) -> Duration {
		self.max_backoff
	}

	/// Growth factor between delays.
	pub fn multiplier(&self) -> f64 {
		self.multiplier
	}

	/// Delay before retry `retry` (0-based).
	pub fn backoff(&self, retry: u32) -> Duration {
		if self.initial_backoff.is_zero() {
			return Duration::ZERO;
		}

		let factor = self.multiplier.powi(i32::try_from(retry).unwrap_or(i32::MAX));

		Duration::try_from_secs_f64(self.initial_backoff.as_secs_f64() * factor)
			.unwrap_or(self.max_backoff)
			.min(self.max_backoff)
	}

	/// Applies the predicate to one attempt's outcome.
	pub fn should_retry(&self, outcome: &Result<ApiResponse>) -> bool {
		match outcome {
			Ok(response) => (self.predicate)(Some(response), None),
			Err(error) => (self.predicate)(None, Some(error)),
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
			initial_backoff: Self::DEFAULT_INITIAL_BACKOFF,
			max_backoff: Self::DEFAULT_MAX_BACKOFF,
			multiplier: Self::DEFAULT_MULTIPLIER,
			predicate: Arc::new(default_retry_predicate),
		}
	}
}
impl Debug for RetryPolicy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RetryPolicy")
			.field("max_attempts", &self.max_attempts)
			.field("initial_backoff", &self.initial_backoff)
			.field("max_backoff", &self.max_backoff)
			.field("multiplier", &self.multiplier)
			.finish_non_exhaustive()
	}
}

/// Re-sends requests according to a [`RetryPolicy`].
///
/// The context is checked before every attempt and every backoff sleep is interruptible. When
/// attempts run out the last outcome is returned unchanged.
pub struct RetryMiddleware {
	policy: RetryPolicy,
	recorder: Arc<dyn Recorder>,
}
impl RetryMiddleware {
	/// Creates the layer.
	pub fn new(policy: RetryPolicy) -> Self {
		Self { policy, recorder: obs::noop_recorder() }
	}

	/// Reports scheduled retries to `recorder`.
	pub fn with_recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
		self.recorder = recorder;

		self
	}

	/// Active policy.
	pub fn policy(&self) -> &RetryPolicy {
		&self.policy
	}
}
impl Debug for RetryMiddleware {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RetryMiddleware").field("policy", &self.policy).finish_non_exhaustive()
	}
}
impl Middleware for RetryMiddleware {
	fn handle<'a>(
		&'a self,
		ctx: &'a Context,
		request: ApiRequest,
		next: Next<'a>,
	) -> MiddlewareFuture<'a> {
		Box::pin(async move {
			let mut attempt = 1;

			loop {
				if let Some(cause) = ctx.err() {
					return Err(cause.into());
				}

				let outcome = next.run(ctx, request.clone()).await;

				if attempt >= self.policy.max_attempts || !self.policy.should_retry(&outcome) {
					return outcome;
				}

				let delay = self.policy.backoff(attempt - 1);

				attempt += 1;
				obs::retry_scheduled(attempt, delay);
				self.recorder.record_retry(attempt, delay);
				ctx.sleep(delay).await?;
			}
		})
	}
}
