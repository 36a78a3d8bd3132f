//! Single-bucket limiter with cancellable waits and server-hint updates.

// self
use crate::{
	_prelude::*,
	rate_limit::{Acquisition, RateBudget, RateLimitError, TokenBucket},
};

/// Rate limiter delegating to exactly one [`TokenBucket`].
#[derive(Debug)]
pub struct RateLimiter {
	bucket: TokenBucket,
}
impl RateLimiter {
	/// Creates a limiter allowing `rate` requests per second with bursts of `burst`.
	pub fn new(rate: f64, burst: u32) -> Result<Self, RateLimitError> {
		Ok(Self::from_budget(RateBudget::new(rate, burst)?))
	}

	/// Creates a limiter from a validated budget.
	pub fn from_budget(budget: RateBudget) -> Self {
		Self { bucket: TokenBucket::from_budget(budget) }
	}

	/// Consumes a token if one is available right now.
	pub fn allow(&self) -> bool {
		self.bucket.take().is_granted()
	}

	/// Returns how long the caller should wait before a token is available.
	///
	/// Nothing is reserved: callers must still go through [`allow`](Self::allow) or
	/// [`wait`](Self::wait) after sleeping.
	pub fn reserve(&self) -> Duration {
		self.bucket.peek_wait()
	}

	/// Blocks until a token is consumed or `ctx` stops.
	///
	/// Every retry sleeps at least [`MIN_WAIT`](crate::rate_limit::MIN_WAIT), and a stopped
	/// context returns its [`Cancellation`] immediately.
	pub async fn wait(&self, ctx: &Context) -> Result<(), Cancellation> {
		loop {
			if let Some(cause) = ctx.err() {
				return Err(cause);
			}

			match self.bucket.take() {
				Acquisition::Granted => return Ok(()),
				Acquisition::Throttled { wait } => ctx.sleep(wait).await?,
			}
		}
	}

	/// Replaces the rate and burst.
	pub fn set_rate(&self, rate: f64, burst: u32) -> Result<(), RateLimitError> {
		self.bucket.update_rate(rate, burst)
	}

	/// Returns the current rate and burst.
	pub fn rate(&self) -> RateBudget {
		self.bucket.budget()
	}

	/// Applies a server-supplied requests-per-second hint while keeping the current burst.
	///
	/// A missing or blank hint is a no-op.
	pub fn update_from_server_hint(&self, hint: Option<&str>) -> Result<(), RateLimitError> {
		let Some(raw) = hint.map(str::trim).filter(|value| !value.is_empty()) else {
			return Ok(());
		};
		let rate = raw
			.parse::<f64>()
			.map_err(|_| RateLimitError::InvalidHint { value: raw.to_owned() })?;
		let budget = RateBudget::new(rate, self.rate().burst())
			.map_err(|_| RateLimitError::InvalidHint { value: raw.to_owned() })?;

		self.bucket.set_budget(budget);

		Ok(())
	}

	/// Exposes the bucket for diagnostics.
	pub fn bucket(&self) -> &TokenBucket {
		&self.bucket
	}
}
