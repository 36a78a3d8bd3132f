//! Lazily refilled token bucket.

// self
use crate::{
	_prelude::*,
	rate_limit::{RateBudget, RateLimitError},
};

/// Lower bound for reported waits so callers never spin on a sub-millisecond deficit.
pub const MIN_WAIT: Duration = Duration::from_millis(1);

/// Outcome of a take attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquisition {
	/// Tokens were consumed.
	Granted,
	/// Not enough tokens; retry after `wait`.
	Throttled {
		/// Time needed to accumulate the deficit (at least [`MIN_WAIT`]).
		wait: Duration,
	},
}
impl Acquisition {
	/// Returns `true` when tokens were consumed.
	pub fn is_granted(self) -> bool {
		matches!(self, Self::Granted)
	}

	/// Returns the advised wait, zero when granted.
	pub fn wait(self) -> Duration {
		match self {
			Self::Granted => Duration::ZERO,
			Self::Throttled { wait } => wait,
		}
	}
}

/// Thread-safe token bucket with fractional tokens.
///
/// All state sits behind one mutex. Each access first credits `elapsed * rate` tokens (capped
/// at capacity), so `0 <= tokens <= capacity` holds at every observation point.
#[derive(Debug)]
pub struct TokenBucket(Mutex<BucketState>);
impl TokenBucket {
	/// Creates a full bucket refilling at `rate` tokens per second up to `capacity`.
	pub fn new(rate: f64, capacity: u32) -> Result<Self, RateLimitError> {
		Ok(Self::from_budget(RateBudget::new(rate, capacity)?))
	}

	/// Creates a full bucket from a validated budget.
	pub fn from_budget(budget: RateBudget) -> Self {
		Self::from_budget_at(budget, Instant::now())
	}

	pub(crate) fn from_budget_at(budget: RateBudget, now: Instant) -> Self {
		Self(Mutex::new(BucketState {
			budget,
			tokens: f64::from(budget.burst()),
			last_refill: now,
		}))
	}

	/// Consumes one token if available.
	pub fn take(&self) -> Acquisition {
		self.take_n_at(1, Instant::now())
	}

	/// Consumes `n` tokens if available; `n == 0` always succeeds.
	///
	/// Requests above capacity can never be granted; the reported wait is still the time to
	/// accumulate `n` tokens.
	pub fn take_n(&self, n: u32) -> Acquisition {
		self.take_n_at(n, Instant::now())
	}

	pub(crate) fn take_n_at(&self, n: u32, now: Instant) -> Acquisition {
		if n == 0 {
			return Acquisition::Granted;
		}

		let mut state = self.0.lock();

		state.refill(now);

		let needed = f64::from(n);

		if state.tokens >= needed {
			state.tokens -= needed;

			Acquisition::Granted
		} else {
			Acquisition::Throttled { wait: state.wait_for(needed) }
		}
	}

	/// Returns the tokens currently available.
	pub fn available(&self) -> f64 {
		self.available_at(Instant::now())
	}

	pub(crate) fn available_at(&self, now: Instant) -> f64 {
		let mut state = self.0.lock();

		state.refill(now);

		state.tokens
	}

	/// Returns how long until one token is available without consuming anything.
	pub fn peek_wait(&self) -> Duration {
		self.peek_wait_at(Instant::now())
	}

	pub(crate) fn peek_wait_at(&self, now: Instant) -> Duration {
		let mut state = self.0.lock();

		state.refill(now);

		if state.tokens >= 1.0 { Duration::ZERO } else { state.wait_for(1.0) }
	}

	/// Replaces rate and capacity, clamping the current tokens to the new capacity.
	pub fn update_rate(&self, rate: f64, capacity: u32) -> Result<(), RateLimitError> {
		self.set_budget(RateBudget::new(rate, capacity)?);

		Ok(())
	}

	/// Replaces the configuration with an already validated budget.
	pub fn set_budget(&self, budget: RateBudget) {
		self.set_budget_at(budget, Instant::now());
	}

	pub(crate) fn set_budget_at(&self, budget: RateBudget, now: Instant) {
		let mut state = self.0.lock();

		// Credit time elapsed under the old rate before switching.
		state.refill(now);
		state.budget = budget;
		state.tokens = state.tokens.min(f64::from(budget.burst()));
	}

	/// Returns the current configuration.
	pub fn budget(&self) -> RateBudget {
		self.0.lock().budget
	}

	/// Refills the bucket to capacity and restarts the refill clock.
	pub fn reset(&self) {
		let mut state = self.0.lock();

		state.tokens = f64::from(state.budget.burst());
		state.last_refill = Instant::now();
	}
}

#[derive(Debug)]
struct BucketState {
	budget: RateBudget,
	tokens: f64,
	last_refill: Instant,
}
impl BucketState {
	fn refill(&mut self, now: Instant) {
		let elapsed = now.saturating_duration_since(self.last_refill);

		if elapsed.is_zero() {
			return;
		}

		let capacity = f64::from(self.budget.burst());

		self.tokens = (self.tokens + elapsed.as_secs_f64() * self.budget.rate()).min(capacity);
		self.last_refill = now;
	}

	fn wait_for(&self, needed: f64) -> Duration {
		let deficit = (needed - self.tokens).max(0.0);

		Duration::try_from_secs_f64(deficit / self.budget.rate())
			.unwrap_or(Duration::MAX)
			.max(MIN_WAIT)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn bucket(rate: f64, capacity: u32, now: Instant) -> TokenBucket {
		let budget = RateBudget::new(rate, capacity).expect("Bucket fixture should be valid.");

		TokenBucket::from_budget_at(budget, now)
	}

	#[test]
	fn fresh_bucket_bursts_then_throttles() {
		let start = Instant::now();
		let bucket = bucket(0.5, 5, start);

		for _ in 0..5 {
			assert!(bucket.take_n_at(1, start).is_granted());
		}

		let denied = bucket.take_n_at(1, start);

		assert!(!denied.is_granted());
		assert_eq!(denied.wait(), Duration::from_secs(2));
	}

	#[test]
	fn refill_converges_to_rate_times_elapsed() {
		let start = Instant::now();
		let bucket = bucket(10.0, 5, start);

		assert!(bucket.take_n_at(5, start).is_granted());

		let available = bucket.available_at(start + Duration::from_millis(200));

		assert!((available - 2.0).abs() < 1e-9, "Expected ~2 tokens, got {available}.");

		let capped = bucket.available_at(start + Duration::from_secs(60));

		assert_eq!(capped, 5.0);
	}

	#[test]
	fn tokens_stay_within_bounds_across_mixed_takes() {
		let start = Instant::now();
		let bucket = bucket(3.0, 4, start);
		let mut now = start;

		for step in 0..200_u32 {
			now += Duration::from_millis(u64::from(step % 7) * 45);

			let _ = bucket.take_n_at(step % 3, now);
			let tokens = bucket.available_at(now);

			assert!((0.0..=4.0).contains(&tokens), "Tokens escaped bounds: {tokens}.");
		}
	}

	#[test]
	fn minimum_wait_prevents_busy_loops() {
		let start = Instant::now();
		let bucket = bucket(1_000_000.0, 1, start);

		assert!(bucket.take_n_at(1, start).is_granted());
		assert_eq!(bucket.take_n_at(1, start).wait(), MIN_WAIT);
	}

	#[test]
	fn zero_token_requests_always_succeed() {
		let start = Instant::now();
		let bucket = bucket(1.0, 1, start);

		assert!(bucket.take_n_at(1, start).is_granted());
		assert!(bucket.take_n_at(0, start).is_granted());
	}

	#[test]
	fn peek_wait_does_not_consume() {
		let start = Instant::now();
		let bucket = bucket(2.0, 1, start);

		assert_eq!(bucket.peek_wait_at(start), Duration::ZERO);
		assert_eq!(bucket.peek_wait_at(start), Duration::ZERO);
		assert!(bucket.take_n_at(1, start).is_granted());
		assert_eq!(bucket.peek_wait_at(start), Duration::from_millis(500));
	}

	#[test]
	fn update_rate_clamps_tokens_and_rejects_invalid_values() {
		let start = Instant::now();
		let bucket = bucket(1.0, 10, start);
		let smaller = RateBudget::new(5.0, 3).expect("Replacement budget should be valid.");

		bucket.set_budget_at(smaller, start);

		assert_eq!(bucket.available_at(start), 3.0);
		assert_eq!(bucket.budget(), smaller);
		assert!(bucket.update_rate(0.0, 3).is_err());
		assert!(bucket.update_rate(1.0, 0).is_err());
		assert_eq!(bucket.budget(), smaller, "Rejected updates must not change the budget.");
	}

	#[test]
	fn reset_refills_to_capacity() {
		let bucket = TokenBucket::new(0.001, 2).expect("Bucket should build.");

		assert!(bucket.take_n(2).is_granted());
		assert!(bucket.available() < 1.0);

		bucket.reset();

		assert!(bucket.available() >= 2.0);
	}
}
