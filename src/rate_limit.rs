//! Multi-dimensional request throttling.
//!
//! [`TokenBucket`] is the single-key primitive: refill is computed lazily from elapsed time
//! under the bucket lock, never by a background timer. [`RateLimiter`] adds cancellable waits
//! and server-hint updates on top of one bucket, and [`RateLimitManager`] keeps one limiter per
//! [`DimensionKey`] (principal, application, marketplace, operation).

pub mod bucket;
pub mod limiter;
pub mod manager;

pub use bucket::*;
pub use limiter::*;
pub use manager::*;

// self
use crate::_prelude::*;

/// Validation failures for rate budgets and server hints.
#[derive(Clone, Debug, PartialEq, ThisError)]
pub enum RateLimitError {
	/// Rates must be positive and finite.
	#[error("Rate must be a positive finite number, got {rate}.")]
	InvalidRate {
		/// Rejected rate in tokens per second.
		rate: f64,
	},
	/// Burst capacity must allow at least one request.
	#[error("Burst capacity must be greater than zero.")]
	InvalidBurst,
	/// A server-supplied rate hint could not be parsed into a positive rate.
	#[error("Server rate hint `{value}` is not a positive number.")]
	InvalidHint {
		/// Raw header value.
		value: String,
	},
}

/// Validated `(rate, burst)` pair used to configure buckets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateBudget {
	rate: f64,
	burst: u32,
}
impl RateBudget {
	/// Validates and creates a budget of `rate` tokens per second with `burst` capacity.
	pub fn new(rate: f64, burst: u32) -> Result<Self, RateLimitError> {
		if !rate.is_finite() || rate <= 0.0 {
			return Err(RateLimitError::InvalidRate { rate });
		}
		if burst == 0 {
			return Err(RateLimitError::InvalidBurst);
		}

		Ok(Self { rate, burst })
	}

	/// Tokens added per second.
	pub fn rate(self) -> f64 {
		self.rate
	}

	/// Maximum number of tokens the bucket holds.
	pub fn burst(self) -> u32 {
		self.burst
	}
}
impl Display for RateBudget {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}/s (burst {})", self.rate, self.burst)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn budget_rejects_non_positive_values() {
		assert_eq!(RateBudget::new(0.0, 1), Err(RateLimitError::InvalidRate { rate: 0.0 }));
		assert_eq!(RateBudget::new(-1.0, 1), Err(RateLimitError::InvalidRate { rate: -1.0 }));
		assert!(RateBudget::new(f64::NAN, 1).is_err());
		assert!(RateBudget::new(f64::INFINITY, 1).is_err());
		assert_eq!(RateBudget::new(1.0, 0), Err(RateLimitError::InvalidBurst));

		let budget = RateBudget::new(0.0167, 20).expect("Fractional rates should be accepted.");

		assert_eq!(budget.burst(), 20);
		assert_eq!(budget.to_string(), "0.0167/s (burst 20)");
	}
}
