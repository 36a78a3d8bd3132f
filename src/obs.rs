//! Observability hooks for the governance layer.
//!
//! # Feature Flags
//!
//! - `tracing` (default) wraps every pipeline call in an `spapi_governor.call` span and emits
//!   events for retries, throttling, token fetches, and rejected rate hints.
//! - `metrics` enables [`MetricsRecorder`], which reports `spapi_governor_requests_total`,
//!   `spapi_governor_retries_total`, `spapi_governor_rate_limit_wait_seconds`, and
//!   `spapi_governor_token_fetch_total` through the `metrics` facade.
//!
//! Without either feature the hooks compile to no-ops. A [`Recorder`] value is always injected
//! at construction; there is no global sink.

#[cfg(feature = "metrics")] mod metrics;
mod tracing;

#[cfg(feature = "metrics")] pub use metrics::*;
pub use tracing::*;

// self
use crate::{_prelude::*, auth::GrantKind, rate_limit::DimensionKey};

/// Outcome labels recorded for requests and token fetches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// The call produced a usable result.
	Success,
	/// The call failed or returned an error status.
	Failure,
}
impl Outcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Success => "success",
			Self::Failure => "failure",
		}
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Measurement taken for one HTTP exchange or one whole pipeline call.
#[derive(Clone, Debug)]
pub struct RequestSample {
	/// HTTP method.
	pub method: reqwest::Method,
	/// Target host, when the URL has one.
	pub host: Option<String>,
	/// URL path.
	pub path: String,
	/// Response status; `None` when no response arrived.
	pub status: Option<u16>,
	/// Wall time spent.
	pub elapsed: Duration,
}
impl RequestSample {
	/// Success for statuses below 400.
	pub fn outcome(&self) -> Outcome {
		match self.status {
			Some(status) if status < 400 => Outcome::Success,
			_ => Outcome::Failure,
		}
	}
}

/// Sink for governance measurements. Every method defaults to a no-op.
pub trait Recorder: Send + Sync {
	/// One terminal HTTP exchange (one per attempt).
	fn record_request(&self, _sample: &RequestSample) {}

	/// One logical call through the whole pipeline.
	fn record_call(&self, _sample: &RequestSample) {}

	/// A retry was scheduled after `delay`; `attempt` is the attempt about to run (1-based).
	fn record_retry(&self, _attempt: u32, _delay: Duration) {}

	/// Time spent waiting on the limiter for `key`.
	fn record_rate_limit_wait(&self, _key: &DimensionKey, _waited: Duration) {}

	/// One upstream token exchange.
	fn record_token_fetch(&self, _grant: GrantKind, _outcome: Outcome) {}
}

/// Recorder that drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRecorder;
impl Recorder for NoopRecorder {}

/// Shared no-op recorder used when none is configured.
pub fn noop_recorder() -> Arc<dyn Recorder> {
	Arc::new(NoopRecorder)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn sample_outcome_follows_status() {
		let mut sample = RequestSample {
			method: reqwest::Method::GET,
			host: Some("sellingpartnerapi-na.amazon.com".into()),
			path: "/orders/v0/orders".into(),
			status: Some(200),
			elapsed: Duration::from_millis(5),
		};

		assert_eq!(sample.outcome(), Outcome::Success);

		sample.status = Some(429);

		assert_eq!(sample.outcome(), Outcome::Failure);

		sample.status = None;

		assert_eq!(sample.outcome(), Outcome::Failure);
	}

	#[test]
	fn noop_recorder_accepts_everything() {
		let recorder = noop_recorder();

		recorder.record_retry(2, Duration::from_millis(100));
		recorder.record_token_fetch(GrantKind::RefreshToken, Outcome::Success);
		recorder.record_rate_limit_wait(&DimensionKey::new("s", "a", "m", "o"), Duration::ZERO);
	}
}
