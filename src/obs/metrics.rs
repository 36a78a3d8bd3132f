// self
use crate::{
	_prelude::*,
	auth::GrantKind,
	obs::{Outcome, Recorder, RequestSample},
	rate_limit::DimensionKey,
};

/// [`Recorder`] reporting through the global `metrics` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsRecorder;
impl Recorder for MetricsRecorder {
	fn record_request(&self, sample: &RequestSample) {
		metrics::counter!(
			"spapi_governor_requests_total",
			"method" => sample.method.to_string(),
			"outcome" => sample.outcome().as_str()
		)
		.increment(1);
		metrics::histogram!(
			"spapi_governor_request_duration_seconds",
			"method" => sample.method.to_string()
		)
		.record(sample.elapsed.as_secs_f64());
	}

	fn record_retry(&self, attempt: u32, _delay: Duration) {
		metrics::counter!("spapi_governor_retries_total", "attempt" => attempt.to_string())
			.increment(1);
	}

	fn record_rate_limit_wait(&self, key: &DimensionKey, waited: Duration) {
		metrics::histogram!(
			"spapi_governor_rate_limit_wait_seconds",
			"operation" => key.operation.clone()
		)
		.record(waited.as_secs_f64());
	}

	fn record_token_fetch(&self, grant: GrantKind, outcome: Outcome) {
		metrics::counter!(
			"spapi_governor_token_fetch_total",
			"grant" => grant.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}
}
