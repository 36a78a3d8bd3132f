// self
use crate::{
	_prelude::*,
	auth::GrantKind,
	obs::{Outcome, RequestSample},
	rate_limit::{DimensionKey, RateLimitError},
};

/// Resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedCall<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedCall<F> = F;

/// Span covering one logical call through the pipeline.
#[derive(Clone, Debug)]
pub struct CallSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl CallSpan {
	/// Creates an `spapi_governor.call` span tagged with method and path.
	pub fn new(method: &reqwest::Method, path: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"spapi_governor.call",
				method = %method,
				path,
				status = tracing::field::Empty,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (method, path);

			Self {}
		}
	}

	/// Records the final status on the span.
	pub fn record_status(&self, status: Option<u16>) {
		#[cfg(feature = "tracing")]
		{
			if let Some(status) = status {
				self.span.record("status", status);
			}
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = status;
		}
	}

	/// Instruments a future without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedCall<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

pub(crate) fn call_finished(sample: &RequestSample, error: Option<&Error>) {
	#[cfg(feature = "tracing")]
	{
		let elapsed_ms = sample.elapsed.as_millis() as u64;

		match error {
			Some(error) => tracing::warn!(elapsed_ms, error = %error, "call failed"),
			None => tracing::debug!(
				status = sample.status,
				elapsed_ms,
				outcome = sample.outcome().as_str(),
				"call finished"
			),
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (sample, error);
	}
}

pub(crate) fn retry_scheduled(attempt: u32, delay: Duration) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying request");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (attempt, delay);
	}
}

pub(crate) fn throttled(key: &DimensionKey, waited: Duration) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(key = %key, waited_ms = waited.as_millis() as u64, "rate limited");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (key, waited);
	}
}

pub(crate) fn hint_rejected(key: &DimensionKey, error: &RateLimitError) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(key = %key, error = %error, "ignoring rate limit hint");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (key, error);
	}
}

pub(crate) fn token_fetched(grant: GrantKind, outcome: Outcome) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(grant = grant.as_str(), outcome = outcome.as_str(), "token exchange");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (grant, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrument_preserves_output() {
		let span = CallSpan::new(&reqwest::Method::GET, "/orders/v0/orders");

		span.record_status(Some(200));

		assert_eq!(span.instrument(async { 42 }).await, 42);
	}
}
