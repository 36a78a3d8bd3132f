//! Cancellation contexts threaded through every blocking call.
//!
//! A [`Context`] couples a [`CancellationToken`] with an optional deadline. Rate limiter waits,
//! retry delays, singleflight guards, and network I/O race their work against
//! [`Context::done`], so cancelling a context (or letting its deadline pass) returns the matching
//! [`Cancellation`] promptly instead of after another sleep.

// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::_prelude::*;

/// Reason a [`Context`] stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ThisError)]
pub enum Cancellation {
	/// The context (or one of its parents) was cancelled explicitly.
	#[error("Context was cancelled.")]
	Cancelled,
	/// The context deadline passed.
	#[error("Context deadline exceeded.")]
	DeadlineExceeded,
}

/// Cancellation scope for a single logical call.
///
/// Cloning a context shares its token; [`child`](Self::child) and
/// [`with_timeout`](Self::with_timeout) derive a scope that is cancelled with the parent but
/// can be cancelled (or expire) independently.
#[derive(Clone, Debug, Default)]
pub struct Context {
	token: CancellationToken,
	deadline: Option<Instant>,
}
impl Context {
	/// Creates a root context without a deadline.
	pub fn new() -> Self {
		Self::default()
	}

	/// Wraps an existing token, e.g. one owned by a shutdown coordinator.
	pub fn with_cancellation(token: CancellationToken) -> Self {
		Self { token, deadline: None }
	}

	/// Derives a child scope that shares this context's deadline.
	pub fn child(&self) -> Self {
		Self { token: self.token.child_token(), deadline: self.deadline }
	}

	/// Derives a child scope that expires after `timeout`, keeping any earlier parent deadline.
	///
	/// A timeout too large to represent as an [`Instant`] adds no deadline.
	pub fn with_timeout(&self, timeout: Duration) -> Self {
		match Instant::now().checked_add(timeout) {
			Some(deadline) => self.with_deadline(deadline),
			None => self.child(),
		}
	}

	/// Derives a child scope that expires at `deadline`, keeping any earlier parent deadline.
	pub fn with_deadline(&self, deadline: Instant) -> Self {
		let deadline = match self.deadline {
			Some(current) if current <= deadline => current,
			_ => deadline,
		};

		Self { token: self.token.child_token(), deadline: Some(deadline) }
	}

	/// Cancels this context and every child derived from it.
	pub fn cancel(&self) {
		self.token.cancel();
	}

	/// Returns the underlying token.
	pub fn cancellation_token(&self) -> &CancellationToken {
		&self.token
	}

	/// Returns the effective deadline, if any.
	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	/// Returns the cancellation cause if the context already stopped.
	pub fn err(&self) -> Option<Cancellation> {
		if self.token.is_cancelled() {
			return Some(Cancellation::Cancelled);
		}

		match self.deadline {
			Some(deadline) if deadline <= Instant::now() => Some(Cancellation::DeadlineExceeded),
			_ => None,
		}
	}

	/// Resolves once the context is cancelled or its deadline passes.
	pub async fn done(&self) -> Cancellation {
		match self.deadline {
			Some(deadline) => tokio::select! {
				biased;
				_ = self.token.cancelled() => Cancellation::Cancelled,
				_ = tokio::time::sleep_until(deadline.into()) => Cancellation::DeadlineExceeded,
			},
			None => {
				self.token.cancelled().await;

				Cancellation::Cancelled
			},
		}
	}

	/// Drives `fut` to completion unless the context stops first.
	///
	/// A context that already stopped returns its cause without polling `fut`.
	pub async fn run<F>(&self, fut: F) -> Result<F::Output, Cancellation>
	where
		F: Future,
	{
		if let Some(cause) = self.err() {
			return Err(cause);
		}

		tokio::select! {
			biased;
			cause = self.done() => Err(cause),
			output = fut => Ok(output),
		}
	}

	/// Sleeps for `duration`, waking early with the cause if the context stops.
	pub async fn sleep(&self, duration: Duration) -> Result<(), Cancellation> {
		self.run(tokio::time::sleep(duration)).await
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn cancelled_context_short_circuits_run() {
		let ctx = Context::new();

		ctx.cancel();

		let result = ctx.run(async { 7 }).await;

		assert_eq!(result, Err(Cancellation::Cancelled));
	}

	#[tokio::test]
	async fn deadline_interrupts_sleep() {
		let ctx = Context::new().with_timeout(Duration::from_millis(10));
		let started = Instant::now();
		let result = ctx.sleep(Duration::from_secs(30)).await;

		assert_eq!(result, Err(Cancellation::DeadlineExceeded));
		assert!(started.elapsed() < Duration::from_secs(5));
		assert_eq!(ctx.err(), Some(Cancellation::DeadlineExceeded));
	}

	#[tokio::test]
	async fn parent_cancellation_reaches_children_only_downwards() {
		let parent = Context::new();
		let child = parent.child();
		let sibling = parent.child();

		child.cancel();

		assert_eq!(child.err(), Some(Cancellation::Cancelled));
		assert_eq!(parent.err(), None);
		assert_eq!(sibling.err(), None);

		parent.cancel();

		assert_eq!(sibling.err(), Some(Cancellation::Cancelled));
	}

	#[test]
	fn child_deadline_never_extends_parent() {
		let parent = Context::new().with_timeout(Duration::from_secs(1));
		let child = parent.with_timeout(Duration::from_secs(60));

		assert_eq!(child.deadline(), parent.deadline());

		let tighter = parent.with_timeout(Duration::from_millis(1));

		assert!(tighter.deadline() < parent.deadline());
	}

	#[test]
	fn unrepresentable_timeouts_add_no_deadline() {
		let ctx = Context::new().with_timeout(Duration::MAX);

		assert_eq!(ctx.deadline(), None);
		assert_eq!(ctx.err(), None);

		let bounded = Context::new().with_timeout(Duration::from_secs(1));

		assert_eq!(bounded.with_timeout(Duration::MAX).deadline(), bounded.deadline());
	}

	#[tokio::test]
	async fn run_returns_output_when_not_cancelled() {
		let ctx = Context::new().with_timeout(Duration::from_secs(5));
		let value = ctx.run(async { "done" }).await.expect("Future should finish in time.");

		assert_eq!(value, "done");
	}
}
