//! Onion-style middleware pipeline in front of a terminal HTTP handler.
//!
//! Middleware registered later wraps middleware registered earlier, so the last registered
//! layer sees the request first and the response last. [`Next`] walks the registered slice on
//! every call; nothing is rebuilt per request.

pub mod middleware;
pub mod request;
pub mod retry;
pub mod terminal;

pub use middleware::*;
pub use request::*;
pub use retry::*;
pub use terminal::*;

// self
use crate::_prelude::*;

/// `x-amz-date` request header.
pub const DATE_HEADER: &str = "x-amz-date";
/// Client-generated request identifier header.
pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// Server rate hint header (requests per second).
pub const RATE_LIMIT_HEADER: &str = "x-amzn-ratelimit-limit";
/// Server-assigned request identifier header.
pub const AMZN_REQUEST_ID_HEADER: &str = "x-amzn-requestid";

/// Boxed future produced by middleware and handlers.
pub type MiddlewareFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse>> + 'a + Send>>;

/// Terminal step of the pipeline that performs the network call.
pub trait Handler: Send + Sync {
	/// Sends `request` and buffers the response.
	fn call<'a>(&'a self, ctx: &'a Context, request: ApiRequest) -> MiddlewareFuture<'a>;
}

/// One layer of the pipeline.
pub trait Middleware: Send + Sync {
	/// Processes `request`, delegating to `next` zero or more times.
	fn handle<'a>(
		&'a self,
		ctx: &'a Context,
		request: ApiRequest,
		next: Next<'a>,
	) -> MiddlewareFuture<'a>;
}

/// The remainder of the pipeline below the current layer.
#[derive(Clone, Copy)]
pub struct Next<'a> {
	middlewares: &'a [Arc<dyn Middleware>],
	handler: &'a dyn Handler,
}
impl<'a> Next<'a> {
	/// Dispatches `request` to the next layer, or to the handler when none remain.
	///
	/// `ctx` may be shorter lived than the chain, which lets a layer pass a scoped child context.
	pub fn run<'b>(self, ctx: &'b Context, request: ApiRequest) -> MiddlewareFuture<'b>
	where
		'a: 'b,
	{
		match self.middlewares.split_last() {
			Some((outer, rest)) =>
				outer.handle(ctx, request, Next { middlewares: rest, handler: self.handler }),
			None => self.handler.call(ctx, request),
		}
	}

	/// Number of middleware layers left below the current one.
	pub fn remaining(&self) -> usize {
		self.middlewares.len()
	}
}
impl Debug for Next<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Next").field("remaining", &self.middlewares.len()).finish()
	}
}

/// Middleware pipeline plus terminal handler.
#[derive(Clone)]
pub struct TransportClient {
	middlewares: Vec<Arc<dyn Middleware>>,
	handler: Arc<dyn Handler>,
}
impl TransportClient {
	/// Creates a pipeline with no middleware.
	pub fn new(handler: impl Handler + 'static) -> Self {
		Self::with_handler(Arc::new(handler))
	}

	/// Creates a pipeline around a shared handler.
	pub fn with_handler(handler: Arc<dyn Handler>) -> Self {
		Self { middlewares: Vec::new(), handler }
	}

	/// Registers `middleware` as the new outermost layer.
	pub fn use_middleware(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
		self.use_shared(Arc::new(middleware))
	}

	/// Registers an already shared middleware as the new outermost layer.
	pub fn use_shared(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
		self.middlewares.push(middleware);

		self
	}

	/// Builder-style [`use_middleware`](Self::use_middleware).
	pub fn with_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
		self.use_middleware(middleware);

		self
	}

	/// Number of registered layers.
	pub fn middleware_count(&self) -> usize {
		self.middlewares.len()
	}

	/// Runs `request` through every layer and the handler.
	pub async fn execute(&self, ctx: &Context, request: ApiRequest) -> Result<ApiResponse> {
		Next { middlewares: &self.middlewares, handler: self.handler.as_ref() }
			.run(ctx, request)
			.await
	}
}
impl Debug for TransportClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TransportClient")
			.field("middlewares", &self.middlewares.len())
			.finish_non_exhaustive()
	}
}
