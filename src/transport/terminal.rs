//! Terminal handler that performs the network call with `reqwest`.

// crates.io
use async_lock::Semaphore;
// self
use crate::{
	_prelude::*,
	config::PoolConfig,
	error::{ConfigError, TransportError},
	obs::{self, Recorder, RequestSample},
	transport::{ApiRequest, ApiResponse, Handler, MiddlewareFuture},
};

/// Per-origin cap on in-flight requests.
///
/// Origins are keyed by `scheme://host:port`. A cap of `0` disables the limit. The registry
/// holds one semaphore per origin ever contacted; a client only talks to its regional endpoint,
/// and [`prune`](Self::prune) releases origins with nothing in flight.
#[derive(Debug)]
pub struct HostLimits {
	max_per_host: usize,
	semaphores: RwLock<HashMap<String, Arc<Semaphore>>>,
}
impl HostLimits {
	/// Creates a registry that allows `max_per_host` concurrent requests per origin.
	pub fn new(max_per_host: usize) -> Self {
		Self { max_per_host, semaphores: Default::default() }
	}

	/// Configured cap; `0` means unlimited.
	pub fn max_per_host(&self) -> usize {
		self.max_per_host
	}

	/// Returns the semaphore guarding `url`'s origin, or `None` when unlimited.
	pub fn semaphore(&self, url: &Url) -> Option<Arc<Semaphore>> {
		if self.max_per_host == 0 {
			return None;
		}

		let origin = url.origin().ascii_serialization();

		if let Some(semaphore) = self.semaphores.read().get(&origin) {
			return Some(semaphore.clone());
		}

		let mut semaphores = self.semaphores.write();
		let semaphore = semaphores
			.entry(origin)
			.or_insert_with(|| Arc::new(Semaphore::new(self.max_per_host)))
			.clone();

		Some(semaphore)
	}

	/// Forgets origins without in-flight requests, returning how many were removed.
	pub fn prune(&self) -> usize {
		let mut semaphores = self.semaphores.write();
		let before = semaphores.len();

		// Held permits and waiters each keep a reference to the semaphore.
		semaphores.retain(|_, semaphore| Arc::strong_count(semaphore) > 1);

		before - semaphores.len()
	}

	/// Number of origins tracked.
	pub fn len(&self) -> usize {
		self.semaphores.read().len()
	}

	/// Returns true when no origin has been seen.
	pub fn is_empty(&self) -> bool {
		self.semaphores.read().is_empty()
	}
}

/// Sends requests with a shared [`ReqwestClient`] and buffers the response body.
///
/// Both the host permit and the network I/O race the caller's [`Context`].
pub struct ReqwestHandler {
	client: ReqwestClient,
	hosts: HostLimits,
	recorder: Arc<dyn Recorder>,
}
impl ReqwestHandler {
	/// Wraps an existing client.
	pub fn new(client: ReqwestClient, max_connections_per_host: usize) -> Self {
		Self { client, hosts: HostLimits::new(max_connections_per_host), recorder: obs::noop_recorder() }
	}

	/// Builds the client from `pool`.
	pub fn from_pool(pool: &PoolConfig) -> Result<Self, ConfigError> {
		Ok(Self::new(pool.build_client()?, pool.max_connections_per_host))
	}

	/// Reports every exchange to `recorder`.
	pub fn with_recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
		self.recorder = recorder;

		self
	}

	/// Underlying client, shared with the token endpoint.
	pub fn client(&self) -> &ReqwestClient {
		&self.client
	}

	/// Per-origin permit registry.
	pub fn hosts(&self) -> &HostLimits {
		&self.hosts
	}

	async fn send(&self, ctx: &Context, request: ApiRequest) -> Result<ApiResponse> {
		let _permit = match self.hosts.semaphore(&request.url) {
			Some(semaphore) => Some(ctx.run(semaphore.acquire_arc()).await?),
			None => None,
		};
		let response = ctx
			.run(request.into_reqwest(&self.client).send())
			.await?
			.map_err(|e| TransportError::from_reqwest("send", e))?;
		let status = response.status();
		let headers = response.headers().clone();
		let body = ctx
			.run(response.bytes())
			.await?
			.map_err(|e| TransportError::from_reqwest("read_body", e))?;

		Ok(ApiResponse { status, headers, body: body.to_vec() })
	}
}
impl Handler for ReqwestHandler {
	fn call<'a>(&'a self, ctx: &'a Context, request: ApiRequest) -> MiddlewareFuture<'a> {
		Box::pin(async move {
			let mut sample = RequestSample {
				method: request.method.clone(),
				host: request.url.host_str().map(ToOwned::to_owned),
				path: request.path().to_owned(),
				status: None,
				elapsed: Duration::ZERO,
			};
			let started = Instant::now();
			let result = self.send(ctx, request).await;

			sample.status = result.as_ref().ok().map(|response| response.status.as_u16());
			sample.elapsed = started.elapsed();
			self.recorder.record_request(&sample);

			result
		})
	}
}
impl Debug for ReqwestHandler {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ReqwestHandler").field("hosts", &self.hosts).finish_non_exhaustive()
	}
}
