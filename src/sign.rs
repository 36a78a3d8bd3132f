//! Ordered request signing steps.
//!
//! A [`SignerChain`] runs each [`RequestSigner`] in registration order and stops at the first
//! failure. [`BearerSigner`] injects the LWA access token; [`RestrictedDataSigner`] then swaps it
//! for a restricted data token on sensitive paths.

pub mod restricted;

pub use restricted::*;

// self
use crate::{_prelude::*, auth::AccessTokenSource, transport::ApiRequest};

/// Header carrying the access token or restricted data token.
pub const ACCESS_TOKEN_HEADER: &str = "x-amz-access-token";

/// Boxed future returned by [`RequestSigner::sign`].
pub type SignFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a + Send>>;

/// One signing step.
pub trait RequestSigner: Send + Sync {
	/// Mutates `request` in place, typically by setting headers.
	fn sign<'a>(&'a self, ctx: &'a Context, request: &'a mut ApiRequest) -> SignFuture<'a>;
}

/// Signers applied in order.
#[derive(Clone, Default)]
pub struct SignerChain(Vec<Arc<dyn RequestSigner>>);
impl SignerChain {
	/// Creates an empty chain.
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder-style [`push`](Self::push).
	pub fn with(mut self, signer: impl RequestSigner + 'static) -> Self {
		self.push(Arc::new(signer));

		self
	}

	/// Appends a signer.
	pub fn push(&mut self, signer: Arc<dyn RequestSigner>) {
		self.0.push(signer);
	}

	/// Number of signers.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true when no signer is registered.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Applies every signer; the first error is returned unchanged.
	pub async fn sign(&self, ctx: &Context, request: &mut ApiRequest) -> Result<()> {
		for signer in &self.0 {
			signer.sign(ctx, request).await?;
		}

		Ok(())
	}
}
impl Debug for SignerChain {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SignerChain").field(&self.0.len()).finish()
	}
}

/// Sets [`ACCESS_TOKEN_HEADER`] from an access token source.
pub struct BearerSigner {
	source: Arc<dyn AccessTokenSource>,
}
impl BearerSigner {
	/// Signs with tokens from `source`.
	pub fn new(source: Arc<dyn AccessTokenSource>) -> Self {
		Self { source }
	}
}
impl RequestSigner for BearerSigner {
	fn sign<'a>(&'a self, ctx: &'a Context, request: &'a mut ApiRequest) -> SignFuture<'a> {
		Box::pin(async move {
			let token = self.source.access_token(ctx).await?;

			request.set_sensitive_header(ACCESS_TOKEN_HEADER, token.secret.expose())?;

			Ok(())
		})
	}
}
impl Debug for BearerSigner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BearerSigner").finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		auth::{AccessToken, AccessTokenFuture, Secret},
		error::AuthError,
	};

	struct Fixed(&'static str);
	impl AccessTokenSource for Fixed {
		fn access_token<'a>(&'a self, _ctx: &'a Context) -> AccessTokenFuture<'a> {
			let token = AccessToken::new(Secret::new(self.0), "bearer", 3600, OffsetDateTime::now_utc());

			Box::pin(async move { Ok(token) })
		}
	}

	struct Failing(Arc<AtomicUsize>);
	impl RequestSigner for Failing {
		fn sign<'a>(&'a self, _ctx: &'a Context, _request: &'a mut ApiRequest) -> SignFuture<'a> {
			self.0.fetch_add(1, Ordering::SeqCst);

			Box::pin(async { Err(AuthError::EmptyAccessToken.into()) })
		}
	}

	fn request() -> ApiRequest {
		ApiRequest::get(
			Url::parse("https://sellingpartnerapi-na.amazon.com/orders/v0/orders")
				.expect("Fixture URL should parse."),
		)
	}

	#[tokio::test]
	async fn bearer_signer_sets_a_hidden_header() {
		let chain = SignerChain::new().with(BearerSigner::new(Arc::new(Fixed("Atza|one"))));
		let mut request = request();

		chain.sign(&Context::new(), &mut request).await.expect("Signing should succeed.");

		assert_eq!(request.header_value(ACCESS_TOKEN_HEADER), Some("Atza|one"));
		assert!(!format!("{request:?}").contains("Atza|one"));
	}

	#[tokio::test]
	async fn first_failure_stops_the_chain() {
		let calls = Arc::new(AtomicUsize::new(0));
		let chain = SignerChain::new()
			.with(Failing(calls.clone()))
			.with(BearerSigner::new(Arc::new(Fixed("Atza|never"))));
		let mut request = request();
		let err = chain.sign(&Context::new(), &mut request).await.expect_err("Signing should fail.");

		assert!(matches!(err, Error::Auth(AuthError::EmptyAccessToken)));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(request.header_value(ACCESS_TOKEN_HEADER).is_none());
		assert_eq!(chain.len(), 2);
	}
}
