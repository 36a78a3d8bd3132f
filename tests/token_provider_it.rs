// std
use std::{sync::Arc, time::Duration};
// crates.io
use httpmock::prelude::*;
// self
use spapi_governor::{
	auth::{Credentials, TokenCache, TokenProvider},
	context::{Cancellation, Context},
	error::{AuthError, Error},
	url::Url,
};

const CLIENT_ID: &str = "amzn1.application-oa2-client.integration";
const CLIENT_SECRET: &str = "secret-integration";

fn token_endpoint(server: &MockServer) -> Url {
	Url::parse(&server.url("/auth/o2/token")).expect("Mock token endpoint should parse.")
}

fn refresh_credentials(server: &MockServer) -> Credentials {
	Credentials::builder()
		.client_id(CLIENT_ID)
		.client_secret(CLIENT_SECRET)
		.refresh_token("Atzr|integration")
		.token_endpoint(token_endpoint(server))
		.build()
		.expect("Refresh credentials should build.")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_fetch() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/o2/token").body_includes("grant_type=refresh_token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(Duration::from_millis(100))
				.body(r#"{"access_token":"Atza|shared","token_type":"bearer","expires_in":3600}"#);
		})
		.await;
	let provider = Arc::new(TokenProvider::new(refresh_credentials(&server)));
	let ctx = Context::new();
	let mut tasks = Vec::new();

	for _ in 0..16 {
		let provider = provider.clone();
		let ctx = ctx.clone();

		tasks.push(tokio::spawn(async move { provider.get_access_token(&ctx).await }));
	}
	for task in tasks {
		let token = task
			.await
			.expect("Token task should not panic.")
			.expect("Every caller should receive a token.");

		assert_eq!(token.secret.expose(), "Atza|shared");
	}

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn client_credentials_send_normalized_scopes() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/auth/o2/token")
				.body_includes("grant_type=client_credentials")
				.body_includes("scope=sellingpartnerapi%3A%3Anotifications")
				.body_includes(format!("client_id={CLIENT_ID}"));
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"Atc|grantless","token_type":"bearer","expires_in":3600}"#);
		})
		.await;
	let credentials = Credentials::builder()
		.client_id(CLIENT_ID)
		.client_secret(CLIENT_SECRET)
		.scopes(["sellingpartnerapi::notifications", "sellingpartnerapi::notifications"])
		.token_endpoint(token_endpoint(&server))
		.build()
		.expect("Client credentials should build.");
	let provider = TokenProvider::new(credentials);
	let token =
		provider.get_access_token(&Context::new()).await.expect("Grantless fetch should succeed.");

	assert_eq!(token.secret.expose(), "Atc|grantless");
	assert_eq!(token.expires_in, 3600);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn providers_with_equal_credentials_share_a_cache() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/o2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"Atza|cached","token_type":"bearer","expires_in":3600}"#);
		})
		.await;
	let cache = Arc::new(TokenCache::new());
	let first = TokenProvider::new(refresh_credentials(&server)).with_cache(cache.clone());
	let second = TokenProvider::new(refresh_credentials(&server)).with_cache(cache.clone());
	let ctx = Context::new();

	assert_eq!(first.cache_key(), second.cache_key());

	first.get_access_token(&ctx).await.expect("First provider should fetch.");
	second.get_access_token(&ctx).await.expect("Second provider should hit the cache.");

	assert_eq!(cache.len(), 1);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn forced_refresh_replaces_the_cached_token() {
	let server = MockServer::start_async().await;
	let first = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/o2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"Atza|first","token_type":"bearer","expires_in":3600}"#);
		})
		.await;
	let provider = TokenProvider::new(refresh_credentials(&server));
	let ctx = Context::new();
	let initial = provider.get_access_token(&ctx).await.expect("Initial fetch should succeed.");

	assert_eq!(initial.secret.expose(), "Atza|first");

	first.delete_async().await;

	let second = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/o2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"Atza|second","token_type":"bearer","expires_in":3600}"#);
		})
		.await;
	let refreshed = provider.refresh_token(&ctx).await.expect("Forced refresh should succeed.");

	assert_eq!(refreshed.secret.expose(), "Atza|second");
	assert_ne!(refreshed, initial);

	let cached = provider
		.cache()
		.get_fresh(provider.cache_key())
		.expect("The refreshed token should be cached.");

	assert_eq!(cached, refreshed);
	assert_eq!(
		provider.get_access_token(&ctx).await.expect("Cache hit should succeed.").secret.expose(),
		"Atza|second"
	);

	second.assert_calls_async(1).await;
}

#[tokio::test]
async fn success_status_with_error_body_is_rejected() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/o2/token");
			then.status(200).header("content-type", "application/json").body(
				r#"{"error":"invalid_client","error_description":"Client authentication failed"}"#,
			);
		})
		.await;

	let provider = TokenProvider::new(refresh_credentials(&server));
	let err = provider
		.get_access_token(&Context::new())
		.await
		.expect_err("An error body should never become a token.");

	assert!(matches!(
		err,
		Error::Auth(AuthError::Rejected { ref error, .. }) if error == "invalid_client"
	));
	assert!(provider.cache().is_empty());
}

#[tokio::test]
async fn missing_expiry_is_rejected() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/o2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"Atza|forever","token_type":"bearer"}"#);
		})
		.await;

	let provider = TokenProvider::new(refresh_credentials(&server));
	let err = provider
		.get_access_token(&Context::new())
		.await
		.expect_err("Tokens without expiry should be rejected.");

	assert!(matches!(err, Error::Auth(AuthError::InvalidExpiry)));
}

#[tokio::test]
async fn deadline_stops_a_slow_exchange() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/o2/token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(Duration::from_secs(2))
				.body(r#"{"access_token":"Atza|late","token_type":"bearer","expires_in":3600}"#);
		})
		.await;

	let provider = TokenProvider::new(refresh_credentials(&server));
	let ctx = Context::new().with_timeout(Duration::from_millis(50));
	let err = provider.get_access_token(&ctx).await.expect_err("The deadline should win.");

	assert_eq!(err.cancellation(), Some(Cancellation::DeadlineExceeded));
	assert!(provider.cache().is_empty());
}
