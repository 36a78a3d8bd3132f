// std
use std::{
	sync::{Arc, Mutex},
	time::{Duration, Instant},
};
// crates.io
use httpmock::prelude::*;
use serde::Deserialize;
// self
use spapi_governor::{
	auth::Credentials,
	client::Client,
	context::Context,
	error::{AuthError, Error},
	obs::{Recorder, RequestSample},
	rate_limit::DimensionKey,
	reqwest::Method,
	sign::RestrictedResources,
	transport::RetryPolicy,
	url::Url,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Participations {
	payload: Vec<Participation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Participation {
	marketplace_id: String,
}

#[derive(Default)]
struct Calls(Mutex<Vec<RequestSample>>);
impl Recorder for Calls {
	fn record_call(&self, sample: &RequestSample) {
		self.0.lock().expect("Test lock should not be poisoned.").push(sample.clone());
	}
}

fn credentials(server: &MockServer) -> Credentials {
	Credentials::builder()
		.client_id("amzn1.application-oa2-client.e2e")
		.client_secret("secret-e2e")
		.refresh_token("Atzr|e2e")
		.token_endpoint(Url::parse(&server.url("/auth/o2/token")).expect("Mock URL should parse."))
		.build()
		.expect("Credentials fixture should build.")
}

fn endpoint(server: &MockServer) -> Url {
	Url::parse(&server.base_url()).expect("Mock URL should parse.")
}

#[tokio::test]
async fn signed_calls_reuse_one_access_token() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/o2/token").body_includes("refresh_token=Atzr%7Ce2e");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"Atza|e2e","token_type":"bearer","expires_in":3600}"#);
		})
		.await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/sellers/v1/marketplaceParticipations")
				.header("x-amz-access-token", "Atza|e2e")
				.header_exists("x-amz-date")
				.header_exists("x-request-id")
				.header_exists("user-agent");
			then.status(200)
				.header("content-type", "application/json")
				.header("x-amzn-RateLimit-Limit", "0.016")
				.body(r#"{"payload":[{"marketplaceId":"ATVPDKIKX0DER"}]}"#);
		})
		.await;
	let calls = Arc::new(Calls::default());
	let client = Client::builder()
		.endpoint(endpoint(&server))
		.credentials(credentials(&server))
		.operation_rate_limit("getMarketplaceParticipations", 0.016, 15)
		.recorder(calls.clone())
		.build()
		.expect("Client should build.");
	let key = DimensionKey::new("seller", "app", "ATVPDKIKX0DER", "getMarketplaceParticipations");
	let ctx = Context::new();

	for _ in 0..2 {
		let request = client
			.request(Method::GET, "/sellers/v1/marketplaceParticipations")
			.expect("Path should join.")
			.rate_limited(key.clone());
		let response = client.execute(&ctx, request).await.expect("Call should succeed.");
		let body: Participations = response.json().expect("Body should decode.");

		assert_eq!(body.payload[0].marketplace_id, "ATVPDKIKX0DER");
	}

	let budget = client.rate_limits().get(&key).expect("Limiter should exist.").rate();

	assert_eq!(budget.burst(), 15);
	assert_eq!(calls.0.lock().expect("Test lock should not be poisoned.").len(), 2);

	token.assert_calls_async(1).await;
	api.assert_calls_async(2).await;
}

#[tokio::test]
async fn restricted_paths_are_signed_with_a_restricted_data_token() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/o2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"Atza|e2e","token_type":"bearer","expires_in":3600}"#);
		})
		.await;

	let rdt = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/tokens/2021-03-01/restrictedDataToken")
				.header("x-amz-access-token", "Atza|e2e")
				.body_includes(r#""path":"/orders/v0/orders/902-1845936-5435065/address""#);
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"restrictedDataToken":"Atz.sprdt|e2e","expiresIn":3600}"#);
		})
		.await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/orders/v0/orders/902-1845936-5435065/address")
				.header("x-amz-access-token", "Atz.sprdt|e2e");
			then.status(200).header("content-type", "application/json").body(r#"{"payload":{}}"#);
		})
		.await;
	let client = Client::builder()
		.endpoint(endpoint(&server))
		.credentials(credentials(&server))
		.restricted_resources(RestrictedResources::sp_api_defaults())
		.build()
		.expect("Client should build.");
	let request = client
		.request(Method::GET, "/orders/v0/orders/902-1845936-5435065/address")
		.expect("Path should join.");
	let response =
		client.execute(&Context::new(), request).await.expect("Restricted call should succeed.");

	assert!(response.is_success());

	rdt.assert_calls_async(1).await;
	api.assert_calls_async(1).await;
}

#[tokio::test]
async fn token_rejections_fail_fast_without_retrying() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/o2/token");
			then.status(400).header("content-type", "application/json").body(
				r#"{"error":"invalid_grant","error_description":"The refresh token is invalid."}"#,
			);
		})
		.await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/sellers/v1/marketplaceParticipations");
			then.status(200);
		})
		.await;
	let client = Client::builder()
		.endpoint(endpoint(&server))
		.credentials(credentials(&server))
		.build()
		.expect("Client should build.");
	let request = client
		.request(Method::GET, "/sellers/v1/marketplaceParticipations")
		.expect("Path should join.");
	let err = client
		.execute(&Context::new(), request)
		.await
		.expect_err("Rejected credentials should fail the call.");

	assert!(matches!(err, Error::Auth(AuthError::Rejected { status: Some(400), .. })));

	token.assert_calls_async(1).await;
	api.assert_calls_async(0).await;
}

#[tokio::test]
async fn throttled_calls_wait_past_the_attempt_timeout() {
	let server = MockServer::start_async().await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/sellers/v1/marketplaceParticipations");
			then.status(200).header("content-type", "application/json").body(r#"{"payload":[]}"#);
		})
		.await;
	let client = Client::builder()
		.endpoint(endpoint(&server))
		.default_rate_limit(2.0, 1)
		.timeout(Duration::from_millis(100))
		.retry(RetryPolicy::disabled())
		.build()
		.expect("Client should build.");
	let key = DimensionKey::new("seller", "app", "ATVPDKIKX0DER", "getMarketplaceParticipations");
	let ctx = Context::new();
	let started = Instant::now();

	for _ in 0..2 {
		let request = client
			.request(Method::GET, "/sellers/v1/marketplaceParticipations")
			.expect("Path should join.")
			.rate_limited(key.clone());
		let response =
			client.execute(&ctx, request).await.expect("Throttled calls should wait, not time out.");

		assert_eq!(response.status.as_u16(), 200);
	}

	// The second call waits about 500ms for a token, five times the attempt timeout.
	assert!(started.elapsed() >= Duration::from_millis(400));

	api.assert_calls_async(2).await;
}
