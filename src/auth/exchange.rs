//! `oauth2` client facade performing the Login-with-Amazon token exchange.

// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError, RefreshToken,
	RequestTokenError, Scope, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Credentials, GrantFlow, Secret},
	error::{AuthError, ConfigError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};

const OPERATION: &str = "token_exchange";

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Posts credentials to the token endpoint with request-body client authentication.
pub(crate) struct TokenExchange<C>
where
	C: ?Sized + TokenHttpClient,
{
	oauth_client: ConfiguredBasicClient,
	http_client: Arc<C>,
}
impl<C> TokenExchange<C>
where
	C: ?Sized + TokenHttpClient,
{
	pub(crate) fn new(credentials: &Credentials, http_client: Arc<C>) -> Self {
		let oauth_client = BasicClient::new(ClientId::new(credentials.client_id().to_owned()))
			.set_client_secret(ClientSecret::new(credentials.client_secret().expose().to_owned()))
			.set_token_uri(TokenUrl::from_url(credentials.token_endpoint().clone()))
			.set_auth_type(AuthType::RequestBody);

		Self { oauth_client, http_client }
	}

	/// Performs one exchange; never returns a partially populated token.
	pub(crate) async fn fetch(&self, grant: &GrantFlow) -> Result<AccessToken> {
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());
		let response = match grant {
			GrantFlow::RefreshToken(secret) => {
				let refresh = RefreshToken::new(secret.expose().to_owned());

				self.oauth_client.exchange_refresh_token(&refresh).request_async(&handle).await
			},
			GrantFlow::ClientCredentials(scopes) => {
				let mut request = self.oauth_client.exchange_client_credentials();

				for scope in scopes.iter() {
					request = request.add_scope(Scope::new(scope.to_owned()));
				}

				request.request_async(&handle).await
			},
		};
		let issued_at = OffsetDateTime::now_utc();

		match response {
			Ok(response) => map_token_response(meta.take(), response, issued_at),
			Err(err) => Err(map_request_error(meta.take(), err)),
		}
	}
}

fn map_token_response(
	meta: Option<ResponseMetadata>,
	response: BasicTokenResponse,
	issued_at: OffsetDateTime,
) -> Result<AccessToken> {
	if let Some(ResponseMetadata { status, oauth_error: Some(body) }) = meta {
		return Err(AuthError::Rejected {
			status,
			error: body.error,
			description: body.error_description,
		}
		.into());
	}

	let secret = response.access_token().secret();

	if secret.trim().is_empty() {
		return Err(AuthError::EmptyAccessToken.into());
	}

	let expires_in = response
		.expires_in()
		.map(|lifetime| lifetime.as_secs())
		.filter(|secs| *secs > 0)
		.ok_or(AuthError::InvalidExpiry)?;

	Ok(AccessToken::new(
		Secret::new(secret.to_owned()),
		response.token_type().as_ref(),
		expires_in,
		issued_at,
	))
}

fn map_request_error<E>(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	let status = meta.as_ref().and_then(|meta| meta.status);

	match err {
		RequestTokenError::ServerResponse(response) => AuthError::Rejected {
			status,
			error: response.error().as_ref().to_owned(),
			description: response.error_description().cloned(),
		}
		.into(),
		RequestTokenError::Request(error) => map_transport_error(status, error),
		// A 2xx body without `access_token` lands here; surface its OAuth error when present.
		RequestTokenError::Parse(source, _body) => match meta.and_then(|meta| meta.oauth_error) {
			Some(body) => AuthError::Rejected {
				status,
				error: body.error,
				description: body.error_description,
			}
			.into(),
			None => AuthError::MalformedResponse { status, source }.into(),
		},
		RequestTokenError::Other(message) => AuthError::UnexpectedResponse { status, message }.into(),
	}
}

fn map_transport_error<E>(status: Option<u16>, err: HttpClientError<E>) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	match err {
		HttpClientError::Reqwest(inner) =>
			TransportError::Network { operation: OPERATION, source: inner }.into(),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) => AuthError::UnexpectedResponse { status, message }.into(),
		_ => AuthError::UnexpectedResponse {
			status,
			message: "unhandled HTTP client error".into(),
		}
		.into(),
	}
}
