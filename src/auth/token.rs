//! Access tokens with a proactive expiry margin.

// self
use crate::{_prelude::*, auth::Secret};

/// Tokens are treated as expired this long before their real expiry.
pub const EXPIRY_MARGIN: time::Duration = time::Duration::seconds(60);

/// Bearer credential returned by the token endpoint (or the restricted data token API).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessToken {
	/// Token value sent in `x-amz-access-token`.
	pub secret: Secret,
	/// Token type reported by the issuer (`bearer` for LWA).
	pub token_type: String,
	/// Lifetime in seconds as reported by the issuer.
	pub expires_in: u64,
	/// Wall-clock time the response was received.
	pub issued_at: OffsetDateTime,
	/// `issued_at + expires_in`.
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Creates a token whose expiry is derived from `issued_at` and `expires_in`.
	pub fn new(
		secret: Secret,
		token_type: impl Into<String>,
		expires_in: u64,
		issued_at: OffsetDateTime,
	) -> Self {
		let lifetime = time::Duration::seconds(i64::try_from(expires_in).unwrap_or(i64::MAX));
		let expires_at = issued_at.checked_add(lifetime).unwrap_or(issued_at);

		Self { secret, token_type: token_type.into(), expires_in, issued_at, expires_at }
	}

	/// Returns true if the token is within [`EXPIRY_MARGIN`] of expiry at `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		now + EXPIRY_MARGIN >= self.expires_at
	}

	/// Returns true if the token is within [`EXPIRY_MARGIN`] of expiry.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	/// Time left before the token stops being served from cache.
	pub fn remaining_at(&self, now: OffsetDateTime) -> time::Duration {
		(self.expires_at - EXPIRY_MARGIN - now).max(time::Duration::ZERO)
	}
}

/// Expiry check that treats a missing token as expired.
pub fn token_expired(token: Option<&AccessToken>, now: OffsetDateTime) -> bool {
	token.is_none_or(|token| token.is_expired_at(now))
}
