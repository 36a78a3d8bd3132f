//! Shared access-token cache with per-key singleflight guards.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, CacheKey},
};

/// Read-mostly token cache keyed by credential identity.
///
/// One cache can back many [`TokenProvider`](crate::auth::TokenProvider)s. Each key also owns
/// an async guard; providers hold it while fetching so concurrent misses coalesce into a single
/// upstream exchange.
#[derive(Debug, Default)]
pub struct TokenCache {
	tokens: RwLock<HashMap<CacheKey, AccessToken>>,
	guards: Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>,
}
impl TokenCache {
	/// Creates an empty cache.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the cached token if it is still fresh, evicting it otherwise.
	pub fn get_fresh(&self, key: &CacheKey) -> Option<AccessToken> {
		self.get_fresh_at(key, OffsetDateTime::now_utc())
	}

	/// [`get_fresh`](Self::get_fresh) evaluated at `now`.
	pub fn get_fresh_at(&self, key: &CacheKey, now: OffsetDateTime) -> Option<AccessToken> {
		match self.tokens.read().get(key) {
			Some(token) if !token.is_expired_at(now) => return Some(token.clone()),
			Some(_) => {},
			None => return None,
		}

		let mut tokens = self.tokens.write();

		// Another writer may have stored a fresh token between the two locks.
		match tokens.get(key) {
			Some(token) if !token.is_expired_at(now) => Some(token.clone()),
			Some(_) => {
				tokens.remove(key);

				None
			},
			None => None,
		}
	}

	/// Stores `token`, replacing any previous entry.
	pub fn insert(&self, key: CacheKey, token: AccessToken) {
		self.tokens.write().insert(key, token);
	}

	/// Removes and returns the entry for `key`.
	pub fn evict(&self, key: &CacheKey) -> Option<AccessToken> {
		self.tokens.write().remove(key)
	}

	/// Drops every cached token.
	pub fn clear(&self) {
		self.tokens.write().clear();
	}

	/// Number of cached tokens, fresh or not.
	pub fn len(&self) -> usize {
		self.tokens.read().len()
	}

	/// Returns true if nothing is cached.
	pub fn is_empty(&self) -> bool {
		self.tokens.read().is_empty()
	}

	/// Returns (and creates on demand) the singleflight guard for `key`.
	pub(crate) fn guard(&self, key: &CacheKey) -> Arc<AsyncMutex<()>> {
		let mut guards = self.guards.lock();

		guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
