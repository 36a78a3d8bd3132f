//! Registry of rate limiters keyed by request dimensions.

// self
use crate::{
	_prelude::*,
	rate_limit::{RateBudget, RateLimitError, RateLimiter},
};

/// Identifies an independent rate budget.
///
/// The key is a fixed-arity struct hashed field by field, so components may contain any
/// characters without colliding.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DimensionKey {
	/// Selling partner or account the call is made for.
	pub principal: String,
	/// Application (client) issuing the call.
	pub application: String,
	/// Marketplace or region the call targets.
	pub marketplace: String,
	/// API operation name.
	pub operation: String,
}
impl DimensionKey {
	/// Builds a key from its four components.
	pub fn new(
		principal: impl Into<String>,
		application: impl Into<String>,
		marketplace: impl Into<String>,
		operation: impl Into<String>,
	) -> Self {
		Self {
			principal: principal.into(),
			application: application.into(),
			marketplace: marketplace.into(),
			operation: operation.into(),
		}
	}
}
impl Display for DimensionKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}/{}/{}/{}", self.principal, self.application, self.marketplace, self.operation)
	}
}

/// Lazily populated registry of [`RateLimiter`]s.
///
/// Lookups take the read lock; only the first access for a key takes the write lock, and the
/// entry is re-checked under it so racing callers share one limiter instance.
#[derive(Debug)]
pub struct RateLimitManager {
	limiters: RwLock<HashMap<DimensionKey, Arc<RateLimiter>>>,
	default_budget: RateBudget,
	operation_budgets: RwLock<HashMap<String, RateBudget>>,
}
impl RateLimitManager {
	/// Creates a manager whose limiters default to `rate` requests per second with `burst`.
	pub fn new(rate: f64, burst: u32) -> Result<Self, RateLimitError> {
		Ok(Self::with_budget(RateBudget::new(rate, burst)?))
	}

	/// Creates a manager from a validated default budget.
	pub fn with_budget(default_budget: RateBudget) -> Self {
		Self { limiters: Default::default(), default_budget, operation_budgets: Default::default() }
	}

	/// Overrides the default budget for every key with the given operation.
	pub fn with_operation_default(mut self, operation: impl Into<String>, budget: RateBudget) -> Self {
		self.operation_budgets.get_mut().insert(operation.into(), budget);

		self
	}

	/// Sets the budget used for limiters created later for `operation`.
	///
	/// Existing limiters keep their configuration; use [`update_rate`](Self::update_rate) for
	/// those.
	pub fn set_operation_default(&self, operation: impl Into<String>, budget: RateBudget) {
		self.operation_budgets.write().insert(operation.into(), budget);
	}

	/// Returns the budget a new limiter for `operation` would start with.
	pub fn budget_for(&self, operation: &str) -> RateBudget {
		self.operation_budgets.read().get(operation).copied().unwrap_or(self.default_budget)
	}

	/// Returns the limiter for `key`, creating it on first use.
	pub fn get_or_create(&self, key: &DimensionKey) -> Arc<RateLimiter> {
		if let Some(limiter) = self.limiters.read().get(key) {
			return limiter.clone();
		}

		let budget = self.budget_for(&key.operation);
		let mut limiters = self.limiters.write();

		limiters
			.entry(key.clone())
			.or_insert_with(|| Arc::new(RateLimiter::from_budget(budget)))
			.clone()
	}

	/// Returns the limiter for `key` without creating one.
	pub fn get(&self, key: &DimensionKey) -> Option<Arc<RateLimiter>> {
		self.limiters.read().get(key).cloned()
	}

	/// Waits for a token on `key`'s limiter.
	pub async fn wait(&self, ctx: &Context, key: &DimensionKey) -> Result<(), Cancellation> {
		let limiter = self.get_or_create(key);

		limiter.wait(ctx).await
	}

	/// Consumes a token on `key`'s limiter if one is available.
	pub fn allow(&self, key: &DimensionKey) -> bool {
		self.get_or_create(key).allow()
	}

	/// Reports the wait for `key` without consuming.
	pub fn reserve(&self, key: &DimensionKey) -> Duration {
		self.get_or_create(key).reserve()
	}

	/// Replaces the rate and burst of `key`'s limiter.
	pub fn update_rate(
		&self,
		key: &DimensionKey,
		rate: f64,
		burst: u32,
	) -> Result<(), RateLimitError> {
		self.get_or_create(key).set_rate(rate, burst)
	}

	/// Feeds a server-supplied rate hint into `key`'s limiter.
	pub fn update_from_server_hint(
		&self,
		key: &DimensionKey,
		hint: Option<&str>,
	) -> Result<(), RateLimitError> {
		if hint.is_none_or(|value| value.trim().is_empty()) {
			return Ok(());
		}

		self.get_or_create(key).update_from_server_hint(hint)
	}

	/// Drops `key`'s limiter; returns whether one existed.
	pub fn remove(&self, key: &DimensionKey) -> bool {
		self.limiters.write().remove(key).is_some()
	}

	/// Drops every limiter.
	pub fn clear(&self) {
		self.limiters.write().clear();
	}

	/// Number of live limiters.
	pub fn count(&self) -> usize {
		self.limiters.read().len()
	}

	/// Budget applied to operations without an override.
	pub fn default_budget(&self) -> RateBudget {
		self.default_budget
	}
}
