//! Endpoint regions and connection pool settings.

// crates.io
use reqwest::redirect::Policy;
// self
use crate::{_prelude::*, error::ConfigError};

/// Selling Partner API region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
	/// North America (`na`).
	NorthAmerica,
	/// Europe (`eu`).
	Europe,
	/// Far East (`fe`).
	FarEast,
}
impl Region {
	/// Production base URL.
	pub const fn endpoint(self) -> &'static str {
		match self {
			Self::NorthAmerica => "https://sellingpartnerapi-na.amazon.com",
			Self::Europe => "https://sellingpartnerapi-eu.amazon.com",
			Self::FarEast => "https://sellingpartnerapi-fe.amazon.com",
		}
	}

	/// Sandbox base URL.
	pub const fn sandbox_endpoint(self) -> &'static str {
		match self {
			Self::NorthAmerica => "https://sandbox.sellingpartnerapi-na.amazon.com",
			Self::Europe => "https://sandbox.sellingpartnerapi-eu.amazon.com",
			Self::FarEast => "https://sandbox.sellingpartnerapi-fe.amazon.com",
		}
	}

	/// Parsed base URL for production or sandbox.
	pub fn url(self, sandbox: bool) -> Result<Url, ConfigError> {
		let value = if sandbox { self.sandbox_endpoint() } else { self.endpoint() };

		Url::parse(value).map_err(|source| ConfigError::InvalidUrl { value: value.into(), source })
	}
}
impl FromStr for Region {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"na" | "north_america" => Ok(Self::NorthAmerica),
			"eu" | "europe" => Ok(Self::Europe),
			"fe" | "far_east" => Ok(Self::FarEast),
			_ => Err(ConfigError::UnknownRegion { value: s.to_owned() }),
		}
	}
}

/// Connection pool limits applied to the shared HTTP client.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
	/// Idle keep-alive connections retained per host.
	pub max_idle_per_host: usize,
	/// How long an idle connection is kept.
	pub idle_timeout: Duration,
	/// TCP/TLS connect timeout.
	pub connect_timeout: Duration,
	/// Concurrent in-flight requests per host; `0` disables the cap.
	pub max_connections_per_host: usize,
}
impl PoolConfig {
	/// Rejects zero timeouts.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.idle_timeout.is_zero() {
			return Err(ConfigError::InvalidPool { reason: "idle_timeout must be greater than zero" });
		}
		if self.connect_timeout.is_zero() {
			return Err(ConfigError::InvalidPool {
				reason: "connect_timeout must be greater than zero",
			});
		}

		Ok(())
	}

	/// Builds a [`ReqwestClient`] honoring these limits.
	///
	/// Redirects are disabled so signed headers never follow a request to another host.
	pub fn build_client(&self) -> Result<ReqwestClient, ConfigError> {
		self.validate()?;

		let client = ReqwestClient::builder()
			.pool_max_idle_per_host(self.max_idle_per_host)
			.pool_idle_timeout(self.idle_timeout)
			.connect_timeout(self.connect_timeout)
			.redirect(Policy::none())
			.build()?;

		Ok(client)
	}
}
impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			max_idle_per_host: 16,
			idle_timeout: Duration::from_secs(90),
			connect_timeout: Duration::from_secs(10),
			max_connections_per_host: 64,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn regions_resolve_to_their_hosts() {
		let url = Region::Europe.url(false).expect("Built-in endpoints should parse.");

		assert_eq!(url.host_str(), Some("sellingpartnerapi-eu.amazon.com"));

		let sandbox = Region::FarEast.url(true).expect("Built-in endpoints should parse.");

		assert_eq!(sandbox.host_str(), Some("sandbox.sellingpartnerapi-fe.amazon.com"));
		assert_eq!("NA".parse::<Region>().expect("Short codes should parse."), Region::NorthAmerica);
		assert!(matches!("mars".parse::<Region>(), Err(ConfigError::UnknownRegion { .. })));
	}

	#[test]
	fn pool_defaults_are_valid() {
		let pool = PoolConfig::default();

		assert!(pool.validate().is_ok());
		assert!(pool.build_client().is_ok());
	}

	#[test]
	fn zero_timeouts_are_rejected() {
		let pool = PoolConfig { connect_timeout: Duration::ZERO, ..Default::default() };

		assert!(matches!(pool.validate(), Err(ConfigError::InvalidPool { .. })));
		assert!(pool.build_client().is_err());
	}

	#[test]
	fn partial_pool_config_fills_defaults() {
		let pool: PoolConfig = serde_json::from_str(r#"{"max_connections_per_host":8}"#)
			.expect("Partial config should deserialize.");

		assert_eq!(pool.max_connections_per_host, 8);
		assert_eq!(pool.max_idle_per_host, PoolConfig::default().max_idle_per_host);
	}
}
