//! Redacting wrapper for client secrets, refresh tokens, and access tokens.

// self
use crate::_prelude::*;

/// Sensitive string that never appears in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);
impl Secret {
	/// Wraps a secret value.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the raw value. Callers must keep it out of logs.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns true if the secret is empty or whitespace.
	pub fn is_blank(&self) -> bool {
		self.0.trim().is_empty()
	}
}
impl From<String> for Secret {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("Secret(<redacted>)")
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn formatters_redact() {
		let secret = Secret::new("Atzr|refresh");

		assert_eq!(format!("{secret:?}"), "Secret(<redacted>)");
		assert_eq!(secret.to_string(), "<redacted>");
		assert_eq!(secret.expose(), "Atzr|refresh");
		assert!(Secret::new("  ").is_blank());
	}
}
