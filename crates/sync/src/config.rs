//! Session tuning loaded from TOML.
//!
//! Every field has a default, so an empty document is a valid configuration:
//!
//! ```toml
//! local_session = 4
//! move_debounce_ms = 300
//! data_coalesce_ms = 1000
//! meta_coalesce_ms = 1500
//! history_limit = 100
//! waiting_input_hold_ms = 600
//! replay_echo_timeout_ms = 3000
//! ```

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use trellis_proto::SessionId;

/// Errors that can occur when loading a session configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// The document is not valid TOML or has wrongly typed fields.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),
	/// A field holds a value the session cannot run with.
	#[error("invalid value for '{field}': {reason}")]
	Invalid {
		/// Offending field.
		field: &'static str,
		/// Why the value was rejected.
		reason: &'static str,
	},
}

/// Tunables for one editing session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
	/// Identity of this session, used to tell own locks from others'.
	pub local_session: SessionId,
	/// Delay before a drag emits its final `node_moved`.
	pub move_debounce_ms: u64,
	/// Window in which payload edits to one node coalesce into one undo step.
	pub data_coalesce_ms: u64,
	/// Window in which edits to one metadata field coalesce.
	pub meta_coalesce_ms: u64,
	/// Maximum number of undo entries kept.
	pub history_limit: usize,
	/// How long a `waiting_input` mark survives once execution moves on.
	pub waiting_input_hold_ms: u64,
	/// How long an undo or redo waits for its echo before a matching self
	/// echo is treated as a fresh edit.
	pub replay_echo_timeout_ms: u64,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			local_session: SessionId(0),
			move_debounce_ms: 300,
			data_coalesce_ms: 1000,
			meta_coalesce_ms: 1500,
			history_limit: 100,
			waiting_input_hold_ms: 600,
			replay_echo_timeout_ms: 3000,
		}
	}
}

impl SessionConfig {
	/// Returns the default configuration for the given session identity.
	pub fn for_session(local_session: SessionId) -> Self {
		Self {
			local_session,
			..Self::default()
		}
	}

	/// Parses and validates a TOML document.
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(source)?;
		config.validate()?;
		Ok(config)
	}

	/// Rejects values that would disable a component outright.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.move_debounce_ms == 0 {
			return Err(ConfigError::Invalid {
				field: "move_debounce_ms",
				reason: "must be greater than zero",
			});
		}
		if self.history_limit == 0 {
			return Err(ConfigError::Invalid {
				field: "history_limit",
				reason: "must keep at least one entry",
			});
		}
		Ok(())
	}

	/// Debounce delay for drag moves.
	pub fn move_debounce(&self) -> Duration {
		Duration::from_millis(self.move_debounce_ms)
	}

	/// Coalescing window for node payload edits.
	pub fn data_coalesce_window(&self) -> Duration {
		Duration::from_millis(self.data_coalesce_ms)
	}

	/// Coalescing window for metadata edits.
	pub fn meta_coalesce_window(&self) -> Duration {
		Duration::from_millis(self.meta_coalesce_ms)
	}

	/// Hold time for `waiting_input` marks.
	pub fn waiting_input_hold(&self) -> Duration {
		Duration::from_millis(self.waiting_input_hold_ms)
	}

	/// Lifetime of an expected undo/redo echo.
	pub fn replay_echo_timeout(&self) -> Duration {
		Duration::from_millis(self.replay_echo_timeout_ms)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_document_yields_defaults() {
		let config = SessionConfig::from_toml_str("").unwrap();
		assert_eq!(config, SessionConfig::default());
		assert_eq!(config.move_debounce(), Duration::from_millis(300));
	}

	#[test]
	fn fields_override_defaults() {
		let config = SessionConfig::from_toml_str("local_session = 7\ndata_coalesce_ms = 250\n").unwrap();
		assert_eq!(config.local_session, SessionId(7));
		assert_eq!(config.data_coalesce_window(), Duration::from_millis(250));
		assert_eq!(config.meta_coalesce_ms, 1500);
	}

	#[test]
	fn zero_history_limit_is_rejected() {
		let err = SessionConfig::from_toml_str("history_limit = 0").unwrap_err();
		assert!(matches!(
			err,
			ConfigError::Invalid {
				field: "history_limit",
				..
			}
		));
	}

	#[test]
	fn unknown_fields_are_rejected() {
		let err = SessionConfig::from_toml_str("move_delay = 5").unwrap_err();
		assert!(matches!(err, ConfigError::Toml(_)));
	}
}
