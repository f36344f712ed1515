//! Session configuration
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (`SftpConfig::default()`)
//! 2. Config file (TOML, or JSON/JSON5 for anything else)
//! 3. CLI flags (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::demux::Markers;
use crate::error::SftpError;

/// Logged by `sftp -v` once the sftp subsystem has been requested
pub const SUBSYSTEM_MARKER: &str = "Sending subsystem: sftp";

/// Configuration for one sftp session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SftpConfig {
	// ========================================================================
	// TARGET
	// ========================================================================
	/// Remote host name or address
	pub host: String,

	/// Remote port
	pub port: u16,

	/// Login user (omitted from the target when unset)
	pub username: Option<String>,

	/// Private key: either a key file path or the inline PEM text
	pub private_key: Option<String>,

	/// Remote directory to `cd` into right after connecting
	pub home: Option<String>,

	// ========================================================================
	// TRANSPORT
	// ========================================================================
	/// Program to spawn
	pub program: String,

	/// Pass `-v` to the program (diagnostic output is filtered by `trace_marker`)
	pub verbose: bool,

	/// Extra arguments inserted before the target
	pub extra_args: Vec<String>,

	// ========================================================================
	// PROTOCOL
	// ========================================================================
	/// Text the remote session prints when it is ready for the next command
	pub prompt_marker: String,

	/// Text that completes the handshake. When unset, a verbose session waits
	/// for `Sending subsystem: sftp` on the diagnostic stream and a quiet one
	/// waits for `prompt_marker`.
	pub connect_marker: Option<String>,

	/// Diagnostic lines starting with this (optionally followed by a level
	/// digit, then `:`) are treated as noise
	pub trace_marker: String,

	/// Silence interval that completes a listing
	pub listing_quiet_period_ms: u64,

	/// Extra substrings that mark a reply line as an error
	pub error_markers: Vec<String>,

	// ========================================================================
	// STAGING
	// ========================================================================
	/// Poll interval while waiting for a downloaded file to settle
	pub watch_interval_ms: u64,

	/// Directory for staged transfers and keys (defaults to the system temp dir)
	pub temp_dir: Option<PathBuf>,
}

impl Default for SftpConfig {
	fn default() -> Self {
		SftpConfig {
			host: "localhost".to_string(),
			port: 22,
			username: None,
			private_key: None,
			home: None,

			program: "sftp".to_string(),
			verbose: true,
			extra_args: vec![],

			prompt_marker: "sftp>".to_string(),
			connect_marker: None,
			trace_marker: "debug".to_string(),
			listing_quiet_period_ms: 1000,
			error_markers: vec![],

			watch_interval_ms: 50,
			temp_dir: None,
		}
	}
}

impl SftpConfig {
	/// Config for `host` with everything else defaulted
	pub fn for_host(host: &str) -> Self {
		SftpConfig { host: host.to_string(), ..Default::default() }
	}

	/// Load a config file; `.toml` is parsed as TOML, anything else as JSON5
	pub fn load(path: &Path) -> Result<Self, SftpError> {
		let contents = std::fs::read_to_string(path)?;
		let is_toml = path.extension().map(|ext| ext == "toml").unwrap_or(false);

		let config: SftpConfig = if is_toml {
			toml::from_str(&contents).map_err(|e| SftpError::InvalidConfig {
				message: format!("{}: {}", path.display(), e),
			})?
		} else {
			json5::from_str(&contents).map_err(|e| SftpError::InvalidConfig {
				message: format!("{}: {}", path.display(), e),
			})?
		};

		config.validate()?;
		Ok(config)
	}

	/// Reject settings the engine cannot work with
	pub fn validate(&self) -> Result<(), SftpError> {
		if self.host.trim().is_empty() {
			return Err(SftpError::InvalidConfig { message: "host must not be empty".to_string() });
		}
		if self.program.trim().is_empty() {
			return Err(SftpError::InvalidConfig {
				message: "program must not be empty".to_string(),
			});
		}
		if self.prompt_marker.is_empty() {
			return Err(SftpError::InvalidConfig {
				message: "promptMarker must not be empty".to_string(),
			});
		}
		if self.listing_quiet_period_ms == 0 {
			return Err(SftpError::InvalidConfig {
				message: "listingQuietPeriodMs must be positive".to_string(),
			});
		}
		Ok(())
	}

	/// `[user@]host` as passed to the program
	pub fn target(&self) -> String {
		match &self.username {
			Some(user) if !user.is_empty() => format!("{}@{}", user, self.host),
			_ => self.host.clone(),
		}
	}

	/// Marker set for the reply demultiplexer
	pub fn markers(&self) -> Markers {
		let mut markers = Markers::new(&self.prompt_marker, &self.trace_marker);
		match self.connect_marker.as_ref().filter(|m| !m.is_empty()) {
			Some(connect) => markers.connect = connect.clone(),
			// sftp reading from a pipe prints no prompt until it has read a command
			None if self.verbose => markers.connect = SUBSYSTEM_MARKER.to_string(),
			None => {}
		}
		markers
	}

	pub fn listing_quiet_period(&self) -> Duration {
		Duration::from_millis(self.listing_quiet_period_ms)
	}

	pub fn watch_interval(&self) -> Duration {
		Duration::from_millis(self.watch_interval_ms)
	}

	pub fn staging_dir(&self) -> PathBuf {
		self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_config_default() {
		let config = SftpConfig::default();
		assert_eq!(config.host, "localhost");
		assert_eq!(config.port, 22);
		assert_eq!(config.prompt_marker, "sftp>");
		assert_eq!(config.listing_quiet_period(), Duration::from_millis(1000));
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_target_with_and_without_user() {
		let mut config = SftpConfig::for_host("stage.io");
		assert_eq!(config.target(), "stage.io");
		config.username = Some("cloud9".to_string());
		assert_eq!(config.target(), "cloud9@stage.io");
	}

	#[test]
	fn test_verbose_session_connects_on_subsystem_request() {
		let config = SftpConfig::default();
		assert!(config.verbose);
		assert_eq!(config.markers().connect, "Sending subsystem: sftp");
		assert_eq!(config.markers().prompt, "sftp>");
	}

	#[test]
	fn test_quiet_session_connects_on_prompt() {
		let config = SftpConfig { verbose: false, ..Default::default() };
		assert_eq!(config.markers().connect, "sftp>");
	}

	#[test]
	fn test_explicit_connect_marker_wins() {
		let mut config =
			SftpConfig { connect_marker: Some("Connected to".to_string()), ..Default::default() };
		assert_eq!(config.markers().connect, "Connected to");
		config.verbose = false;
		assert_eq!(config.markers().connect, "Connected to");
		config.connect_marker = Some(String::new());
		assert_eq!(config.markers().connect, "sftp>");
	}

	#[test]
	fn test_validate_rejects_zero_quiet_period() {
		let config = SftpConfig { listing_quiet_period_ms: 0, ..Default::default() };
		assert!(matches!(config.validate(), Err(SftpError::InvalidConfig { .. })));
	}

	#[test]
	fn test_config_serialization() {
		let config = SftpConfig::for_host("example.org");
		let json = serde_json::to_string(&config).expect("Failed to serialize");
		assert!(json.contains("\"promptMarker\""));
		let deserialized: SftpConfig = serde_json::from_str(&json).expect("Failed to deserialize");
		assert_eq!(config.host, deserialized.host);
		assert_eq!(config.watch_interval_ms, deserialized.watch_interval_ms);
	}
}

// vim: ts=4
