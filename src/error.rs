//! Error types for sftpq operations

use std::error::Error;
use std::fmt;
use std::io;

/// Main error type returned by the client API
#[derive(Debug)]
pub enum SftpError {
	/// Transport level failure (spawn, stdio, exit)
	Connection(ConnectionError),

	/// `connect()` called while a connection attempt is still running
	AlreadyConnecting,

	/// The session went away before the command completed
	Disconnected,

	/// The remote program reported an error; carries the literal matched line
	Remote { message: String },

	/// Stat lookup found no matching entry
	NotFound { path: String },

	/// Reply did not have the expected shape
	UnexpectedReply { command: String, reply: Vec<String> },

	/// Local staging I/O error
	Io(io::Error),

	/// Invalid configuration
	InvalidConfig { message: String },
}

impl SftpError {
	/// True when this error carries remote "no such file" semantics
	pub fn is_not_found(&self) -> bool {
		match self {
			SftpError::NotFound { .. } => true,
			SftpError::Remote { message } => message.contains(crate::reply::NO_SUCH_FILE),
			_ => false,
		}
	}
}

impl fmt::Display for SftpError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SftpError::Connection(e) => write!(f, "Connection error: {}", e),
			SftpError::AlreadyConnecting => write!(f, "already connecting"),
			SftpError::Disconnected => write!(f, "Session disconnected"),
			SftpError::Remote { message } => write!(f, "{}", message),
			SftpError::NotFound { path } => {
				write!(f, "{}: no such file or directory", path)
			}
			SftpError::UnexpectedReply { command, reply } => {
				write!(f, "Unexpected reply to {}: {:?}", command, reply)
			}
			SftpError::Io(e) => write!(f, "I/O error: {}", e),
			SftpError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
		}
	}
}

impl Error for SftpError {}

impl From<io::Error> for SftpError {
	fn from(e: io::Error) -> Self {
		SftpError::Io(e)
	}
}

impl From<ConnectionError> for SftpError {
	fn from(e: ConnectionError) -> Self {
		SftpError::Connection(e)
	}
}

/// Transport-specific errors
#[derive(Debug)]
pub enum ConnectionError {
	/// Subprocess spawn failed
	SpawnFailed { cmd: String, source: io::Error },

	/// Stdio unavailable
	StdioUnavailable { what: String },

	/// Writing a command line to the child failed
	WriteFailed { message: String },

	/// Inline private key could not be staged
	KeyStaging { source: io::Error },

	/// The child process exited
	Exited { code: Option<i32> },
}

impl fmt::Display for ConnectionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConnectionError::SpawnFailed { cmd, source } => {
				write!(f, "Failed to spawn '{}': {}", cmd, source)
			}
			ConnectionError::StdioUnavailable { what } => {
				write!(f, "Stdio unavailable: {}", what)
			}
			ConnectionError::WriteFailed { message } => {
				write!(f, "Write to transport failed: {}", message)
			}
			ConnectionError::KeyStaging { source } => {
				write!(f, "Failed to stage private key: {}", source)
			}
			ConnectionError::Exited { code: Some(code) } => {
				write!(f, "Transport exited with code {}", code)
			}
			ConnectionError::Exited { code: None } => write!(f, "Transport terminated"),
		}
	}
}

impl Error for ConnectionError {}


// vim: ts=4
