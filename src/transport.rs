//! Transport to the interactive sftp program
//!
//! The engine only needs three things from a transport: start it, write a
//! command line, and stop it. Everything the program prints comes back as
//! `TransportEvent`s on a channel, tagged with the session number given to
//! `start()` so events from an earlier process can be told apart.

use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::SftpConfig;
use crate::error::ConnectionError;
use crate::keyfile::{self, StagedKey};

/// Which stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
	/// stdout
	Primary,
	/// stderr
	Diagnostic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
	Chunk { origin: Origin, data: String },
	Exit { code: Option<i32> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
	pub session: u64,
	pub kind: TransportEventKind,
}

impl TransportEvent {
	pub fn chunk(session: u64, origin: Origin, data: &str) -> Self {
		TransportEvent {
			session,
			kind: TransportEventKind::Chunk { origin, data: data.to_string() },
		}
	}

	pub fn exit(session: u64, code: Option<i32>) -> Self {
		TransportEvent { session, kind: TransportEventKind::Exit { code } }
	}
}

/// Channel end the transport delivers events to
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Process-like transport driven by the connection
///
/// Implementations must not block: writes are queued, output is delivered
/// asynchronously through the event channel.
pub trait Transport: Send {
	/// Start a new process for `session`
	fn start(&mut self, session: u64) -> Result<(), ConnectionError>;

	/// Queue `line` plus a line terminator for the process's stdin
	fn write_line(&mut self, line: &str) -> Result<(), ConnectionError>;

	/// Stop the process and release anything staged for it. Idempotent.
	fn terminate(&mut self);
}

struct Running {
	stdin: mpsc::UnboundedSender<String>,
	kill: Option<oneshot::Sender<()>>,
	_key: Option<StagedKey>,
}

/// Transport backed by a tokio child process
pub struct ProcessTransport {
	config: SftpConfig,
	events: EventSender,
	running: Option<Running>,
}

impl ProcessTransport {
	pub fn new(config: SftpConfig, events: EventSender) -> Self {
		ProcessTransport { config, events, running: None }
	}
}

/// Argument list for the transport program
pub fn build_command_args(config: &SftpConfig, key_path: Option<&Path>) -> Vec<String> {
	let mut args = Vec::new();
	if config.verbose {
		args.push("-v".to_string());
	}
	if config.port != 22 {
		args.push("-P".to_string());
		args.push(config.port.to_string());
	}
	if let Some(path) = key_path {
		args.extend(keyfile::build_args(path));
	}
	args.extend(config.extra_args.iter().cloned());
	args.push(config.target());
	args
}

impl Transport for ProcessTransport {
	fn start(&mut self, session: u64) -> Result<(), ConnectionError> {
		self.terminate();

		let staged = match &self.config.private_key {
			Some(key) if keyfile::is_inline_key(key) => Some(
				keyfile::write_key_file(&self.config.staging_dir(), key)
					.map_err(|source| ConnectionError::KeyStaging { source })?,
			),
			_ => None,
		};
		let key_path = match (&staged, &self.config.private_key) {
			(Some(staged), _) => Some(staged.path().to_path_buf()),
			(None, Some(path)) => Some(path.into()),
			(None, None) => None,
		};

		let args = build_command_args(&self.config, key_path.as_deref());
		info!("Launching: {} {}", self.config.program, args.join(" "));

		let mut child = tokio::process::Command::new(&self.config.program)
			.args(&args)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.spawn()
			.map_err(|source| ConnectionError::SpawnFailed {
				cmd: self.config.program.clone(),
				source,
			})?;

		let mut stdin = child
			.stdin
			.take()
			.ok_or(ConnectionError::StdioUnavailable { what: "stdin".to_string() })?;
		let stdout = child
			.stdout
			.take()
			.ok_or(ConnectionError::StdioUnavailable { what: "stdout".to_string() })?;
		let stderr = child
			.stderr
			.take()
			.ok_or(ConnectionError::StdioUnavailable { what: "stderr".to_string() })?;

		tokio::spawn(forward_output(stdout, Origin::Primary, session, self.events.clone()));
		tokio::spawn(forward_output(stderr, Origin::Diagnostic, session, self.events.clone()));

		let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();
		tokio::spawn(async move {
			while let Some(line) = stdin_rx.recv().await {
				if let Err(e) = stdin.write_all(line.as_bytes()).await {
					warn!("Write to transport stdin failed: {}", e);
					break;
				}
				if let Err(e) = stdin.flush().await {
					warn!("Flush of transport stdin failed: {}", e);
					break;
				}
			}
		});

		let (kill_tx, kill_rx) = oneshot::channel::<()>();
		let events = self.events.clone();
		tokio::spawn(async move {
			let waited = tokio::select! {
				status = child.wait() => Some(status),
				_ = kill_rx => None,
			};
			let code = match waited {
				Some(Ok(status)) => status.code(),
				Some(Err(e)) => {
					warn!("Waiting for transport failed: {}", e);
					None
				}
				None => {
					if let Err(e) = child.kill().await {
						debug!("Kill of transport failed: {}", e);
					}
					None
				}
			};
			debug!("Transport session {} exited with {:?}", session, code);
			let _ = events.send(TransportEvent::exit(session, code));
		});

		self.running = Some(Running { stdin: stdin_tx, kill: Some(kill_tx), _key: staged });
		Ok(())
	}

	fn write_line(&mut self, line: &str) -> Result<(), ConnectionError> {
		let running = self.running.as_ref().ok_or(ConnectionError::Exited { code: None })?;
		running.stdin.send(format!("{}\n", line)).map_err(|_| ConnectionError::WriteFailed {
			message: "transport stdin closed".to_string(),
		})
	}

	fn terminate(&mut self) {
		if let Some(mut running) = self.running.take() {
			if let Some(kill) = running.kill.take() {
				let _ = kill.send(());
			}
			// Dropping `running` closes stdin and removes a staged key
		}
	}
}

impl Drop for ProcessTransport {
	fn drop(&mut self) {
		self.terminate();
	}
}

/// Read `reader` in chunks and forward them as events until EOF
async fn forward_output<R>(mut reader: R, origin: Origin, session: u64, events: EventSender)
where
	R: AsyncRead + Unpin,
{
	let mut buf = [0u8; 8192];
	let mut pending = Vec::new();
	loop {
		match reader.read(&mut buf).await {
			Ok(0) => break,
			Ok(n) => {
				pending.extend_from_slice(&buf[..n]);
				let text = decode_utf8_prefix(&mut pending);
				if text.is_empty() {
					continue;
				}
				if events.send(TransportEvent::chunk(session, origin, &text)).is_err() {
					break;
				}
			}
			Err(e) => {
				debug!("Transport {:?} read failed: {}", origin, e);
				break;
			}
		}
	}
	if !pending.is_empty() {
		let rest = String::from_utf8_lossy(&pending).into_owned();
		let _ = events.send(TransportEvent::chunk(session, origin, &rest));
	}
}

/// Take the longest decodable prefix out of `pending`.
///
/// An incomplete multi-byte sequence at the end stays in `pending` for the
/// next read; invalid bytes are replaced.
fn decode_utf8_prefix(pending: &mut Vec<u8>) -> String {
	match std::str::from_utf8(pending) {
		Ok(text) => {
			let text = text.to_string();
			pending.clear();
			text
		}
		Err(e) if e.error_len().is_none() => {
			let valid = e.valid_up_to();
			let text = String::from_utf8_lossy(&pending[..valid]).into_owned();
			pending.drain(..valid);
			text
		}
		Err(_) => {
			let text = String::from_utf8_lossy(pending).into_owned();
			pending.clear();
			text
		}
	}
}


// vim: ts=4
