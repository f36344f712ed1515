//! Async client handle
//!
//! `Sftp` is a cheap, cloneable handle. All clones talk to one driver task
//! that owns the `Connection`; requests, transport events and the listing
//! timer are multiplexed there, so commands from any number of callers are
//! serialized onto the single interactive session.

use std::future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::config::SftpConfig;
use crate::connection::{
	quote_arg, Command, Connection, ConnectionEvent, ConnectionState, ProgressSender,
	ReplyReceiver,
};
use crate::error::SftpError;
use crate::features::FeatureTable;
use crate::listing::{parse_listing, Listing};
use crate::reply;
use crate::staging::Staging;
use crate::stat::{find_entry, resolve_parent, split_remote_path, Stat};
use crate::transport::{EventSender, ProcessTransport, Transport, TransportEvent};

/// Point-in-time view of the engine
#[derive(Debug, Clone)]
pub struct Snapshot {
	pub state: ConnectionState,
	pub queued: usize,
	pub active: Option<String>,
	pub features: FeatureTable,
}

enum Request {
	Connect(oneshot::Sender<Result<(), SftpError>>),
	Disconnect(oneshot::Sender<()>),
	Exec(Command),
	Inspect(oneshot::Sender<Snapshot>),
}

/// Handle to one queued sftp session
#[derive(Clone)]
pub struct Sftp {
	requests: mpsc::UnboundedSender<Request>,
	events: broadcast::Sender<ConnectionEvent>,
	config: Arc<SftpConfig>,
	staging: Staging,
}

impl Sftp {
	/// Session backed by the configured sftp program. Must be called from
	/// within a tokio runtime; nothing is spawned until the first command.
	pub fn new(config: SftpConfig) -> Result<Self, SftpError> {
		let transport_config = config.clone();
		Sftp::with_transport(config, move |events| ProcessTransport::new(transport_config, events))
	}

	/// Session over a caller-supplied transport
	pub fn with_transport<T, F>(config: SftpConfig, build: F) -> Result<Self, SftpError>
	where
		T: Transport + 'static,
		F: FnOnce(EventSender) -> T,
	{
		config.validate()?;

		let (event_tx, event_rx) = mpsc::unbounded_channel();
		let transport = build(event_tx);
		let connection = Connection::new(Box::new(transport), &config);
		let events = connection.event_sender();

		let (request_tx, request_rx) = mpsc::unbounded_channel();
		tokio::spawn(drive(connection, request_rx, event_rx));

		Ok(Sftp {
			requests: request_tx,
			events,
			staging: Staging::new(config.staging_dir()),
			config: Arc::new(config),
		})
	}

	pub fn config(&self) -> &SftpConfig {
		&self.config
	}

	/// Lifecycle events (`Connected`, `Disconnected { code }`)
	pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
		self.events.subscribe()
	}

	pub async fn connect(&self) -> Result<(), SftpError> {
		let (tx, rx) = oneshot::channel();
		self.send(Request::Connect(tx))?;
		rx.await.map_err(|_| SftpError::Disconnected)?
	}

	/// Send `bye` and stop the session. Commands still pending never complete.
	pub async fn disconnect(&self) -> Result<(), SftpError> {
		let (tx, rx) = oneshot::channel();
		self.send(Request::Disconnect(tx))?;
		rx.await.map_err(|_| SftpError::Disconnected)
	}

	pub async fn snapshot(&self) -> Result<Snapshot, SftpError> {
		let (tx, rx) = oneshot::channel();
		self.send(Request::Inspect(tx))?;
		rx.await.map_err(|_| SftpError::Disconnected)
	}

	pub async fn state(&self) -> Result<ConnectionState, SftpError> {
		Ok(self.snapshot().await?.state)
	}

	pub async fn features(&self) -> Result<FeatureTable, SftpError> {
		Ok(self.snapshot().await?.features)
	}

	/// Run an arbitrary command line and return its reply lines
	pub async fn exec_raw(&self, name: &str, line: &str) -> Result<Vec<String>, SftpError> {
		let (command, rx) = Command::new(name, line);
		self.run(command, rx).await
	}

	/// Like `exec_raw`, forwarding raw output chunks to `progress` while it runs
	pub async fn exec_with_progress(
		&self,
		name: &str,
		line: &str,
		progress: ProgressSender,
	) -> Result<Vec<String>, SftpError> {
		let (command, rx) = Command::new(name, line);
		self.run(command.with_progress(progress), rx).await
	}

	pub async fn cd(&self, path: &str) -> Result<(), SftpError> {
		self.simple("cd", format!("cd {}", quote_arg(path))).await
	}

	/// `mode` is numeric (`0o755`); it is sent in octal
	pub async fn chmod(&self, path: &str, mode: u32) -> Result<(), SftpError> {
		self.simple("chmod", format!("chmod {:o} {}", mode, quote_arg(path))).await
	}

	pub async fn chown(&self, path: &str, owner: &str) -> Result<(), SftpError> {
		self.simple("chown", format!("chown {} {}", quote_arg(owner), quote_arg(path))).await
	}

	pub async fn chgrp(&self, path: &str, group: &str) -> Result<(), SftpError> {
		self.simple("chgrp", format!("chgrp {} {}", quote_arg(group), quote_arg(path))).await
	}

	pub async fn ln(&self, target: &str, link: &str) -> Result<(), SftpError> {
		self.simple("ln", format!("ln {} {}", quote_arg(target), quote_arg(link))).await
	}

	pub async fn symlink(&self, target: &str, link: &str) -> Result<(), SftpError> {
		self.ln(target, link).await
	}

	pub async fn mkdir(&self, path: &str) -> Result<(), SftpError> {
		self.simple("mkdir", format!("mkdir {}", quote_arg(path))).await
	}

	pub async fn rmdir(&self, path: &str) -> Result<(), SftpError> {
		self.simple("rmdir", format!("rmdir {}", quote_arg(path))).await
	}

	pub async fn unlink(&self, path: &str) -> Result<(), SftpError> {
		self.simple("rm", format!("rm {}", quote_arg(path))).await
	}

	pub async fn rename(&self, from: &str, to: &str) -> Result<(), SftpError> {
		self.simple("rename", format!("rename {} {}", quote_arg(from), quote_arg(to))).await
	}

	/// Remote working directory
	pub async fn pwd(&self) -> Result<String, SftpError> {
		let lines = self.exec_raw("pwd", "pwd").await?;
		self.check(&lines)?;
		reply::parse_pwd(&lines)
			.ok_or(SftpError::UnexpectedReply { command: "pwd".to_string(), reply: lines })
	}

	/// Long listing of `path` (the working directory when empty)
	pub async fn ls(&self, path: &str) -> Result<Listing, SftpError> {
		let (command, rx) = Command::listing(path, self.config.listing_quiet_period());
		let lines = self.run(command, rx).await?;
		let listing = parse_listing(&lines);

		for line in &listing.rejected {
			debug!("Unparseable listing line: {:?}", line);
		}
		if listing.is_empty() {
			self.check(&lines)?;
		}
		Ok(listing)
	}

	/// Download `remote` to `local`, waiting until the local file settles
	pub async fn get(&self, remote: &str, local: &Path) -> Result<u64, SftpError> {
		self.get_inner(remote, local, None).await
	}

	pub async fn get_with_progress(
		&self,
		remote: &str,
		local: &Path,
		progress: ProgressSender,
	) -> Result<u64, SftpError> {
		self.get_inner(remote, local, Some(progress)).await
	}

	pub async fn put(&self, local: &Path, remote: &str) -> Result<(), SftpError> {
		let line = format!("put {} {}", quote_arg(&local.display().to_string()), quote_arg(remote));
		self.simple("put", line).await
	}

	/// Whole remote file contents via a staged download
	pub async fn read_file(&self, remote: &str) -> Result<Vec<u8>, SftpError> {
		let staged = self.staging.unique_path();
		let result = match self.get(remote, &staged).await {
			Ok(_) => self.staging.read(&staged).await.map_err(SftpError::from),
			Err(e) => Err(e),
		};
		self.staging.remove(&staged).await;
		result
	}

	/// Replace a remote file via a staged upload
	pub async fn write_file(&self, remote: &str, data: &[u8]) -> Result<(), SftpError> {
		let staged = self.staging.unique_path();
		let result = match self.staging.write(&staged, data).await {
			Ok(()) => self.put(&staged, remote).await,
			Err(e) => Err(SftpError::from(e)),
		};
		self.staging.remove(&staged).await;
		result
	}

	/// Metadata derived from the parent directory's listing
	pub async fn stat(&self, path: &str) -> Result<Stat, SftpError> {
		let (parent, name) = split_remote_path(path);
		let parent = if parent.starts_with('/') {
			parent
		} else {
			let cwd = self.pwd().await?;
			resolve_parent(&cwd, &parent)
		};

		let listing = self.ls(&parent).await?;
		find_entry(listing.into_entries(), &name)
			.map(Stat::new)
			.ok_or(SftpError::NotFound { path: path.to_string() })
	}

	/// Listings do not distinguish links from their targets
	pub async fn lstat(&self, path: &str) -> Result<Stat, SftpError> {
		self.stat(path).await
	}

	pub async fn fstat(&self, path: &str) -> Result<Stat, SftpError> {
		self.stat(path).await
	}

	async fn get_inner(
		&self,
		remote: &str,
		local: &Path,
		progress: Option<ProgressSender>,
	) -> Result<u64, SftpError> {
		let line = format!("get {} {}", quote_arg(remote), quote_arg(&local.display().to_string()));
		let (mut command, rx) = Command::new("get", line);
		if let Some(progress) = progress {
			command = command.with_progress(progress);
		}
		let lines = self.run(command, rx).await?;
		self.check(&lines)?;

		let size = self.staging.wait_until_stable(local, self.config.watch_interval()).await?;
		debug!("Downloaded {} ({} bytes)", remote, size);
		Ok(size)
	}

	async fn simple(&self, name: &str, line: String) -> Result<(), SftpError> {
		let lines = self.exec_raw(name, &line).await?;
		self.check(&lines)
	}

	fn check(&self, lines: &[String]) -> Result<(), SftpError> {
		match reply::classify_error_with(lines, &self.config.error_markers) {
			Some(message) => Err(SftpError::Remote { message }),
			None => Ok(()),
		}
	}

	async fn run(&self, command: Command, rx: ReplyReceiver) -> Result<Vec<String>, SftpError> {
		self.send(Request::Exec(command))?;
		rx.await.map_err(|_| SftpError::Disconnected)
	}

	fn send(&self, request: Request) -> Result<(), SftpError> {
		self.requests.send(request).map_err(|_| SftpError::Disconnected)
	}
}

/// Driver task: the only place the `Connection` is touched
async fn drive(
	mut connection: Connection,
	mut requests: mpsc::UnboundedReceiver<Request>,
	mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
	loop {
		let deadline = connection.next_deadline();
		tokio::select! {
			request = requests.recv() => match request {
				Some(request) => handle_request(&mut connection, request),
				None => {
					debug!("All handles dropped, shutting down");
					connection.disconnect();
					break;
				}
			},
			Some(event) = events.recv() => connection.handle_event(event, Instant::now()),
			_ = sleep_until_deadline(deadline) => connection.poll_timeout(Instant::now()),
		}
	}
}

fn handle_request(connection: &mut Connection, request: Request) {
	match request {
		Request::Connect(waiter) => connection.connect(waiter),
		Request::Disconnect(done) => {
			connection.disconnect();
			let _ = done.send(());
		}
		Request::Exec(command) => connection.exec(command, Instant::now()),
		Request::Inspect(reply) => {
			let snapshot = Snapshot {
				state: connection.state(),
				queued: connection.queued(),
				active: connection.active_command().map(|s| s.to_string()),
				features: connection.features().clone(),
			};
			if reply.send(snapshot).is_err() {
				warn!("Snapshot requester went away");
			}
		}
	}
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => sleep_until(deadline).await,
		None => future::pending().await,
	}
}

// vim: ts=4
