//! Connection state machine and command dispatcher
//!
//! `Connection` owns the transport, the command queue and the active command.
//! It performs no I/O of its own besides calling into the `Transport`: the
//! driver task (see `client`) feeds it requests, transport events and timer
//! ticks, and it reacts by writing command lines and firing completion
//! handles. Only that one task touches it, so nothing here is locked.

use serde::Serialize;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::SftpConfig;
use crate::demux::{self, ChunkAction, CompletionPolicy, DemuxState, Markers};
use crate::error::{ConnectionError, SftpError};
use crate::features::FeatureTable;
use crate::reply;
use crate::transport::{Origin, Transport, TransportEvent, TransportEventKind};

/// Public connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	Connected,
}

/// Lifecycle notifications broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
	Connected,
	Disconnected { code: Option<i32> },
}

/// Internal phases; `Connecting` is split so discovery can bypass the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
	Disconnected,
	AwaitingPrompt,
	Discovering,
	Ready,
}

/// Command text, rendered when the command is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
	/// Sent verbatim
	Raw(String),
	/// Long listing; flags come from the feature table at dispatch time
	Listing { path: String },
}

impl CommandLine {
	pub fn render(&self, features: &FeatureTable) -> String {
		match self {
			CommandLine::Raw(line) => line.clone(),
			CommandLine::Listing { path } => features.listing_command(&quote_arg(path)),
		}
	}
}

/// Receives the reply lines of a completed command
pub type ReplyReceiver = oneshot::Receiver<Vec<String>>;

/// Receives raw output chunks while a command runs
pub type ProgressSender = mpsc::UnboundedSender<String>;

/// Resolved once a `connect()` attempt settles
pub type ConnectWaiter = oneshot::Sender<Result<(), SftpError>>;

#[derive(Debug)]
enum Responder {
	Caller(oneshot::Sender<Vec<String>>),
	/// The `help` reply that populates the feature table
	Discovery,
	/// Nobody waits for the reply
	Detached,
}

/// One queued request; its completion handle travels with it
#[derive(Debug)]
pub struct Command {
	name: String,
	line: CommandLine,
	policy: CompletionPolicy,
	progress: Option<ProgressSender>,
	responder: Responder,
}

impl Command {
	/// Prompt-completed command
	pub fn new(name: &str, line: impl Into<String>) -> (Self, ReplyReceiver) {
		let (tx, rx) = oneshot::channel();
		let command = Command {
			name: name.to_string(),
			line: CommandLine::Raw(line.into()),
			policy: CompletionPolicy::Prompt,
			progress: None,
			responder: Responder::Caller(tx),
		};
		(command, rx)
	}

	/// Listing of `path`, completed after `quiet` of silence
	pub fn listing(path: &str, quiet: Duration) -> (Self, ReplyReceiver) {
		let (tx, rx) = oneshot::channel();
		let command = Command {
			name: "ls".to_string(),
			line: CommandLine::Listing { path: path.to_string() },
			policy: CompletionPolicy::QuietPeriod(quiet),
			progress: None,
			responder: Responder::Caller(tx),
		};
		(command, rx)
	}

	pub fn with_progress(mut self, progress: ProgressSender) -> Self {
		self.progress = Some(progress);
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn line(&self) -> &CommandLine {
		&self.line
	}

	pub fn policy(&self) -> CompletionPolicy {
		self.policy
	}

	fn discovery() -> Self {
		Command {
			name: "help".to_string(),
			line: CommandLine::Raw("help".to_string()),
			policy: CompletionPolicy::Prompt,
			progress: None,
			responder: Responder::Discovery,
		}
	}

	fn detached(name: &str, line: String) -> Self {
		Command {
			name: name.to_string(),
			line: CommandLine::Raw(line),
			policy: CompletionPolicy::Prompt,
			progress: None,
			responder: Responder::Detached,
		}
	}

	fn respond(self, lines: Vec<String>) {
		if let Responder::Caller(tx) = self.responder {
			let _ = tx.send(lines);
		}
	}

	/// Commands after which the remote program exits
	fn is_quit(&self) -> bool {
		matches!(self.name.as_str(), "bye" | "quit" | "exit")
	}
}

/// Quote a command argument for the remote command parser when needed
pub fn quote_arg(arg: &str) -> Cow<'_, str> {
	let needs_quotes =
		arg.chars().any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | '#'));
	if !needs_quotes {
		return Cow::Borrowed(arg);
	}
	let mut quoted = String::with_capacity(arg.len() + 2);
	quoted.push('"');
	for c in arg.chars() {
		if c == '"' || c == '\\' {
			quoted.push('\\');
		}
		quoted.push(c);
	}
	quoted.push('"');
	Cow::Owned(quoted)
}

#[derive(Debug)]
struct ActiveCommand {
	command: Command,
	buffer: String,
	deadline: Option<Instant>,
}

/// The engine: state machine, queue and reply demultiplexer
pub struct Connection {
	phase: Phase,
	session: u64,
	transport: Box<dyn Transport>,
	markers: Markers,
	home: Option<String>,
	queue: VecDeque<Command>,
	active: Option<ActiveCommand>,
	connect_waiter: Option<ConnectWaiter>,
	features: FeatureTable,
	events: broadcast::Sender<ConnectionEvent>,
}

impl Connection {
	pub fn new(transport: Box<dyn Transport>, config: &SftpConfig) -> Self {
		let (events, _) = broadcast::channel(16);
		Connection {
			phase: Phase::Disconnected,
			session: 0,
			transport,
			markers: config.markers(),
			home: config.home.clone().filter(|h| !h.is_empty()),
			queue: VecDeque::new(),
			active: None,
			connect_waiter: None,
			features: FeatureTable::default(),
			events,
		}
	}

	pub fn state(&self) -> ConnectionState {
		match self.phase {
			Phase::Disconnected => ConnectionState::Disconnected,
			Phase::AwaitingPrompt | Phase::Discovering => ConnectionState::Connecting,
			Phase::Ready => ConnectionState::Connected,
		}
	}

	pub fn features(&self) -> &FeatureTable {
		&self.features
	}

	/// Number of commands waiting behind the active one
	pub fn queued(&self) -> usize {
		self.queue.len()
	}

	/// Name of the command currently awaiting its reply
	pub fn active_command(&self) -> Option<&str> {
		self.active.as_ref().map(|a| a.command.name.as_str())
	}

	pub fn session(&self) -> u64 {
		self.session
	}

	pub fn event_sender(&self) -> broadcast::Sender<ConnectionEvent> {
		self.events.clone()
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
		self.events.subscribe()
	}

	/// Start connecting; `waiter` is resolved when the attempt settles
	pub fn connect(&mut self, waiter: ConnectWaiter) {
		match self.phase {
			Phase::Ready => {
				let _ = waiter.send(Ok(()));
			}
			Phase::Disconnected => {
				self.connect_waiter = Some(waiter);
				self.start_session();
			}
			Phase::AwaitingPrompt | Phase::Discovering => {
				let _ = waiter.send(Err(SftpError::AlreadyConnecting));
			}
		}
	}

	/// Send `command` now if possible, otherwise queue it
	pub fn exec(&mut self, command: Command, now: Instant) {
		match self.phase {
			Phase::Ready if self.active.is_none() => self.send(command, now),
			Phase::Disconnected => {
				debug!("Queueing {} until connected", command.name);
				self.queue.push_back(command);
				self.start_session();
			}
			_ => {
				debug!("Queueing {} behind {} other(s)", command.name, self.queue.len());
				self.queue.push_back(command);
			}
		}
	}

	/// Tear the session down; pending commands never complete
	pub fn disconnect(&mut self) {
		if self.phase == Phase::Disconnected {
			return;
		}
		if self.phase == Phase::Ready {
			if let Err(e) = self.transport.write_line("bye") {
				debug!("Could not send bye: {}", e);
			}
		}
		info!("Disconnecting session {}", self.session);
		self.enter_disconnected(None);
	}

	pub fn handle_event(&mut self, event: TransportEvent, now: Instant) {
		if event.session != self.session || self.phase == Phase::Disconnected {
			trace!("Ignoring event from session {}", event.session);
			return;
		}
		match event.kind {
			TransportEventKind::Chunk { origin, data } => self.handle_chunk(origin, &data, now),
			TransportEventKind::Exit { code } => self.handle_exit(code),
		}
	}

	/// When the active quiet-period command is due
	pub fn next_deadline(&self) -> Option<Instant> {
		self.active.as_ref().and_then(|a| a.deadline)
	}

	/// Complete the active command if its quiet period has elapsed
	pub fn poll_timeout(&mut self, now: Instant) {
		if !matches!(self.next_deadline(), Some(deadline) if deadline <= now) {
			return;
		}
		if let Some(active) = self.active.take() {
			let lines = demux::assemble_reply(&active.buffer, "", &self.markers.prompt);
			self.complete(active.command, lines, now);
		}
	}

	fn handle_chunk(&mut self, origin: Origin, chunk: &str, now: Instant) {
		let state = DemuxState {
			awaiting_handshake: self.phase == Phase::AwaitingPrompt,
			active: self.active.as_ref().map(|a| a.command.policy),
			buffered: self.active.as_ref().map(|a| a.buffer.as_str()).unwrap_or(""),
		};

		match demux::classify(&self.markers, state, origin, chunk) {
			ChunkAction::Handshake => self.begin_discovery(now),
			ChunkAction::Noise => trace!("{:?} noise: {:?}", origin, chunk),
			ChunkAction::Complete(text) => {
				if let Some(active) = self.active.take() {
					let lines = demux::assemble_reply(&active.buffer, &text, &self.markers.prompt);
					self.complete(active.command, lines, now);
				}
			}
			ChunkAction::Accumulate(text) => {
				if let Some(active) = self.active.as_mut() {
					active.buffer.push_str(&text);
					if let Some(progress) = &active.command.progress {
						let _ = progress.send(text);
					}
					if let CompletionPolicy::QuietPeriod(period) = active.command.policy {
						active.deadline = Some(now + period);
					}
				}
			}
			ChunkAction::Unsolicited => debug!("Unsolicited {:?} output: {:?}", origin, chunk),
		}
	}

	fn handle_exit(&mut self, code: Option<i32>) {
		info!("Session {} ended with {:?}", self.session, code);
		if let Some(active) = self.active.take() {
			if active.command.is_quit() {
				let lines = demux::assemble_reply(&active.buffer, "", &self.markers.prompt);
				active.command.respond(lines);
			}
		}
		self.enter_disconnected(code);
	}

	fn start_session(&mut self) {
		self.session += 1;
		self.phase = Phase::AwaitingPrompt;
		info!("Connecting (session {})", self.session);

		if let Err(e) = self.transport.start(self.session) {
			warn!("Failed to start transport: {}", e);
			let waiter = self.connect_waiter.take();
			self.enter_disconnected(None);
			if let Some(waiter) = waiter {
				let _ = waiter.send(Err(SftpError::Connection(e)));
			}
		}
	}

	fn begin_discovery(&mut self, now: Instant) {
		debug!("Handshake complete, discovering features");
		self.phase = Phase::Discovering;
		self.send(Command::discovery(), now);
	}

	fn finish_discovery(&mut self, lines: &[String]) {
		self.features = FeatureTable::parse(lines);
		self.phase = Phase::Ready;
		info!("Connected (session {}, {:?} features)", self.session, self.features.source());

		if let Some(waiter) = self.connect_waiter.take() {
			let _ = waiter.send(Ok(()));
		}
		let _ = self.events.send(ConnectionEvent::Connected);

		if let Some(home) = &self.home {
			self.queue.push_front(Command::detached("cd", format!("cd {}", quote_arg(home))));
		}
	}

	fn send(&mut self, command: Command, now: Instant) {
		let line = command.line.render(&self.features);
		debug!("> {}", line);

		if let Err(e) = self.transport.write_line(&line) {
			warn!("Failed to send {}: {}", command.name, e);
			self.enter_disconnected(None);
			return;
		}

		let deadline = match command.policy {
			CompletionPolicy::QuietPeriod(period) => Some(now + period),
			CompletionPolicy::Prompt => None,
		};
		self.active = Some(ActiveCommand { command, buffer: String::new(), deadline });
	}

	fn complete(&mut self, command: Command, lines: Vec<String>, now: Instant) {
		debug!("< {} ({} line(s))", command.name, lines.len());
		let quit = command.is_quit();

		match command.responder {
			Responder::Discovery => self.finish_discovery(&lines),
			Responder::Detached => {
				if let Some(message) = reply::classify_error(&lines) {
					warn!("{} failed: {}", command.name, message);
				}
			}
			Responder::Caller(tx) => {
				let _ = tx.send(lines);
			}
		}

		if quit {
			self.enter_disconnected(None);
		} else {
			self.drain(now);
		}
	}

	/// Dispatch the queue head when idle
	fn drain(&mut self, now: Instant) {
		if self.phase != Phase::Ready || self.active.is_some() {
			return;
		}
		if let Some(next) = self.queue.pop_front() {
			self.send(next, now);
		}
	}

	fn enter_disconnected(&mut self, code: Option<i32>) {
		let previous = self.phase;
		self.phase = Phase::Disconnected;
		self.active = None;
		if !self.queue.is_empty() {
			debug!("Discarding {} queued command(s)", self.queue.len());
			self.queue.clear();
		}
		if let Some(waiter) = self.connect_waiter.take() {
			let _ = waiter.send(Err(SftpError::Connection(ConnectionError::Exited { code })));
		}
		self.transport.terminate();
		self.features = FeatureTable::default();

		if previous != Phase::Disconnected {
			let _ = self.events.send(ConnectionEvent::Disconnected { code });
		}
	}
}

impl Drop for Connection {
	fn drop(&mut self) {
		self.transport.terminate();
	}
}


// vim: ts=4
