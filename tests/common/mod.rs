//! Shared test harness: an in-memory transport that plays the remote side
//!
//! The scripted remote greets like `sftp -v` (the subsystem request on the
//! diagnostic stream, no prompt) or, for quiet sessions, with a bare prompt.
//! It answers `help` with a catalogue, exits on `bye`, and otherwise replies
//! with whatever the test registered for the command (or a bare prompt).

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sftpq::transport::{EventSender, Origin, Transport, TransportEvent};
use sftpq::{ConnectionError, Sftp, SftpConfig, Snapshot};

pub const PROMPT: &str = "sftp> ";

/// Logged by a verbose session once the subsystem is requested
pub const SUBSYSTEM: &str = "debug1: Sending subsystem: sftp\n";

pub const CATALOGUE: &str = "Available commands:\n\
bye                                Quit sftp\n\
cd path                            Change remote directory to 'path'\n\
get [-afpPR] remote [local]        Download file\n\
ls [-1afhlnrSt] [path]             Display remote directory listing\n\
put [-afpPR] local [remote]        Upload file\n\
pwd                                Display remote working directory\n";

/// What the remote does in response to a command
#[derive(Debug, Clone)]
pub enum Step {
	Out(String),
	Err(String),
	Exit(Option<i32>),
}

pub fn out(text: &str) -> Step {
	Step::Out(text.to_string())
}

pub fn err(text: &str) -> Step {
	Step::Err(text.to_string())
}

type Handler = Box<dyn FnMut(&str) -> Vec<Step> + Send>;

#[derive(Default)]
struct Script {
	handlers: Vec<(String, Handler)>,
	hold: bool,
	silent_handshake: bool,
	fail_start: bool,
	catalogue: Option<String>,
}

/// Test-side view of the scripted remote
#[derive(Clone)]
pub struct Remote {
	events: EventSender,
	session: Arc<AtomicU64>,
	starts: Arc<AtomicUsize>,
	written: Arc<Mutex<Vec<String>>>,
	script: Arc<Mutex<Script>>,
	greeting: Vec<Step>,
	pub files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl Remote {
	/// Every line the engine wrote, across sessions
	pub fn written(&self) -> Vec<String> {
		self.written.lock().unwrap().clone()
	}

	pub fn starts(&self) -> usize {
		self.starts.load(Ordering::SeqCst)
	}

	/// Replies to commands starting with `prefix` (first registration wins)
	pub fn on<F>(&self, prefix: &str, handler: F)
	where
		F: FnMut(&str) -> Vec<Step> + Send + 'static,
	{
		self.script.lock().unwrap().handlers.push((prefix.to_string(), Box::new(handler)));
	}

	/// Fixed reply followed by the prompt
	pub fn reply(&self, prefix: &str, text: &str) {
		let text = text.to_string();
		self.on(prefix, move |_| vec![Step::Out(text.clone()), out(PROMPT)]);
	}

	/// While held, commands are recorded but not answered
	pub fn hold(&self, hold: bool) {
		self.script.lock().unwrap().hold = hold;
	}

	pub fn silent_handshake(&self, silent: bool) {
		self.script.lock().unwrap().silent_handshake = silent;
	}

	pub fn fail_start(&self, fail: bool) {
		self.script.lock().unwrap().fail_start = fail;
	}

	pub fn catalogue(&self, text: &str) {
		self.script.lock().unwrap().catalogue = Some(text.to_string());
	}

	/// Inject output into the current session
	pub fn emit(&self, step: Step) {
		play(&self.events, self.session.load(Ordering::SeqCst), vec![step]);
	}
}

fn play(events: &EventSender, session: u64, steps: Vec<Step>) {
	for step in steps {
		let event = match step {
			Step::Out(text) => TransportEvent::chunk(session, Origin::Primary, &text),
			Step::Err(text) => TransportEvent::chunk(session, Origin::Diagnostic, &text),
			Step::Exit(code) => TransportEvent::exit(session, code),
		};
		let _ = events.send(event);
	}
}

pub struct ScriptedTransport {
	remote: Remote,
	running: bool,
}

impl Transport for ScriptedTransport {
	fn start(&mut self, session: u64) -> Result<(), ConnectionError> {
		let script = self.remote.script.lock().unwrap();
		if script.fail_start {
			return Err(ConnectionError::SpawnFailed {
				cmd: "sftp".to_string(),
				source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted failure"),
			});
		}
		self.running = true;
		self.remote.session.store(session, Ordering::SeqCst);
		self.remote.starts.fetch_add(1, Ordering::SeqCst);
		if !script.silent_handshake {
			play(&self.remote.events, session, self.remote.greeting.clone());
		}
		Ok(())
	}

	fn write_line(&mut self, line: &str) -> Result<(), ConnectionError> {
		if !self.running {
			return Err(ConnectionError::WriteFailed { message: "not running".to_string() });
		}
		self.remote.written.lock().unwrap().push(line.to_string());

		let session = self.remote.session.load(Ordering::SeqCst);
		let steps = {
			let mut guard = self.remote.script.lock().unwrap();
			let script = &mut *guard;
			if script.hold {
				return Ok(());
			}
			let handler =
				script.handlers.iter_mut().find(|(prefix, _)| line.starts_with(prefix.as_str()));
			match handler {
				Some((_, handler)) => handler(line),
				None if line == "help" => {
					let catalogue = script.catalogue.clone().unwrap_or_else(|| CATALOGUE.to_string());
					vec![Step::Out(catalogue), out(PROMPT)]
				}
				None if line == "bye" => vec![Step::Exit(Some(0))],
				None => vec![out(PROMPT)],
			}
		};
		play(&self.remote.events, session, steps);
		Ok(())
	}

	fn terminate(&mut self) {
		self.running = false;
	}
}

/// Config tuned for tests: short timers, private staging dir
pub fn test_config(staging: PathBuf) -> SftpConfig {
	SftpConfig {
		host: "stage.io".to_string(),
		listing_quiet_period_ms: 20,
		watch_interval_ms: 2,
		temp_dir: Some(staging),
		..Default::default()
	}
}

/// Client wired to a scripted remote
pub fn scripted(config: SftpConfig) -> (Sftp, Remote) {
	let mut remote = None;
	let greeting = if config.verbose {
		vec![err("debug1: Authentication succeeded (publickey).\n"), err(SUBSYSTEM)]
	} else {
		vec![out(PROMPT)]
	};
	let sftp = Sftp::with_transport(config, |events| {
		let r = Remote {
			events,
			session: Arc::new(AtomicU64::new(0)),
			starts: Arc::new(AtomicUsize::new(0)),
			written: Arc::new(Mutex::new(Vec::new())),
			script: Arc::new(Mutex::new(Script::default())),
			greeting,
			files: Arc::new(Mutex::new(HashMap::new())),
		};
		remote = Some(r.clone());
		ScriptedTransport { remote: r, running: false }
	})
	.expect("valid test config");
	(sftp, remote.expect("transport was built"))
}

/// Poll the engine until `check` holds
pub async fn wait_for<F>(sftp: &Sftp, mut check: F) -> Snapshot
where
	F: FnMut(&Snapshot) -> bool,
{
	for _ in 0..2000 {
		let snapshot = sftp.snapshot().await.expect("driver alive");
		if check(&snapshot) {
			return snapshot;
		}
		tokio::time::sleep(Duration::from_millis(1)).await;
	}
	panic!("engine never reached the expected state");
}

/// Local path argument of a `get`/`put` line (last token)
pub fn last_arg(line: &str) -> String {
	line.rsplit(' ').next().unwrap_or("").trim_matches('"').to_string()
}

/// Token at `idx` of a command line
pub fn arg_at(line: &str, idx: usize) -> String {
	line.split(' ').nth(idx).unwrap_or("").trim_matches('"').to_string()
}

// vim: ts=4
