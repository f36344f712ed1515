//! Reply demultiplexer
//!
//! The remote program writes one undifferentiated stream per file descriptor.
//! Reply boundaries are recovered from the prompt the program prints when it
//! is ready for the next command; everything between two prompts belongs to
//! the active command.

use crate::transport::Origin;

/// How a command's reply is known to be complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPolicy {
	/// A chunk containing the prompt marker ends the reply
	Prompt,
	/// The reply ends after this much silence; every chunk restarts the timer
	QuietPeriod(std::time::Duration),
}

/// Marker strings the demultiplexer looks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
	/// Printed when the session is ready for the next command
	pub prompt: String,
	/// First sign of life that completes the handshake
	pub connect: String,
	/// Diagnostic lines starting with this are noise
	pub trace: String,
}

impl Markers {
	pub fn new(prompt: &str, trace: &str) -> Self {
		Markers { prompt: prompt.to_string(), connect: prompt.to_string(), trace: trace.to_string() }
	}
}

/// What the connection should do with a chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkAction {
	/// Handshake prompt seen; start capability discovery
	Handshake,
	/// Drop without touching any command
	Noise,
	/// Active command finished; `String` is the chunk text to append
	Complete(String),
	/// Chunk belongs to the still-running active command
	Accumulate(String),
	/// Nothing is waiting for output
	Unsolicited,
}

/// Connection facts the decision depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemuxState<'a> {
	pub awaiting_handshake: bool,
	pub active: Option<CompletionPolicy>,
	/// Text already buffered for the active command
	pub buffered: &'a str,
}

/// Decide what a chunk means.
///
/// Order matters: the handshake check runs first so a connect marker on the
/// diagnostic stream is honoured even when it also looks like trace output.
pub fn classify(markers: &Markers, state: DemuxState, origin: Origin, chunk: &str) -> ChunkAction {
	if state.awaiting_handshake {
		if chunk.contains(markers.connect.as_str()) {
			return ChunkAction::Handshake;
		}
		return ChunkAction::Noise;
	}

	let text = match origin {
		Origin::Diagnostic => match strip_trace_lines(chunk, &markers.trace) {
			Some(text) => text,
			None => return ChunkAction::Noise,
		},
		Origin::Primary => chunk.to_string(),
	};

	match state.active {
		Some(CompletionPolicy::Prompt) if ends_reply(state.buffered, &text, &markers.prompt) => {
			ChunkAction::Complete(text)
		}
		Some(_) => ChunkAction::Accumulate(text),
		None => ChunkAction::Unsolicited,
	}
}

/// Whether `text` completes the prompt, which may have started in `buffered`
fn ends_reply(buffered: &str, text: &str, prompt: &str) -> bool {
	if text.contains(prompt) {
		return true;
	}
	let mut start = buffered.len().saturating_sub(prompt.len().saturating_sub(1));
	while !buffered.is_char_boundary(start) {
		start += 1;
	}
	let mut seam = String::with_capacity(prompt.len() * 2);
	seam.push_str(&buffered[start..]);
	let mut end = text.len().min(prompt.len());
	while !text.is_char_boundary(end) {
		end += 1;
	}
	seam.push_str(&text[..end]);
	seam.contains(prompt)
}

/// `debug1: ...` style verbose output: the marker, an optional level, then `:`
fn is_trace_line(line: &str, trace: &str) -> bool {
	match line.trim_start().strip_prefix(trace) {
		Some(rest) => rest.trim_start_matches(|c: char| c.is_ascii_digit()).starts_with(':'),
		None => false,
	}
}

/// Remove trace lines from a diagnostic chunk; `None` if nothing else is left
fn strip_trace_lines(chunk: &str, trace: &str) -> Option<String> {
	if trace.is_empty() || !chunk.contains(trace) {
		return Some(chunk.to_string());
	}
	let kept: Vec<&str> = chunk
		.split_inclusive('\n')
		.filter(|line| !is_trace_line(line, trace) && !line.trim().is_empty())
		.collect();
	if kept.is_empty() {
		None
	} else {
		Some(kept.concat())
	}
}

/// Turn buffered text plus the final chunk into reply lines.
///
/// Prompt lines are removed, `\r` is trimmed, blank lines are dropped.
pub fn assemble_reply(buffer: &str, chunk: &str, prompt: &str) -> Vec<String> {
	let mut full = String::with_capacity(buffer.len() + chunk.len());
	full.push_str(buffer);
	full.push_str(chunk);

	full.split('\n')
		.map(|line| line.trim_end_matches('\r'))
		.filter(|line| !line.contains(prompt))
		.filter(|line| !line.trim().is_empty())
		.map(|line| line.to_string())
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	fn markers() -> Markers {
		Markers::new("sftp>", "debug")
	}

	fn active(policy: CompletionPolicy) -> DemuxState<'static> {
		DemuxState { awaiting_handshake: false, active: Some(policy), buffered: "" }
	}

	#[test]
	fn test_handshake_on_first_prompt() {
		let state = DemuxState { awaiting_handshake: true, active: None, buffered: "" };
		assert_eq!(classify(&markers(), state, Origin::Primary, "sftp> "), ChunkAction::Handshake);
		assert_eq!(
			classify(&markers(), state, Origin::Diagnostic, "debug1: Authentication succeeded\n"),
			ChunkAction::Noise
		);
	}

	#[test]
	fn test_custom_connect_marker_on_diagnostic_stream() {
		let mut m = markers();
		m.connect = "Sending subsystem: sftp".to_string();
		let state = DemuxState { awaiting_handshake: true, active: None, buffered: "" };
		assert_eq!(
			classify(&m, state, Origin::Diagnostic, "debug1: Sending subsystem: sftp\r\n"),
			ChunkAction::Handshake
		);
	}

	#[test]
	fn test_prompt_completes_active_command() {
		let action = classify(
			&markers(),
			active(CompletionPolicy::Prompt),
			Origin::Primary,
			"Remote working directory: /home/user\nsftp> ",
		);
		assert_eq!(
			action,
			ChunkAction::Complete("Remote working directory: /home/user\nsftp> ".to_string())
		);
	}

	#[test]
	fn test_chunk_without_prompt_accumulates() {
		let action =
			classify(&markers(), active(CompletionPolicy::Prompt), Origin::Primary, "partial");
		assert_eq!(action, ChunkAction::Accumulate("partial".to_string()));
	}

	#[test]
	fn test_quiet_period_commands_never_complete_on_prompt() {
		let policy = CompletionPolicy::QuietPeriod(Duration::from_millis(10));
		let action = classify(&markers(), active(policy), Origin::Primary, "x\nsftp> ");
		assert_eq!(action, ChunkAction::Accumulate("x\nsftp> ".to_string()));
	}

	#[test]
	fn test_trace_noise_is_discarded() {
		let action = classify(
			&markers(),
			active(CompletionPolicy::Prompt),
			Origin::Diagnostic,
			"debug2: channel 0: rcvd adjust 65536\ndebug3: send packet\n",
		);
		assert_eq!(action, ChunkAction::Noise);
	}

	#[test]
	fn test_mixed_diagnostic_chunk_keeps_real_lines() {
		let action = classify(
			&markers(),
			active(CompletionPolicy::Prompt),
			Origin::Diagnostic,
			"debug3: received\nCouldn't stat remote file: No such file or directory\n",
		);
		assert_eq!(
			action,
			ChunkAction::Accumulate(
				"Couldn't stat remote file: No such file or directory\n".to_string()
			)
		);
	}

	#[test]
	fn test_trace_marker_on_primary_is_not_noise() {
		let action =
			classify(&markers(), active(CompletionPolicy::Prompt), Origin::Primary, "debug.log\n");
		assert_eq!(action, ChunkAction::Accumulate("debug.log\n".to_string()));
	}

	#[test]
	fn test_error_naming_a_debug_path_is_kept() {
		let action = classify(
			&markers(),
			active(CompletionPolicy::Prompt),
			Origin::Diagnostic,
			"debug1: Sending command: get\nremote open(\"/var/log/debug.log\"): No such file or directory\n",
		);
		assert_eq!(
			action,
			ChunkAction::Accumulate(
				"remote open(\"/var/log/debug.log\"): No such file or directory\n".to_string()
			)
		);
	}

	#[test]
	fn test_trace_line_shapes() {
		assert!(is_trace_line("debug1: channel 0: new\n", "debug"));
		assert!(is_trace_line("debug: plain\n", "debug"));
		assert!(!is_trace_line("debug.log\n", "debug"));
		assert!(!is_trace_line("Couldn't delete file \"/srv/debug\": No such file\n", "debug"));
	}

	#[test]
	fn test_prompt_split_across_chunks_completes() {
		let state = DemuxState {
			awaiting_handshake: false,
			active: Some(CompletionPolicy::Prompt),
			buffered: "Remote working directory: /srv\nsft",
		};
		assert_eq!(
			classify(&markers(), state, Origin::Primary, "p> "),
			ChunkAction::Complete("p> ".to_string())
		);
		let lines = assemble_reply(state.buffered, "p> ", "sftp>");
		assert_eq!(lines, vec!["Remote working directory: /srv".to_string()]);
	}

	#[test]
	fn test_partial_prompt_alone_keeps_waiting() {
		let state = DemuxState {
			awaiting_handshake: false,
			active: Some(CompletionPolicy::Prompt),
			buffered: "Remote working directory: /srv\n",
		};
		assert_eq!(
			classify(&markers(), state, Origin::Primary, "sft"),
			ChunkAction::Accumulate("sft".to_string())
		);
	}

	#[test]
	fn test_unsolicited_output() {
		let state = DemuxState { awaiting_handshake: false, active: None, buffered: "" };
		assert_eq!(classify(&markers(), state, Origin::Primary, "sftp> "), ChunkAction::Unsolicited);
	}

	#[test]
	fn test_assemble_reply_strips_prompts() {
		let lines = assemble_reply(
			"sftp> pwd\r\nRemote working",
			" directory: /home/user\r\nsftp> ",
			"sftp>",
		);
		assert_eq!(lines, vec!["Remote working directory: /home/user".to_string()]);
	}

	#[test]
	fn test_assemble_reply_empty() {
		assert!(assemble_reply("", "sftp> ", "sftp>").is_empty());
	}
}

// vim: ts=4
