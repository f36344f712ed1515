//! Per-command option flags discovered from the remote `help` catalogue
//!
//! The catalogue looks like:
//!
//! ```text
//! Available commands:
//! bye                                Quit sftp
//! ls [-1afhlnrSt] [path]             Display remote directory listing
//! get [-afpPR] remote [local]        Download file
//! ```
//!
//! Remote endpoints differ in which flags they accept, so listing commands are
//! built from whatever the endpoint reports instead of a fixed flag set.

use std::collections::{BTreeMap, BTreeSet};

/// Header line that opens the catalogue section
pub const CATALOGUE_HEADER: &str = "Available commands:";

/// Where the table contents came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSource {
	/// Parsed from the endpoint's help catalogue
	Discovered,
	/// Catalogue missing or unrecognized; built-in defaults
	Default,
}

/// Accepted single-character flags per command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureTable {
	commands: BTreeMap<String, BTreeSet<char>>,
	source: FeatureSource,
}

impl Default for FeatureTable {
	/// Flags every OpenSSH sftp since 4.x understands
	fn default() -> Self {
		let mut commands = BTreeMap::new();
		commands.insert("ls".to_string(), "aln".chars().collect());
		commands.insert("get".to_string(), "P".chars().collect());
		commands.insert("put".to_string(), "P".chars().collect());
		FeatureTable { commands, source: FeatureSource::Default }
	}
}

impl FeatureTable {
	/// Parse a `help` reply; falls back to the default table when no
	/// catalogue header is present.
	pub fn parse(lines: &[String]) -> Self {
		let start = match lines.iter().position(|l| l.contains(CATALOGUE_HEADER)) {
			Some(idx) => idx + 1,
			None => return FeatureTable::default(),
		};

		let mut commands = BTreeMap::new();
		for line in &lines[start..] {
			// Wrapped descriptions are indented; entries start in column 0
			if line.is_empty() || line.starts_with(char::is_whitespace) {
				continue;
			}
			let mut tokens = line.split_whitespace();
			let command = match tokens.next() {
				Some(cmd) => cmd,
				None => continue,
			};
			let flags = tokens.next().and_then(parse_flag_token).unwrap_or_default();
			commands.insert(command.to_string(), flags);
		}

		if commands.is_empty() {
			return FeatureTable::default();
		}
		FeatureTable { commands, source: FeatureSource::Discovered }
	}

	pub fn source(&self) -> FeatureSource {
		self.source
	}

	/// Whether the endpoint listed `command` at all
	pub fn has_command(&self, command: &str) -> bool {
		self.commands.contains_key(command)
	}

	pub fn supports(&self, command: &str, flag: char) -> bool {
		self.commands.get(command).map(|flags| flags.contains(&flag)).unwrap_or(false)
	}

	/// Flag string for a long listing: always `l`, plus `a` and `n` when accepted
	pub fn listing_flags(&self) -> String {
		let mut flags = String::from("l");
		if self.supports("ls", 'a') {
			flags.push('a');
		}
		if self.supports("ls", 'n') {
			flags.push('n');
		}
		flags
	}

	/// Render a listing command line for `path`
	pub fn listing_command(&self, path: &str) -> String {
		let flags = self.listing_flags();
		if path.is_empty() {
			format!("ls -{}", flags)
		} else {
			format!("ls -{} {}", flags, path)
		}
	}
}

/// `[-1aflnrSt]` -> {'1','a','f','l','n','r','S','t'}
fn parse_flag_token(token: &str) -> Option<BTreeSet<char>> {
	let inner = token.strip_prefix("[-")?.strip_suffix(']')?;
	if inner.is_empty() || !inner.chars().all(|c| c.is_ascii_alphanumeric()) {
		return None;
	}
	Some(inner.chars().collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn catalogue() -> Vec<String> {
		[
			"Available commands:",
			"bye                                Quit sftp",
			"cd path                            Change remote directory to 'path'",
			"df [-hi] [path]                    Display statistics for current directory or",
			"                                   filesystem containing 'path'",
			"get [-P] remote-path [local-path]  Download file",
			"ls [-1aflnrSt] [path]              Display remote directory listing",
			"?                                  Synonym for help",
		]
		.iter()
		.map(|s| s.to_string())
		.collect()
	}

	#[test]
	fn test_parse_catalogue() {
		let table = FeatureTable::parse(&catalogue());
		assert_eq!(table.source(), FeatureSource::Discovered);
		assert!(table.supports("ls", 'n'));
		assert!(table.supports("ls", 'S'));
		assert!(table.supports("df", 'h'));
		assert!(table.supports("get", 'P'));
		assert!(!table.supports("cd", 'P'));
		assert!(table.has_command("bye"));
		assert!(table.has_command("?"));
		assert!(!table.has_command("filesystem"));
	}

	#[test]
	fn test_listing_prefers_richest_form() {
		let table = FeatureTable::parse(&catalogue());
		assert_eq!(table.listing_command("/tmp"), "ls -lan /tmp");
	}

	#[test]
	fn test_listing_falls_back_to_plain_form() {
		let lines: Vec<String> =
			vec!["Available commands:".to_string(), "ls [path]  list".to_string()];
		let table = FeatureTable::parse(&lines);
		assert_eq!(table.source(), FeatureSource::Discovered);
		assert_eq!(table.listing_command("dir"), "ls -l dir");
	}

	#[test]
	fn test_unrecognized_catalogue_uses_default() {
		let lines = vec!["Invalid command.".to_string()];
		let table = FeatureTable::parse(&lines);
		assert_eq!(table.source(), FeatureSource::Default);
		assert_eq!(table.listing_command(""), "ls -lan");
	}

	#[test]
	fn test_flag_token_rejects_non_flags() {
		assert!(parse_flag_token("[path]").is_none());
		assert!(parse_flag_token("remote-path").is_none());
		assert_eq!(parse_flag_token("[-hi]").unwrap().len(), 2);
	}
}

// vim: ts=4
