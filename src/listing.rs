//! Long-listing parser
//!
//! Turns `ls -l` style output into `DirectoryEntry` records:
//!
//! ```text
//! drwxr-xr-x    3 1000     1000         4096 Jan 12 09:30 c9/.git
//! ```
//!
//! Field layout: permissions, link count, uid, gid, size, date (one or more
//! tokens), `HH:MM`, path. The path is everything after the time token and
//! may contain spaces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters allowed in the permissions token
const PERMISSION_CHARS: &[char] = &['d', 'r', 'w', 'x', '-', 'l', 'b', 'c', 'p', 's'];

/// One listing record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
	/// Symbolic permissions including the type character (`drwxr-xr-x`)
	pub permissions: String,
	pub links: u64,
	pub uid: u32,
	pub gid: u32,
	pub size: u64,
	/// Date as printed (`Jan 12`)
	pub date: String,
	/// `HH:MM`
	pub time: String,
	pub path: String,
}

impl DirectoryEntry {
	/// Last path segment
	pub fn name(&self) -> &str {
		final_segment(&self.path)
	}

	/// File-type character (first char of the permissions token)
	pub fn type_char(&self) -> char {
		self.permissions.chars().next().unwrap_or('-')
	}
}

impl fmt::Display for DirectoryEntry {
	/// Renders the entry back as a listing line
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{} {:>4} {:<8} {:<8} {:>12} {} {} {}",
			self.permissions,
			self.links,
			self.uid,
			self.gid,
			self.size,
			self.date,
			self.time,
			self.path
		)
	}
}

/// Result of parsing a single line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
	Entry(DirectoryEntry),
	/// Blank line or a `.` / `..` entry
	Ignored,
	/// Line that does not follow the field grammar
	Unparseable(String),
}

/// Parsed listing: entries in input order plus the lines that did not parse
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Listing {
	pub entries: Vec<DirectoryEntry>,
	pub rejected: Vec<String>,
}

impl Listing {
	pub fn into_entries(self) -> Vec<DirectoryEntry> {
		self.entries
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// Parse every line of a listing reply
pub fn parse_listing<S: AsRef<str>>(lines: &[S]) -> Listing {
	let mut listing = Listing::default();
	for line in lines {
		match parse_line(line.as_ref()) {
			ParsedLine::Entry(entry) => listing.entries.push(entry),
			ParsedLine::Ignored => {}
			ParsedLine::Unparseable(raw) => listing.rejected.push(raw),
		}
	}
	listing
}

/// Parse one listing line
pub fn parse_line(line: &str) -> ParsedLine {
	let line = line.trim_end_matches(['\r', '\n']);
	if line.trim().is_empty() {
		return ParsedLine::Ignored;
	}
	if is_dot_entry(final_segment(line.trim_end())) {
		return ParsedLine::Ignored;
	}

	match tokenize(line) {
		Some(entry) => ParsedLine::Entry(entry),
		None => ParsedLine::Unparseable(line.to_string()),
	}
}

/// Final `/`-separated segment, or the last whitespace token when there is no `/`
pub(crate) fn final_segment(path: &str) -> &str {
	match path.rfind('/') {
		Some(idx) => &path[idx + 1..],
		None => path.rsplit(char::is_whitespace).next().unwrap_or(path),
	}
}

fn is_dot_entry(segment: &str) -> bool {
	segment == "." || segment == ".."
}

/// Splits off whitespace-separated tokens while remembering where the rest starts
struct Fields<'a> {
	rest: &'a str,
}

impl<'a> Fields<'a> {
	fn next_token(&mut self) -> Option<&'a str> {
		let trimmed = self.rest.trim_start();
		if trimmed.is_empty() {
			return None;
		}
		let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
		let (token, rest) = trimmed.split_at(end);
		self.rest = rest;
		Some(token)
	}

	/// Remainder after the single separator run, preserving inner spaces
	fn remainder(&self) -> &'a str {
		self.rest.trim_start()
	}
}

fn tokenize(line: &str) -> Option<DirectoryEntry> {
	let mut fields = Fields { rest: line };

	let permissions = fields.next_token()?;
	if permissions.len() != 10 || !permissions.chars().all(|c| PERMISSION_CHARS.contains(&c)) {
		return None;
	}
	let links = fields.next_token()?.parse::<u64>().ok()?;
	let uid = fields.next_token()?.parse::<u32>().ok()?;
	let gid = fields.next_token()?.parse::<u32>().ok()?;
	let size = fields.next_token()?.parse::<u64>().ok()?;

	let mut date_parts = Vec::new();
	let time = loop {
		let token = fields.next_token()?;
		if is_time(token) {
			break token;
		}
		if !token.chars().all(|c| c.is_alphanumeric()) {
			return None;
		}
		date_parts.push(token);
	};
	if date_parts.is_empty() {
		return None;
	}

	let path = fields.remainder();
	if path.is_empty() {
		return None;
	}

	Some(DirectoryEntry {
		permissions: permissions.to_string(),
		links,
		uid,
		gid,
		size,
		date: date_parts.join(" "),
		time: time.to_string(),
		path: path.to_string(),
	})
}

/// `HH:MM`
fn is_time(token: &str) -> bool {
	let bytes = token.as_bytes();
	bytes.len() == 5
		&& bytes[2] == b':'
		&& bytes[..2].iter().all(u8::is_ascii_digit)
		&& bytes[3..].iter().all(u8::is_ascii_digit)
}


// vim: ts=4
