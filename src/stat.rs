//! Stat view over a listing entry
//!
//! There is no stat command in the interactive protocol, so metadata is
//! derived from the long listing of the parent directory.

use serde::Serialize;

use crate::listing::{final_segment, DirectoryEntry};

/// File type encoded by the first permissions character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileType {
	File,
	Directory,
	SymbolicLink,
	BlockDevice,
	CharacterDevice,
	Fifo,
	Socket,
	Unknown,
}

impl FileType {
	pub fn from_char(c: char) -> Self {
		match c {
			'-' => FileType::File,
			'd' => FileType::Directory,
			'l' => FileType::SymbolicLink,
			'b' => FileType::BlockDevice,
			'c' => FileType::CharacterDevice,
			'p' => FileType::Fifo,
			's' => FileType::Socket,
			_ => FileType::Unknown,
		}
	}
}

/// Derived metadata for one entry; cheap to rebuild, never cached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
	entry: DirectoryEntry,
}

impl Stat {
	pub fn new(entry: DirectoryEntry) -> Self {
		Stat { entry }
	}

	pub fn entry(&self) -> &DirectoryEntry {
		&self.entry
	}

	pub fn into_entry(self) -> DirectoryEntry {
		self.entry
	}

	/// Permission bits (`0o754` for `-rwxr-xr--`)
	pub fn mode(&self) -> u32 {
		permissions_to_mode(&self.entry.permissions)
	}

	pub fn size(&self) -> u64 {
		self.entry.size
	}

	pub fn uid(&self) -> u32 {
		self.entry.uid
	}

	pub fn gid(&self) -> u32 {
		self.entry.gid
	}

	pub fn file_type(&self) -> FileType {
		FileType::from_char(self.entry.type_char())
	}

	pub fn is_file(&self) -> bool {
		self.file_type() == FileType::File
	}

	pub fn is_directory(&self) -> bool {
		self.file_type() == FileType::Directory
	}

	pub fn is_symbolic_link(&self) -> bool {
		self.file_type() == FileType::SymbolicLink
	}

	pub fn is_block_device(&self) -> bool {
		self.file_type() == FileType::BlockDevice
	}

	pub fn is_character_device(&self) -> bool {
		self.file_type() == FileType::CharacterDevice
	}

	pub fn is_fifo(&self) -> bool {
		self.file_type() == FileType::Fifo
	}

	pub fn is_socket(&self) -> bool {
		self.file_type() == FileType::Socket
	}
}

/// Convert symbolic permissions to numeric mode bits.
///
/// Accepts the 9-character triplet form or the 10-character form with a
/// leading type character.
pub fn permissions_to_mode(permissions: &str) -> u32 {
	let chars: Vec<char> = permissions.chars().collect();
	let triplets = if chars.len() > 9 { &chars[chars.len() - 9..] } else { &chars[..] };

	triplets.chunks(3).fold(0, |mode, triplet| {
		let mut bits = 0;
		for c in triplet {
			bits |= match *c {
				'r' => 4,
				'w' => 2,
				'x' | 's' | 't' => 1,
				_ => 0,
			};
		}
		(mode << 3) | bits
	})
}

/// Split a remote path into (parent, basename)
///
/// `"/a/b"` -> `("/a", "b")`, `"/b"` -> `("/", "b")`, `"b"` -> `("", "b")`
pub fn split_remote_path(path: &str) -> (String, String) {
	let trimmed = if path.len() > 1 { path.trim_end_matches('/') } else { path };
	match trimmed.rfind('/') {
		Some(0) => ("/".to_string(), trimmed[1..].to_string()),
		Some(idx) => (trimmed[..idx].to_string(), trimmed[idx + 1..].to_string()),
		None => (String::new(), trimmed.to_string()),
	}
}

/// Join a relative parent onto the working directory
pub fn resolve_parent(cwd: &str, parent: &str) -> String {
	if parent.starts_with('/') {
		return parent.to_string();
	}
	let base = cwd.trim_end_matches('/');
	match parent {
		"" | "." => if base.is_empty() { "/".to_string() } else { base.to_string() },
		_ => format!("{}/{}", base, parent),
	}
}

/// First entry whose final path segment equals `name`
pub fn find_entry(entries: Vec<DirectoryEntry>, name: &str) -> Option<DirectoryEntry> {
	entries.into_iter().find(|entry| final_segment(&entry.path) == name)
}


// vim: ts=4
