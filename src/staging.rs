//! Local temp-file staging for whole-file reads and writes
//!
//! `read_file` downloads into a staged file and reads it back; `write_file`
//! writes a staged file and uploads it. Downloads are only trusted once the
//! file has stopped growing.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Give up waiting for a download after this many polls without a file
const MAX_MISSING_POLLS: u32 = 200;

#[derive(Debug, Clone)]
pub struct Staging {
	dir: PathBuf,
}

impl Staging {
	pub fn new(dir: PathBuf) -> Self {
		Staging { dir }
	}

	/// Fresh path inside the staging directory; nothing is created
	pub fn unique_path(&self) -> PathBuf {
		self.dir.join(format!("sftpq-{}", Uuid::new_v4()))
	}

	pub async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
		tokio::fs::write(path, data).await
	}

	pub async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
		tokio::fs::read(path).await
	}

	/// Remove a staged file; a file that is already gone is fine
	pub async fn remove(&self, path: &Path) {
		match tokio::fs::remove_file(path).await {
			Ok(()) => debug!("Removed staged file {}", path.display()),
			Err(e) if e.kind() == io::ErrorKind::NotFound => {}
			Err(e) => warn!("Failed to remove staged file {}: {}", path.display(), e),
		}
	}

	/// Poll `path` until it exists and its size is unchanged between two
	/// consecutive polls. Returns the final size.
	pub async fn wait_until_stable(&self, path: &Path, interval: Duration) -> io::Result<u64> {
		let mut previous: Option<u64> = None;
		let mut missing = 0;

		loop {
			match tokio::fs::metadata(path).await {
				Ok(meta) => {
					let size = meta.len();
					if previous == Some(size) {
						return Ok(size);
					}
					previous = Some(size);
				}
				Err(e) if e.kind() == io::ErrorKind::NotFound => {
					previous = None;
					missing += 1;
					if missing >= MAX_MISSING_POLLS {
						return Err(io::Error::new(
							io::ErrorKind::NotFound,
							format!("{} never appeared", path.display()),
						));
					}
				}
				Err(e) => return Err(e),
			}
			tokio::time::sleep(interval).await;
		}
	}
}


// vim: ts=4
