//! Reply classification
//!
//! Replies are plain text lines; success or failure is inferred from their
//! content.

/// Marker the remote program prints for missing paths
pub const NO_SUCH_FILE: &str = "No such file or directory";

/// Scan `lines` for an error marker; the last matching line wins.
///
/// Returns `None` when no line matches.
pub fn classify_error(lines: &[String]) -> Option<String> {
	classify_error_with(lines, &[])
}

/// Like `classify_error`, with additional caller-supplied markers
pub fn classify_error_with(lines: &[String], extra_markers: &[String]) -> Option<String> {
	let mut found = None;
	for line in lines {
		let hit = line.contains(NO_SUCH_FILE)
			|| extra_markers.iter().any(|m| !m.is_empty() && line.contains(m.as_str()));
		if hit {
			found = Some(line.clone());
		}
	}
	found
}

/// Extract the directory from a `pwd` reply (`Remote working directory: /path`)
pub fn parse_pwd(lines: &[String]) -> Option<String> {
	lines.iter().find_map(|line| {
		let (_, rest) = line.split_once(':')?;
		let path = rest.trim();
		if path.is_empty() {
			None
		} else {
			Some(path.to_string())
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn lines(v: &[&str]) -> Vec<String> {
		v.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn test_classify_error_returns_matching_line() {
		let reply = lines(&["foo", "No such file or directory", "bar"]);
		assert_eq!(classify_error(&reply), Some("No such file or directory".to_string()));
	}

	#[test]
	fn test_classify_error_ok() {
		assert_eq!(classify_error(&lines(&["ok"])), None);
		assert_eq!(classify_error(&[]), None);
	}

	#[test]
	fn test_classify_error_last_match_wins() {
		let reply = lines(&[
			"Couldn't stat remote file: No such file or directory",
			"rm /x: No such file or directory",
		]);
		assert_eq!(classify_error(&reply), Some("rm /x: No such file or directory".to_string()));
	}

	#[test]
	fn test_classify_error_extra_markers() {
		let reply = lines(&["Couldn't remove file: Permission denied"]);
		assert_eq!(classify_error(&reply), None);
		let markers = vec!["Permission denied".to_string()];
		assert_eq!(classify_error_with(&reply, &markers), Some(reply[0].clone()));
	}

	#[test]
	fn test_parse_pwd() {
		let reply = lines(&["Remote working directory: /home/user"]);
		assert_eq!(parse_pwd(&reply), Some("/home/user".to_string()));
	}

	#[test]
	fn test_parse_pwd_path_with_spaces_and_colons() {
		let reply = lines(&["Remote working directory: /srv/my files/a:b"]);
		assert_eq!(parse_pwd(&reply), Some("/srv/my files/a:b".to_string()));
	}

	#[test]
	fn test_parse_pwd_rejects_garbage() {
		assert_eq!(parse_pwd(&lines(&["nothing here"])), None);
	}
}

// vim: ts=4
