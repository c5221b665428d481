//! Non-recursive file discovery.

use std::io::ErrorKind;
use std::path::Path;

use regex::Regex;

use crate::{ConfigError, ConfigResult};

/// Lists the names of regular files in `dir` whose name matches `pattern`.
///
/// Names are sorted so discovery order does not depend on the file system.
/// A missing directory yields an empty list.
///
/// # Errors
///
/// Returns [`ConfigError::Pattern`] for an invalid pattern and
/// [`ConfigError::Scan`] when the directory exists but cannot be read.
pub fn filter_files(dir: &Path, pattern: &str) -> ConfigResult<Vec<String>> {
    let regex = Regex::new(pattern).map_err(|source| ConfigError::Pattern {
        pattern: pattern.to_owned(),
        source,
    })?;

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ConfigError::Scan {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Scan {
            path: dir.to_path_buf(),
            source,
        })?;
        if !entry.path().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if regex.is_match(name) {
                names.push(name.to_owned());
            }
        }
    }
    names.sort();
    Ok(names)
}
