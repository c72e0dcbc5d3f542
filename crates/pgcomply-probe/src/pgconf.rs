//! Parser for key=value configuration files (postgresql.conf grammar)
//!
//! Handles `name = value` lines, `#` comments (whole-line and trailing),
//! single-quoted values with `''` escapes, and last-assignment-wins
//! semantics, which is how the server itself reads the file.

use crate::types::ConfigMap;
use pgcomply_core::{Error, Result};
use std::path::Path;

/// Read and parse a configuration file
pub fn read_file(path: &str) -> Result<ConfigMap> {
    let content = match std::fs::read_to_string(Path::new(path)) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound {
                path: path.to_string(),
            })
        }
        Err(e) => {
            return Err(Error::ProbeFailed(format!(
                "cannot read config {}: {}",
                path, e
            )))
        }
    };
    Ok(parse(&content))
}

/// Parse configuration content into a lookup table
pub fn parse(content: &str) -> ConfigMap {
    let mut map = ConfigMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, raw_value) = match line.split_once('=') {
            Some((k, v)) => (k.trim(), v),
            None => continue,
        };
        if key.is_empty() {
            continue;
        }

        if let Some(value) = parse_value(raw_value) {
            map.insert(key.to_string(), value);
        }
    }

    map
}

/// Parse the right-hand side of an assignment: strip a trailing comment
/// that is outside quotes, then unquote.
fn parse_value(raw: &str) -> Option<String> {
    let raw = raw.trim_start();

    if let Some(rest) = raw.strip_prefix('\'') {
        // Quoted value; '' is an escaped quote
        let mut value = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    value.push('\'');
                } else {
                    return Some(value);
                }
            } else {
                value.push(c);
            }
        }
        // Unterminated quote; take what we have
        Some(value)
    } else {
        let unquoted = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let unquoted = unquoted.trim();
        if unquoted.is_empty() {
            None
        } else {
            Some(unquoted.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_basic_assignments() {
        let map = parse(
            r#"
# postgresql.conf
max_connections = 100
ssl = on
log_directory = 'pg_log'      # trailing comment
"#,
        );
        assert_eq!(map.get("max_connections").map(String::as_str), Some("100"));
        assert_eq!(map.get("ssl").map(String::as_str), Some("on"));
        assert_eq!(map.get("log_directory").map(String::as_str), Some("pg_log"));
    }

    #[test]
    fn test_quoted_value_with_escape_and_hash() {
        let map = parse("log_line_prefix = '< %m %u '' #%d >'\n");
        assert_eq!(
            map.get("log_line_prefix").map(String::as_str),
            Some("< %m %u ' #%d >")
        );
    }

    #[test]
    fn test_last_assignment_wins() {
        let map = parse("port = 5432\nport = 5433\n");
        assert_eq!(map.get("port").map(String::as_str), Some("5433"));
    }

    #[test]
    fn test_commented_assignment_ignored() {
        let map = parse("#ssl = on\n");
        assert!(map.get("ssl").is_none());
    }

    #[test]
    fn test_read_file_missing_is_not_found() {
        let err = read_file("/nonexistent/postgresql.conf").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_read_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "shared_preload_libraries = 'pgaudit'").unwrap();

        let map = read_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(
            map.get("shared_preload_libraries").map(String::as_str),
            Some("pgaudit")
        );
    }
}
