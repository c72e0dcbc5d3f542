//! Filesystem metadata probe

use crate::types::FileMeta;
use pgcomply_core::{Error, Result};
use std::fs;
use std::path::Path;

/// Stat a path. Absent paths are `Error::NotFound`; the caller decides
/// whether absence is a finding.
pub fn stat_path(path: &str) -> Result<FileMeta> {
    let p = Path::new(path);

    let metadata = match fs::metadata(p) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound {
                path: path.to_string(),
            })
        }
        Err(e) => return Err(Error::ProbeFailed(format!("cannot stat {}: {}", path, e))),
    };

    Ok(build_meta(&metadata))
}

#[cfg(unix)]
fn build_meta(metadata: &fs::Metadata) -> FileMeta {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    FileMeta {
        exists: true,
        is_directory: metadata.is_dir(),
        mode: metadata.permissions().mode() & 0o7777,
        owner: username(metadata.uid()),
        group: groupname(metadata.gid()),
    }
}

#[cfg(not(unix))]
fn build_meta(metadata: &fs::Metadata) -> FileMeta {
    FileMeta {
        exists: true,
        is_directory: metadata.is_dir(),
        mode: 0,
        owner: String::new(),
        group: String::new(),
    }
}

/// Get username from UID
#[cfg(unix)]
fn username(uid: u32) -> String {
    lookup_id("/etc/passwd", uid).unwrap_or_else(|| uid.to_string())
}

/// Get group name from GID
#[cfg(unix)]
fn groupname(gid: u32) -> String {
    lookup_id("/etc/group", gid).unwrap_or_else(|| gid.to_string())
}

#[cfg(unix)]
fn lookup_id(db: &str, id: u32) -> Option<String> {
    fs::read_to_string(db).ok().and_then(|content| {
        content.lines().find_map(|line| {
            let parts: Vec<&str> = line.split(':').collect();
            if parts.len() >= 3 && parts[2].parse::<u32>().ok() == Some(id) {
                Some(parts[0].to_string())
            } else {
                None
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_path_is_not_found() {
        let err = stat_path("/nonexistent/pgsql/data").unwrap_err();
        assert!(matches!(err, Error::NotFound { path } if path.contains("pgsql")));
    }

    #[cfg(unix)]
    #[test]
    fn test_stat_directory_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("data");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700)).unwrap();

        let meta = stat_path(dir.to_str().unwrap()).unwrap();
        assert!(meta.exists);
        assert!(meta.is_directory);
        assert_eq!(meta.mode, 0o700);
        assert!(!meta.owner.is_empty());
    }
}
