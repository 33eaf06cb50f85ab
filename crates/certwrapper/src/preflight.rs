//! Output path preflight
//!
//! Verifies every file the supervisor will write is writable before any
//! network activity happens.

use std::path::Path;

use nix::unistd::{access, AccessFlags};
use tracing::debug;

use crate::errors::Fatal;

/// Check that each path can be written
///
/// An existing path must itself be writable. For a missing path the nearest
/// existing ancestor directory must be writable, since the missing directories
/// are created on first write.
pub fn check_writable<'a, I, P>(paths: I) -> Result<(), Fatal>
where
    I: IntoIterator<Item = &'a P>,
    P: AsRef<Path> + ?Sized + 'a,
{
    for path in paths {
        let path = path.as_ref();
        let checked = nearest_existing(path);

        if access(checked, AccessFlags::W_OK).is_err() {
            return Err(Fatal::Permissions(path.to_path_buf()));
        }
        debug!(path = %path.display(), checked = %checked.display(), "Path is writable");
    }
    Ok(())
}

fn nearest_existing(path: &Path) -> &Path {
    let mut current = path;
    loop {
        if current.exists() {
            return current;
        }
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => current = parent,
            _ => return Path::new("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn running_as_root() -> bool {
        nix::unistd::geteuid().is_root()
    }

    #[test]
    fn test_existing_writable_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("certificate.pem");
        fs::write(&file, "").unwrap();

        assert!(check_writable([&file]).is_ok());
    }

    #[test]
    fn test_missing_file_checks_ancestor() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("cert").join("nested").join("user.json");

        assert_eq!(nearest_existing(&file), dir.path());
        assert!(check_writable([&file]).is_ok());
    }

    #[test]
    fn test_relative_path_falls_back_to_current_dir() {
        let path = PathBuf::from("certwrapper-missing-dir/user.json");
        assert_eq!(nearest_existing(&path), Path::new("."));
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_file_is_rejected() {
        use std::os::unix::fs::PermissionsExt;

        if running_as_root() {
            return;
        }

        let dir = TempDir::new().unwrap();
        let writable = dir.path().join("issuer.pem");
        let read_only = dir.path().join("privatekey.pem");
        fs::write(&writable, "").unwrap();
        fs::write(&read_only, "").unwrap();
        fs::set_permissions(&read_only, fs::Permissions::from_mode(0o400)).unwrap();

        let fatal = check_writable([&writable, &read_only]).unwrap_err();

        assert_eq!(fatal.exit_code(), 8);
        assert!(matches!(fatal, Fatal::Permissions(ref p) if *p == read_only));
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_directory_is_rejected() {
        use std::os::unix::fs::PermissionsExt;

        if running_as_root() {
            return;
        }

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).unwrap();
        let file = locked.join("certificate.pem");

        let result = check_writable([&file]);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o700)).unwrap();

        assert!(matches!(result, Err(Fatal::Permissions(ref p)) if *p == file));
    }
}
