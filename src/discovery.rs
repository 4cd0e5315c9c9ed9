//! One-time discovery of external executables and resource files.
//!
//! Candidates are probed in order:
//! 1. Explicit config path
//! 2. Each configured search directory (relative entries resolve against the working directory)
//! 3. `PATH` lookup via [`which::which`]
//!
//! Discovery runs once at startup; the resolved paths are cached in the pipeline.

use std::path::{Path, PathBuf};

/// Build the ordered list of candidate paths for an executable named `name`.
pub fn binary_candidates(name: &str, explicit: Option<&Path>, search_dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(search_dirs.len() + 2);

    if let Some(p) = explicit {
        candidates.push(p.to_path_buf());
    }

    for dir in search_dirs {
        candidates.push(resolve(dir).join(name));
    }

    if let Ok(found) = which::which(name) {
        candidates.push(found);
    }

    candidates
}

/// Locate an executable, making it executable if it was shipped without the bit set.
///
/// Returns `None` when no candidate exists.
pub fn locate_binary(name: &str, explicit: Option<&Path>, search_dirs: &[PathBuf]) -> Option<PathBuf> {
    let candidates = binary_candidates(name, explicit, search_dirs);
    let found = candidates.iter().find(|c| c.is_file()).cloned();

    match &found {
        Some(path) => {
            if let Err(e) = ensure_executable(path) {
                tracing::warn!(path = %path.display(), error = %e, "could not mark binary executable");
            }
            tracing::info!(tool = name, path = %path.display(), "located external tool");
        }
        None => {
            tracing::warn!(
                tool = name,
                searched = candidates.len(),
                "external tool not found"
            );
        }
    }

    found
}

/// Locate a resource file at `relative` under one of the search directories.
pub fn locate_resource(relative: &Path, explicit: Option<&Path>, search_dirs: &[PathBuf]) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return p.is_file().then(|| p.to_path_buf());
    }
    search_dirs
        .iter()
        .map(|dir| resolve(dir).join(relative))
        .find(|candidate| candidate.is_file())
}

/// Resolve a possibly relative directory against the current working directory.
fn resolve(dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        return dir.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(dir),
        Err(_) => dir.to_path_buf(),
    }
}

/// Ensure the owner/group/other execute bits are set (mode 0755).
#[cfg(unix)]
pub fn ensure_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)?.permissions();
    if perms.mode() & 0o111 != 0o111 {
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

/// No-op on platforms without Unix permission bits.
#[cfg(not(unix))]
pub fn ensure_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn candidates_put_explicit_first() {
        let explicit = PathBuf::from("/custom/bin/rhubarb");
        let candidates = binary_candidates("rhubarb", Some(&explicit), &[PathBuf::from("/opt/a")]);
        assert_eq!(candidates[0], explicit);
        assert_eq!(candidates[1], PathBuf::from("/opt/a/rhubarb"));
    }

    #[test]
    fn relative_search_dirs_resolve_against_cwd() {
        let candidates = binary_candidates("tool", None, &[PathBuf::from("bin")]);
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(candidates[0], cwd.join("bin").join("tool"));
    }

    #[test]
    fn locate_binary_finds_file_in_search_dir() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("rhubarb-test-tool");
        std::fs::write(&bin, b"#!/bin/sh\n").unwrap();

        let found = locate_binary("rhubarb-test-tool", None, &[dir.path().to_path_buf()]);
        assert_eq!(found.as_deref(), Some(bin.as_path()));
    }

    #[cfg(unix)]
    #[test]
    fn locate_binary_sets_execute_bits() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("tool");
        std::fs::write(&bin, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o644)).unwrap();

        locate_binary("tool", None, &[dir.path().to_path_buf()]).unwrap();
        let mode = std::fs::metadata(&bin).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn missing_binary_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(locate_binary("definitely-not-a-real-tool-xyz", None, &[dir.path().to_path_buf()]).is_none());
    }

    #[test]
    fn resource_lookup_probes_dirs_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let rel = Path::new("res/sphinx/cmudict-en-us.dict");
        std::fs::create_dir_all(second.path().join("res/sphinx")).unwrap();
        std::fs::write(second.path().join(rel), "hello HH AH L OW\n").unwrap();

        let found = locate_resource(rel, None, &[first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(found, Some(second.path().join(rel)));
    }

    #[test]
    fn explicit_resource_must_exist() {
        let rel = Path::new("res/x.dict");
        assert!(locate_resource(rel, Some(Path::new("/nonexistent/x.dict")), &[]).is_none());
    }
}
