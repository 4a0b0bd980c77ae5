// src/memo/fingerprint.rs

//! Content-derived fingerprints for memoization.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

/// Compute the hash of a single file.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file =
        File::open(path).with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Fingerprint a task from its command line and input files.
///
/// Paths are sorted before hashing so declaration order does not matter.
/// A missing input is an error: a fingerprint must never silently ignore
/// part of what the task reads.
pub fn compute_fingerprint<I, P>(cmd: &str, inputs: I) -> Result<String>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut hasher = Hasher::new();
    hasher.update(b"cmd\0");
    hasher.update(cmd.as_bytes());

    let mut paths: Vec<PathBuf> = inputs
        .into_iter()
        .map(|p| p.as_ref().to_path_buf())
        .collect();
    paths.sort();

    for path in paths {
        let file_hash = compute_file_hash(&path)?;
        hasher.update(b"\0file\0");
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(file_hash.as_bytes());
    }

    let fingerprint = hasher.finalize().to_hex().to_string();
    debug!(fingerprint = %fingerprint, "computed task fingerprint");
    Ok(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn fingerprint_is_order_independent() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.nii");
        let b = dir.path().join("b.nii");
        fs::write(&a, b"aaa").unwrap();
        fs::write(&b, b"bbb").unwrap();

        let one = compute_fingerprint("run", [&a, &b]).unwrap();
        let two = compute_fingerprint("run", [&b, &a]).unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn fingerprint_changes_with_content_and_command() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.nii");
        fs::write(&a, b"v1").unwrap();
        let before = compute_fingerprint("run", [&a]).unwrap();

        assert_ne!(before, compute_fingerprint("run --fast", [&a]).unwrap());

        fs::write(&a, b"v2").unwrap();
        assert_ne!(before, compute_fingerprint("run", [&a]).unwrap());
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(compute_fingerprint("run", [dir.path().join("nope")]).is_err());
    }
}
