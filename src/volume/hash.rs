//! Content digests for files and directory subtrees.

use std::fs;
use std::io;
use std::path::Path;

use globset::GlobSet;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::metrics::Metrics;

/// Lowercase hex SHA-256 of a whole file, plus its length. The file is read
/// into memory in one go.
pub fn file_hash(path: &Path) -> io::Result<(String, u64)> {
    let bytes = fs::read(path)?;
    Ok((hex::encode(Sha256::digest(&bytes)), bytes.len() as u64))
}

/// Aggregate digest and total file size of a directory subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirDigest {
    pub hash: String,
    pub size: u64,
}

fn relative(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Hashes every descendant of `dir` in file-name order. Directories feed
/// `D <rel>\n`, files feed `F <rel> <sha256>\n`, where `<rel>` is relative to
/// `dir`. Symlinks are not followed and contribute nothing, neither do entries
/// whose name matches `excludes`.
pub fn dir_digest(dir: &Path, excludes: &GlobSet, metrics: &Metrics) -> io::Result<DirDigest> {
    let mut hasher = Sha256::new();
    let mut size = 0u64;

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !excludes.is_match(e.file_name()));

    for entry in walker {
        let entry = entry?;
        let ft = entry.file_type();
        if ft.is_symlink() {
            continue;
        }
        let rel = relative(dir, entry.path());
        if ft.is_dir() {
            hasher.update(format!("D {}\n", rel).as_bytes());
        } else if ft.is_file() {
            let (digest, len) = file_hash(entry.path())?;
            metrics.add_hashed(len);
            size += len;
            hasher.update(format!("F {} {}\n", rel, digest).as_bytes());
        }
    }

    Ok(DirDigest { hash: hex::encode(hasher.finalize()), size })
}
