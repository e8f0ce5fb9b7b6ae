//! The sandboxed storage root: path sanitizing, directory listings and
//! content hashes.

pub mod hash;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::types::{Breadcrumb, FileEntry};

const SI_UNITS: [&str; 6] = ["k", "M", "G", "T", "P", "E"];

pub fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        if p.trim().is_empty() {
            continue;
        }
        b.add(Glob::new(&p.trim().replace('\\', "/"))?);
    }
    b.build()
}

/// Strips every `..` segment, turns `\` into `/` and drops leading
/// separators, so the result can be joined below a root without climbing out
/// of it. `"../../etc"` becomes `"etc"`.
pub fn sanitize_path(path: &str) -> String {
    let mut s = path.replace('\\', "/");
    // Removing one occurrence can form a new one ("...." style inputs).
    loop {
        let next = s.replace("../", "").replace("..", "");
        if next == s {
            break;
        }
        s = next;
    }
    let mut out = String::with_capacity(s.len());
    for part in s.split('/').filter(|p| !p.is_empty() && *p != ".") {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(part);
    }
    out
}

/// Base-1000 human readable size: `"999 B"`, `"1.5 kB"`, `"2.0 MB"`.
pub fn size_si(bytes: u64) -> String {
    if bytes < 1000 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < SI_UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.1} {}B", value, SI_UNITS[unit])
}

/// Splits a file name into stem and lowercase dotted extension. A leading dot
/// alone does not start an extension.
pub fn split_extension(file_name: &str) -> (String, String) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => {
            (file_name[..idx].to_string(), file_name[idx..].to_ascii_lowercase())
        }
        _ => (file_name.to_string(), String::new()),
    }
}

#[derive(Debug, Clone)]
pub struct Volume {
    name: String,
    root: PathBuf,
    excludes: GlobSet,
    metrics: Metrics,
}

impl Volume {
    /// Opens a volume at `root`. The root must exist; it is canonicalized so
    /// prefix checks work on resolved paths.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>, excludes: &[String]) -> AppResult<Self> {
        let root = fs::canonicalize(root.as_ref())?;
        Ok(Self { name: name.into(), root, excludes: build_globset(excludes)?, metrics: Metrics::new() })
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_excluded(&self, file_name: &str) -> bool {
        !self.excludes.is_empty() && self.excludes.is_match(file_name)
    }

    /// Joins the sanitized `path` below the root. Anything that still ends up
    /// outside the root is a `PathEscape`.
    pub fn resolve(&self, path: &str) -> AppResult<PathBuf> {
        let rel = sanitize_path(path);
        let joined = self.root.join(&rel);
        if !joined.starts_with(&self.root) {
            return Err(AppError::PathEscape(path.to_string()));
        }
        // An existing path may still be a link pointing elsewhere.
        if let Ok(real) = fs::canonicalize(&joined) {
            if !real.starts_with(&self.root) {
                return Err(AppError::PathEscape(path.to_string()));
            }
        }
        Ok(joined)
    }

    /// Volume-relative form of an absolute path below the root: leading `/`,
    /// `/`-separated, root itself is `/`.
    pub fn relative(&self, abs: &Path) -> String {
        let rel = abs.strip_prefix(&self.root).unwrap_or(abs);
        let parts: Vec<_> = rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
        format!("/{}", parts.join("/"))
    }

    /// Lists the immediate entries of `path`, sorted by name, hashing every
    /// file and every subtree on the way.
    pub fn walk(&self, path: &str) -> AppResult<Vec<FileEntry>> {
        let dir = self.resolve(path)?;
        let read = fs::read_dir(&dir).map_err(|e| {
            tracing::debug!("Cannot list {:?}: {}", dir, e);
            AppError::NotFound(format!("directory '{}'", sanitize_path(path)))
        })?;
        self.metrics.inc_walks();

        let mut names: Vec<(String, PathBuf)> = read
            .filter_map(|e| e.ok())
            .map(|e| (e.file_name().to_string_lossy().into_owned(), e.path()))
            .collect();
        names.sort_by(|a, b| a.0.cmp(&b.0));

        let mut entries = Vec::with_capacity(names.len());
        for (file_name, full) in names {
            if self.is_excluded(&file_name) {
                continue;
            }
            if let Some(entry) = self.entry(&file_name, &full)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// False for links that dangle or resolve outside the root; true for
    /// everything that is not a link.
    fn link_stays_inside(&self, full: &Path) -> bool {
        match fs::symlink_metadata(full) {
            Ok(meta) if meta.file_type().is_symlink() => {
                fs::canonicalize(full).map(|t| t.starts_with(&self.root)).unwrap_or(false)
            }
            Ok(_) => true,
            Err(_) => false,
        }
    }

    fn entry(&self, file_name: &str, full: &Path) -> AppResult<Option<FileEntry>> {
        let link_meta = fs::symlink_metadata(full)?;
        let meta = if link_meta.file_type().is_symlink() {
            match fs::canonicalize(full) {
                Ok(target) if target.starts_with(&self.root) => fs::metadata(&target)?,
                Ok(target) => {
                    let err = AppError::PathEscape(format!("{:?} -> {:?}", full, target));
                    tracing::warn!("Skipping link: {}", err);
                    return Ok(None);
                }
                Err(e) => {
                    tracing::warn!("Skipping dangling link {:?}: {}", full, e);
                    return Ok(None);
                }
            }
        } else {
            link_meta
        };

        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);
        let path = self.relative(full);

        if meta.is_dir() {
            let child_count = fs::read_dir(full)?
                .filter_map(|e| e.ok())
                .filter(|e| !self.is_excluded(&e.file_name().to_string_lossy()) && self.link_stays_inside(&e.path()))
                .count() as u64;
            let digest = hash::dir_digest(full, &self.excludes, &self.metrics)?;
            return Ok(Some(FileEntry {
                name: file_name.to_string(),
                path,
                size: digest.size,
                size_si: size_si(digest.size),
                is_dir: true,
                child_count,
                extension: String::new(),
                content_hash: digest.hash,
                modified,
                app_binding: None,
            }));
        }

        let (name, extension) = split_extension(file_name);
        let (content_hash, size) = hash::file_hash(full)?;
        self.metrics.add_hashed(size);
        Ok(Some(FileEntry {
            name,
            path,
            size,
            size_si: size_si(size),
            is_dir: false,
            child_count: 0,
            extension,
            content_hash,
            modified,
            app_binding: None,
        }))
    }

    /// Navigation trail for a listing: the volume name first, then one crumb
    /// per path segment.
    pub fn breadcrumbs(&self, path: &str) -> Vec<Breadcrumb> {
        let rel = sanitize_path(path);
        let mut crumbs = vec![Breadcrumb { name: self.name.clone(), path: "/".to_string() }];
        let mut acc = String::new();
        for part in rel.split('/').filter(|p| !p.is_empty()) {
            acc.push('/');
            acc.push_str(part);
            crumbs.push(Breadcrumb { name: part.to_string(), path: acc.clone() });
        }
        crumbs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_removes_parent_segments() {
        assert_eq!(sanitize_path("../../etc"), "etc");
        assert_eq!(sanitize_path("..\\..\\windows\\system32"), "windows/system32");
        assert_eq!(sanitize_path("/docs//a/./b/"), "docs/a/b");
        assert_eq!(sanitize_path("a/..../b"), "a/b");
        assert_eq!(sanitize_path(""), "");
        assert!(!sanitize_path("....//....//x").contains(".."));
    }

    #[test]
    fn size_si_formats_base_1000() {
        assert_eq!(size_si(0), "0 B");
        assert_eq!(size_si(999), "999 B");
        assert_eq!(size_si(1000), "1.0 kB");
        assert_eq!(size_si(1500), "1.5 kB");
        assert_eq!(size_si(2_000_000), "2.0 MB");
        assert_eq!(size_si(u64::MAX), "18.4 EB");
    }

    #[test]
    fn split_extension_lowercases_suffix() {
        assert_eq!(split_extension("Report.PDF"), ("Report".to_string(), ".pdf".to_string()));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar".to_string(), ".gz".to_string()));
        assert_eq!(split_extension("README"), ("README".to_string(), String::new()));
        assert_eq!(split_extension(".bashrc"), (".bashrc".to_string(), String::new()));
    }

    #[test]
    fn invalid_glob_is_rejected() {
        assert!(build_globset(&["[".to_string()]).is_err());
        assert!(build_globset(&["*.tmp".to_string(), "  ".to_string()]).is_ok());
    }
}
