//! Path mapping for the mirrored site
//!
//! This module turns URLs into local file locations under the save root and
//! produces the page-relative references written back into the DOM, so the
//! mirror is browsable straight from disk.
//!
//! # Mapping rules
//!
//! - The first page of a run is always the root document (`index.html`),
//!   regardless of its URL path.
//! - Subsequent pages use their URL path segments as nested directories,
//!   with the final segment as the filename. A root path (or a path with no
//!   segments) falls back to the root document name.
//! - Resources live under the `resources/` subtree mirroring their own URL
//!   path segments.
//!
//! # Conflict policy
//!
//! A page like `/site/about` claims `site/about` as a plain file. When a
//! child page such as `/site/about/team` later needs `site/about` to be a
//! directory, the existing file is converted in place: its content moves to
//! `site/about/index.html` and the directory takes its name. The conversion
//! is serialized through an internal lock so concurrent savers never observe
//! a half-converted path.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use url::Url;

/// Fixed document name for the crawl root and converted directories
pub const ROOT_DOCUMENT: &str = "index.html";

/// Directory under the save root holding downloaded resources
pub const RESOURCE_DIR: &str = "resources";

/// Maps URLs to local paths under a save root
#[derive(Debug, Clone)]
pub struct PathMapper {
    save_root: PathBuf,
    convert_lock: Arc<Mutex<()>>,
}

impl PathMapper {
    pub fn new(save_root: impl Into<PathBuf>) -> Self {
        Self {
            save_root: save_root.into(),
            convert_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn save_root(&self) -> &Path {
        &self.save_root
    }

    /// Maps a page URL to its local save path
    ///
    /// `first_page` marks the one-time transition at the start of a run: the
    /// first page saved is always the root document, whatever its URL.
    pub fn map_page_url(&self, url: &Url, first_page: bool) -> PathBuf {
        if first_page {
            return self.save_root.join(ROOT_DOCUMENT);
        }

        let segments: Vec<&str> = url
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        if segments.is_empty() {
            return self.save_root.join(ROOT_DOCUMENT);
        }

        let mut path = self.save_root.clone();
        for segment in &segments {
            path.push(sanitize_segment(segment));
        }
        path
    }

    /// Maps a resource URL to its local save path under the resources subtree
    pub fn map_resource_url(&self, url: &Url) -> PathBuf {
        let mut path = self.save_root.join(RESOURCE_DIR);

        let segments: Vec<&str> = url
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        if segments.is_empty() {
            path.push("resource");
            return path;
        }

        for segment in &segments {
            path.push(sanitize_segment(segment));
        }
        path
    }

    /// Produces the in-DOM reference for `target` relative to the page saved
    /// at `page_path`
    ///
    /// Both paths must live under the same save root. The result uses `/`
    /// separators so the saved document stays portable.
    pub fn relative_reference(page_path: &Path, target: &Path) -> String {
        let page_dir = page_path.parent().unwrap_or_else(|| Path::new(""));

        let from: Vec<Component> = page_dir.components().collect();
        let to: Vec<Component> = target.components().collect();

        let common = from
            .iter()
            .zip(to.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut parts: Vec<String> = Vec::new();
        for _ in common..from.len() {
            parts.push("..".to_string());
        }
        for component in &to[common..] {
            parts.push(component.as_os_str().to_string_lossy().into_owned());
        }

        if parts.is_empty() {
            ROOT_DOCUMENT.to_string()
        } else {
            parts.join("/")
        }
    }

    /// Prepares the filesystem for a write to `target`
    ///
    /// Converts any ancestor that exists as a plain file into a directory
    /// holding the old content under the root document name, then creates
    /// the parent directories. Returns the (possibly adjusted) path to write:
    /// if `target` itself already exists as a directory, the write is
    /// redirected to the root document inside it.
    pub fn prepare(&self, target: &Path) -> io::Result<PathBuf> {
        let _guard = self.convert_lock.lock().unwrap();

        if let Some(parent) = target.parent() {
            self.convert_ancestor_files(parent)?;
            fs::create_dir_all(parent)?;
        }

        if target.is_dir() {
            Ok(target.join(ROOT_DOCUMENT))
        } else {
            Ok(target.to_path_buf())
        }
    }

    /// Converts every file on the path from the save root down to `dir` into
    /// a directory containing the old content as its root document
    fn convert_ancestor_files(&self, dir: &Path) -> io::Result<()> {
        let mut ancestors: Vec<&Path> = dir.ancestors().collect();
        ancestors.reverse();

        for ancestor in ancestors {
            if !ancestor.starts_with(&self.save_root) || ancestor == self.save_root {
                continue;
            }
            if ancestor.is_file() {
                let content = fs::read(ancestor)?;
                fs::remove_file(ancestor)?;
                fs::create_dir_all(ancestor)?;
                fs::write(ancestor.join(ROOT_DOCUMENT), content)?;
                tracing::info!(
                    "Converted file {} into a directory (content moved to {})",
                    ancestor.display(),
                    ROOT_DOCUMENT
                );
            }
        }

        Ok(())
    }
}

/// Strips characters that would escape the save root or upset the filesystem
fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| match c {
            '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();

    if cleaned == ".." || cleaned == "." {
        "_".to_string()
    } else {
        cleaned
    }
}
