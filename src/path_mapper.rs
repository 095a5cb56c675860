use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

use crate::safety;

/// Maximum length for the query-string fragment folded into a filename.
const MAX_QUERY_TOKEN_LENGTH: usize = 30;

/// Where one URL lives on disk for the current run.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedPath {
    /// Absolute path of the local copy, always inside the output root.
    pub local_path: PathBuf,
    /// Run-relative path used for bookkeeping.
    pub relative_path: String,
    /// True when the structural mapping would have escaped the output root
    /// and a quarantine location was substituted.
    pub relocated: bool,
}

/// Per-run URL -> local path mapper. The map is append-only for the run's
/// lifetime: the same URL always yields the same local path.
#[derive(Debug)]
pub struct PathMapper {
    output_root: PathBuf,
    mappings: HashMap<String, MappedPath>,
}

impl PathMapper {
    pub fn new(output_root: &Path) -> Self {
        Self {
            output_root: output_root.to_path_buf(),
            mappings: HashMap::new(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Maps a resource URL to its local file path, preserving the site's
    /// directory structure where that is safe and quarantining anything
    /// that would escape the output root.
    pub fn map_url(&mut self, url: &str) -> Result<MappedPath> {
        if let Some(mapped) = self.mappings.get(url) {
            return Ok(mapped.clone());
        }

        let mapped = match Url::parse(url) {
            Ok(parsed) if !safety::is_attack_path(parsed.path()) => {
                let relative = structural_relative_path(&parsed);
                let (local_path, relocated) =
                    safety::create_safe_file_path(&self.output_root, &relative)?;
                let relative_path = if relocated {
                    run_relative(&local_path, &self.output_root)
                } else {
                    relative
                };
                MappedPath {
                    local_path,
                    relative_path,
                    relocated,
                }
            }
            // Unparseable URLs and flagged paths both go to quarantine.
            _ => self.quarantine_mapping(url)?,
        };

        self.mappings.insert(url.to_string(), mapped.clone());
        Ok(mapped)
    }

    fn quarantine_mapping(&self, url: &str) -> Result<MappedPath> {
        let relative = format!(
            "{}/{}",
            safety::QUARANTINE_DIR,
            safety::quarantine_file_name(url)
        );
        let (local_path, _) = safety::create_safe_file_path(&self.output_root, &relative)?;
        if !local_path.starts_with(&self.output_root) {
            anyhow::bail!("Quarantine mapping escaped output root for: {}", url);
        }
        Ok(MappedPath {
            local_path,
            relative_path: relative,
            relocated: true,
        })
    }

    /// Relative path from the directory containing `from` to `to`, with
    /// forward slashes regardless of platform so rewritten references stay
    /// portable. When relativization fails (different roots), `to` is
    /// returned unchanged; callers treat that as a degraded, non-fatal case.
    pub fn relative_path_between(from: &Path, to: &Path) -> String {
        let from_dir = from.parent().unwrap_or_else(|| Path::new(""));
        match pathdiff::diff_paths(to, from_dir) {
            Some(diff) if !diff.as_os_str().is_empty() => {
                diff.to_string_lossy().replace('\\', "/")
            }
            _ => to.to_string_lossy().replace('\\', "/"),
        }
    }
}

/// Run-relative form of an absolute path under the output root.
fn run_relative(local_path: &Path, output_root: &Path) -> String {
    local_path
        .strip_prefix(output_root)
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|_| local_path.to_string_lossy().replace('\\', "/"))
}

/// Structure-preserving relative path for a parsed URL: root and trailing
/// slashes become `index.html`, extensionless paths are treated as
/// directories, and the query string is folded into the filename so distinct
/// query variants do not collide.
fn structural_relative_path(url: &Url) -> String {
    let mut path = url.path().trim_start_matches('/').to_string();

    if path.is_empty() {
        path = "index.html".to_string();
    } else if path.ends_with('/') {
        path.push_str("index.html");
    } else if !path.contains('.') && !path.ends_with("index.html") {
        path.push_str("/index.html");
    }

    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        let mut token: String = query
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        token.truncate(MAX_QUERY_TOKEN_LENGTH);

        // Insert before the extension so the file type is preserved.
        match path.rfind('.') {
            Some(dot) if dot > 0 => path.insert_str(dot, &format!("_{}", token)),
            _ => path.push_str(&format!("_{}.html", token)),
        }
    }

    path
}
