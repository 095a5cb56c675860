use anyhow::{bail, Context, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};

/// Longest domain name allowed by RFC 1035.
const MAX_DOMAIN_LENGTH: usize = 253;

/// Maximum length for a quarantined file's sanitized stem.
const MAX_SAFE_STEM_LENGTH: usize = 50;

/// Directory under the output root where unsafe mappings are quarantined.
pub const QUARANTINE_DIR: &str = "safe_files";

/// Checks that a domain only uses the restrictive hostname character set
/// and carries no traversal sequences.
pub fn is_domain_safe(domain: &str) -> bool {
    let domain = domain.trim();
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LENGTH {
        return false;
    }

    if !domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return false;
    }

    // The character class above already excludes separators; this guards the
    // same property if the class is ever widened.
    if domain == ".."
        || domain.contains("../")
        || domain.contains("/..")
        || domain.contains("..\\")
        || domain.contains("\\..")
    {
        return false;
    }

    true
}

/// Checks that a URL parses, uses http(s), has a safe host, and a valid port.
pub fn is_url_safe(url: &str) -> bool {
    let parsed = match url::Url::parse(url.trim()) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }

    let host = match parsed.host_str() {
        Some(host) => host,
        None => return false,
    };
    if !is_domain_safe(host) {
        return false;
    }

    // A u16 port can't exceed 65535; zero is the only out-of-range value left.
    if parsed.port() == Some(0) {
        return false;
    }

    true
}

/// Cheap pre-filter for obviously hostile paths. Never the sole guard:
/// the normalize-and-prefix-check in `create_safe_file_path` is what the
/// sandbox actually relies on.
pub fn is_attack_path(path: &str) -> bool {
    if path.matches("..").count() > 5 {
        return true;
    }

    let lower = path.to_lowercase();
    lower.contains("/etc/")
        || lower.contains("\\windows\\")
        || lower.contains("/sys/")
        || lower.contains("/proc/")
        || lower.contains("system32")
}

/// Resolves `.` and `..` components lexically, without touching the
/// filesystem. `..` at the root is dropped rather than preserved, which is
/// safe here because the result is always prefix-checked afterwards.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

fn to_absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let cwd = std::env::current_dir().context("Failed to resolve current directory")?;
        Ok(cwd.join(path))
    }
}

/// True when `path` is a lexical descendant of `base` (or `base` itself).
pub fn is_path_within(path: &Path, base: &Path) -> bool {
    let path = match to_absolute(path) {
        Ok(p) => normalize_lexically(&p),
        Err(_) => return false,
    };
    let base = match to_absolute(base) {
        Ok(p) => normalize_lexically(&p),
        Err(_) => return false,
    };
    path.starts_with(&base)
}

/// Builds the sandboxed output root `<base_dir>/<sub_dir>/<domain-token>`
/// for one run. Fails hard if the normalized result is not a descendant of
/// `base_dir`; nothing is silently truncated.
pub fn create_safe_output_root(base_dir: &Path, sub_dir: &str, domain: &str) -> Result<PathBuf> {
    if !is_domain_safe(domain) {
        bail!("Unsafe domain: {}", domain);
    }

    let token: String = domain
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let base = normalize_lexically(&to_absolute(base_dir)?);
    let output_root = normalize_lexically(&base.join(sub_dir).join(token));

    if !output_root.starts_with(&base) {
        bail!("Output root escapes base directory: {:?}", output_root);
    }

    Ok(output_root)
}

/// Joins `relative_path` under `output_root` and normalizes. If the result
/// escapes the root, the file is relocated to a deterministic quarantine
/// path instead; the returned flag records the relocation. The quarantine
/// path is verified again — there is no code path that yields a location
/// outside the root.
pub fn create_safe_file_path(output_root: &Path, relative_path: &str) -> Result<(PathBuf, bool)> {
    if relative_path.trim().is_empty() {
        bail!("Empty relative path");
    }

    let root = normalize_lexically(&to_absolute(output_root)?);
    // Backslashes count as separators here; on Unix they would otherwise hide
    // a whole Windows-style traversal inside one component.
    let forward = relative_path.replace('\\', "/");
    let candidate = normalize_lexically(&root.join(&forward));

    if candidate.starts_with(&root) {
        return Ok((candidate, false));
    }

    let quarantined = normalize_lexically(
        &root
            .join(QUARANTINE_DIR)
            .join(quarantine_file_name(relative_path)),
    );
    if !quarantined.starts_with(&root) {
        bail!("Unable to construct a safe path for: {}", relative_path);
    }

    Ok((quarantined, true))
}

/// Derives a collision-resistant, filesystem-safe name for a path that could
/// not be placed at its structural location.
pub fn quarantine_file_name(original: &str) -> String {
    let basename = original
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown");

    let (stem, extension) = match basename.rfind('.') {
        Some(dot) if dot > 0 => (&basename[..dot], &basename[dot + 1..]),
        _ => (basename, ""),
    };

    let mut stem: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    stem.truncate(MAX_SAFE_STEM_LENGTH);
    if stem.is_empty() {
        stem = "unknown".to_string();
    }

    let extension = if extension.is_empty() { "html" } else { extension };
    format!("{}_{}.{}", stem, short_hash(original), extension)
}

/// Short numeric hash used to keep distinct unsafe inputs from colliding
/// after sanitization.
pub fn short_hash(input: &str) -> u32 {
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    hasher.finish() as u32
}

pub fn is_file_size_allowed(file_size: u64, max_size: u64) -> bool {
    file_size <= max_size
}

pub fn is_total_size_allowed(current_size: u64, new_file_size: u64, max_total_size: u64) -> bool {
    current_size
        .checked_add(new_file_size)
        .map_or(false, |total| total <= max_total_size)
}

pub fn is_parameter_in_range(value: u64, min: u64, max: u64) -> bool {
    value >= min && value <= max
}
