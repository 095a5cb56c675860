use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::safety;

/// Metadata for one mirrored file, as exposed by the listing interface.
#[derive(Debug, Clone, Serialize)]
pub struct FileMetadata {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub modified_ms: i64,
}

/// Relative paths (forward slashes) of every regular file under an output
/// root, sorted for stable listings.
pub fn list_files(output_root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    collect_files(output_root, output_root, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to list directory: {:?}", dir))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if path.is_file() {
            if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    Ok(())
}

/// Metadata for one file under the output root.
pub fn file_metadata(output_root: &Path, relative_path: &str) -> Result<FileMetadata> {
    let path = resolve(output_root, relative_path)?;
    let meta =
        fs::metadata(&path).with_context(|| format!("Failed to stat file: {:?}", path))?;
    let modified_ms = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    Ok(FileMetadata {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: relative_path.to_string(),
        size: meta.len(),
        modified_ms,
    })
}

/// Reads one mirrored file, returning its bytes and inferred content type.
/// The requested path is revalidated against the output root before the
/// filesystem is touched.
pub fn read_file(output_root: &Path, relative_path: &str) -> Result<(Vec<u8>, String)> {
    let path = resolve(output_root, relative_path)?;
    let bytes = fs::read(&path).with_context(|| format!("Failed to read file: {:?}", path))?;
    Ok((bytes, content_type_for(&path)))
}

/// Content type inferred from the file extension, defaulting to an opaque
/// binary type when unknown.
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn resolve(output_root: &Path, relative_path: &str) -> Result<PathBuf> {
    let candidate = safety::normalize_lexically(&output_root.join(relative_path));
    if !safety::is_path_within(&candidate, output_root) {
        bail!("Requested path escapes the output root: {}", relative_path);
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn populate(root: &Path) {
        fs::create_dir_all(root.join("css")).unwrap();
        fs::create_dir_all(root.join("images")).unwrap();
        fs::write(root.join("index.html"), "<html></html>").unwrap();
        fs::write(root.join("css/style.css"), "body{}").unwrap();
        fs::write(root.join("images/logo.png"), [0x89u8, 0x50]).unwrap();
    }

    #[test]
    fn test_list_files_is_relative_and_sorted() {
        let temp = tempdir().unwrap();
        populate(temp.path());

        let files = list_files(temp.path()).unwrap();
        assert_eq!(
            files,
            vec!["css/style.css", "images/logo.png", "index.html"]
        );
    }

    #[test]
    fn test_read_file_infers_content_type() {
        let temp = tempdir().unwrap();
        populate(temp.path());

        let (bytes, content_type) = read_file(temp.path(), "index.html").unwrap();
        assert_eq!(bytes, b"<html></html>");
        assert_eq!(content_type, "text/html");

        let (_, content_type) = read_file(temp.path(), "css/style.css").unwrap();
        assert_eq!(content_type, "text/css");
    }

    #[test]
    fn test_unknown_extension_defaults_to_octet_stream() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("blob.xyz123"), b"?").unwrap();

        let (_, content_type) = read_file(temp.path(), "blob.xyz123").unwrap();
        assert_eq!(content_type, "application/octet-stream");
    }

    #[test]
    fn test_read_rejects_traversal() {
        let temp = tempdir().unwrap();
        populate(temp.path());

        assert!(read_file(temp.path(), "../../etc/passwd").is_err());
        assert!(read_file(temp.path(), "css/../../outside.txt").is_err());
    }

    #[test]
    fn test_file_metadata() {
        let temp = tempdir().unwrap();
        populate(temp.path());

        let meta = file_metadata(temp.path(), "css/style.css").unwrap();
        assert_eq!(meta.name, "style.css");
        assert_eq!(meta.size, 6);
        assert!(meta.modified_ms > 0);
    }
}
