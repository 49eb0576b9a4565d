//! Utility functions for file naming and path manipulation

use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Maximum length of a sanitized file name, in characters
const MAX_FILE_NAME_CHARS: usize = 100;

/// Fallback when sanitizing leaves nothing
const FALLBACK_FILE_NAME: &str = "download";

/// Get a unique path for a file, handling collisions according to the specified action
///
/// For Rename, a ` (n)` suffix is added before the extension until the name
/// is free. For Skip, an existing file is an [`Error::FileCollision`].
/// Overwrite returns the path unchanged.
///
/// # Examples
///
/// ```
/// use standards_dl::utils::get_unique_path;
/// use standards_dl::config::FileCollisionAction;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/GB T 1.1-2020.pdf");
/// let unique = get_unique_path(path, FileCollisionAction::Rename).unwrap();
/// // If the file exists, returns "/tmp/GB T 1.1-2020 (1).pdf", and so on
/// ```
pub fn get_unique_path(path: &Path, action: FileCollisionAction) -> Result<PathBuf> {
    match action {
        FileCollisionAction::Overwrite => Ok(path.to_path_buf()),
        FileCollisionAction::Skip => {
            if path.exists() {
                return Err(Error::FileCollision {
                    path: path.to_path_buf(),
                    reason: "file already exists and collision action is skip".to_string(),
                });
            }
            Ok(path.to_path_buf())
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| Error::InvalidPath {
                    path: path.to_path_buf(),
                    reason: "cannot extract file stem".to_string(),
                })?;
            let extension = path.extension().and_then(|e| e.to_str());
            let parent = path.parent().ok_or_else(|| Error::InvalidPath {
                path: path.to_path_buf(),
                reason: "cannot extract parent directory".to_string(),
            })?;

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_name = match extension {
                    Some(ext) => format!("{stem} ({i}).{ext}"),
                    None => format!("{stem} ({i})"),
                };
                let new_path = parent.join(new_name);
                if !new_path.exists() {
                    return Ok(new_path);
                }
            }

            Err(Error::FileCollision {
                path: path.to_path_buf(),
                reason: format!("no free name after {MAX_RENAME_ATTEMPTS} attempts"),
            })
        }
    }
}

/// Turn an arbitrary title into a safe file name
///
/// Strips markup tags, decodes common HTML entities, replaces characters that
/// are illegal in file names, collapses runs of whitespace and underscores,
/// trims dots/spaces/underscores from the ends and limits the length.
/// Returns `"download"` if nothing is left.
///
/// ```
/// use standards_dl::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("GB/T 1.1-2020 <b>Rules</b>"), "GB T 1.1-2020 Rules");
/// assert_eq!(sanitize_filename("  ...  "), "download");
/// ```
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let text = decode_entities(&strip_tags(name));

    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars() {
        let c = match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        };
        if c.is_whitespace() || c == '_' {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }

    let trimmed: String = out
        .trim_matches(|c: char| c == '.' || c == ' ' || c == '_')
        .chars()
        .take(MAX_FILE_NAME_CHARS)
        .collect();
    let trimmed = trimmed.trim_end_matches(|c: char| c == '.' || c == ' ');

    if trimmed.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Target file name for an artifact: sanitized label plus the original extension
#[must_use]
pub fn artifact_file_name(label: &str, extension: Option<&str>) -> String {
    let base = sanitize_filename(label);
    match extension.filter(|e| !e.is_empty()) {
        Some(ext) => format!("{base}.{}", ext.to_lowercase()),
        None => base,
    }
}

fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        match after.find('>') {
            // `<>` is not a tag
            Some(end) if end > 0 => {
                out.push_str(&rest[..start]);
                rest = &after[end + 1..];
            }
            _ => {
                out.push_str(&rest[..=start]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let decoded = candidate
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&candidate[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = entity.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn unique_path_for_missing_file_is_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.pdf");
        for action in [
            FileCollisionAction::Rename,
            FileCollisionAction::Overwrite,
            FileCollisionAction::Skip,
        ] {
            assert_eq!(get_unique_path(&path, action).unwrap(), path);
        }
    }

    #[test]
    fn rename_appends_counter_before_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("GB 1.pdf");
        fs::write(&path, "x").unwrap();

        let first = get_unique_path(&path, FileCollisionAction::Rename).unwrap();
        assert_eq!(first, temp_dir.path().join("GB 1 (1).pdf"));
        fs::write(&first, "y").unwrap();
        let second = get_unique_path(&path, FileCollisionAction::Rename).unwrap();
        assert_eq!(second, temp_dir.path().join("GB 1 (2).pdf"));
    }

    #[test]
    fn skip_reports_collision() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.pdf");
        fs::write(&path, "x").unwrap();

        match get_unique_path(&path, FileCollisionAction::Skip) {
            Err(Error::FileCollision { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected collision, got {other:?}"),
        }
        assert_eq!(
            get_unique_path(&path, FileCollisionAction::Overwrite).unwrap(),
            path
        );
    }

    #[test]
    fn sanitize_replaces_illegal_characters_and_collapses() {
        assert_eq!(sanitize_filename("a:b*c?d"), "a b c d");
        assert_eq!(sanitize_filename("GB/T 3100-2015  标准__代号"), "GB T 3100-2015 标准 代号");
        assert_eq!(sanitize_filename("..hidden name.."), "hidden name");
    }

    #[test]
    fn sanitize_strips_tags_and_decodes_entities() {
        assert_eq!(
            sanitize_filename("<span class=\"x\">Rules</span> &amp; Guides&#33;"),
            "Rules & Guides!"
        );
        assert_eq!(sanitize_filename("a&nbsp;b"), "a b");
        assert_eq!(sanitize_filename("fish & chips"), "fish & chips");
        assert_eq!(sanitize_filename("1 < 2 > 0"), "1 0");
        assert_eq!(sanitize_filename("a <> b"), "a b");
    }

    #[test]
    fn sanitize_limits_length_and_falls_back() {
        let long = "x".repeat(300);
        assert_eq!(sanitize_filename(&long).chars().count(), 100);
        assert_eq!(sanitize_filename(""), "download");
        assert_eq!(sanitize_filename("<b></b>"), "download");
        assert_eq!(sanitize_filename("___"), "download");
    }

    #[test]
    fn artifact_name_keeps_lowercased_extension() {
        assert_eq!(
            artifact_file_name("GB/T 1.1-2020 Rules", Some("PDF")),
            "GB T 1.1-2020 Rules.pdf"
        );
        assert_eq!(artifact_file_name("x", None), "x");
        assert_eq!(artifact_file_name("x", Some("")), "x");
    }
}
