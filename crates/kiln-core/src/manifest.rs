//! Loads the compile-parts manifest: expected content hashes keyed by
//! logical path, plus the remote store coordinates.
//!
//! Document format: `{ "files": { logicalPath: hexSha256, ... },
//! "prefix": String, "server-url": String }`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::KilnError;

/// Archives on the wire and in the cache use this extension.
pub const ARCHIVE_EXTENSION: &str = "jar";

/// One expected compile part: where it lives logically and what its bytes
/// must hash to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestEntry {
    pub logical_path: String,
    pub hash: String,
}

/// Immutable manifest of expected compile parts, loaded once per run.
/// Entries are kept in a deterministic order (sorted by logical path).
#[derive(Clone, Debug)]
pub struct PartsManifest {
    pub prefix: String,
    pub server_url: String,
    entries: Vec<ManifestEntry>,
}

impl PartsManifest {
    pub fn load(path: &Path) -> Result<Self, KilnError> {
        let data = fs::read_to_string(path).map_err(|e| KilnError::Manifest {
            path: Some(path.display().to_string()),
            reason: format!("cannot read manifest: {}", e),
        })?;
        Self::parse(&data, Some(path))
    }

    pub fn parse(data: &str, origin: Option<&Path>) -> Result<Self, KilnError> {
        let origin = origin.map(|p| p.display().to_string());
        let fail = |reason: String| KilnError::Manifest {
            path: origin.clone(),
            reason,
        };

        let doc: Value = serde_json::from_str(data)
            .map_err(|e| fail(format!("cannot parse manifest: {}", e)))?;
        let root = doc
            .as_object()
            .ok_or_else(|| fail("manifest root is not an object".to_string()))?;

        let prefix = required_string(root, "prefix").map_err(&fail)?;
        let server_url = required_string(root, "server-url").map_err(&fail)?;
        let files = root
            .get("files")
            .and_then(Value::as_object)
            .ok_or_else(|| fail("missing required field: files".to_string()))?;

        let mut seen: HashMap<String, String> = HashMap::with_capacity(files.len());
        let mut entries = Vec::with_capacity(files.len());
        for (raw_path, value) in files {
            let hash = value
                .as_str()
                .ok_or_else(|| fail(format!("hash for {} is not a string", raw_path)))?;
            let logical_path = normalize_logical_path(raw_path).map_err(&fail)?;
            if !is_content_hash(hash) {
                return Err(fail(format!(
                    "malformed hash for {}: expected 64 lowercase hex chars, got {:?}",
                    logical_path, hash
                )));
            }
            match seen.get(&logical_path) {
                Some(previous) if previous != hash => {
                    return Err(fail(format!(
                        "duplicate logical path {} with conflicting hashes ({} vs {})",
                        logical_path, previous, hash
                    )));
                }
                Some(_) => continue,
                None => {
                    seen.insert(logical_path.clone(), hash.to_string());
                    entries.push(ManifestEntry {
                        logical_path,
                        hash: hash.to_string(),
                    });
                }
            }
        }
        entries.sort_by(|a, b| a.logical_path.cmp(&b.logical_path));

        Ok(Self {
            prefix,
            server_url,
            entries,
        })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetch endpoint for one part:
    /// `{server-url}/{prefix}/{logicalPath}/{hash}.jar`
    pub fn entry_url(&self, logical_path: &str, hash: &str) -> String {
        format!(
            "{}/{}/{}/{}.{}",
            self.server_url.trim_end_matches('/'),
            self.prefix,
            logical_path,
            hash,
            ARCHIVE_EXTENSION
        )
    }
}

fn required_string(
    root: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<String, String> {
    let value = root
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing required field: {}", field))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("missing required field: {}", field));
    }
    Ok(value.to_string())
}

/// Strip surrounding slashes and reject paths that would escape the cache
/// or output layout.
fn normalize_logical_path(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        return Err(format!("empty logical path: {:?}", raw));
    }
    if trimmed.contains('\\') {
        return Err(format!("logical path contains backslash: {:?}", raw));
    }
    if trimmed.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        return Err(format!("unsafe logical path: {:?}", raw));
    }
    Ok(trimmed.to_string())
}

fn is_content_hash(hash: &str) -> bool {
    hash.len() == 64
        && hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
