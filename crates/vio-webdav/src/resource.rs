//! The `Resource` discovered by PROPFIND and its translation to a file-stat.

use vio_core::mode;

/// What kind of entry a PROPFIND `<d:response>` described.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Normal,
    Collection,
    /// `<d:href>` pointed somewhere other than the resource itself (rare, unused by
    /// the properties this crate requests, kept for completeness).
    Reference,
    /// A `<d:propstat>` whose `<d:status>` was not 2xx.
    Error,
}

/// A single remote entry discovered by PROPFIND.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Percent-decoded absolute path on the server.
    pub uri: String,
    /// Last path segment.
    pub name: String,
    pub kind: ResourceType,
    /// Unset (`None`) for collections; set for normal entries.
    pub size: Option<i64>,
    /// UTC epoch seconds from `getlastmodified`, before clock-skew correction.
    pub modtime_server: i64,
    /// `getetag` with outer quotes stripped.
    pub etag: Option<String>,
}

impl Resource {
    pub fn is_collection(&self) -> bool {
        matches!(self.kind, ResourceType::Collection)
    }

    /// Whether this resource should ever be surfaced to the engine: references
    /// and errors never are.
    pub fn is_surfaceable(&self) -> bool {
        matches!(self.kind, ResourceType::Normal | ResourceType::Collection)
    }
}

/// The POSIX-style stat record handed back across the VIO surface.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStat {
    pub name: String,
    pub is_dir: bool,
    pub mode: u32,
    pub size: i64,
    /// Mtime already adjusted for clock skew (`mtime_server - time_delta`).
    pub mtime: i64,
    pub etag: Option<String>,
}

impl FileStat {
    /// Builds a `FileStat` from a `Resource`, subtracting `time_delta` from the
    /// server-reported mtime to correct for clock skew.
    pub fn from_resource(resource: &Resource, time_delta: i64) -> Self {
        Self {
            name: resource.name.clone(),
            is_dir: resource.is_collection(),
            mode: mode::synthesize(resource.is_collection()),
            size: resource.size.unwrap_or(0),
            mtime: resource.modtime_server - time_delta,
            etag: resource.etag.clone(),
        }
    }
}

/// Strips a single pair of surrounding double quotes from an ETag value.
pub fn strip_etag_quotes(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(uri: &str) -> Resource {
        Resource {
            uri: uri.to_string(),
            name: vio_core::uri::basename(uri),
            kind: ResourceType::Collection,
            size: None,
            modtime_server: 1_700_000_000,
            etag: None,
        }
    }

    fn normal(uri: &str, size: i64) -> Resource {
        Resource {
            uri: uri.to_string(),
            name: vio_core::uri::basename(uri),
            kind: ResourceType::Normal,
            size: Some(size),
            modtime_server: 1_700_000_000,
            etag: Some("abc123".to_string()),
        }
    }

    #[test]
    fn collection_has_no_size_and_dir_mode() {
        let r = collection("/files/");
        let stat = FileStat::from_resource(&r, 0);
        assert!(stat.is_dir);
        assert_eq!(stat.mode, 0o755);
        assert_eq!(stat.size, 0);
    }

    #[test]
    fn normal_file_has_file_mode() {
        let r = normal("/files/a.txt", 42);
        let stat = FileStat::from_resource(&r, 0);
        assert!(!stat.is_dir);
        assert_eq!(stat.mode, 0o644);
        assert_eq!(stat.size, 42);
    }

    #[test]
    fn mtime_is_corrected_for_skew() {
        let r = normal("/files/a.txt", 42);
        let stat = FileStat::from_resource(&r, 300);
        assert_eq!(stat.mtime, 1_700_000_000 - 300);
    }

    #[test]
    fn strips_surrounding_quotes() {
        assert_eq!(strip_etag_quotes("\"abc123\""), "abc123");
        assert_eq!(strip_etag_quotes("abc123"), "abc123");
        assert_eq!(strip_etag_quotes("\"\""), "");
    }

    #[test]
    fn error_and_reference_resources_are_not_surfaceable() {
        let mut r = normal("/files/a.txt", 1);
        r.kind = ResourceType::Error;
        assert!(!r.is_surfaceable());
        r.kind = ResourceType::Reference;
        assert!(!r.is_surfaceable());
    }
}
