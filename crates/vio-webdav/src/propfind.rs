//! Multistatus XML parsing and the refcounted Listing Context.

use std::cell::RefCell;
use std::rc::Rc;

use vio_core::httpdate::parse_httpdate;
use vio_core::uri;

use crate::resource::{Resource, ResourceType, strip_etag_quotes};

/// PROPFIND depth, as sent in the `Depth:` request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
}

impl Depth {
    pub fn as_header_value(self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
        }
    }
}

/// The request body asking for the four properties this crate cares about.
pub const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:">
  <D:prop>
    <D:getlastmodified/>
    <D:getcontentlength/>
    <D:resourcetype/>
    <D:getetag/>
  </D:prop>
</D:propfind>
"#;

/// The result of one PROPFIND.
#[derive(Debug)]
pub struct ListingContext {
    /// The requested, cleaned URI this context was fetched for.
    pub target: String,
    /// Resources in server-response order (prepended as parsed, so this is the
    /// reverse of arrival order -- see `parse_propfind_multistatus`).
    pub list: Vec<Resource>,
    /// Cursor into `list` for `readdir`.
    pub cursor: usize,
}

/// A shared handle to a `ListingContext`. Cloning bumps the reference count;
/// dropping the last clone frees the context. The cache slot holds one strong
/// reference, and each caller that has not yet `closedir`'d holds another.
pub type ListingHandle = Rc<RefCell<ListingContext>>;

pub fn new_handle(target: String, list: Vec<Resource>) -> ListingHandle {
    Rc::new(RefCell::new(ListingContext {
        target,
        list,
        cursor: 0,
    }))
}

pub fn refcount(handle: &ListingHandle) -> usize {
    Rc::strong_count(handle)
}

/// Single-slot cache of the most recently fetched Listing Context, keyed by target.
#[derive(Default)]
pub struct PropfindCache {
    slot: Option<ListingHandle>,
}

impl PropfindCache {
    pub fn new() -> Self {
        Self { slot: None }
    }

    /// Returns a freshly cloned handle (bumping the refcount) if the cached entry's
    /// target matches `target` exactly.
    pub fn lookup(&self, target: &str) -> Option<ListingHandle> {
        self.slot
            .as_ref()
            .filter(|handle| handle.borrow().target == target)
            .cloned()
    }

    /// Replaces the cache slot, releasing the old entry's cache-held reference.
    pub fn store(&mut self, handle: ListingHandle) {
        self.slot = Some(handle);
    }

    /// Drops the cache's reference to the current entry, if any.
    pub fn invalidate(&mut self) {
        self.slot = None;
    }
}

/// Parses a PROPFIND multistatus document into a list of `Resource`s.
///
/// Entries are prepended to the output, so the returned order is the reverse of
/// the order responses appeared in the document.
pub fn parse_propfind_multistatus(xml: &str) -> Result<Vec<Resource>, roxmltree::Error> {
    let doc = roxmltree::Document::parse(xml)?;

    let mut out = Vec::<Resource>::new();
    for response in doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "response")
    {
        let Some(href) = response
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "href")
            .and_then(|n| n.text())
        else {
            continue;
        };
        let decoded_uri = uri::unescape_path(href.trim());

        let mut kind = ResourceType::Normal;
        let mut size = None::<i64>;
        let mut modtime = 0i64;
        let mut etag = None::<String>;
        let mut saw_ok_propstat = false;

        for propstat in response
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "propstat")
        {
            let status = propstat
                .children()
                .find(|n| n.is_element() && n.tag_name().name() == "status")
                .and_then(|n| n.text())
                .unwrap_or("");
            if !status.contains(" 200 ") {
                continue;
            }
            saw_ok_propstat = true;

            let Some(prop) = propstat
                .children()
                .find(|n| n.is_element() && n.tag_name().name() == "prop")
            else {
                continue;
            };

            let has_content_length = prop
                .children()
                .any(|n| n.is_element() && n.tag_name().name() == "getcontentlength");

            if let Some(resourcetype) = prop
                .children()
                .find(|n| n.is_element() && n.tag_name().name() == "resourcetype")
            {
                let is_collection = resourcetype
                    .children()
                    .any(|n| n.is_element() && n.tag_name().name() == "collection");
                if is_collection && !has_content_length {
                    kind = ResourceType::Collection;
                }
            }

            if let Some(v) = prop
                .children()
                .find(|n| n.is_element() && n.tag_name().name() == "getcontentlength")
                .and_then(|n| n.text())
                .map(str::trim)
                .filter(|v| !v.is_empty())
            {
                size = v.parse::<i64>().ok();
            }

            if let Some(v) = prop
                .children()
                .find(|n| n.is_element() && n.tag_name().name() == "getlastmodified")
                .and_then(|n| n.text())
                .map(str::trim)
                .filter(|v| !v.is_empty())
            {
                modtime = parse_httpdate(v);
            }

            if let Some(v) = prop
                .children()
                .find(|n| n.is_element() && n.tag_name().name() == "getetag")
                .and_then(|n| n.text())
                .map(str::trim)
                .filter(|v| !v.is_empty())
            {
                etag = Some(strip_etag_quotes(v));
            }
        }

        if !saw_ok_propstat {
            kind = ResourceType::Error;
        }

        let name = uri::basename(&decoded_uri);
        out.insert(
            0,
            Resource {
                uri: decoded_uri,
                name,
                kind,
                size: if kind == ResourceType::Collection { None } else { size },
                modtime_server: modtime,
                etag,
            },
        );
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_collection_and_file_entries() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/files/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype><d:collection/></d:resourcetype>
        <d:getlastmodified>Sun, 06 Nov 1994 08:49:37 GMT</d:getlastmodified>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/files/a.txt</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype/>
        <d:getcontentlength>5</d:getcontentlength>
        <d:getetag>"abc123"</d:getetag>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>
"#;
        let entries = parse_propfind_multistatus(xml).unwrap();
        assert_eq!(entries.len(), 2);
        // Prepend-order means the file (parsed second) comes first.
        assert_eq!(entries[0].uri, "/files/a.txt");
        assert_eq!(entries[0].size, Some(5));
        assert_eq!(entries[0].etag.as_deref(), Some("abc123"));
        assert_eq!(entries[1].uri, "/files/");
        assert!(entries[1].is_collection());
        assert_eq!(entries[1].size, None);
        assert_eq!(entries[1].modtime_server, 784_111_777);
    }

    #[test]
    fn skips_non_200_propstat_and_uses_the_200_one() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/files/a.txt</d:href>
    <d:propstat>
      <d:prop><d:getcontentlength>999</d:getcontentlength></d:prop>
      <d:status>HTTP/1.1 404 Not Found</d:status>
    </d:propstat>
    <d:propstat>
      <d:prop><d:getcontentlength>5</d:getcontentlength></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>
"#;
        let entries = parse_propfind_multistatus(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, Some(5));
    }

    #[test]
    fn entry_with_no_200_propstat_is_an_error_resource() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/files/locked.txt</d:href>
    <d:propstat>
      <d:prop><d:getcontentlength>1</d:getcontentlength></d:prop>
      <d:status>HTTP/1.1 423 Locked</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>
"#;
        let entries = parse_propfind_multistatus(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, ResourceType::Error);
        assert!(!entries[0].is_surfaceable());
    }

    #[test]
    fn cache_lookup_bumps_refcount() {
        let mut cache = PropfindCache::new();
        let handle = new_handle("/files/".to_string(), vec![]);
        assert_eq!(refcount(&handle), 1);
        cache.store(handle.clone());
        assert_eq!(refcount(&handle), 2);

        let looked_up = cache.lookup("/files/").expect("cache hit");
        assert_eq!(refcount(&looked_up), 3);
        drop(looked_up);
        assert_eq!(refcount(&handle), 2);
    }

    #[test]
    fn cache_miss_on_different_target() {
        let mut cache = PropfindCache::new();
        cache.store(new_handle("/files/".to_string(), vec![]));
        assert!(cache.lookup("/other/").is_none());
    }
}
