//! Directory enumeration and namespace mutation (MKCOL/DELETE/MOVE/PROPPATCH).

use std::cell::RefCell;

use reqwest::Method;
use vio_core::error::{VioError, VioErrorKind, VioResult};
use vio_core::uri;

use crate::cache::{IdCache, StatCache};
use crate::propfind::{self, Depth, ListingHandle, PropfindCache, PROPFIND_BODY};
use crate::resource::FileStat;
use crate::session::Session;

/// Issues `PROPFIND` for `target` and returns a shared, possibly cached, handle.
pub fn fetch(
    session: &Session,
    propfind_cache: &RefCell<PropfindCache>,
    target: &str,
    depth: Depth,
) -> VioResult<ListingHandle> {
    let curi = uri::clean(target);

    if let Some(handle) = propfind_cache.borrow().lookup(&curi) {
        return Ok(handle);
    }

    let headers = [
        ("Depth", depth.as_header_value().to_string()),
        ("Content-Type", "application/xml; charset=utf-8".to_string()),
    ];
    let response = session.execute(
        Method::from_bytes(b"PROPFIND").unwrap(),
        &curi,
        &headers,
        Some(reqwest::blocking::Body::from(PROPFIND_BODY.as_bytes().to_vec())),
    )?;

    let status = response.status().as_u16();
    if let Some(err) = session.map_status(status, &format!("PROPFIND {curi}")) {
        return Err(err);
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = response
        .text()
        .map_err(|e| VioError::new(VioErrorKind::IoError, format!("reading PROPFIND body: {e}")))?;

    if !content_type.starts_with("application/xml") {
        return Err(VioError::new(
            VioErrorKind::WrongContent,
            "Server error: PROPFIND reply is not XML formatted!".to_string(),
        ));
    }

    let entries = propfind::parse_propfind_multistatus(&body)
        .map_err(|e| VioError::new(VioErrorKind::WrongContent, format!("malformed PROPFIND XML: {e}")))?;

    let handle = propfind::new_handle(curi, entries);
    propfind_cache.borrow_mut().store(handle.clone());
    Ok(handle)
}

/// Resolves a single resource's stat, consulting the Stat Cache first.
pub fn stat(
    session: &Session,
    propfind_cache: &RefCell<PropfindCache>,
    stat_cache: &RefCell<StatCache>,
    target: &str,
) -> VioResult<FileStat> {
    let name = uri::basename(&uri::clean(target));

    if let Some(cached) = stat_cache.borrow().get(&name) {
        return Ok(cached.clone());
    }

    let handle = fetch(session, propfind_cache, target, Depth::One)?;
    let ctx = handle.borrow();
    let want = uri::clean(target);
    let resource = ctx
        .list
        .iter()
        .find(|r| uri::same_resource(&r.uri, &want))
        .ok_or_else(|| VioError::new(VioErrorKind::NoSuchEntry, format!("no such entry: {target}")))?;

    Ok(FileStat::from_resource(resource, session.time_delta()))
}

/// Resolves the ETag for `target`, consulting the ID Cache before falling back
/// to a full stat.
pub fn get_file_id(
    session: &Session,
    propfind_cache: &RefCell<PropfindCache>,
    stat_cache: &RefCell<StatCache>,
    id_cache: &RefCell<IdCache>,
    target: &str,
) -> VioResult<Option<String>> {
    let curi = uri::clean(target);
    if let Some(etag) = id_cache.borrow().get(&curi) {
        return Ok(Some(etag.to_string()));
    }
    let stat = stat(session, propfind_cache, stat_cache, target)?;
    Ok(stat.etag)
}

/// Advances `handle`'s cursor, skipping the collection's own entry, and returns
/// the next file-stat (populating the Stat Cache). `None` at end of iteration.
pub fn readdir(handle: &ListingHandle, stat_cache: &RefCell<StatCache>, time_delta: i64) -> Option<FileStat> {
    loop {
        let mut ctx = handle.borrow_mut();
        let idx = ctx.cursor;
        if idx >= ctx.list.len() {
            return None;
        }
        ctx.cursor += 1;
        let target = ctx.target.clone();
        let resource = ctx.list[idx].clone();
        drop(ctx);

        if uri::same_resource(&resource.uri, &target) {
            continue;
        }
        if !resource.is_surfaceable() {
            continue;
        }

        let stat = FileStat::from_resource(&resource, time_delta);
        stat_cache.borrow_mut().store(stat.clone());
        return Some(stat);
    }
}

fn clear_all_caches(
    propfind_cache: &RefCell<PropfindCache>,
    stat_cache: &RefCell<StatCache>,
    id_cache: &RefCell<IdCache>,
) {
    propfind_cache.borrow_mut().invalidate();
    stat_cache.borrow_mut().invalidate();
    id_cache.borrow_mut().invalidate();
}

pub fn mkdir(
    session: &Session,
    propfind_cache: &RefCell<PropfindCache>,
    stat_cache: &RefCell<StatCache>,
    id_cache: &RefCell<IdCache>,
    target: &str,
) -> VioResult<()> {
    let mut curi = uri::clean(target);
    if !curi.ends_with('/') {
        curi.push('/');
    }
    let response = session.execute(Method::from_bytes(b"MKCOL").unwrap(), &curi, &[], None)?;
    let status = response.status().as_u16();
    if status == 405 {
        return Err(VioError::new(
            VioErrorKind::AlreadyExists,
            format!("MKCOL {curi}: HTTP 405"),
        ));
    }
    if let Some(err) = session.map_status(status, &format!("MKCOL {curi}")) {
        return Err(err);
    }
    clear_all_caches(propfind_cache, stat_cache, id_cache);
    Ok(())
}

fn delete(
    session: &Session,
    propfind_cache: &RefCell<PropfindCache>,
    stat_cache: &RefCell<StatCache>,
    id_cache: &RefCell<IdCache>,
    target: &str,
    context: &str,
) -> VioResult<()> {
    let curi = uri::clean(target);
    let response = session.execute(Method::DELETE, &curi, &[], None)?;
    let status = response.status().as_u16();
    if let Some(err) = session.map_status(status, &format!("{context} {curi}")) {
        return Err(err);
    }
    clear_all_caches(propfind_cache, stat_cache, id_cache);
    Ok(())
}

pub fn rmdir(
    session: &Session,
    propfind_cache: &RefCell<PropfindCache>,
    stat_cache: &RefCell<StatCache>,
    id_cache: &RefCell<IdCache>,
    target: &str,
) -> VioResult<()> {
    delete(session, propfind_cache, stat_cache, id_cache, target, "RMDIR")
}

pub fn unlink(
    session: &Session,
    propfind_cache: &RefCell<PropfindCache>,
    stat_cache: &RefCell<StatCache>,
    id_cache: &RefCell<IdCache>,
    target: &str,
) -> VioResult<()> {
    delete(session, propfind_cache, stat_cache, id_cache, target, "UNLINK")
}

pub fn rename(
    session: &Session,
    propfind_cache: &RefCell<PropfindCache>,
    stat_cache: &RefCell<StatCache>,
    id_cache: &RefCell<IdCache>,
    old: &str,
    new: &str,
) -> VioResult<()> {
    let curi_old = uri::clean(old);
    let curi_new = uri::clean(new);
    let destination = session.absolute_url(&curi_new)?;
    let headers = [
        ("Destination", destination),
        ("Overwrite", "T".to_string()),
    ];
    let response = session.execute(Method::from_bytes(b"MOVE").unwrap(), &curi_old, &headers, None)?;
    let status = response.status().as_u16();
    if let Some(err) = session.map_status(status, &format!("MOVE {curi_old} -> {curi_new}")) {
        return Err(err);
    }
    clear_all_caches(propfind_cache, stat_cache, id_cache);
    Ok(())
}

pub fn utimes(
    session: &Session,
    propfind_cache: &RefCell<PropfindCache>,
    stat_cache: &RefCell<StatCache>,
    id_cache: &RefCell<IdCache>,
    target: &str,
    modtime: i64,
) -> VioResult<()> {
    let curi = uri::clean(target);
    let wire_time = modtime + session.time_delta();
    let body = format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propertyupdate xmlns:D="DAV:">
  <D:set>
    <D:prop>
      <D:lastmodified>{wire_time}</D:lastmodified>
    </D:prop>
  </D:set>
</D:propertyupdate>
"#
    );
    let headers = [("Content-Type", "application/xml; charset=utf-8".to_string())];
    let response = session.execute(
        Method::from_bytes(b"PROPPATCH").unwrap(),
        &curi,
        &headers,
        Some(reqwest::blocking::Body::from(body.into_bytes())),
    )?;
    let status = response.status().as_u16();
    if let Some(err) = session.map_status(status, &format!("PROPPATCH {curi}")) {
        return Err(err);
    }
    clear_all_caches(propfind_cache, stat_cache, id_cache);
    Ok(())
}

/// `chmod`/`chown` are no-ops: the server has no POSIX permission model.
pub fn chmod(_target: &str, _mode: u32) -> VioResult<()> {
    Ok(())
}

pub fn chown(_target: &str, _uid: u32, _gid: u32) -> VioResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::any;
    use tokio::net::TcpListener;

    /// Starts a server that 404s every request except PROPFIND, which it answers
    /// with `body` under whatever content-type the test wants to exercise.
    fn start_server(body: &'static str, content_type: &'static str) -> String {
        async fn handler(req: Request<Body>) -> impl IntoResponse {
            if req.method().as_str() == "PROPFIND" {
                return axum::http::Response::builder()
                    .status(StatusCode::MULTI_STATUS)
                    .header("Content-Type", content_type)
                    .body(Body::from(body))
                    .unwrap();
            }
            axum::http::Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Body::empty())
                .unwrap()
        }

        let app = Router::new().route("/{*path}", any(handler));
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (addr_tx, addr_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            rt.block_on(async move {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                addr_tx.send(listener.local_addr().unwrap()).unwrap();
                axum::serve(listener, app).await.unwrap();
            });
        });
        let addr = addr_rx.recv().unwrap();
        format!("owncloud://{addr}/")
    }

    #[test]
    fn stat_on_404_path_yields_no_such_entry() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?><D:multistatus xmlns:D="DAV:"></D:multistatus>"#;
        let base = start_server(xml, "application/xml; charset=utf-8");
        let session = Session::new(SessionConfig::default());
        session.connect(&base).unwrap();

        let propfind_cache = RefCell::new(PropfindCache::new());
        let stat_cache = RefCell::new(StatCache::new());
        let err = stat(&session, &propfind_cache, &stat_cache, &format!("{base}missing.txt")).unwrap_err();
        assert_eq!(err.kind, VioErrorKind::NoSuchEntry);
    }

    #[test]
    fn propfind_with_non_xml_content_type_yields_wrong_content() {
        let base = start_server("not xml", "text/plain");
        let session = Session::new(SessionConfig::default());
        session.connect(&base).unwrap();

        let propfind_cache = RefCell::new(PropfindCache::new());
        let err = fetch(&session, &propfind_cache, &base, Depth::One).unwrap_err();
        assert_eq!(err.kind, VioErrorKind::WrongContent);
        assert!(propfind_cache.borrow().lookup(&uri::clean(&base)).is_none());
    }
}
