//! The operation table the sync engine drives: a remote-filesystem facade
//! over one WebDAV `Session`.

use std::cell::RefCell;
use std::io::{Read, Write};

use vio_core::capabilities::Capabilities;
use vio_core::error::{VioError, VioErrorKind, VioResult};
use vio_core::progress::ProgressCallback;
use vio_core::uri;

use crate::cache::{IdCache, StatCache};
use crate::config::SessionConfig;
use crate::dirops;
use crate::propfind::{Depth, ListingHandle, PropfindCache};
use crate::resource::FileStat;
use crate::session::Session;
use crate::transfer;

pub const O_WRONLY: u32 = 0b0001;
pub const O_RDWR: u32 = 0b0010;
pub const O_CREAT: u32 = 0b0100;
pub const O_TRUNC: u32 = 0b1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMethod {
    Put,
    Get,
}

/// A transfer in progress, returned by [`WebdavVio::open`]/[`WebdavVio::creat`]
/// and consumed by [`WebdavVio::sendfile_put`]/[`WebdavVio::sendfile_get`].
#[derive(Debug, Clone)]
pub struct TransferHandle {
    pub clean_uri: String,
    pub method: TransferMethod,
}

/// The WebDAV virtual-I/O backend: owns the session and its three caches, and
/// exposes the operation table the embedding engine drives.
pub struct WebdavVio {
    session: Session,
    propfind_cache: RefCell<PropfindCache>,
    stat_cache: RefCell<StatCache>,
    id_cache: RefCell<IdCache>,
    last_seen_parent: RefCell<Option<String>>,
    progress_callback: Option<ProgressCallback>,
    /// Opaque back-reference to the embedding engine's own context ("Session
    /// State... back-reference to the engine context and opaque user data").
    /// Never interpreted by this crate.
    csync_context: Option<Box<dyn std::any::Any + Send>>,
}

impl WebdavVio {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            session: Session::new(config),
            propfind_cache: RefCell::new(PropfindCache::new()),
            stat_cache: RefCell::new(StatCache::new()),
            id_cache: RefCell::new(IdCache::new()),
            last_seen_parent: RefCell::new(None),
            progress_callback: None,
            csync_context: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Wires the engine's trust-decision callback for certificates the default
    /// TLS validation rejects ("TLS trust callback").
    pub fn with_tls_trust_callback(mut self, callback: crate::tls::TrustCallback) -> Self {
        self.session = self.session.with_tls_trust_callback(callback);
        self
    }

    /// Wires the engine's auth callback for proxy credentials ("Authentication
    /// callback (proxy)").
    pub fn with_proxy_auth_callback(mut self, callback: crate::session::AuthCallback) -> Self {
        self.session = self.session.with_proxy_auth_callback(callback);
        self
    }

    /// Wires the engine's auth callback for server credentials ("Authentication
    /// callback (server)").
    pub fn with_server_auth_callback(mut self, callback: crate::session::AuthCallback) -> Self {
        self.session = self.session.with_server_auth_callback(callback);
        self
    }

    pub fn get_capabilities(&self) -> Capabilities {
        Capabilities {
            atomar_copy: true,
            do_post_copy_stat: false,
            time_sync_required: false,
            unix_extensions: 0,
            propagate_on_fd: true,
        }
    }

    pub fn get_error_string(&self) -> String {
        self.session.error_string()
    }

    /// `set_property` surface for the string/integer-valued keys:
    /// `session_key`, `proxy_type`, `proxy_host`, `proxy_user`, `proxy_pwd`,
    /// `proxy_port`, `read_timeout`.
    pub fn set_property(&self, property: crate::config::Property) -> VioResult<()> {
        self.session.set_property(property)
    }

    pub fn set_property_session_key(&self, key: String) {
        self.session.set_property_session_key(key);
    }

    /// `set_property("progress_callback", ...)`: the function-pointer-valued key,
    /// modeled as a typed setter rather than crammed into the string-keyed
    /// `set_property` table.
    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress_callback = Some(callback);
    }

    /// `set_property("csync_context", ...)`: the opaque back-reference to the
    /// engine's own context, passed through unexamined on every call.
    pub fn set_csync_context(&mut self, context: Box<dyn std::any::Any + Send>) {
        self.csync_context = Some(context);
    }

    pub fn open(&self, target: &str, flags: u32) -> VioResult<TransferHandle> {
        self.session.connect(target)?;
        let clean_uri = uri::clean(target);
        let is_put = flags & (O_WRONLY | O_RDWR | O_CREAT) != 0;

        if is_put {
            // `dirops::stat`/`fetch` re-parse their argument as a full, scheme-qualified
            // URI, so the parent must be rebuilt as one too rather than passed as a bare
            // clean path (which has no scheme and would resolve against the server root).
            let parent_uri = uri::parent_uri(target).map_err(|_| {
                VioError::new(
                    VioErrorKind::InvalidArgument,
                    format!("cannot resolve parent of {target}"),
                )
            })?;
            let parent_clean = uri::clean(&parent_uri);
            let already_known = self
                .last_seen_parent
                .borrow()
                .as_deref()
                .is_some_and(|p| p == parent_clean);
            if !already_known {
                dirops::stat(
                    &self.session,
                    &self.propfind_cache,
                    &self.stat_cache,
                    &parent_uri,
                )
                .map_err(|_| {
                    VioError::new(
                        VioErrorKind::NoSuchEntry,
                        format!("parent directory does not exist: {parent_clean}"),
                    )
                })?;
                *self.last_seen_parent.borrow_mut() = Some(parent_clean);
            }
            Ok(TransferHandle {
                clean_uri,
                method: TransferMethod::Put,
            })
        } else {
            Ok(TransferHandle {
                clean_uri,
                method: TransferMethod::Get,
            })
        }
    }

    /// Equivalent to `open` with `O_CREAT|O_WRONLY|O_TRUNC` followed by a
    /// zero-length write, establishing the empty resource.
    pub fn creat(&self, target: &str) -> VioResult<TransferHandle> {
        let handle = self.open(target, O_CREAT | O_WRONLY | O_TRUNC)?;
        self.sendfile_put(&handle, std::io::empty(), 0)?;
        Ok(handle)
    }

    pub fn sendfile_put<R>(&self, handle: &TransferHandle, source: R, size: u64) -> VioResult<()>
    where
        R: Read + Send + 'static,
    {
        transfer::sendfile_put(
            &self.session,
            &handle.clean_uri,
            source,
            size,
            self.progress_callback.as_ref(),
        )
    }

    pub fn sendfile_get<W>(&self, handle: &TransferHandle, dest: W) -> VioResult<u64>
    where
        W: Write,
    {
        transfer::sendfile_get(
            &self.session,
            &self.id_cache,
            &handle.clean_uri,
            dest,
            self.progress_callback.as_ref(),
        )
    }

    /// Destroys the transfer context; if it was a PUT, clears every cache so
    /// subsequent reads observe the mutation.
    pub fn close(&self, handle: TransferHandle) {
        if handle.method == TransferMethod::Put {
            self.propfind_cache.borrow_mut().invalidate();
            self.stat_cache.borrow_mut().invalidate();
            self.id_cache.borrow_mut().invalidate();
        }
    }

    /// Stub: all bulk transfer happens via `sendfile_put`/`sendfile_get`.
    pub fn read(&self, _handle: &TransferHandle, _buf: &mut [u8]) -> VioResult<usize> {
        Ok(0)
    }

    /// Stub: all bulk transfer happens via `sendfile_put`/`sendfile_get`.
    pub fn write(&self, _handle: &TransferHandle, _buf: &[u8]) -> VioResult<usize> {
        Err(VioError::new(
            VioErrorKind::InvalidArgument,
            "write is unsupported; use sendfile".to_string(),
        ))
    }

    /// Stub: this backend has no seekable transfer context.
    pub fn lseek(&self, _handle: &TransferHandle, _offset: i64) -> VioResult<i64> {
        Ok(0)
    }

    pub fn opendir(&self, target: &str) -> VioResult<ListingHandle> {
        self.session.connect(target)?;
        dirops::fetch(&self.session, &self.propfind_cache, target, Depth::One)
    }

    pub fn readdir(&self, handle: &ListingHandle) -> Option<FileStat> {
        dirops::readdir(handle, &self.stat_cache, self.session.time_delta())
    }

    /// Drops this handle's reference; the `ListingContext` is freed once no
    /// reference (cache or caller) remains.
    pub fn closedir(&self, _handle: ListingHandle) {}

    pub fn mkdir(&self, target: &str) -> VioResult<()> {
        self.session.connect(target)?;
        dirops::mkdir(
            &self.session,
            &self.propfind_cache,
            &self.stat_cache,
            &self.id_cache,
            target,
        )
    }

    pub fn rmdir(&self, target: &str) -> VioResult<()> {
        self.session.connect(target)?;
        dirops::rmdir(
            &self.session,
            &self.propfind_cache,
            &self.stat_cache,
            &self.id_cache,
            target,
        )
    }

    pub fn unlink(&self, target: &str) -> VioResult<()> {
        self.session.connect(target)?;
        dirops::unlink(
            &self.session,
            &self.propfind_cache,
            &self.stat_cache,
            &self.id_cache,
            target,
        )
    }

    pub fn stat(&self, target: &str) -> VioResult<FileStat> {
        self.session.connect(target)?;
        dirops::stat(&self.session, &self.propfind_cache, &self.stat_cache, target)
    }

    pub fn get_file_id(&self, target: &str) -> VioResult<Option<String>> {
        self.session.connect(target)?;
        dirops::get_file_id(
            &self.session,
            &self.propfind_cache,
            &self.stat_cache,
            &self.id_cache,
            target,
        )
    }

    pub fn rename(&self, old: &str, new: &str) -> VioResult<()> {
        self.session.connect(old)?;
        dirops::rename(
            &self.session,
            &self.propfind_cache,
            &self.stat_cache,
            &self.id_cache,
            old,
            new,
        )
    }

    pub fn utimes(&self, target: &str, modtime: i64) -> VioResult<()> {
        self.session.connect(target)?;
        dirops::utimes(
            &self.session,
            &self.propfind_cache,
            &self.stat_cache,
            &self.id_cache,
            target,
            modtime,
        )
    }

    /// The server has no POSIX permission model: always succeeds.
    pub fn chmod(&self, target: &str, mode: u32) -> VioResult<()> {
        dirops::chmod(target, mode)
    }

    /// The server has no POSIX permission model: always succeeds.
    pub fn chown(&self, target: &str, uid: u32, gid: u32) -> VioResult<()> {
        dirops::chown(target, uid, gid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Starts a server whose PROPFIND answers describe exactly one collection,
    /// `/files/`, so a parent-stat against anything else 404s.
    fn start_parent_only_server() -> String {
        async fn handler(req: axum::extract::Request) -> axum::response::Response {
            use axum::http::StatusCode;
            use axum::response::IntoResponse;

            if req.method().as_str() == "PROPFIND" && req.uri().path() == "/files/" {
                let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/files/</D:href>
    <D:propstat>
      <D:prop><D:resourcetype><D:collection/></D:resourcetype></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;
                let mut resp = (StatusCode::MULTI_STATUS, xml).into_response();
                resp.headers_mut().insert(
                    axum::http::header::CONTENT_TYPE,
                    "application/xml; charset=utf-8".parse().unwrap(),
                );
                return resp;
            }
            if req.method() == axum::http::Method::PUT {
                return StatusCode::CREATED.into_response();
            }
            StatusCode::NOT_FOUND.into_response()
        }

        let app = axum::Router::new().route("/{*path}", axum::routing::any(handler));
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (addr_tx, addr_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            rt.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                addr_tx.send(listener.local_addr().unwrap()).unwrap();
                axum::serve(listener, app).await.unwrap();
            });
        });
        let addr = addr_rx.recv().unwrap();
        format!("owncloud://{addr}/")
    }

    #[test]
    fn open_for_put_stats_the_parent_as_a_fully_qualified_uri() {
        let base = start_parent_only_server();
        let vio = WebdavVio::new(SessionConfig::default());

        // `/files/` exists, so PUT-opening a file inside it must succeed.
        vio.open(&format!("{base}files/a.txt"), O_CREAT | O_WRONLY)
            .expect("parent exists, open must succeed");
    }

    #[test]
    fn open_for_put_fails_when_the_parent_does_not_exist() {
        let base = start_parent_only_server();
        let vio = WebdavVio::new(SessionConfig::default());

        let err = vio
            .open(&format!("{base}missing/a.txt"), O_CREAT | O_WRONLY)
            .unwrap_err();
        assert_eq!(err.kind, VioErrorKind::NoSuchEntry);
    }

    #[test]
    fn capabilities_match_documented_values() {
        let vio = WebdavVio::new(SessionConfig::default());
        let caps = vio.get_capabilities();
        assert!(caps.atomar_copy);
        assert!(!caps.do_post_copy_stat);
        assert!(!caps.time_sync_required);
        assert_eq!(caps.unix_extensions, 0);
        assert!(caps.propagate_on_fd);
    }

    #[test]
    fn chmod_and_chown_are_no_ops() {
        let vio = WebdavVio::new(SessionConfig::default());
        assert!(vio.chmod("/a.txt", 0o600).is_ok());
        assert!(vio.chown("/a.txt", 1, 1).is_ok());
    }

    #[test]
    fn set_property_configures_proxy_before_connect() {
        let vio = WebdavVio::new(SessionConfig::default());
        vio.set_property(crate::config::Property::ProxyHost("proxy.example".to_string()))
            .unwrap();
        vio.set_property(crate::config::Property::ProxyPort(3128))
            .unwrap();
        vio.set_property(crate::config::Property::ProxyType(
            crate::config::ProxyType::HttpProxy,
        ))
        .unwrap();
    }

    #[test]
    fn set_property_rejects_transport_changes_after_connect() {
        let vio = WebdavVio::new(SessionConfig::default());
        vio.session.connect("owncloud://ex.com/files/").unwrap();
        let err = vio
            .set_property(crate::config::Property::ProxyPort(3128))
            .unwrap_err();
        assert_eq!(err.kind, VioErrorKind::InvalidArgument);
    }

    #[test]
    fn session_key_settable_after_connect() {
        let vio = WebdavVio::new(SessionConfig::default());
        vio.session.connect("owncloud://ex.com/files/").unwrap();
        vio.set_property(crate::config::Property::SessionKey("OCSID=xyz".to_string()))
            .unwrap();
    }
}
