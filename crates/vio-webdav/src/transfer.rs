//! Upload and download of file content over the WebDAV session.

use std::cell::RefCell;
use std::io::{Read, Write};

use flate2::read::GzDecoder;
use reqwest::Method;

use vio_core::error::{VioError, VioErrorKind, VioResult};
use vio_core::progress::{ProgressCallback, ProgressEvent};

use crate::cache::IdCache;
use crate::resource::strip_etag_quotes;
use crate::session::Session;

/// Uploads exactly `size` bytes read from `source` to `clean_uri`.
///
/// The upload is always a fixed-length stream starting at offset 0: the whole
/// body is sized up front rather than chunked transfer-encoded.
pub fn sendfile_put<R>(
    session: &Session,
    clean_uri: &str,
    source: R,
    size: u64,
    progress: Option<&ProgressCallback>,
) -> VioResult<()>
where
    R: Read + Send + 'static,
{
    emit(progress, ProgressEvent::StartUpload { uri: clean_uri.to_string() });

    let body = reqwest::blocking::Body::sized(source, size);
    let headers = [
        ("Content-Type", "application/octet-stream".to_string()),
        ("Content-Length", size.to_string()),
    ];
    let response = match session.execute(Method::PUT, clean_uri, &headers, Some(body)) {
        Ok(r) => r,
        Err(err) => {
            emit(
                progress,
                ProgressEvent::Error {
                    uri: clean_uri.to_string(),
                    code: 0,
                    reason: err.message.clone(),
                },
            );
            return Err(err);
        }
    };

    let status = response.status().as_u16();
    if let Some(err) = session.map_status(status, &format!("PUT {clean_uri}")) {
        emit(
            progress,
            ProgressEvent::Error {
                uri: clean_uri.to_string(),
                code: status,
                reason: err.message.clone(),
            },
        );
        return Err(err);
    }

    emit(progress, ProgressEvent::FinishedUpload { uri: clean_uri.to_string() });
    Ok(())
}

/// Downloads `clean_uri` into `dest`, transparently inflating a gzip-encoded
/// response body. Returns the number of bytes written.
pub fn sendfile_get<W>(
    session: &Session,
    id_cache: &RefCell<IdCache>,
    clean_uri: &str,
    mut dest: W,
    progress: Option<&ProgressCallback>,
) -> VioResult<u64>
where
    W: Write,
{
    emit(progress, ProgressEvent::StartDownload { uri: clean_uri.to_string() });

    let headers = [("Accept-Encoding", "gzip".to_string())];
    let response = match session.execute(Method::GET, clean_uri, &headers, None) {
        Ok(r) => r,
        Err(err) => {
            emit(
                progress,
                ProgressEvent::Error {
                    uri: clean_uri.to_string(),
                    code: 0,
                    reason: err.message.clone(),
                },
            );
            return Err(err);
        }
    };

    let status = response.status().as_u16();
    if let Some(err) = session.map_status(status, &format!("GET {clean_uri}")) {
        emit(
            progress,
            ProgressEvent::Error {
                uri: clean_uri.to_string(),
                code: status,
                reason: err.message.clone(),
            },
        );
        return Err(err);
    }

    let is_gzip = response
        .headers()
        .get(reqwest::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("gzip"))
        .unwrap_or(false);

    if let Some(etag) = response
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
    {
        id_cache
            .borrow_mut()
            .store(clean_uri.to_string(), strip_etag_quotes(etag));
    }

    let written = if is_gzip {
        let mut decoder = GzDecoder::new(response);
        copy_to_writer(&mut decoder, &mut dest)?
    } else {
        let mut reader = response;
        copy_to_writer(&mut reader, &mut dest)?
    };

    emit(
        progress,
        ProgressEvent::Progress {
            bytes_done: written,
            bytes_total: Some(written),
        },
    );
    emit(progress, ProgressEvent::FinishedDownload { uri: clean_uri.to_string() });
    Ok(written)
}

fn copy_to_writer<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> VioResult<u64> {
    std::io::copy(reader, writer)
        .map_err(|e| VioError::new(VioErrorKind::BadFd, format!("failed writing transfer content: {e}")))
}

fn emit(progress: Option<&ProgressCallback>, event: ProgressEvent) {
    if let Some(cb) = progress {
        cb(event);
    }
}
