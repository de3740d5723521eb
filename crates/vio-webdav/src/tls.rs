//! Certificate-trust callback: falls back to an engine-supplied accept/reject
//! decision when default webpki validation rejects a server certificate.

use std::fmt;
use std::sync::{Arc, Mutex};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::{DigitallySignedStruct, Error as TlsError, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use sha2::{Digest, Sha256};

/// One bit of why the default TLS validator rejected a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsFailureReason {
    NotYetValid,
    Expired,
    Untrusted,
    HostnameMismatch,
    BadChain,
    Revoked,
}

impl fmt::Display for TlsFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TlsFailureReason::NotYetValid => "not-yet-valid",
            TlsFailureReason::Expired => "expired",
            TlsFailureReason::Untrusted => "untrusted",
            TlsFailureReason::HostnameMismatch => "hostname-mismatch",
            TlsFailureReason::BadChain => "bad-chain",
            TlsFailureReason::Revoked => "revoked",
        };
        f.write_str(s)
    }
}

/// The human-readable report handed to the engine's trust-decision callback.
#[derive(Debug, Clone)]
pub struct TlsTrustReport {
    pub host: String,
    pub fingerprint_sha256: String,
    pub reasons: Vec<TlsFailureReason>,
}

impl fmt::Display for TlsTrustReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "certificate for {} ({}) rejected: {}",
            self.host,
            self.fingerprint_sha256,
            self.reasons
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

pub fn sha256_fingerprint(der: &[u8]) -> String {
    let digest = Sha256::digest(der);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn classify(error: &TlsError) -> Vec<TlsFailureReason> {
    use rustls::CertificateError as CE;
    match error {
        TlsError::InvalidCertificate(CE::NotValidYet) => vec![TlsFailureReason::NotYetValid],
        TlsError::InvalidCertificate(CE::Expired) => vec![TlsFailureReason::Expired],
        TlsError::InvalidCertificate(CE::UnknownIssuer) => vec![TlsFailureReason::Untrusted],
        TlsError::InvalidCertificate(CE::Revoked) => vec![TlsFailureReason::Revoked],
        TlsError::InvalidCertificate(CE::BadEncoding)
        | TlsError::InvalidCertificate(CE::InvalidPurpose)
        | TlsError::InvalidCertificate(CE::PathLenConstraintViolated) => {
            vec![TlsFailureReason::BadChain]
        }
        TlsError::InvalidCertificate(_) => vec![TlsFailureReason::BadChain],
        TlsError::NoCertificatesPresented => vec![TlsFailureReason::BadChain],
        _ => vec![TlsFailureReason::Untrusted],
    }
}

/// An engine-supplied decision: accept iff the callback returns `true`,
/// mirroring "accepts iff the first reply byte is y/Y".
pub type TrustCallback = Arc<dyn Fn(&TlsTrustReport) -> bool + Send + Sync>;

/// Mirrors the most recent rejected [`TlsTrustReport`] so the owning `Session`
/// can fold its fingerprint and failure reasons into `error_string` — the
/// verifier itself has no handle to the session, only to this shared slot.
pub type TlsReportSink = Arc<Mutex<Option<String>>>;

/// Wraps the default webpki-roots verifier; on rejection, composes a
/// [`TlsTrustReport`] and defers the accept/reject decision to the engine.
#[derive(Debug)]
pub struct CallbackVerifier {
    inner: Arc<WebPkiServerVerifier>,
    callback: Option<TrustCallback>,
    report_sink: TlsReportSink,
}

impl CallbackVerifier {
    pub fn new(callback: Option<TrustCallback>, report_sink: TlsReportSink) -> Result<Self, TlsError> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let inner = WebPkiServerVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| TlsError::General(e.to_string()))?;
        Ok(Self {
            inner,
            callback,
            report_sink,
        })
    }
}

/// Composes the trust report for a rejected certificate and asks the engine's
/// callback whether to accept it anyway; on a final rejection, records the
/// report text into `sink` for the session's `error_string`.
///
/// Split out from `verify_server_cert` so it is testable without a real
/// certificate chain or `ServerCertVerifier` plumbing.
fn decide(
    err: TlsError,
    server_name: &ServerName<'_>,
    cert_der: &[u8],
    callback: &Option<TrustCallback>,
    sink: &TlsReportSink,
) -> Result<ServerCertVerified, TlsError> {
    let mut reasons = classify(&err);
    if server_name_mismatch(&err) {
        reasons.push(TlsFailureReason::HostnameMismatch);
    }
    let report = TlsTrustReport {
        host: format!("{server_name:?}"),
        fingerprint_sha256: sha256_fingerprint(cert_der),
        reasons,
    };
    tracing::warn!(report = %report, "tls certificate rejected by default validation");
    match callback {
        Some(cb) if cb(&report) => Ok(ServerCertVerified::assertion()),
        _ => {
            *sink.lock().unwrap() = Some(report.to_string());
            Err(err)
        }
    }
}

impl ServerCertVerifier for CallbackVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Ok(ok) => Ok(ok),
            Err(err) => decide(err, server_name, end_entity.as_ref(), &self.callback, &self.report_sink),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

fn server_name_mismatch(error: &TlsError) -> bool {
    matches!(
        error,
        TlsError::InvalidCertificate(rustls::CertificateError::NotValidForName)
    )
}
