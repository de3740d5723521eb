//! Progress events a VIO backend reports to the engine's progress callback.

/// One event in the stream a transfer reports to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StartUpload { uri: String },
    FinishedUpload { uri: String },
    StartDownload { uri: String },
    FinishedDownload { uri: String },
    Progress { bytes_done: u64, bytes_total: Option<u64> },
    Error { uri: String, code: u16, reason: String },
}

/// The callback capability the engine supplies for progress notification.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send>;
