pub mod capabilities;
pub mod error;
pub mod httpdate;
pub mod mode;
pub mod progress;
pub mod uri;

pub use capabilities::Capabilities;
pub use error::{TransportFailure, VioError, VioErrorKind, VioResult, map_http_status, parse_leading_status};
pub use progress::{ProgressCallback, ProgressEvent};
