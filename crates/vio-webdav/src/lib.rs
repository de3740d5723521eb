pub mod cache;
pub mod config;
pub mod dirops;
pub mod propfind;
pub mod resource;
pub mod session;
pub mod skew;
pub mod tls;
pub mod transfer;
pub mod vio;

pub use config::{Property, ProxyConfig, ProxyType, SessionConfig};
pub use resource::{FileStat, Resource, ResourceType};
pub use session::Session;
pub use vio::{TransferHandle, TransferMethod, WebdavVio};
