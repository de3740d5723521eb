//! Typed configuration surface for a session, set via `set_property` instead of
//! parsed from an INI file.

use std::time::Duration;

/// Proxy transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyType {
    #[default]
    NoProxy,
    DefaultProxy,
    HttpProxy,
    HttpCachingProxy,
    FtpCachingProxy,
    Socks5Proxy,
}

#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    pub proxy_type: ProxyType,
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    pub fn none() -> Self {
        Self {
            proxy_type: ProxyType::NoProxy,
            host: None,
            port: default_proxy_port(),
            user: None,
            password: None,
        }
    }
}

pub fn default_proxy_port() -> u16 {
    8080
}

pub fn default_read_timeout() -> Duration {
    Duration::from_secs(30)
}

pub fn default_skew_warn_threshold() -> Duration {
    Duration::from_secs(5)
}

pub fn default_user_agent() -> String {
    format!("csyncoC/{}", env!("CARGO_PKG_VERSION"))
}

/// One `set_property` key/value pair ("Configurable properties"). `SessionKey`
/// is the only variant settable after `connect`; the rest configure transport
/// setup and so only take effect if set beforehand.
#[derive(Debug, Clone)]
pub enum Property {
    SessionKey(String),
    ProxyType(ProxyType),
    ProxyHost(String),
    ProxyUser(String),
    ProxyPwd(String),
    ProxyPort(u16),
    ReadTimeout(Duration),
}

/// Everything a session needs to connect: credentials, proxy, timeouts.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user: Option<String>,
    pub password: Option<String>,
    pub proxy: ProxyConfig,
    pub read_timeout: Duration,
    pub skew_warn_threshold: Duration,
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user: None,
            password: None,
            proxy: ProxyConfig::none(),
            read_timeout: default_read_timeout(),
            skew_warn_threshold: default_skew_warn_threshold(),
            user_agent: default_user_agent(),
        }
    }
}
