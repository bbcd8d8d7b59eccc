//! Read API listener settings
//!
//! Lives under the `http` key of the main config file. Every field is
//! optional; `{}` binds the loopback interface on port 8195.

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

const LOOPBACK: &str = "127.0.0.1";
const READ_API_PORT: u16 = 8195;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpServerConfig {
    /// Interface address, IPv4 or IPv6 literal
    pub host: String,
    pub port: u16,
    /// Browser origins allowed to call the API; empty allows any
    pub cors_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: LOOPBACK.to_string(),
            port: READ_API_PORT,
            cors_origins: Vec::new(),
        }
    }
}

impl HttpServerConfig {
    pub fn on_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Resolved listen address. Host names are not looked up.
    pub fn bind_addr(&self) -> Result<SocketAddr, String> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| format!("http.host '{}' is not an IP address", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn validate(&self) -> Result<(), String> {
        self.bind_addr()?;
        if let Some(bad) = self
            .cors_origins
            .iter()
            .find(|o| !(o.starts_with("http://") || o.starts_with("https://")))
        {
            return Err(format!("http.cors_origins entry '{}' is not an origin URL", bad));
        }
        Ok(())
    }
}
