use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use mac_address::MacAddress;
use std::net::Ipv4Addr;
use thiserror::Error;
use url::Url;

/// Port the TV serves its status API and plain WebSocket on.
pub const DEFAULT_STATUS_PORT: u16 = 8001;
/// Port of the TLS WebSocket endpoint.
pub const DEFAULT_PORT: u16 = 8002;
pub const DEFAULT_SUBNET: Ipv4Addr = Ipv4Addr::BROADCAST;

const REMOTE_CONTROL_PATH: &str = "/api/v2/channels/samsung.remote.control";

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid MAC address '{0}': expected 6 hex bytes separated by '-' or ':'")]
    InvalidMac(String),

    #[error("Invalid subnet mask: {0}")]
    InvalidSubnet(String),
}

/// Who we are to the TV and where the TV is.
///
/// Everything but the token is fixed for the lifetime of one client.
#[derive(Debug, Clone)]
pub struct RemoteIdentity {
    pub app_name: String,
    pub ip_addr: String,
    pub mac_addr: MacAddress,
    pub port: u16,
    pub status_port: u16,
    pub subnet: Ipv4Addr,
    pub token: Option<String>,
    pub debug: bool,
}

impl RemoteIdentity {
    pub fn new(app_name: &str, ip_addr: &str, mac_addr: &str) -> Result<Self, IdentityError> {
        Ok(Self {
            app_name: app_name.to_string(),
            ip_addr: ip_addr.to_string(),
            mac_addr: parse_mac(mac_addr)?,
            port: DEFAULT_PORT,
            status_port: DEFAULT_STATUS_PORT,
            subnet: DEFAULT_SUBNET,
            token: None,
            debug: false,
        })
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_status_port(mut self, port: u16) -> Self {
        self.status_port = port;
        self
    }

    pub fn with_subnet(mut self, subnet: &str) -> Result<Self, IdentityError> {
        self.subnet = subnet
            .trim()
            .parse()
            .map_err(|_| IdentityError::InvalidSubnet(subnet.to_string()))?;
        Ok(self)
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// The app name as the TV knows it.
    pub fn app_name_base64(&self) -> String {
        BASE64_STANDARD.encode(self.app_name.as_bytes())
    }

    pub fn status_url(&self) -> String {
        format!("http://{}:{}/api/v2/", self.ip_addr, self.status_port)
    }

    /// Plain `ws` on the status port, `wss` everywhere else.
    pub fn scheme(&self) -> &'static str {
        if self.port == self.status_port {
            "ws"
        } else {
            "wss"
        }
    }

    pub fn remote_control_url(&self, token: Option<&str>) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!(
            "{}://{}:{}{}",
            self.scheme(),
            self.ip_addr,
            self.port,
            REMOTE_CONTROL_PATH
        ))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("name", &self.app_name_base64());
            if let Some(token) = token.filter(|t| !t.is_empty()) {
                query.append_pair("token", token);
            }
        }
        Ok(url)
    }
}

fn parse_mac(mac: &str) -> Result<MacAddress, IdentityError> {
    let normalized = mac.trim().replace('-', ":");
    let parts: Vec<&str> = normalized.split(':').collect();
    if parts.len() != 6 || parts.iter().any(|p| p.len() != 2) {
        return Err(IdentityError::InvalidMac(mac.to_string()));
    }
    normalized
        .parse()
        .map_err(|_| IdentityError::InvalidMac(mac.to_string()))
}
