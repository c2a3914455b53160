//! Endpoint Resolution
//!
//! Maps a contract name to the address a channel should connect to.

mod config;

use std::fmt;

use serde::Deserialize;

use crate::error::ChannelError;

pub use config::{
    ConfigEndpointResolver, DEFAULT_CONFIG_PATH, EndpointConfigError, interpolate_env_vars,
};

/// Transport binding of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingFlavor {
    /// Plain `ws://`.
    WebSocket,
    /// TLS `wss://`.
    SecureWebSocket,
}

impl BindingFlavor {
    /// URL scheme for this binding.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::WebSocket => "ws",
            Self::SecureWebSocket => "wss",
        }
    }

    const fn default_port(self) -> u16 {
        match self {
            Self::WebSocket => 80,
            Self::SecureWebSocket => 443,
        }
    }
}

/// Resolved address of a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Contract name.
    pub contract: String,
    /// URL scheme.
    pub scheme: String,
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Request path, always starting with `/`.
    pub path: String,
    /// Transport binding.
    pub binding: BindingFlavor,
}

impl Endpoint {
    /// Parse `scheme://host[:port][/path]` for a contract.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Config` if the address is malformed or its
    /// scheme disagrees with the binding.
    pub fn parse(
        contract: impl Into<String>,
        address: &str,
        binding: BindingFlavor,
    ) -> Result<Self, ChannelError> {
        let contract = contract.into();
        let invalid = |reason: &str| ChannelError::Config(format!("{contract}: {reason}"));

        let (scheme, rest) = address
            .trim()
            .split_once("://")
            .ok_or_else(|| invalid("address has no scheme"))?;
        if !scheme.eq_ignore_ascii_case(binding.scheme()) {
            return Err(invalid(&format!(
                "scheme '{scheme}' does not match binding {binding}"
            )));
        }

        let (authority, path) = rest
            .find('/')
            .map_or((rest, "/"), |at| (&rest[..at], &rest[at..]));
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>()
                    .map_err(|_| invalid(&format!("invalid port '{port}'")))?,
            ),
            None => (authority, binding.default_port()),
        };
        if host.is_empty() {
            return Err(invalid("address has no host"));
        }

        Ok(Self {
            scheme: binding.scheme().to_string(),
            host: host.to_string(),
            port,
            path: path.to_string(),
            binding,
            contract,
        })
    }

    /// Same endpoint on another host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Connection URL.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }
}

impl fmt::Display for BindingFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebSocket => write!(f, "web_socket"),
            Self::SecureWebSocket => write!(f, "secure_web_socket"),
        }
    }
}

/// Resolves contract names to endpoints.
pub trait EndpointResolver: Send + Sync {
    /// Endpoint for `contract`.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::ChannelUnavailable` if nothing is configured
    /// for the contract.
    fn resolve(&self, contract: &str) -> Result<Endpoint, ChannelError>;
}
