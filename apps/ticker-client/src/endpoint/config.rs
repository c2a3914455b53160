//! YAML endpoint configuration.
//!
//! ```yaml
//! host: ${TICKER_HOST:-}
//! endpoints:
//!   - contract: IStockService
//!     address: ws://localhost:8733/ticker
//!     binding: web_socket
//! ```
//!
//! `${VAR}` and `${VAR:-default}` are replaced from the environment before
//! parsing. A non-empty `host` replaces the host of every endpoint.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Deserialize;

use super::{BindingFlavor, Endpoint, EndpointResolver};
use crate::error::ChannelError;

/// Config file used when `TICKER_CLIENT_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "ticker-client.yaml";

/// Endpoint configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum EndpointConfigError {
    /// Failed to read the file.
    #[error("failed to read endpoint config '{path}': {source}")]
    ReadError {
        /// File path.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML.
    #[error("failed to parse endpoint config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Parsed but unusable.
    #[error("endpoint config validation failed: {0}")]
    ValidationError(String),
}

#[derive(Debug, Deserialize)]
struct EndpointFile {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    endpoints: Vec<EndpointEntry>,
}

#[derive(Debug, Deserialize)]
struct EndpointEntry {
    contract: String,
    address: String,
    #[serde(default = "default_binding")]
    binding: BindingFlavor,
}

const fn default_binding() -> BindingFlavor {
    BindingFlavor::WebSocket
}

/// Resolver backed by a fixed endpoint table.
#[derive(Debug, Clone, Default)]
pub struct ConfigEndpointResolver {
    endpoints: HashMap<String, Endpoint>,
    host_override: Option<String>,
}

impl ConfigEndpointResolver {
    /// Resolver over explicit endpoints.
    #[must_use]
    pub fn from_endpoints(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        Self {
            endpoints: endpoints
                .into_iter()
                .map(|e| (e.contract.clone(), e))
                .collect(),
            host_override: None,
        }
    }

    /// Load a YAML endpoint file.
    ///
    /// # Errors
    ///
    /// Returns an `EndpointConfigError` if the file cannot be read, parsed,
    /// or validated.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EndpointConfigError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|source| EndpointConfigError::ReadError {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse YAML endpoint configuration.
    ///
    /// # Errors
    ///
    /// Returns an `EndpointConfigError` if the YAML cannot be parsed or an
    /// entry is invalid.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, EndpointConfigError> {
        let file: EndpointFile = serde_yaml_bw::from_str(&interpolate_env_vars(yaml))?;

        let mut endpoints = HashMap::with_capacity(file.endpoints.len());
        for entry in file.endpoints {
            let endpoint = Endpoint::parse(entry.contract, &entry.address, entry.binding)
                .map_err(|e| EndpointConfigError::ValidationError(e.to_string()))?;
            if endpoints.contains_key(&endpoint.contract) {
                return Err(EndpointConfigError::ValidationError(format!(
                    "contract '{}' is configured twice",
                    endpoint.contract
                )));
            }
            endpoints.insert(endpoint.contract.clone(), endpoint);
        }

        Ok(Self {
            endpoints,
            host_override: non_blank(file.host),
        })
    }

    /// Replace the host of every resolved endpoint. Blank clears it.
    #[must_use]
    pub fn with_host_override(mut self, host: Option<String>) -> Self {
        self.host_override = non_blank(host);
        self
    }

    /// Active host override.
    #[must_use]
    pub fn host_override(&self) -> Option<&str> {
        self.host_override.as_deref()
    }
}

impl EndpointResolver for ConfigEndpointResolver {
    fn resolve(&self, contract: &str) -> Result<Endpoint, ChannelError> {
        let endpoint = self
            .endpoints
            .get(contract)
            .cloned()
            .ok_or_else(|| ChannelError::ChannelUnavailable(contract.to_string()))?;
        Ok(match &self.host_override {
            Some(host) => endpoint.with_host(host.clone()),
            None => endpoint,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Replace `${VAR}` and `${VAR:-default}` with environment values.
///
/// Unset or empty variables take the default; without a default the
/// reference is left as written.
#[must_use]
pub fn interpolate_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

    let Some(re) = ENV_VAR_REGEX
        .get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").ok())
    else {
        return input.to_string();
    };

    re.replace_all(input, |caps: &Captures<'_>| {
        let value = std::env::var(&caps[1]).ok().filter(|v| !v.is_empty());
        match (value, caps.get(2)) {
            (Some(value), _) => value,
            (None, Some(default)) => default.as_str().to_string(),
            (None, None) => caps[0].to_string(),
        }
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r"
endpoints:
  - contract: IStockService
    address: ws://localhost:8733/ticker
    binding: web_socket
";

    #[test]
    fn resolves_configured_contract() {
        let resolver = ConfigEndpointResolver::from_yaml_str(YAML).unwrap();
        let endpoint = resolver.resolve("IStockService").unwrap();
        assert_eq!(endpoint.url(), "ws://localhost:8733/ticker");
        assert_eq!(endpoint.binding, BindingFlavor::WebSocket);
    }

    #[test]
    fn unknown_contract_is_unavailable() {
        let resolver = ConfigEndpointResolver::from_yaml_str(YAML).unwrap();
        let result = resolver.resolve("IOrderService");
        assert!(matches!(result, Err(ChannelError::ChannelUnavailable(name)) if name == "IOrderService"));
    }

    #[test]
    fn host_from_file_overrides_every_endpoint() {
        let yaml = format!("host: quotes.internal\n{YAML}");
        let resolver = ConfigEndpointResolver::from_yaml_str(&yaml).unwrap();
        assert_eq!(
            resolver.resolve("IStockService").unwrap().url(),
            "ws://quotes.internal:8733/ticker"
        );
    }

    #[test]
    fn blank_override_is_ignored() {
        let resolver = ConfigEndpointResolver::from_yaml_str(YAML)
            .unwrap()
            .with_host_override(Some("  ".to_string()));
        assert!(resolver.host_override().is_none());
        assert_eq!(resolver.resolve("IStockService").unwrap().host, "localhost");
    }

    #[test]
    fn duplicate_contract_is_rejected() {
        let yaml = format!("{YAML}  - contract: IStockService\n    address: ws://other:1/\n");
        assert!(matches!(
            ConfigEndpointResolver::from_yaml_str(&yaml),
            Err(EndpointConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn invalid_address_is_rejected() {
        let yaml = "endpoints:\n  - contract: IStockService\n    address: localhost\n";
        assert!(matches!(
            ConfigEndpointResolver::from_yaml_str(yaml),
            Err(EndpointConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();
        let resolver = ConfigEndpointResolver::from_path(file.path()).unwrap();
        assert!(resolver.resolve("IStockService").is_ok());
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigEndpointResolver::from_path(dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(EndpointConfigError::ReadError { .. })));
    }

    #[test]
    fn interpolation_uses_default_when_unset() {
        let out = interpolate_env_vars("ws://${TICKER_TEST_UNSET_HOST:-localhost}:8733/");
        assert_eq!(out, "ws://localhost:8733/");
    }

    #[test]
    fn interpolation_keeps_unresolved_reference() {
        assert_eq!(
            interpolate_env_vars("${TICKER_TEST_UNSET_HOST}"),
            "${TICKER_TEST_UNSET_HOST}"
        );
    }

    #[test]
    fn interpolation_reads_environment() {
        // PATH is set in any test environment.
        let path = std::env::var("PATH").unwrap();
        assert_eq!(interpolate_env_vars("${PATH:-none}"), path);
    }

    #[test]
    fn interpolated_address_resolves() {
        let yaml = "endpoints:\n  - contract: IStockService\n    address: ws://${TICKER_TEST_UNSET_HOST:-127.0.0.1}:${TICKER_TEST_UNSET_PORT:-9000}/ticker\n";
        let resolver = ConfigEndpointResolver::from_yaml_str(yaml).unwrap();
        assert_eq!(
            resolver.resolve("IStockService").unwrap().url(),
            "ws://127.0.0.1:9000/ticker"
        );
    }
}
