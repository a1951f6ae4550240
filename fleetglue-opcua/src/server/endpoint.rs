use crate::error::{OpcError, OpcResult};
use std::fmt;
use url::Url;

/// Default OPC UA binary protocol port.
pub const DEFAULT_PORT: u16 = 4840;

const SCHEME: &str = "opc.tcp";

/// A parsed `opc.tcp://host:port/path` endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Resource path, always starting with `/`.
    pub path: String,
}

impl Endpoint {
    /// Parse an endpoint URL.
    ///
    /// # Examples
    /// ```
    /// use fleetglue_opcua::Endpoint;
    ///
    /// let ep = Endpoint::parse("opc.tcp://0.0.0.0:4840/freeopcua/server/").unwrap();
    /// assert_eq!(ep.host, "0.0.0.0");
    /// assert_eq!(ep.port, 4840);
    /// assert_eq!(ep.path, "/freeopcua/server/");
    /// ```
    pub fn parse(raw: &str) -> OpcResult<Self> {
        let url = Url::parse(raw.trim()).map_err(|e| OpcError::Endpoint(format!("{raw}: {e}")))?;

        if url.scheme() != SCHEME {
            return Err(OpcError::Endpoint(format!(
                "{raw}: scheme must be '{SCHEME}', got '{}'",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| OpcError::Endpoint(format!("{raw}: missing host")))?
            .to_string();

        let path = if url.path().is_empty() {
            "/".to_string()
        } else {
            url.path().to_string()
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            path,
        })
    }

    /// Same endpoint with the host replaced, e.g. a bind-all address
    /// replaced by the name clients should use.
    #[must_use]
    pub fn with_host(&self, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}://{}:{}{}", self.host, self.port, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_endpoint() {
        let ep = Endpoint::parse("opc.tcp://192.168.1.20:4841/freeopcua/server/").unwrap();
        assert_eq!(ep.host, "192.168.1.20");
        assert_eq!(ep.port, 4841);
        assert_eq!(ep.path, "/freeopcua/server/");
    }

    #[test]
    fn test_parse_defaults_port_and_path() {
        let ep = Endpoint::parse("opc.tcp://plc-gateway").unwrap();
        assert_eq!(ep.port, DEFAULT_PORT);
        assert_eq!(ep.path, "/");
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        let err = Endpoint::parse("http://localhost:4840/").unwrap_err();
        assert!(matches!(err, OpcError::Endpoint(_)));
        assert!(err.to_string().contains("opc.tcp"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Endpoint::parse("not a url").is_err());
        assert!(Endpoint::parse("opc.tcp:///no-host").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let raw = "opc.tcp://localhost:4840/freeopcua/server/";
        assert_eq!(Endpoint::parse(raw).unwrap().to_string(), raw);
    }

    #[test]
    fn test_with_host() {
        let ep = Endpoint::parse("opc.tcp://0.0.0.0:4840/freeopcua/server/").unwrap();
        assert_eq!(
            ep.with_host("localhost").to_string(),
            "opc.tcp://localhost:4840/freeopcua/server/"
        );
    }
}
