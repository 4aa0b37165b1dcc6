// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RpcProtocol {
    Http,
    Https,
    Ws,
    Wss,
}

impl RpcProtocol {
    pub fn is_websocket(&self) -> bool {
        matches!(self, RpcProtocol::Ws | RpcProtocol::Wss)
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, RpcProtocol::Https | RpcProtocol::Wss)
    }
}

/// A validated JSON-RPC endpoint.
///
/// Local development nodes and relayers are both addressed through this type so
/// that a malformed URL is rejected at configuration time rather than on the
/// first request.
#[derive(Clone, PartialEq, Eq)]
pub struct RpcEndpoint {
    protocol: RpcProtocol,
    url: Url,
}

impl RpcEndpoint {
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).context("Invalid URL format")?;
        let protocol = match parsed.scheme() {
            "http" => RpcProtocol::Http,
            "https" => RpcProtocol::Https,
            "ws" => RpcProtocol::Ws,
            "wss" => RpcProtocol::Wss,
            _ => bail!("Invalid protocol. Expected: http://, https://, ws://, wss://"),
        };

        if parsed.host_str().is_none() {
            bail!("URL must contain a host");
        }

        Ok(RpcEndpoint {
            protocol,
            url: parsed,
        })
    }

    pub fn protocol(&self) -> RpcProtocol {
        self.protocol
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn hostname(&self) -> &str {
        // from_url rejects host-less URLs
        self.url.host_str().unwrap_or_default()
    }

    /// The URL as written, without the trailing slash `Url` adds to bare hosts.
    pub fn as_str(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }

    /// JSON-RPC over HTTP is what the probes and the relayer speak, so websocket
    /// endpoints are downgraded to their http(s) counterpart.
    pub fn as_http_url(&self) -> Result<Url> {
        if !self.protocol.is_websocket() {
            return Ok(self.url.clone());
        }
        let mut parsed = self.url.clone();
        let scheme = if self.protocol.is_secure() {
            "https"
        } else {
            "http"
        };
        parsed
            .set_scheme(scheme)
            .map_err(|_| anyhow!("http(s) are valid schemes"))?;
        Ok(parsed)
    }

    /// Join a path such as `v1/keyurl` onto the endpoint.
    pub fn join(&self, path: &str) -> Result<Url> {
        let mut base = self.as_http_url()?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(path.trim_start_matches('/'))
            .with_context(|| format!("Cannot join '{}' onto '{}'", path, self.as_str()))
    }

    pub fn is_local(&self) -> bool {
        match self.hostname() {
            "localhost" | "127.0.0.1" | "::1" | "[::1]" => true,
            host => host.starts_with("127."),
        }
    }
}

impl FromStr for RpcEndpoint {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RpcEndpoint::from_url(s)
    }
}

impl fmt::Display for RpcEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for RpcEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RpcEndpoint({})", self.as_str())
    }
}

impl Serialize for RpcEndpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RpcEndpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        RpcEndpoint::from_url(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_scheme() {
        assert!(RpcEndpoint::from_url("ftp://localhost:8545").is_err());
        assert!(RpcEndpoint::from_url("not a url").is_err());
    }

    #[test]
    fn test_local_detection() -> Result<()> {
        assert!(RpcEndpoint::from_url("http://localhost:8545")?.is_local());
        assert!(RpcEndpoint::from_url("http://127.0.0.2:8545")?.is_local());
        assert!(!RpcEndpoint::from_url("https://relayer.testnet.zama.cloud")?.is_local());
        Ok(())
    }

    #[test]
    fn test_ws_is_downgraded_for_http_calls() -> Result<()> {
        let rpc = RpcEndpoint::from_url("wss://node.example.org/rpc")?;
        assert_eq!(rpc.as_http_url()?.as_str(), "https://node.example.org/rpc");
        Ok(())
    }

    #[test]
    fn test_display_keeps_original_form() -> Result<()> {
        let rpc = RpcEndpoint::from_url("http://localhost:8545")?;
        assert_eq!(rpc.to_string(), "http://localhost:8545");
        Ok(())
    }

    #[test]
    fn test_join_paths() -> Result<()> {
        let relayer = RpcEndpoint::from_url("https://relayer.example.org")?;
        assert_eq!(
            relayer.join("v1/keyurl")?.as_str(),
            "https://relayer.example.org/v1/keyurl"
        );
        let nested = RpcEndpoint::from_url("https://relayer.example.org/api")?;
        assert_eq!(
            nested.join("/v1/input-proof")?.as_str(),
            "https://relayer.example.org/api/v1/input-proof"
        );
        Ok(())
    }
}
