use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use super::ProxyRoute;
use crate::config::ProbeConfig;

/// Result of an egress probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EgressIp {
    Address(String),
    Unknown,
}

impl EgressIp {
    pub fn as_str(&self) -> &str {
        match self {
            EgressIp::Address(ip) => ip,
            EgressIp::Unknown => "Unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, EgressIp::Address(_))
    }
}

impl fmt::Display for EgressIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IP-echo response body; httpbin answers `origin`, ipify answers `ip`
#[derive(Debug, Deserialize)]
struct EchoBody {
    origin: Option<String>,
    ip: Option<String>,
}

/// Asks a public IP-echo service which address a request leaves from.
///
/// Purely informational: every failure degrades to [`EgressIp::Unknown`].
#[derive(Debug, Clone)]
pub struct EgressIpProbe {
    echo_url: String,
    timeout: Duration,
}

impl EgressIpProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            echo_url: config.echo_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Probe through `route`, or directly when `route` is `None`
    pub async fn probe(&self, route: Option<&ProxyRoute>) -> EgressIp {
        let descriptor = route
            .map(|r| r.descriptor())
            .unwrap_or_else(|| "direct".to_string());

        match self.try_probe(route).await {
            Ok(ip) => {
                tracing::info!(route = %descriptor, egress_ip = %ip, "Egress probe succeeded");
                EgressIp::Address(ip)
            }
            Err(reason) => {
                tracing::warn!(route = %descriptor, %reason, "Egress probe failed");
                EgressIp::Unknown
            }
        }
    }

    async fn try_probe(&self, route: Option<&ProxyRoute>) -> Result<String, String> {
        let mut builder = Client::builder().timeout(self.timeout);
        if let Some(route) = route {
            let proxy = route
                .to_reqwest_proxy()
                .map_err(|e| format!("invalid proxy: {}", e))?;
            builder = builder.proxy(proxy);
        } else {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| format!("client build failed: {}", e))?;

        let response = client
            .get(&self.echo_url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(format!("status {}", response.status()));
        }

        let body: EchoBody = response
            .json()
            .await
            .map_err(|e| format!("unparsable body: {}", e))?;

        body.origin
            .or(body.ip)
            .filter(|ip| !ip.trim().is_empty())
            .ok_or_else(|| "no IP in response".to_string())
    }
}
