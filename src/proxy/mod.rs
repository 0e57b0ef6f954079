//! Outbound proxy route selection.
//!
//! Two addressing schemes are supported: a single rotating endpoint where the
//! vendor changes the exit IP per connection, and a backbone pool of `N`
//! numbered endpoints, one of which is drawn uniformly per request.

use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use crate::config::{BackbonePool, ProxyConfig, RotatingEndpoint};
use crate::utils::mask_secret;

pub mod probe;

pub use probe::{EgressIp, EgressIpProbe};

/// Which addressing scheme to route through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    Rotating,
    Backbone,
}

impl fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyMode::Rotating => write!(f, "rotating"),
            ProxyMode::Backbone => write!(f, "backbone"),
        }
    }
}

impl FromStr for ProxyMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rotating" | "rotate" => Ok(ProxyMode::Rotating),
            "backbone" => Ok(ProxyMode::Backbone),
            other => anyhow::bail!("Unknown proxy mode: {}", other),
        }
    }
}

/// Proxy account credentials. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyCredentials {
    username: String,
    password: String,
}

impl ProxyCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &mask_secret(&self.username))
            .field("password_len", &self.password.len())
            .finish()
    }
}

/// Which kind of endpoint a route points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Rotating,
    /// 1-based slot in the backbone pool
    Backbone { index: u16 },
}

/// A resolved proxy endpoint plus the credentials to present to it
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyRoute {
    pub kind: RouteKind,
    pub host: String,
    pub port: u16,
    pub username: String,
    password: String,
}

impl ProxyRoute {
    /// Human-readable descriptor, safe to log
    pub fn descriptor(&self) -> String {
        match self.kind {
            RouteKind::Rotating => format!(
                "rotating {}@{}:{}",
                mask_secret(&self.username),
                self.host,
                self.port
            ),
            RouteKind::Backbone { index } => format!(
                "backbone #{} {}@{}:{}",
                index,
                mask_secret(&self.username),
                self.host,
                self.port
            ),
        }
    }

    /// Proxy URL with percent-encoded credentials
    pub fn proxy_url(&self) -> String {
        format!(
            "http://{}:{}@{}:{}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.host,
            self.port
        )
    }

    /// Build a `reqwest::Proxy` applying to both http and https traffic
    pub fn to_reqwest_proxy(&self) -> Result<reqwest::Proxy, reqwest::Error> {
        reqwest::Proxy::all(self.proxy_url())
    }
}

impl fmt::Debug for ProxyRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

/// Reasons a route could not be built as requested
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RouteError {
    #[error("proxy username is empty")]
    EmptyUsername,

    #[error("backbone pool is empty")]
    EmptyPool,

    #[error("backbone index {index} is outside the pool of {pool_size}")]
    IndexOutOfRange { index: u16, pool_size: u16 },

    #[error("backbone port for index {index} overflows from base port {base_port}")]
    PortOverflow { index: u16, base_port: u16 },
}

/// Picks the proxy endpoint for one transcript fetch.
///
/// Pure computation: it never opens connections and never fails, falling back
/// to the first backbone slot (or the fixed rotating endpoint) when the
/// requested route cannot be built.
pub struct ProxyEndpointSelector {
    mode: ProxyMode,
    rotating: RotatingEndpoint,
    backbone: BackbonePool,
    rng: Mutex<Box<dyn rand::RngCore + Send>>,
}

impl ProxyEndpointSelector {
    pub fn new(config: &ProxyConfig) -> Self {
        Self::with_rng(config, Box::new(rand::rngs::StdRng::from_entropy()))
    }

    /// Selector drawing backbone indices from the supplied generator
    pub fn with_rng(config: &ProxyConfig, rng: Box<dyn rand::RngCore + Send>) -> Self {
        Self {
            mode: config.mode,
            rotating: config.rotating.clone(),
            backbone: config.backbone.clone(),
            rng: Mutex::new(rng),
        }
    }

    pub fn mode(&self) -> ProxyMode {
        self.mode
    }

    /// Select a route for one fetch
    pub fn select_route(&self, credentials: &ProxyCredentials) -> ProxyRoute {
        match self.mode {
            ProxyMode::Rotating => self.rotating_route(credentials),
            ProxyMode::Backbone => {
                let index = self.draw_index();
                match self.backbone_route(credentials, index) {
                    Ok(route) => route,
                    Err(e) => {
                        tracing::warn!(index, error = %e, "Backbone route construction failed, using slot #1");
                        self.fallback_backbone_route(credentials)
                    }
                }
            }
        }
    }

    /// Draw a backbone slot uniformly from `[1, pool_size]`
    pub fn draw_index(&self) -> u16 {
        let pool_size = self.backbone.pool_size.max(1);
        // A poisoned lock only means another thread panicked mid-draw; the rng is still usable
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen_range(1..=pool_size)
    }

    /// Route to backbone slot `index` (1-based)
    pub fn backbone_route(
        &self,
        credentials: &ProxyCredentials,
        index: u16,
    ) -> Result<ProxyRoute, RouteError> {
        let pool_size = self.backbone.pool_size;
        if pool_size == 0 {
            return Err(RouteError::EmptyPool);
        }
        if index == 0 || index > pool_size {
            return Err(RouteError::IndexOutOfRange { index, pool_size });
        }
        if credentials.username().is_empty() {
            return Err(RouteError::EmptyUsername);
        }

        let port = self
            .backbone
            .base_port
            .checked_add(index - 1)
            .ok_or(RouteError::PortOverflow {
                index,
                base_port: self.backbone.base_port,
            })?;

        Ok(ProxyRoute {
            kind: RouteKind::Backbone { index },
            host: self.backbone.host.clone(),
            port,
            username: format!("{}-{}", credentials.username(), index),
            password: credentials.password().to_string(),
        })
    }

    /// Route through the single rotating endpoint
    pub fn rotating_route(&self, credentials: &ProxyCredentials) -> ProxyRoute {
        ProxyRoute {
            kind: RouteKind::Rotating,
            host: self.rotating.host.clone(),
            port: self.rotating.port,
            username: format!("{}{}", credentials.username(), self.rotating.username_suffix),
            password: credentials.password().to_string(),
        }
    }

    fn fallback_backbone_route(&self, credentials: &ProxyCredentials) -> ProxyRoute {
        ProxyRoute {
            kind: RouteKind::Backbone { index: 1 },
            host: self.backbone.host.clone(),
            port: self.backbone.base_port,
            username: format!("{}-1", credentials.username()),
            password: credentials.password().to_string(),
        }
    }
}
