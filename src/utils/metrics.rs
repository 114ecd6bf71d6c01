use crate::utils::from_env::{EnvItemInfo, FromEnv, FromEnvErr, FromEnvVar};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::{Ipv4Addr, SocketAddr};

const METRICS_PORT: &str = "METRICS_PORT";

/// Prometheus exporter configuration. This struct is intended to be loaded
/// from the env vars
///
/// The env vars it checks are:
/// - `METRICS_PORT` - optional. The port to serve the Prometheus scrape
///   endpoint on. If not specified, [`MetricsConfig::load`] will return
///   [`None`] and no exporter is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Port for the Prometheus scrape endpoint, bound on all interfaces.
    pub port: u16,
}

impl FromEnv for MetricsConfig {
    type Error = std::num::ParseIntError;

    fn inventory() -> Vec<&'static EnvItemInfo> {
        vec![&EnvItemInfo {
            var: METRICS_PORT,
            description: "Port to serve Prometheus metrics on, a u16. If missing, disables the metrics exporter.",
            optional: true,
        }]
    }

    fn from_env() -> Result<Self, FromEnvErr<Self::Error>> {
        let port = u16::from_env_var(METRICS_PORT)?;
        Ok(Self { port })
    }
}

impl MetricsConfig {
    /// Load from env vars. Returns [`None`] if `METRICS_PORT` is missing or
    /// unparsable.
    pub fn load() -> Option<Self> {
        Self::from_env().ok()
    }

    /// Install the global Prometheus recorder and serve the scrape endpoint
    /// on the configured port. Must be called within a tokio runtime.
    pub fn install(&self) -> Result<(), BuildError> {
        PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port)))
            .install()
    }
}

/// Install the Prometheus exporter if `METRICS_PORT` is set. Exporter
/// failures are logged and otherwise ignored.
pub fn init_metrics() {
    if let Some(cfg) = MetricsConfig::load() {
        if let Err(err) = cfg.install() {
            tracing::warn!(%err, port = cfg.port, "failed to install prometheus exporter");
        }
    }
}
