use crate::utils::from_env::{EnvItemInfo, FromEnv, FromEnvErr, FromEnvVar};
use std::convert::Infallible;

// Environment variable names for configuration
const PROJECT_ID: &str = "ERRLIGHT_PROJECT_ID";
const SERVICE_NAME: &str = "ERRLIGHT_SERVICE_NAME";
const SERVICE_VERSION: &str = "ERRLIGHT_SERVICE_VERSION";

const UNKNOWN_SERVICE: &str = "unknown-service";
const UNKNOWN_VERSION: &str = "unknown";

/// Identifies the service that error events are reported for.
///
/// Constructed once at process start and immutable afterwards. Every error
/// event sent upstream is tagged with these values, and they are also set on
/// the OTLP resource so that the telemetry backend can attribute spans to the
/// right project.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ServiceIdentity {
    /// The project key at the telemetry backend. May be numeric or an opaque
    /// string, depending on the backend.
    project_id: String,
    /// Human-readable service name, e.g. `my-app`.
    service_name: String,
    /// Service version. Commonly a semver string or a git SHA.
    service_version: String,
}

impl ServiceIdentity {
    /// Creates a new `ServiceIdentity` from the given parts.
    pub fn new(
        project_id: impl Into<String>,
        service_name: impl Into<String>,
        service_version: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            service_name: service_name.into(),
            service_version: service_version.into(),
        }
    }

    /// The project key at the telemetry backend.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// The service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The service version.
    pub fn service_version(&self) -> &str {
        &self.service_version
    }
}

impl Default for ServiceIdentity {
    fn default() -> Self {
        Self::new("0", UNKNOWN_SERVICE, UNKNOWN_VERSION)
    }
}

impl FromEnv for ServiceIdentity {
    type Error = Infallible;

    fn inventory() -> Vec<&'static EnvItemInfo> {
        vec![
            &EnvItemInfo {
                var: PROJECT_ID,
                description: "Project key at the telemetry backend, a string.",
                optional: false,
            },
            &EnvItemInfo {
                var: SERVICE_NAME,
                description: "Service name used to tag error events. Defaults to `unknown-service`.",
                optional: true,
            },
            &EnvItemInfo {
                var: SERVICE_VERSION,
                description: "Service version used to tag error events, e.g. a git SHA. Defaults to `unknown`.",
                optional: true,
            },
        ]
    }

    fn from_env() -> Result<Self, FromEnvErr<Self::Error>> {
        let project_id = String::from_env_var(PROJECT_ID)?;
        let service_name =
            String::from_env_var(SERVICE_NAME).unwrap_or_else(|_| UNKNOWN_SERVICE.into());
        let service_version =
            String::from_env_var(SERVICE_VERSION).unwrap_or_else(|_| UNKNOWN_VERSION.into());

        Ok(Self {
            project_id,
            service_name,
            service_version,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn clear_env() {
        std::env::remove_var(PROJECT_ID);
        std::env::remove_var(SERVICE_NAME);
        std::env::remove_var(SERVICE_VERSION);
    }

    #[test]
    #[serial_test::serial]
    fn test_env_read() {
        std::env::set_var(PROJECT_ID, "11983");
        std::env::set_var(SERVICE_NAME, "my-app");
        std::env::set_var(SERVICE_VERSION, "git-sha");

        let identity = ServiceIdentity::from_env().unwrap();
        assert_eq!(identity, ServiceIdentity::new("11983", "my-app", "git-sha"));
        clear_env();
    }

    #[test]
    #[serial_test::serial]
    fn test_defaults() {
        std::env::set_var(PROJECT_ID, "11983");

        let identity = ServiceIdentity::from_env().unwrap();
        assert_eq!(identity.service_name(), UNKNOWN_SERVICE);
        assert_eq!(identity.service_version(), UNKNOWN_VERSION);
        clear_env();
    }

    #[test]
    #[serial_test::serial]
    fn test_missing_project() {
        clear_env();
        assert!(ServiceIdentity::from_env().is_err());
        assert!(ServiceIdentity::check_inventory().is_err());
    }
}
