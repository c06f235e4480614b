//! Management endpoint configuration.

use serde::Deserialize;

/// Connection settings for the management service.
///
/// Consumed by whatever concrete API client binds
/// [`crate::remote::ManagerApi`]; the core itself never opens a connection.
#[derive(Clone, Deserialize)]
pub struct ManagerConfig {
    /// Management server host.
    pub host: String,
    /// Management server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Account used to authenticate. Needs at least read access.
    pub username: String,
    /// Password for the account.
    pub password: String,
    /// Management API version to speak.
    pub api_version: String,
    /// Name of the cluster to operate on.
    pub cluster_name: String,
}

fn default_port() -> u16 {
    7180
}

impl ManagerConfig {
    /// Creates a config with the default port.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        api_version: impl Into<String>,
        cluster_name: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            username: username.into(),
            password: password.into(),
            api_version: api_version.into(),
            cluster_name: cluster_name.into(),
        }
    }

    /// Sets the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

// Manual impl so the password never lands in logs.
impl std::fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("cluster_name", &self.cluster_name)
            .finish()
    }
}
