use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration of the container sandbox.
///
/// Supplied by an external configuration-loading collaborator; immutable
/// for the lifetime of the executor it is given to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Container runtime binary (`docker`, `podman`)
    pub runtime: String,
    /// Image to run agent commands in
    pub image: String,
    /// Memory limit passed to the runtime (e.g. `2g`)
    pub memory_limit: Option<String>,
    /// CPU limit passed to the runtime
    pub cpu_limit: Option<f64>,
    /// Whether the container gets network access
    pub network_enabled: bool,
    /// Extra environment for in-container commands
    pub env: BTreeMap<String, String>,
    /// Mount point of the step workspace inside the container
    pub workdir: String,
    /// Default wall-clock limit for in-container commands
    pub default_timeout: Duration,
}

impl ContainerConfig {
    /// Default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a different runtime binary.
    #[inline]
    #[must_use]
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    /// With a different image.
    #[inline]
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// With a memory limit.
    #[inline]
    #[must_use]
    pub fn with_memory_limit(mut self, limit: impl Into<String>) -> Self {
        self.memory_limit = Some(limit.into());
        self
    }

    /// With a different default command timeout.
    #[inline]
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            image: "ubuntu:24.04".to_string(),
            memory_limit: Some("2g".to_string()),
            cpu_limit: Some(2.0),
            network_enabled: false,
            env: BTreeMap::new(),
            workdir: "/workspace".to_string(),
            default_timeout: Duration::from_secs(300),
        }
    }
}
