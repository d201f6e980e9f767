use std::time::Duration;

/// Configuration for the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for a single connector `execute` call; `None` disables it
    pub node_timeout: Option<Duration>,
    pub event_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_timeout: Some(Duration::from_secs(300)),
            event_buffer_size: 1000,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `PIPELINE_NODE_TIMEOUT_MS` (0 disables the
    /// deadline) and `PIPELINE_EVENT_BUFFER`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("PIPELINE_NODE_TIMEOUT_MS") {
            match raw.trim().parse::<u64>() {
                Ok(0) => config.node_timeout = None,
                Ok(ms) => config.node_timeout = Some(Duration::from_millis(ms)),
                Err(e) => tracing::warn!("Ignoring PIPELINE_NODE_TIMEOUT_MS={}: {}", raw, e),
            }
        }

        if let Some(raw) = lookup("PIPELINE_EVENT_BUFFER") {
            match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => config.event_buffer_size = size,
                Ok(_) => tracing::warn!("Ignoring PIPELINE_EVENT_BUFFER=0"),
                Err(e) => tracing::warn!("Ignoring PIPELINE_EVENT_BUFFER={}: {}", raw, e),
            }
        }

        config
    }

    pub fn with_node_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.node_timeout = timeout;
        self
    }
}
