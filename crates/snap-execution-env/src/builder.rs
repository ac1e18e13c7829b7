//! Service configuration: polling intervals, timeouts, and buffer sizes,
//! built fluently with minimum-value clamps.

use std::path::PathBuf;
use std::time::Duration;

const MIN_POLLING_INTERVAL: Duration = Duration::from_millis(100);
const MIN_UNRESPONSIVE_TIMEOUT: Duration = Duration::from_millis(100);
const MIN_CREATE_WINDOW_TIMEOUT: Duration = Duration::from_millis(50);
const MIN_EVENT_BUS_CAPACITY: usize = 16;

/// Everything the service needs to know that isn't per-job: timings,
/// transport choice, buffer sizes.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub(crate) unresponsive_polling_interval: Duration,
    pub(crate) unresponsive_timeout: Duration,
    pub(crate) create_window_timeout: Duration,
    pub(crate) event_bus_capacity: usize,
    pub(crate) worker_binary: Option<PathBuf>,
}

impl ServiceConfig {
    fn new() -> Self {
        Self {
            unresponsive_polling_interval: Duration::from_secs(5),
            unresponsive_timeout: Duration::from_secs(30),
            create_window_timeout: Duration::from_secs(60),
            event_bus_capacity: 256,
            worker_binary: None,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent builder for [`ServiceConfig`] (and, transitively, the
/// running service). Every `with_*` method clamps to a sane floor
/// rather than accepting a pathological value silently.
pub struct ServiceBuilder {
    config: ServiceConfig,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::new(),
        }
    }

    /// How often a live job's isolate is pinged to confirm it is still
    /// responsive.
    pub fn with_unresponsive_polling_interval(mut self, interval: Duration) -> Self {
        if interval >= MIN_POLLING_INTERVAL {
            self.config.unresponsive_polling_interval = interval;
        }
        self
    }

    /// How long a liveness `ping` is given to answer before the
    /// isolate is declared unresponsive.
    pub fn with_unresponsive_timeout(mut self, timeout: Duration) -> Self {
        if timeout >= MIN_UNRESPONSIVE_TIMEOUT {
            self.config.unresponsive_timeout = timeout;
        }
        self
    }

    /// How long `executeSnap`'s post-spawn handshake `ping` is given to
    /// answer before [`crate::ServiceError::HandshakeTimeout`].
    pub fn with_create_window_timeout(mut self, timeout: Duration) -> Self {
        if timeout >= MIN_CREATE_WINDOW_TIMEOUT {
            self.config.create_window_timeout = timeout;
        }
        self
    }

    /// Capacity of the [`crate::ServiceMessenger`]'s broadcast channel.
    pub fn with_event_bus_capacity(mut self, capacity: usize) -> Self {
        if capacity >= MIN_EVENT_BUS_CAPACITY {
            self.config.event_bus_capacity = capacity;
        }
        self
    }

    /// Path to the `snap-worker` binary, required to spawn
    /// child-process isolates. Unset services can still use in-process
    /// isolates.
    pub fn with_worker_binary(mut self, path: PathBuf) -> Self {
        self.config.worker_binary = Some(path);
        self
    }

    /// Get the current configuration without consuming the builder.
    pub fn get_config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Finish building, returning the assembled configuration.
    pub fn build(self) -> ServiceConfig {
        self.config
    }
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_polling_interval_below_floor() {
        let config = ServiceBuilder::new()
            .with_unresponsive_polling_interval(Duration::from_millis(1))
            .build();
        assert_eq!(config.unresponsive_polling_interval, Duration::from_secs(5));
    }

    #[test]
    fn accepts_polling_interval_at_or_above_floor() {
        let config = ServiceBuilder::new()
            .with_unresponsive_polling_interval(Duration::from_secs(1))
            .build();
        assert_eq!(config.unresponsive_polling_interval, Duration::from_secs(1));
    }

    #[test]
    fn default_config_has_sane_values() {
        let config = ServiceConfig::default();
        assert!(config.unresponsive_polling_interval >= MIN_POLLING_INTERVAL);
        assert!(config.worker_binary.is_none());
    }
}
