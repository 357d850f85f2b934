//! Memory coordinator
//!
//! Owns the handler table and the monitor task. The monitor only runs while
//! at least one handler is registered.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::config::{MemoryConfig, Thresholds, MIN_THRESHOLD_BYTES};
use super::probe::{MemoryProbe, ProcessMemoryProbe};
use super::{CleanupLevel, CleanupRequest};
use crate::error::Result;

/// Receives cleanup requests on behalf of one session
///
/// Implementations must not block; a session forwards the request to its
/// own task and returns.
pub trait CleanupHandler: Send + Sync + 'static {
    fn on_cleanup(&self, request: &CleanupRequest) -> Result<()>;
}

/// Trigger bookkeeping used for cooldown and escalation
#[derive(Debug, Default)]
struct TriggerState {
    last_gentle: Option<Instant>,
    last_aggressive: Option<Instant>,
    /// Usage dropped below the gentle threshold since the last gentle trigger
    recovered: bool,
}

struct Inner {
    threshold_bytes: u64,
    handlers: HashMap<String, Arc<dyn CleanupHandler>>,
    monitor: Option<JoinHandle<()>>,
    triggers: TriggerState,
}

/// Process-wide memory pressure coordinator
///
/// Constructed once and shared by `Arc` with every session.
pub struct MemoryCoordinator {
    config: MemoryConfig,
    probe: Arc<dyn MemoryProbe>,
    inner: Mutex<Inner>,
}

impl MemoryCoordinator {
    /// Create a coordinator that reads this process's resident memory
    pub fn new(config: MemoryConfig) -> Arc<Self> {
        Self::with_probe(config, Arc::new(ProcessMemoryProbe::new()))
    }

    /// Create a coordinator with a custom memory source
    pub fn with_probe(config: MemoryConfig, probe: Arc<dyn MemoryProbe>) -> Arc<Self> {
        let threshold_bytes = config.threshold_bytes.max(MIN_THRESHOLD_BYTES);
        Arc::new(Self {
            config,
            probe,
            inner: Mutex::new(Inner {
                threshold_bytes,
                handlers: HashMap::new(),
                monitor: None,
                triggers: TriggerState {
                    recovered: true,
                    ..Default::default()
                },
            }),
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Current base threshold in bytes
    pub fn threshold_bytes(&self) -> u64 {
        self.inner.lock().threshold_bytes
    }

    /// Replace the base threshold, clamped to at least 50MB
    pub fn set_threshold(&self, bytes: u64) {
        let clamped = bytes.max(MIN_THRESHOLD_BYTES);
        self.inner.lock().threshold_bytes = clamped;
        tracing::info!(
            threshold_mb = clamped / (1024 * 1024),
            "Memory threshold updated"
        );
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds::from_base(self.threshold_bytes())
    }

    /// Number of registered handlers
    pub fn registered(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    /// Whether the background monitor is running
    pub fn is_monitoring(&self) -> bool {
        self.inner
            .lock()
            .monitor
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Register a cleanup handler under a session id
    ///
    /// Replaces any handler already registered under the same id. The first
    /// registration starts the monitor when a tokio runtime is available.
    pub fn register(self: &Arc<Self>, id: impl Into<String>, handler: Arc<dyn CleanupHandler>) {
        let id = id.into();
        let mut inner = self.inner.lock();
        inner.handlers.insert(id.clone(), handler);

        if inner.monitor.is_none() {
            inner.monitor = self.spawn_monitor();
        }

        tracing::debug!(
            session = %id,
            registered = inner.handlers.len(),
            "Cleanup handler registered"
        );
    }

    /// Remove a handler; the last removal stops the monitor
    pub fn unregister(&self, id: &str) {
        let mut inner = self.inner.lock();
        if inner.handlers.remove(id).is_none() {
            return;
        }

        if inner.handlers.is_empty() {
            if let Some(task) = inner.monitor.take() {
                task.abort();
            }
        }

        tracing::debug!(
            session = %id,
            registered = inner.handlers.len(),
            "Cleanup handler unregistered"
        );
    }

    fn spawn_monitor(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.monitor_interval;

        Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                coordinator.check_pressure();
            }
        }))
    }

    /// Sample memory now and dispatch a cleanup if a threshold is crossed
    ///
    /// Returns the level that was dispatched, if any.
    pub fn check_pressure(&self) -> Option<CleanupLevel> {
        let rss = self.probe.resident_bytes();
        let now = Instant::now();

        let (request, handlers) = {
            let mut inner = self.inner.lock();
            let threshold_bytes = inner.threshold_bytes;
            let thresholds = Thresholds::from_base(threshold_bytes);
            let level = self.select_level(&mut inner.triggers, &thresholds, rss, now)?;

            let request = CleanupRequest {
                level,
                process_rss_bytes: rss,
                threshold_bytes,
            };
            let handlers: Vec<(String, Arc<dyn CleanupHandler>)> = inner
                .handlers
                .iter()
                .map(|(id, h)| (id.clone(), Arc::clone(h)))
                .collect();
            (request, handlers)
        };

        tracing::info!(
            level = %request.level,
            rss_mb = rss / (1024 * 1024),
            threshold_mb = request.threshold_bytes / (1024 * 1024),
            sessions = handlers.len(),
            "Memory pressure cleanup"
        );

        for (id, handler) in handlers {
            if let Err(e) = handler.on_cleanup(&request) {
                tracing::error!(session = %id, error = %e, "Cleanup handler failed");
            }
        }

        Some(request.level)
    }

    /// Pick the level to fire, applying cooldown and gentle escalation
    fn select_level(
        &self,
        triggers: &mut TriggerState,
        thresholds: &Thresholds,
        rss: u64,
        now: Instant,
    ) -> Option<CleanupLevel> {
        let cooldown = self.config.cleanup_cooldown;
        let within = |last: Option<Instant>, window| {
            last.is_some_and(|at| now.saturating_duration_since(at) < window)
        };

        if rss > thresholds.emergency {
            return Some(CleanupLevel::Emergency);
        }

        if rss > thresholds.aggressive {
            if within(triggers.last_aggressive, cooldown) {
                tracing::debug!("Aggressive cleanup suppressed by cooldown");
                return None;
            }
            triggers.last_aggressive = Some(now);
            return Some(CleanupLevel::Aggressive);
        }

        if rss > thresholds.gentle {
            if within(triggers.last_gentle, cooldown) {
                tracing::debug!("Gentle cleanup suppressed by cooldown");
                return None;
            }

            let escalate = !triggers.recovered && within(triggers.last_gentle, cooldown * 2);
            triggers.last_gentle = Some(now);
            triggers.recovered = false;

            if escalate {
                if within(triggers.last_aggressive, cooldown) {
                    return None;
                }
                triggers.last_aggressive = Some(now);
                tracing::debug!("Repeated gentle pressure, escalating to aggressive");
                return Some(CleanupLevel::Aggressive);
            }
            return Some(CleanupLevel::Gentle);
        }

        triggers.recovered = true;
        None
    }
}

impl Drop for MemoryCoordinator {
    fn drop(&mut self) {
        if let Some(task) = self.inner.get_mut().monitor.take() {
            task.abort();
        }
    }
}
