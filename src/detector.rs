//! Threshold-based loop detection with per-stream blocking state.

use crate::config::{ConfigUpdate, DetectionConfig};
use crate::monitor::RenderMonitor;
use crate::types::{LoopDetectionResult, LoopKey, LoopKind};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

type Sink = Arc<dyn Fn(&LoopDetectionResult) + Send + Sync>;

/// Handle identifying one sink registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

/// Per-stream detection state machine.
///
/// A stream moves from unmonitored to detected on a fresh threshold
/// breach; effect streams additionally enter a terminal blocked state.
/// Only an explicit reset, or disabling detection, leaves either state.
/// Monitor access is by parameter so detector and monitor stay
/// independently constructible.
pub struct LoopDetector {
    config: DetectionConfig,
    detected: HashSet<LoopKey>,
    blocked: HashSet<LoopKey>,
    sinks: Vec<(SinkId, Sink)>,
    next_sink_id: u64,
}

impl LoopDetector {
    /// Detector with the given thresholds.
    #[must_use]
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            detected: HashSet::new(),
            blocked: HashSet::new(),
            sinks: Vec::new(),
            next_sink_id: 0,
        }
    }

    /// Merge `update` into the live configuration.
    ///
    /// Takes effect on the next check; existing detected/blocked state
    /// is untouched.
    pub fn configure(&mut self, update: ConfigUpdate) {
        self.config.apply(update);
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn config(&self) -> DetectionConfig {
        self.config.clone()
    }

    /// Toggle detection.
    ///
    /// Disabling also clears all detected/blocked state, so a later
    /// re-enable starts fresh.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
        if !enabled {
            self.detected.clear();
            self.blocked.clear();
        }
    }

    /// Check the render stream of `component` against the threshold.
    ///
    /// Returns a result only on a fresh breach; an already-detected
    /// stream stays silent until reset.
    pub fn check_render_loop(
        &mut self,
        monitor: &RenderMonitor,
        component: &str,
    ) -> Option<LoopDetectionResult> {
        if !self.config.enabled {
            return None;
        }

        let count = monitor.render_count_within(component, self.config.time_window_ms);
        if count < self.config.max_executions {
            return None;
        }

        let key = LoopKey::render(component);
        if self.detected.contains(&key) {
            debug!(component, "render loop already reported");
            return None;
        }
        self.detected.insert(key);

        let result = LoopDetectionResult {
            component: component.to_string(),
            kind: LoopKind::Render,
            execution_count: count,
            time_window_ms: self.config.time_window_ms,
            effect_id: None,
        };
        warn!(
            component,
            count,
            window_ms = self.config.time_window_ms,
            "render loop detected"
        );
        self.notify(&result);
        Some(result)
    }

    /// Check the `(component, effect_id)` stream against the threshold.
    ///
    /// A fresh breach marks the stream both detected and blocked; once
    /// blocked, every further check is a free no-op until reset. Callers
    /// are expected to also consult [`Self::is_blocked`] so the work
    /// feeding the loop stops entirely.
    pub fn check_effect_loop(
        &mut self,
        monitor: &RenderMonitor,
        component: &str,
        effect_id: &str,
    ) -> Option<LoopDetectionResult> {
        if !self.config.enabled {
            return None;
        }

        let key = LoopKey::effect(component, effect_id);
        if self.blocked.contains(&key) {
            return None;
        }

        let count = monitor.effect_count_within(component, effect_id, self.config.time_window_ms);
        if count < self.config.max_executions {
            return None;
        }
        if self.detected.contains(&key) {
            return None;
        }
        self.detected.insert(key.clone());
        self.blocked.insert(key);

        let result = LoopDetectionResult {
            component: component.to_string(),
            kind: LoopKind::Effect,
            execution_count: count,
            time_window_ms: self.config.time_window_ms,
            effect_id: Some(effect_id.to_string()),
        };
        warn!(
            component,
            effect_id,
            count,
            window_ms = self.config.time_window_ms,
            "effect loop detected, blocking further checks"
        );
        self.notify(&result);
        Some(result)
    }

    /// Register a sink invoked on every fresh detection, in registration
    /// order. Returns the id used to unsubscribe.
    pub fn on_loop_detected(
        &mut self,
        sink: impl Fn(&LoopDetectionResult) + Send + Sync + 'static,
    ) -> SinkId {
        let id = SinkId(self.next_sink_id);
        self.next_sink_id += 1;
        self.sinks.push((id, Arc::new(sink)));
        id
    }

    /// Remove the registration behind `id`. Returns whether it existed.
    pub fn unsubscribe(&mut self, id: SinkId) -> bool {
        let before = self.sinks.len();
        self.sinks.retain(|(sink_id, _)| *sink_id != id);
        self.sinks.len() != before
    }

    /// Whether the `(component, effect_id)` stream is blocked. With no
    /// effect id this tests the render stream, which never blocks, so it
    /// is false in practice.
    #[must_use]
    pub fn is_blocked(&self, component: &str, effect_id: Option<&str>) -> bool {
        let key = match effect_id {
            Some(effect_id) => LoopKey::effect(component, effect_id),
            None => LoopKey::render(component),
        };
        self.blocked.contains(&key)
    }

    /// Drop detection state for `component` (its render stream and every
    /// effect stream), or for all streams when `None`. History clearing
    /// is the monitor's concern.
    pub fn reset(&mut self, component: Option<&str>) {
        match component {
            Some(component) => {
                self.detected.retain(|key| key.component() != component);
                self.blocked.retain(|key| key.component() != component);
            }
            None => {
                self.detected.clear();
                self.blocked.clear();
            }
        }
    }

    /// Invoke every sink with `result`.
    ///
    /// The sink list is snapshotted first, so subscriptions changed from
    /// inside a callback do not affect this pass. Each call is isolated:
    /// a panicking sink is logged and skipped, later sinks still run.
    fn notify(&self, result: &LoopDetectionResult) {
        let snapshot: Vec<Sink> = self.sinks.iter().map(|(_, sink)| Arc::clone(sink)).collect();
        for sink in snapshot {
            if catch_unwind(AssertUnwindSafe(|| sink(result))).is_err() {
                error!(
                    component = %result.component,
                    kind = ?result.kind,
                    "loop notification sink panicked, skipping"
                );
            }
        }
    }
}
