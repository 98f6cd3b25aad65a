//! Engine facade wiring the monitor, detector and analyzer together.

use crate::analyzer::{self, LoopAnalysis};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigUpdate, DetectionConfig};
use crate::detector::{LoopDetector, SinkId};
use crate::monitor::RenderMonitor;
use crate::types::{DepToken, EventRecord, LoopDetectionResult};
use std::sync::Arc;

/// Loop detection engine for one component tree.
///
/// Hosts construct one per tree (or per test) instead of sharing a
/// process-wide instance, and drive it explicitly: record each render or
/// effect occurrence as the runtime performs it, then check. Render
/// checks may be deferred by the caller until the current render pass
/// completes; effect checks are expected to run synchronously in the
/// effect phase, after dependencies are known. The engine itself is
/// synchronous and immediate.
pub struct LoopGuard {
    monitor: RenderMonitor,
    detector: LoopDetector,
}

impl LoopGuard {
    /// Engine with default thresholds and the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DetectionConfig::default())
    }

    /// Engine with explicit thresholds and the system clock.
    #[must_use]
    pub fn with_config(config: DetectionConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Engine with explicit thresholds and an injected time source.
    #[must_use]
    pub fn with_clock(config: DetectionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            monitor: RenderMonitor::new(clock),
            detector: LoopDetector::new(config),
        }
    }

    /// Engine configured from config files and environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_config(DetectionConfig::from_env())
    }

    /// Merge `update` into the live configuration.
    pub fn configure(&mut self, update: ConfigUpdate) {
        self.detector.configure(update);
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn config(&self) -> DetectionConfig {
        self.detector.config()
    }

    /// Toggle detection; disabling clears detected/blocked state.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.detector.set_enabled(enabled);
    }

    /// Record one render of `component`.
    pub fn record_render(&mut self, component: &str) {
        self.monitor.record_render(component);
    }

    /// Record one execution of `effect_id` within `component`, with the
    /// dependency snapshot the runtime saw, if any.
    pub fn record_effect(
        &mut self,
        component: &str,
        effect_id: &str,
        dependencies: Option<Vec<DepToken>>,
    ) {
        self.monitor.record_effect(component, effect_id, dependencies);
    }

    /// Renders of `component` within the trailing `window_ms`.
    #[must_use]
    pub fn render_count_within(&self, component: &str, window_ms: u64) -> usize {
        self.monitor.render_count_within(component, window_ms)
    }

    /// Executions of `(component, effect_id)` within the trailing `window_ms`.
    #[must_use]
    pub fn effect_count_within(&self, component: &str, effect_id: &str, window_ms: u64) -> usize {
        self.monitor.effect_count_within(component, effect_id, window_ms)
    }

    /// Full render history of `component`, oldest first.
    #[must_use]
    pub fn render_history(&self, component: &str) -> Vec<EventRecord> {
        self.monitor.render_history(component)
    }

    /// Full effect history of `(component, effect_id)`, oldest first.
    #[must_use]
    pub fn effect_history(&self, component: &str, effect_id: &str) -> Vec<EventRecord> {
        self.monitor.effect_history(component, effect_id)
    }

    /// Check the render stream of `component`; reports a fresh breach once.
    pub fn check_render_loop(&mut self, component: &str) -> Option<LoopDetectionResult> {
        self.detector.check_render_loop(&self.monitor, component)
    }

    /// Check the `(component, effect_id)` stream; a fresh breach blocks it.
    pub fn check_effect_loop(
        &mut self,
        component: &str,
        effect_id: &str,
    ) -> Option<LoopDetectionResult> {
        self.detector
            .check_effect_loop(&self.monitor, component, effect_id)
    }

    /// Whether a stream is blocked. Pure state read.
    #[must_use]
    pub fn is_loop_blocked(&self, component: &str, effect_id: Option<&str>) -> bool {
        self.detector.is_blocked(component, effect_id)
    }

    /// Register a sink invoked on every fresh detection.
    pub fn on_loop_detected(
        &mut self,
        sink: impl Fn(&LoopDetectionResult) + Send + Sync + 'static,
    ) -> SinkId {
        self.detector.on_loop_detected(sink)
    }

    /// Remove a sink registration. Returns whether it existed.
    pub fn unsubscribe(&mut self, id: SinkId) -> bool {
        self.detector.unsubscribe(id)
    }

    /// Drop detection state and history for `component`, or for
    /// everything when `None`.
    pub fn reset(&mut self, component: Option<&str>) {
        self.detector.reset(component);
        self.monitor.clear(component);
    }

    /// Drop recorded history only, leaving detection state alone. Hosts
    /// call this when a component is torn down without wanting to forget
    /// that its streams already reported.
    pub fn clear_history(&mut self, component: Option<&str>) {
        self.monitor.clear(component);
    }

    /// Components that currently have at least one record.
    #[must_use]
    pub fn active_components(&self) -> Vec<String> {
        self.monitor.active_components()
    }

    /// Derive causes, suggestions and (for effect loops) the dependency
    /// timeline for a detection.
    #[must_use]
    pub fn analyze(&self, detection: &LoopDetectionResult) -> LoopAnalysis {
        analyzer::analyze(&self.monitor, detection)
    }
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::LoopGuard;
    use crate::clock::ManualClock;
    use crate::config::DetectionConfig;
    use std::sync::Arc;

    fn guard(max_executions: usize) -> LoopGuard {
        LoopGuard::with_clock(
            DetectionConfig {
                time_window_ms: 1_000,
                max_executions,
                enabled: true,
            },
            Arc::new(ManualClock::default()),
        )
    }

    #[test]
    fn reset_clears_state_and_history_together() {
        let mut guard = guard(2);
        guard.record_effect("App", "fx", None);
        guard.record_effect("App", "fx", None);
        assert!(guard.check_effect_loop("App", "fx").is_some());

        guard.reset(Some("App"));
        assert!(!guard.is_loop_blocked("App", Some("fx")));
        assert!(guard.effect_history("App", "fx").is_empty());

        // Back to first-call behavior.
        guard.record_effect("App", "fx", None);
        assert!(guard.check_effect_loop("App", "fx").is_none());
    }

    #[test]
    fn clear_history_preserves_detection_state() {
        let mut guard = guard(2);
        guard.record_effect("App", "fx", None);
        guard.record_effect("App", "fx", None);
        assert!(guard.check_effect_loop("App", "fx").is_some());

        guard.clear_history(Some("App"));
        assert!(guard.effect_history("App", "fx").is_empty());
        assert!(guard.is_loop_blocked("App", Some("fx")));
    }
}
