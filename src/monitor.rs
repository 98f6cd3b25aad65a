//! Bounded per-stream occurrence history.

use crate::clock::Clock;
use crate::types::{DepToken, EventRecord};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Records retained per stream; older entries are evicted first.
pub const HISTORY_LIMIT: usize = 100;

/// Bounded, FIFO-evicting occurrence log per tracked stream.
///
/// Pure bookkeeping: records occurrences, answers windowed-count and
/// full-history queries. No thresholds, no notifications.
pub struct RenderMonitor {
    clock: Arc<dyn Clock>,
    renders: HashMap<String, VecDeque<EventRecord>>,
    effects: HashMap<(String, String), VecDeque<EventRecord>>,
}

impl RenderMonitor {
    /// Monitor reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            renders: HashMap::new(),
            effects: HashMap::new(),
        }
    }

    /// Record one render of `component`.
    pub fn record_render(&mut self, component: &str) {
        let timestamp = self.clock.now();
        let log = self.renders.entry(component.to_string()).or_default();
        let sequence = next_sequence(log);
        push_bounded(
            log,
            EventRecord {
                component: component.to_string(),
                effect_id: None,
                timestamp,
                sequence,
                dependencies: None,
            },
        );
    }

    /// Record one execution of `effect_id` within `component`, together
    /// with the dependency snapshot the runtime saw, if any.
    pub fn record_effect(
        &mut self,
        component: &str,
        effect_id: &str,
        dependencies: Option<Vec<DepToken>>,
    ) {
        let timestamp = self.clock.now();
        let log = self
            .effects
            .entry((component.to_string(), effect_id.to_string()))
            .or_default();
        let sequence = next_sequence(log);
        push_bounded(
            log,
            EventRecord {
                component: component.to_string(),
                effect_id: Some(effect_id.to_string()),
                timestamp,
                sequence,
                dependencies,
            },
        );
    }

    /// Renders of `component` within the trailing `window_ms`.
    #[must_use]
    pub fn render_count_within(&self, component: &str, window_ms: u64) -> usize {
        self.renders
            .get(component)
            .map_or(0, |log| count_within(log, self.cutoff(window_ms)))
    }

    /// Executions of `(component, effect_id)` within the trailing `window_ms`.
    #[must_use]
    pub fn effect_count_within(&self, component: &str, effect_id: &str, window_ms: u64) -> usize {
        self.effects
            .get(&(component.to_string(), effect_id.to_string()))
            .map_or(0, |log| count_within(log, self.cutoff(window_ms)))
    }

    /// Full render history of `component`, oldest first.
    #[must_use]
    pub fn render_history(&self, component: &str) -> Vec<EventRecord> {
        self.renders
            .get(component)
            .map_or_else(Vec::new, |log| log.iter().cloned().collect())
    }

    /// Full effect history of `(component, effect_id)`, oldest first.
    #[must_use]
    pub fn effect_history(&self, component: &str, effect_id: &str) -> Vec<EventRecord> {
        self.effects
            .get(&(component.to_string(), effect_id.to_string()))
            .map_or_else(Vec::new, |log| log.iter().cloned().collect())
    }

    /// Drop all records for `component`, or for every component when `None`.
    ///
    /// A component-scoped clear also removes every effect stream that
    /// component owns.
    pub fn clear(&mut self, component: Option<&str>) {
        match component {
            Some(component) => {
                self.renders.remove(component);
                self.effects.retain(|(owner, _), _| owner != component);
                debug!(component, "cleared history");
            }
            None => {
                self.renders.clear();
                self.effects.clear();
                debug!("cleared all history");
            }
        }
    }

    /// Components that currently have at least one record, render or effect.
    #[must_use]
    pub fn active_components(&self) -> Vec<String> {
        let mut components: Vec<String> = self
            .renders
            .keys()
            .chain(self.effects.keys().map(|(component, _)| component))
            .cloned()
            .collect();
        components.sort_unstable();
        components.dedup();
        components
    }

    fn cutoff(&self, window_ms: u64) -> DateTime<Utc> {
        let window = Duration::milliseconds(i64::try_from(window_ms).unwrap_or(i64::MAX));
        self.clock
            .now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

fn next_sequence(log: &VecDeque<EventRecord>) -> u64 {
    log.back().map_or(1, |last| last.sequence + 1)
}

fn push_bounded(log: &mut VecDeque<EventRecord>, record: EventRecord) {
    while log.len() >= HISTORY_LIMIT {
        log.pop_front();
    }
    log.push_back(record);
}

fn count_within(log: &VecDeque<EventRecord>, cutoff: DateTime<Utc>) -> usize {
    log.iter().filter(|record| record.timestamp >= cutoff).count()
}

#[cfg(test)]
mod tests {
    use super::{RenderMonitor, HISTORY_LIMIT};
    use crate::clock::ManualClock;
    use crate::types::DepToken;
    use std::sync::Arc;

    fn monitor() -> (RenderMonitor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (RenderMonitor::new(clock.clone()), clock)
    }

    #[test]
    fn unknown_stream_counts_zero() {
        let (monitor, _clock) = monitor();
        assert_eq!(monitor.render_count_within("Nope", 1_000), 0);
        assert_eq!(monitor.effect_count_within("Nope", "fx", 1_000), 0);
        assert!(monitor.render_history("Nope").is_empty());
    }

    #[test]
    fn history_is_capped_fifo() {
        let (mut monitor, _clock) = monitor();
        for _ in 0..HISTORY_LIMIT + 20 {
            monitor.record_render("App");
        }
        let history = monitor.render_history("App");
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history[0].sequence, 21);
        assert_eq!(history[HISTORY_LIMIT - 1].sequence, 120);
    }

    #[test]
    fn sequence_starts_at_one_per_stream() {
        let (mut monitor, _clock) = monitor();
        monitor.record_effect("App", "a", None);
        monitor.record_effect("App", "b", None);
        monitor.record_effect("App", "a", None);
        assert_eq!(monitor.effect_history("App", "a")[1].sequence, 2);
        assert_eq!(monitor.effect_history("App", "b")[0].sequence, 1);
    }

    #[test]
    fn window_excludes_older_records() {
        let (mut monitor, clock) = monitor();
        monitor.record_render("App");
        monitor.record_render("App");
        clock.advance_ms(2_000);
        monitor.record_render("App");
        assert_eq!(monitor.render_count_within("App", 1_000), 1);
        assert_eq!(monitor.render_history("App").len(), 3);
    }

    #[test]
    fn scoped_clear_removes_component_effects_only() {
        let (mut monitor, _clock) = monitor();
        monitor.record_render("A");
        monitor.record_effect("A", "fx", Some(vec![DepToken::new(1u8)]));
        monitor.record_render("B");
        monitor.record_effect("B", "fx", None);

        monitor.clear(Some("A"));
        assert!(monitor.render_history("A").is_empty());
        assert!(monitor.effect_history("A", "fx").is_empty());
        assert_eq!(monitor.render_history("B").len(), 1);
        assert_eq!(monitor.effect_history("B", "fx").len(), 1);
    }

    #[test]
    fn active_components_covers_both_stream_kinds() {
        let (mut monitor, _clock) = monitor();
        monitor.record_render("RenderOnly");
        monitor.record_effect("EffectOnly", "fx", None);
        assert_eq!(
            monitor.active_components(),
            vec!["EffectOnly".to_string(), "RenderOnly".to_string()]
        );

        monitor.clear(None);
        assert!(monitor.active_components().is_empty());
    }
}
