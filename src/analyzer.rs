//! Causal analysis of detected loops.

use crate::monitor::RenderMonitor;
use crate::types::{DepToken, EventRecord, LoopDetectionResult, LoopKind};
use chrono::{DateTime, Utc};

/// Explanation derived from a detection: likely causes, remediation
/// suggestions and, for effect loops, a dependency-change timeline.
#[derive(Debug, Clone)]
pub struct LoopAnalysis {
    /// The detection being explained.
    pub detection: LoopDetectionResult,
    /// Probable causes, most specific first.
    pub possible_causes: Vec<String>,
    /// Remediation suggestions, most specific first.
    pub suggestions: Vec<String>,
    /// Dependency snapshots over the recorded history (effect loops only).
    pub dependency_changes: Option<Vec<DependencyChange>>,
}

/// One effect execution's dependency snapshot, with whether it differs
/// by identity from the immediately preceding execution.
#[derive(Debug, Clone)]
pub struct DependencyChange {
    /// Execution time.
    pub timestamp: DateTime<Utc>,
    /// Snapshot recorded at that execution.
    pub dependencies: Vec<DepToken>,
    /// Whether the snapshot differs from its predecessor.
    pub changed: bool,
}

/// Derive causes, suggestions and, for effect loops, the dependency
/// timeline for a detection.
#[must_use]
pub fn analyze(monitor: &RenderMonitor, detection: &LoopDetectionResult) -> LoopAnalysis {
    match detection.kind {
        LoopKind::Render => analyze_render(detection),
        LoopKind::Effect => analyze_effect(monitor, detection),
    }
}

fn analyze_render(detection: &LoopDetectionResult) -> LoopAnalysis {
    LoopAnalysis {
        detection: detection.clone(),
        possible_causes: vec![
            "State is written during the render pass itself.".to_string(),
            "A parent component is re-rendering in rapid succession.".to_string(),
            "A fresh object or collection identity is passed as an input on every render."
                .to_string(),
        ],
        suggestions: vec![
            "Move state writes out of the render pass, into an effect or an event handler."
                .to_string(),
            "Memoize the parent boundary so its re-renders stop propagating.".to_string(),
            "Stabilize the identity of composite inputs instead of rebuilding them each render."
                .to_string(),
            "Check for code outside the component tree writing state on every pass.".to_string(),
        ],
        dependency_changes: None,
    }
}

fn analyze_effect(monitor: &RenderMonitor, detection: &LoopDetectionResult) -> LoopAnalysis {
    let mut possible_causes = Vec::new();
    let mut suggestions = Vec::new();
    let mut dependency_changes = None;

    if let Some(effect_id) = &detection.effect_id {
        let history = monitor.effect_history(&detection.component, effect_id);
        let changes = dependency_timeline(&history);

        if changes.iter().any(|change| change.changed) {
            possible_causes.extend([
                "A value in the dependency set changes identity on every execution.".to_string(),
                "The effect writes state that is itself part of its dependency set.".to_string(),
            ]);
            suggestions.extend([
                "Memoize dependency values so they are not rebuilt on every render.".to_string(),
                "Switch the state write to a previous-value update and drop that state from the \
                 dependency set."
                    .to_string(),
            ]);
        }
        dependency_changes = Some(changes);
    }

    possible_causes.extend([
        "The effect updates state that feeds back into its own dependency set.".to_string(),
        "The dependency set holds an object or collection that is rebuilt on every render."
            .to_string(),
        "An asynchronous continuation is writing state after the component was torn down."
            .to_string(),
    ]);
    suggestions.extend([
        "Use previous-value state updates inside the effect instead of reading the dependency."
            .to_string(),
        "Memoize composite dependency values.".to_string(),
        "Guard asynchronous continuations so they stop after teardown.".to_string(),
        "Trim the dependency set to the values the effect actually reads.".to_string(),
    ]);

    LoopAnalysis {
        detection: detection.clone(),
        possible_causes,
        suggestions,
        dependency_changes,
    }
}

/// Timeline of dependency snapshots, oldest first. The first entry never
/// counts as changed; each later entry is compared against its immediate
/// predecessor by token identity.
fn dependency_timeline(history: &[EventRecord]) -> Vec<DependencyChange> {
    history
        .iter()
        .enumerate()
        .map(|(index, record)| DependencyChange {
            timestamp: record.timestamp,
            dependencies: record.dependencies.clone().unwrap_or_default(),
            changed: index > 0
                && snapshots_differ(
                    history[index - 1].dependencies.as_deref(),
                    record.dependencies.as_deref(),
                ),
        })
        .collect()
}

/// Identity comparison, index by index. Deliberately not deep equality:
/// this is the same check the host runtime uses to re-run the effect.
fn snapshots_differ(previous: Option<&[DepToken]>, current: Option<&[DepToken]>) -> bool {
    let (Some(previous), Some(current)) = (previous, current) else {
        return false;
    };
    if previous.len() != current.len() {
        return true;
    }
    previous
        .iter()
        .zip(current)
        .any(|(prev, curr)| !prev.same_identity(curr))
}

#[cfg(test)]
mod tests {
    use super::{analyze, snapshots_differ};
    use crate::clock::ManualClock;
    use crate::monitor::RenderMonitor;
    use crate::types::{DepToken, LoopDetectionResult, LoopKind};
    use std::sync::Arc;

    fn effect_result(component: &str, effect_id: &str) -> LoopDetectionResult {
        LoopDetectionResult {
            component: component.to_string(),
            kind: LoopKind::Effect,
            execution_count: 50,
            time_window_ms: 1_000,
            effect_id: Some(effect_id.to_string()),
        }
    }

    fn monitor() -> RenderMonitor {
        RenderMonitor::new(Arc::new(ManualClock::default()))
    }

    #[test]
    fn identity_diff_semantics() {
        let shared = DepToken::new(7u32);

        // Fresh identities at every index: changed.
        assert!(snapshots_differ(
            Some(&[DepToken::new(7u32)]),
            Some(&[DepToken::new(7u32)]),
        ));
        // The same token reused: unchanged.
        assert!(!snapshots_differ(
            Some(&[shared.clone()]),
            Some(&[shared.clone()]),
        ));
        // Length mismatch: changed.
        assert!(snapshots_differ(
            Some(&[shared.clone()]),
            Some(&[shared.clone(), DepToken::new(1u8)]),
        ));
        // A missing snapshot on either side: unchanged.
        assert!(!snapshots_differ(None, Some(&[shared])));
    }

    #[test]
    fn render_analysis_is_fixed() {
        let result = LoopDetectionResult {
            component: "App".to_string(),
            kind: LoopKind::Render,
            execution_count: 80,
            time_window_ms: 1_000,
            effect_id: None,
        };
        let analysis = analyze(&monitor(), &result);
        assert_eq!(analysis.possible_causes.len(), 3);
        assert_eq!(analysis.suggestions.len(), 4);
        assert!(analysis.dependency_changes.is_none());
    }

    #[test]
    fn churning_dependencies_prepend_conditional_guidance() {
        let mut monitor = monitor();
        for _ in 0..4 {
            monitor.record_effect("App", "fx", Some(vec![DepToken::new([1, 2])]));
        }

        let analysis = analyze(&monitor, &effect_result("App", "fx"));
        assert_eq!(analysis.possible_causes.len(), 5);
        assert_eq!(analysis.suggestions.len(), 6);
        assert!(analysis.possible_causes[0].contains("changes identity"));

        let changes = analysis.dependency_changes.as_deref().unwrap_or(&[]);
        assert_eq!(changes.len(), 4);
        assert!(!changes[0].changed);
        assert!(changes[1..].iter().all(|change| change.changed));
    }

    #[test]
    fn stable_dependencies_keep_baseline_only() {
        let mut monitor = monitor();
        let stable = vec![DepToken::new("session"), DepToken::new(3u64)];
        for _ in 0..4 {
            monitor.record_effect("App", "fx", Some(stable.clone()));
        }

        let analysis = analyze(&monitor, &effect_result("App", "fx"));
        assert_eq!(analysis.possible_causes.len(), 3);
        assert_eq!(analysis.suggestions.len(), 4);

        let changes = analysis.dependency_changes.as_deref().unwrap_or(&[]);
        assert!(changes.iter().all(|change| !change.changed));
    }
}
