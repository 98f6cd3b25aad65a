//! Types for loop detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Kinds of tracked execution streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    /// Component re-render loop.
    Render,
    /// Reactive side-effect re-execution loop.
    Effect,
}

/// Identity of a tracked stream.
///
/// Render streams are keyed by component alone; effect streams also carry
/// an effect identifier. Two distinct keys are fully independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LoopKey {
    /// A component's render stream.
    Render {
        /// Component identifier.
        component: String,
    },
    /// One effect stream within a component.
    Effect {
        /// Component identifier.
        component: String,
        /// Distinguishes effects within the same component.
        effect_id: String,
    },
}

impl LoopKey {
    /// Key for a component's render stream.
    pub fn render(component: impl Into<String>) -> Self {
        Self::Render {
            component: component.into(),
        }
    }

    /// Key for one effect stream of a component.
    pub fn effect(component: impl Into<String>, effect_id: impl Into<String>) -> Self {
        Self::Effect {
            component: component.into(),
            effect_id: effect_id.into(),
        }
    }

    /// The owning component identifier.
    #[must_use]
    pub fn component(&self) -> &str {
        match self {
            Self::Render { component } | Self::Effect { component, .. } => component,
        }
    }

    /// The stream kind.
    #[must_use]
    pub const fn kind(&self) -> LoopKind {
        match self {
            Self::Render { .. } => LoopKind::Render,
            Self::Effect { .. } => LoopKind::Effect,
        }
    }
}

/// Opaque dependency value captured when an effect executes.
///
/// Identity is the unit of comparison: two tokens compare equal only when
/// they share one allocation. Cloning preserves identity; wrapping an
/// equal value in a fresh token does not. This mirrors the comparison the
/// host runtime itself uses to decide whether a dependency changed, so
/// the diagnostic stays faithful to what actually triggers re-execution.
#[derive(Clone)]
pub struct DepToken(Arc<dyn Any + Send + Sync>);

impl DepToken {
    /// Wrap a value in a token with a fresh identity.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Whether both tokens refer to the same allocation.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for DepToken {
    fn eq(&self, other: &Self) -> bool {
        self.same_identity(other)
    }
}

impl Eq for DepToken {}

impl fmt::Debug for DepToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DepToken({:p})", Arc::as_ptr(&self.0))
    }
}

/// A single recorded render or effect occurrence. Immutable once recorded.
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Owning component identifier.
    pub component: String,
    /// Effect identifier; `None` for render records.
    pub effect_id: Option<String>,
    /// Time the occurrence was recorded.
    pub timestamp: DateTime<Utc>,
    /// Per-stream occurrence number, starting at 1. Continues past
    /// eviction of older records.
    pub sequence: u64,
    /// Dependency snapshot captured alongside an effect occurrence.
    pub dependencies: Option<Vec<DepToken>>,
}

/// A fresh threshold breach.
///
/// Produced at most once per stream until the detector is reset; a
/// stream that keeps breaching after its first report stays silent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopDetectionResult {
    /// Component whose stream breached the threshold.
    pub component: String,
    /// Stream kind.
    pub kind: LoopKind,
    /// Windowed occurrence count observed at detection time.
    pub execution_count: usize,
    /// Window the count was taken over, in milliseconds.
    pub time_window_ms: u64,
    /// Effect identifier, present for effect loops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{DepToken, LoopKey, LoopKind};

    #[test]
    fn token_clone_preserves_identity() {
        let token = DepToken::new(vec![1, 2, 3]);
        let alias = token.clone();
        assert!(token.same_identity(&alias));
        assert_eq!(token, alias);
    }

    #[test]
    fn fresh_token_over_equal_value_differs() {
        let a = DepToken::new(String::from("deps"));
        let b = DepToken::new(String::from("deps"));
        assert!(!a.same_identity(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn key_accessors() {
        let render = LoopKey::render("Sidebar");
        assert_eq!(render.component(), "Sidebar");
        assert_eq!(render.kind(), LoopKind::Render);

        let effect = LoopKey::effect("Sidebar", "fetch");
        assert_eq!(effect.component(), "Sidebar");
        assert_eq!(effect.kind(), LoopKind::Effect);
        assert_ne!(render, effect);
    }
}
