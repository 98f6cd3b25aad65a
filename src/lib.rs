//! Runaway loop detection for reactive component trees.
//!
//! Detects a component re-rendering, or a reactive side-effect
//! re-executing, far more often than legitimate work allows within a
//! short time span. This is a development-time diagnostic: the host
//! runtime reports every render/effect occurrence explicitly, the engine
//! counts them over a trailing window, flags streams that reach the
//! configured ceiling and, for effect loops, explains the breach by
//! diffing recorded dependency snapshots by identity.
//!
//! The engine is a caller-constructed [`LoopGuard`]; there is no global
//! instance. A minimal session:
//!
//! ```
//! use loop_guard::{DepToken, DetectionConfig, LoopGuard};
//!
//! let mut guard = LoopGuard::with_config(DetectionConfig {
//!     time_window_ms: 1_000,
//!     max_executions: 3,
//!     enabled: true,
//! });
//!
//! for _ in 0..3 {
//!     guard.record_effect("Sidebar", "load", Some(vec![DepToken::new(1u32)]));
//! }
//! let hit = guard.check_effect_loop("Sidebar", "load");
//! assert!(hit.is_some());
//! assert!(guard.is_loop_blocked("Sidebar", Some("load")));
//! ```

mod analyzer;
mod clock;
mod config;
mod detector;
mod guard;
mod monitor;
mod types;

pub use analyzer::{analyze, DependencyChange, LoopAnalysis};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigUpdate, DetectionConfig};
pub use detector::{LoopDetector, SinkId};
pub use guard::LoopGuard;
pub use monitor::{RenderMonitor, HISTORY_LIMIT};
pub use types::{DepToken, EventRecord, LoopDetectionResult, LoopKey, LoopKind};
