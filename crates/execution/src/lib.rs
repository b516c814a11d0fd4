//! Execution layer - lock derivation, schedule reconciliation, and the
//! seams to native controls and proof verification.

#![warn(missing_docs)]

pub mod lock;
pub mod clock;
pub mod config;
pub mod adapter;
pub mod reconciler;
pub mod oracle;
pub mod library;

pub use lock::{DependencyLockEngine, GateState};
pub use clock::{Clock, SystemClock, ManualClock};
pub use config::ReconcilerConfig;
pub use adapter::{NativeControlAdapter, AdapterError, NoopAdapter, LoggingAdapter};
pub use reconciler::{ScheduleReconciler, ReconcileError, Rejection, Outcome, GateChange, Reconciliation};
pub use oracle::{ValidationOracle, Verdict, OracleError, OllamaOracle, OllamaConfig, verify_and_validate};
pub use library::WorkflowLibrary;
