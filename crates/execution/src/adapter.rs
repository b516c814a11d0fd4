//! Native control seam.
//!
//! The reconciler calls the adapter after a gate transition has been
//! persisted. Failures are logged by the caller and never undo the
//! transition.

use tracing::info;

/// Error raised by a native control adapter.
#[derive(Debug, thiserror::Error)]
#[error("native control failed: {0}")]
pub struct AdapterError(pub String);

/// Applies focus lock state to OS-visible window effects.
pub trait NativeControlAdapter: Send + Sync {
    /// Keep the window above all others.
    fn set_always_on_top(&self, on: bool) -> Result<(), AdapterError>;

    /// Cover the screen.
    fn set_fullscreen(&self, on: bool) -> Result<(), AdapterError>;
}

/// Adapter that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAdapter;

impl NativeControlAdapter for NoopAdapter {
    fn set_always_on_top(&self, _on: bool) -> Result<(), AdapterError> {
        Ok(())
    }

    fn set_fullscreen(&self, _on: bool) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// Adapter that only logs what it would do.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingAdapter;

impl NativeControlAdapter for LoggingAdapter {
    fn set_always_on_top(&self, on: bool) -> Result<(), AdapterError> {
        info!(on, "always-on-top");
        Ok(())
    }

    fn set_fullscreen(&self, on: bool) -> Result<(), AdapterError> {
        info!(on, "fullscreen");
        Ok(())
    }
}
