//! Overlay camera kept in lock-step with the host map camera.

/// Host matrix intake, scene model composition and repaint requests.
pub mod sync;
