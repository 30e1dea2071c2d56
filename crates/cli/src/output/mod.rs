//! Output handling
//!
//! Commands print through a [`Formatter`], which switches between styled
//! human output and strict JSON.

pub mod formatter;

pub use formatter::Formatter;

/// Output settings from the global command-line options
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Print JSON instead of human-readable text
    pub json: bool,
    /// Disable colors
    pub no_color: bool,
    /// Suppress everything except errors
    pub quiet: bool,
    /// Show per-file detail for transfers
    pub verbose: bool,
}
