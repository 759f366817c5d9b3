//! Utilities module for logging, error types, and small helpers

pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use error::{ClassifierError, Result};
pub use logging::init_logging;

/// Format a probability as a percentage with two decimals, e.g. `"87.50%"`
pub fn format_percent(probability: f32) -> String {
    format!("{:.2}%", probability * 100.0)
}

/// Render a fixed-width text bar for a probability in [0, 1]
pub fn format_probability_bar(probability: f32, width: usize) -> String {
    let filled = ((probability.clamp(0.0, 1.0)) * width as f32).round() as usize;
    let empty = width.saturating_sub(filled);

    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}
