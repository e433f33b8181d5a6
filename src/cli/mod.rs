//! Offline commands that work on the configured data directory without a client.

pub mod doctor;
pub mod evaluate;
pub mod policies;
pub mod stats;

/// Human-readable byte count.
pub(crate) fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
