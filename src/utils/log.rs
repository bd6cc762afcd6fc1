// src/utils/log.rs

//! Formatting helpers for multi-step progress output.
//!
//! Everything goes through the `log` facade; the binary decides where it
//! ends up.

/// Log a step in a process.
pub fn step(step_num: usize, total: usize, message: &str) {
    log::info!("[STEP {}/{}] {}", step_num, total, message);
}

/// Log an indented sub-item.
pub fn sub_item(message: &str) {
    log::info!("    {}", message);
}

/// Log a summary section.
pub fn summary(title: &str, items: &[(&str, String)]) {
    log::info!("[SUMMARY] {}", title);
    for (key, value) in items {
        log::info!("    {}: {}", key, value);
    }
}

/// Render a duration as `1m 05s` or `4.2s`.
pub fn elapsed(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}
