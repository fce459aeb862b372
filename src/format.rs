//! Human-readable memory sizes.

/// Formats a kilobyte count as `KB`, `MB` or `GB` using decimal (1000)
/// steps, with two decimals below 10 and one decimal from 10 up.
pub fn format_memory(kb: u64) -> String {
    if kb < 1_000 {
        return format!("{kb}KB");
    }
    let (value, unit) = if kb < 1_000_000 {
        (kb as f64 / 1_000.0, "MB")
    } else {
        (kb as f64 / 1_000_000.0, "GB")
    };
    if value < 10.0 {
        format!("{value:.2}{unit}")
    } else {
        format!("{value:.1}{unit}")
    }
}
