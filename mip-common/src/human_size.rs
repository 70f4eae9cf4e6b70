//! Human-readable byte sizes for user-facing messages

/// Bytes in one binary megabyte
pub const MB: u64 = 1024 * 1024;

/// Bytes in one binary gigabyte
pub const GB: u64 = 1024 * MB;

/// Format bytes for human-readable display
///
/// Whole multiples are printed without decimals so ceilings read naturally
/// ("100 MB", "2 GB"), everything else with one or two decimals.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < MB {
        format_unit(bytes, 1024, "KB", 1)
    } else if bytes < GB {
        format_unit(bytes, MB, "MB", 1)
    } else {
        format_unit(bytes, GB, "GB", 2)
    }
}

fn format_unit(bytes: u64, unit: u64, suffix: &str, decimals: usize) -> String {
    if bytes % unit == 0 {
        format!("{} {}", bytes / unit, suffix)
    } else {
        format!("{:.*} {}", decimals, bytes as f64 / unit as f64, suffix)
    }
}
