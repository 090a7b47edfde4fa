//! Human-readable rendering of counts, prices and sizes.

/// Format a row count with thousands separators.
///
/// # Examples
///
/// ```
/// use ingest_core::formatting::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1_234_567), "1,234,567");
/// ```
pub fn format_count(count: u64) -> String {
    group_thousands(&count.to_string())
}

/// Format a price with thousands separators and two decimals.
///
/// Infinite values are the extremes of an empty aggregate and render as `"-"`.
/// Magnitudes too large to count in whole cents are printed ungrouped.
///
/// # Examples
///
/// ```
/// use ingest_core::formatting::format_price;
///
/// assert_eq!(format_price(1234.5), "1,234.50");
/// assert_eq!(format_price(-9.99), "-9.99");
/// assert_eq!(format_price(f64::INFINITY), "-");
/// ```
pub fn format_price(value: f64) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    // Cents must fit in a u64.
    if value.abs() >= 1e17 {
        return format!("{:.2}", value);
    }

    let negative = value < 0.0;
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = group_thousands(&(cents / 100).to_string());
    let body = format!("{}.{:02}", whole, cents % 100);

    if negative && cents != 0 {
        format!("-{}", body)
    } else {
        body
    }
}

/// Format a byte count using binary units.
///
/// # Examples
///
/// ```
/// use ingest_core::formatting::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(2048), "2.0 KiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = s.len() % 3;
    for (i, c) in s.chars().enumerate() {
        if i != 0 && i % 3 == remainder {
            result.push(',');
        }
        result.push(c);
    }
    result
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── format_count ─────────────────────────────────────────────────────────

    #[test]
    fn test_format_count_small() {
        assert_eq!(format_count(5), "5");
        assert_eq!(format_count(999), "999");
    }

    #[test]
    fn test_format_count_thousands() {
        assert_eq!(format_count(1_000), "1,000");
        assert_eq!(format_count(12_345), "12,345");
    }

    // ── format_price ─────────────────────────────────────────────────────────

    #[test]
    fn test_format_price_zero() {
        assert_eq!(format_price(0.0), "0.00");
    }

    #[test]
    fn test_format_price_rounds_to_cents() {
        assert_eq!(format_price(25.0), "25.00");
        assert_eq!(format_price(10.456), "10.46");
    }

    #[test]
    fn test_format_price_large() {
        assert_eq!(format_price(1_000_000.0), "1,000,000.00");
    }

    #[test]
    fn test_format_price_beyond_cent_range_is_not_saturated() {
        assert_eq!(format_price(1e20), "100000000000000000000.00");
        assert_eq!(format_price(-2e18), "-2000000000000000000.00");
        // Just below the cutoff still groups.
        assert_eq!(format_price(1e16), "10,000,000,000,000,000.00");
    }

    #[test]
    fn test_format_price_tiny_negative_is_not_signed() {
        assert_eq!(format_price(-0.001), "0.00");
    }

    #[test]
    fn test_format_price_infinities() {
        assert_eq!(format_price(f64::INFINITY), "-");
        assert_eq!(format_price(f64::NEG_INFINITY), "-");
    }

    // ── format_bytes ─────────────────────────────────────────────────────────

    #[test]
    fn test_format_bytes_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
