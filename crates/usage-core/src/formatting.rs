/// Format an event count with thousands separators.
///
/// # Examples
///
/// ```
/// use usage_core::formatting::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1234), "1,234");
/// assert_eq!(format_count(1_234_567), "1,234,567");
/// ```
pub fn format_count(count: u64) -> String {
    group_thousands(&count.to_string())
}

/// Format a non-negative average with thousands separators and a fixed
/// number of decimals.
///
/// # Examples
///
/// ```
/// use usage_core::formatting::format_average;
///
/// assert_eq!(format_average(2.0 / 3.0, 2), "0.67");
/// assert_eq!(format_average(1234.5, 1), "1,234.5");
/// assert_eq!(format_average(12.0, 0), "12");
/// ```
pub fn format_average(value: f64, decimals: usize) -> String {
    let fixed = format!("{:.prec$}", value.max(0.0), prec = decimals);
    match fixed.split_once('.') {
        Some((int_part, frac)) => format!("{}.{}", group_thousands(int_part), frac),
        None => group_thousands(&fixed),
    }
}

/// Share of `part` in `whole` as a percentage rounded to one decimal.
///
/// Returns `0.0` when `whole` is zero.
pub fn share_percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let raw = part as f64 / whole as f64 * 100.0;
    (raw * 10.0).round() / 10.0
}

/// A horizontal bar of `width` cells scaled so that `max` fills it.
///
/// Non-zero counts always get at least one cell so they stay visible next
/// to empty buckets.
///
/// # Examples
///
/// ```
/// use usage_core::formatting::bar;
///
/// assert_eq!(bar(5, 10, 10), "█████");
/// assert_eq!(bar(0, 10, 10), "");
/// assert_eq!(bar(1, 1000, 10), "█");
/// ```
pub fn bar(count: u64, max: u64, width: usize) -> String {
    if count == 0 || max == 0 || width == 0 {
        return String::new();
    }
    let cells = ((count as f64 / max as f64) * width as f64).round() as usize;
    "█".repeat(cells.clamp(1, width))
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert commas every three digits from the right of a digit string.
fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    if len <= 3 {
        return digits.to_string();
    }
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i != 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

// ── Tests ──────────────────────────────────────────────────────────────────────
