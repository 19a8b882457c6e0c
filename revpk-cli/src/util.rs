//! Small output helpers.

/// Format a byte quantity with SI prefixes.
pub fn format_bytes_si(bytes: i64) -> String {
    let neg = bytes < 0;
    let mut b = bytes.unsigned_abs();
    const UNIT: u64 = 1000;
    if b < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    b /= UNIT;
    while b >= UNIT {
        div *= UNIT;
        exp += 1;
        b /= UNIT;
    }
    let value = bytes.unsigned_abs() as f64 / div as f64;
    let prefix = b"kMGTPE"[exp] as char;
    if neg {
        format!("-{value:.1} {prefix}B")
    } else {
        format!("{value:.1} {prefix}B")
    }
}
