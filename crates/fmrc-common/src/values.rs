//! Floating-point comparison used for coordinate deduplication.

/// Maximum relative error for two coordinate values to be considered equal.
pub const MAX_RELATIVE_ERROR: f64 = 1.0e-8;

/// Tolerance-based equality for coordinate values.
///
/// Two values are "close enough" when their relative difference is below
/// [`MAX_RELATIVE_ERROR`]. Near zero the comparison degrades to an absolute
/// one so that 0.0 compares equal to denormal noise.
pub fn close_enough(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    let denom = a.abs().max(b.abs());
    if denom < MAX_RELATIVE_ERROR {
        return (a - b).abs() < MAX_RELATIVE_ERROR;
    }
    (a - b).abs() / denom < MAX_RELATIVE_ERROR
}

/// Pairwise tolerance equality over two slices; lengths must match.
pub fn all_close(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| close_enough(*x, *y))
}

/// Shortest round-trip decimal form of a coordinate value; `-0` collapses
/// to `0`.
pub fn fmt_f64(v: f64) -> String {
    if v == 0.0 {
        "0".to_string()
    } else {
        format!("{v}")
    }
}

/// Space-separated [`fmt_f64`] list, the form coordinate values take in
/// persisted documents.
pub fn fmt_f64_list(values: &[f64]) -> String {
    values
        .iter()
        .map(|&v| fmt_f64(v))
        .collect::<Vec<_>>()
        .join(" ")
}
