/// Convert a dollar amount entered on a form into whole cents.
///
/// Rounds to the nearest cent. Absent, zero and non-finite amounts map to
/// `None` so the column stays NULL rather than recording a zero price.
pub fn dollars_to_cents(dollars: Option<f64>) -> Option<i64> {
    match dollars {
        Some(d) if d.is_finite() && d != 0.0 => Some((d * 100.0).round() as i64),
        _ => None,
    }
}
