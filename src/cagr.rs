/// Price reached from `start` after `months` of compounding at `cagr_pct` percent a year.
///
/// Rates at or below -100% project to zero.
pub fn project_price(start: f64, cagr_pct: f64, months: u32) -> f64 {
    let growth = (1.0 + cagr_pct / 100.0).max(0.0);
    start * growth.powf(months as f64 / 12.0)
}

/// Annual growth rate, in percent, that turns `start` into `end` over `months`.
pub fn implied_cagr(start: f64, end: f64, months: u32) -> Option<f64> {
    if start <= 0.0 || end < 0.0 || months == 0 || !start.is_finite() || !end.is_finite() {
        return None;
    }
    let years = months as f64 / 12.0;
    Some(((end / start).powf(1.0 / years) - 1.0) * 100.0)
}
