//! Age-adjusted Trisomy 21 risk.

/// Probability of a Trisomy 21 pregnancy for a given maternal age (logistic-in-logistic fit).
///
/// Pure and strictly increasing in `age`; the result always lies in (0, 1).
pub fn age_adjusted_risk(age: f64) -> f64 {
    let inner = 4.211 / (1.0 + (-0.282 * (age - 37.23)).exp());
    1.0 / (1.0 + (7.330 - inner).exp())
}
