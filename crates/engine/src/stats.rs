//! Shared variance helper for the stability metric and framework strength.

/// Population variance of a sample stream. Zero for fewer than two samples.
pub(crate) fn variance(samples: impl Iterator<Item = f64> + Clone) -> f64 {
    let count = samples.clone().count();
    if count < 2 {
        return 0.0;
    }
    let mean = samples.clone().sum::<f64>() / count as f64;
    samples.map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64
}
