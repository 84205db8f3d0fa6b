// Numeric helpers shared by scoring and profile building

/// `exp(-age / scale)`: 1.0 when fresh, `e^-1` once `age == scale`
pub fn exponential_decay(age_hours: f64, scale_hours: f64) -> f64 {
    if scale_hours <= 0.0 {
        return 0.0;
    }
    (-age_hours.max(0.0) / scale_hours).exp()
}

/// `log10(value + 1) * 10`, compresses heavy-tailed counts
pub fn log_compress(value: f64) -> f64 {
    (value.max(0.0) + 1.0).log10() * 10.0
}

/// Shannon entropy of a histogram divided by `ln(k)` where `k` is the number of
/// non-empty buckets. Returns `None` for an empty histogram.
pub fn normalized_entropy<I>(counts: I) -> Option<f64>
where
    I: IntoIterator<Item = u32>,
{
    let counts: Vec<f64> = counts
        .into_iter()
        .filter(|&c| c > 0)
        .map(|c| c as f64)
        .collect();
    let total: f64 = counts.iter().sum();
    if total == 0.0 {
        return None;
    }
    if counts.len() == 1 {
        return Some(0.0);
    }

    let entropy: f64 = counts
        .iter()
        .map(|&c| {
            let p = c / total;
            -p * p.ln()
        })
        .sum();

    Some((entropy / (counts.len() as f64).ln()).clamp(0.0, 1.0))
}
