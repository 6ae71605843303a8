//! Window statistics over price slices.

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by N).
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values
        .iter()
        .map(|v| {
            let d = *v - m;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    Some(variance.sqrt())
}

/// Consecutive differences `values[i + 1] - values[i]`.
pub fn deltas(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Number of adjacent pairs whose signs flip. Zero deltas never count.
pub fn sign_changes(deltas: &[f64]) -> usize {
    deltas.windows(2).filter(|w| w[0] * w[1] < 0.0).count()
}

pub fn mean_abs(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| v.abs()).sum::<f64>() / values.len() as f64
}

/// Net move over total path length, in `[0, 1]`. Zero for a flat path.
pub fn efficiency_ratio(deltas: &[f64]) -> f64 {
    let path: f64 = deltas.iter().map(|d| d.abs()).sum();
    if path <= f64::EPSILON {
        return 0.0;
    }
    (deltas.iter().sum::<f64>().abs() / path).min(1.0)
}

/// Pearson correlation of two equally long series. `None` when either side
/// has no variance or fewer than two points.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let ma = mean(a)?;
    let mb = mean(b)?;
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - ma;
        let dy = y - mb;
        cov += dx * dy;
        va += dx * dx;
        vb += dy * dy;
    }
    if va <= f64::EPSILON || vb <= f64::EPSILON {
        return None;
    }
    let r = cov / (va.sqrt() * vb.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Pearson correlation over the last `min(a.len(), b.len())` points of each side.
pub fn tail_aligned_pearson(a: &[f64], b: &[f64], min_points: usize) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < min_points.max(2) {
        return None;
    }
    pearson(&a[a.len() - n..], &b[b.len() - n..])
}
