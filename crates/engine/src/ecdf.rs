//! Empirical distribution of historical returns, fit once and queried for
//! quantiles by the quantile-driven rebalance policy.

/// Empirical CDF over a return sample, with inverse lookup by linear
/// interpolation between order statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct EmpiricalCdf {
    sorted: Vec<f64>,
}

impl EmpiricalCdf {
    pub fn fit(samples: &[f64]) -> Result<Self, &'static str> {
        if samples.is_empty() {
            return Err("Empty sample");
        }
        if samples.iter().any(|x| !x.is_finite()) {
            return Err("Sample contains non-finite values");
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Ok(Self { sorted })
    }

    /// Fraction of the sample at or below `x`.
    pub fn cdf(&self, x: f64) -> f64 {
        let count = self.sorted.partition_point(|&s| s <= x);
        count as f64 / self.sorted.len() as f64
    }

    /// Return value at the given probability level.
    pub fn inverse_cdf(&self, probability: f64) -> Result<f64, &'static str> {
        if !(0.0..=1.0).contains(&probability) {
            return Err("Probability outside [0, 1]");
        }
        let n = self.sorted.len();
        if n == 1 {
            return Ok(self.sorted[0]);
        }
        let pos = probability * (n - 1) as f64;
        let idx = pos.floor() as usize;
        if idx + 1 >= n {
            return Ok(self.sorted[n - 1]);
        }
        let frac = pos - idx as f64;
        Ok(self.sorted[idx] * (1.0 - frac) + self.sorted[idx + 1] * frac)
    }
}
