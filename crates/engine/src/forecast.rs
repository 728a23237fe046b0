//! Return/volatility forecasting collaborator.
//!
//! The forecast-driven policy only sees the narrow `fit_and_forecast`
//! contract; the default implementation pairs an AR(1) mean fit with
//! RiskMetrics-style EWMA volatility.

/// One-step-ahead (or `horizon`-step) forecast of the return distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Forecast {
    pub mean: f64,
    pub sd: f64,
}

/// Fits a model over a trailing return series and produces a forecast.
pub trait ReturnForecaster {
    fn fit_and_forecast(&self, returns: &[f64], horizon: usize) -> Result<Forecast, &'static str>;
}

/// AR(1) conditional mean (ordinary least squares) with EWMA conditional
/// variance, lambda-weighted per RiskMetrics.
#[derive(Debug, Clone)]
pub struct Ar1EwmaForecaster {
    /// EWMA decay; 0.94 is the RiskMetrics daily convention.
    pub lambda: f64,
    /// Minimum trailing observations required to fit.
    pub min_observations: usize,
}

impl Default for Ar1EwmaForecaster {
    fn default() -> Self {
        Self {
            lambda: 0.94,
            min_observations: 30,
        }
    }
}

impl ReturnForecaster for Ar1EwmaForecaster {
    fn fit_and_forecast(&self, returns: &[f64], horizon: usize) -> Result<Forecast, &'static str> {
        if horizon == 0 {
            return Err("Horizon must be at least 1");
        }
        if returns.len() < self.min_observations.max(2) {
            return Err("Insufficient return history");
        }
        if returns.iter().any(|r| !r.is_finite()) {
            return Err("Return history contains non-finite values");
        }

        let n = returns.len();
        let lagged = &returns[..n - 1];
        let current = &returns[1..];
        let mean_x = mean(lagged);
        let mean_y = mean(current);

        let mut cov = 0.0;
        let mut var = 0.0;
        for (x, y) in lagged.iter().zip(current) {
            cov += (x - mean_x) * (y - mean_y);
            var += (x - mean_x) * (x - mean_x);
        }
        let phi = if var > f64::EPSILON { cov / var } else { 0.0 };
        let intercept = mean_y - phi * mean_x;

        // Iterate the AR recursion out to the horizon.
        let mut mean_forecast = returns[n - 1];
        for _ in 0..horizon {
            mean_forecast = intercept + phi * mean_forecast;
        }

        // EWMA variance seeded with the sample variance.
        let sample_var = {
            let m = mean(returns);
            returns.iter().map(|r| (r - m) * (r - m)).sum::<f64>() / n as f64
        };
        let mut variance = sample_var;
        for r in returns {
            variance = self.lambda * variance + (1.0 - self.lambda) * r * r;
        }
        let sd = (variance * horizon as f64).sqrt();

        Ok(Forecast {
            mean: mean_forecast,
            sd,
        })
    }
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}
