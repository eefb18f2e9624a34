use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::PipelineError;

/// Two-sided confidence level of every interval produced here
pub const CONFIDENCE_LEVEL: f64 = 0.95;

/// Confidence interval around a sample mean
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub mean: f64,
    pub low: f64,
    pub high: f64,
}

impl Interval {
    /// `high - low`
    #[allow(dead_code)]
    pub fn width(&self) -> f64 {
        self.high - self.low
    }
}

/// Arithmetic mean; 0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator)
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean(values);
    let mut variance = 0.0;
    for v in values {
        variance += (v - mean) * (v - mean);
    }
    variance /= (values.len() - 1) as f64;
    variance.sqrt()
}

/// Two-sided Student-t critical value for `df` degrees of freedom
pub fn t_critical(df: f64) -> Option<f64> {
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some(dist.inverse_cdf(1.0 - (1.0 - CONFIDENCE_LEVEL) / 2.0))
}

/// Student-t confidence interval of the mean of the observations at time `t`.
///
/// Needs at least two observations; `StatisticsUndefined` otherwise.
pub fn t_confidence_interval(values: &[f64], t: i64) -> Result<Interval, PipelineError> {
    let n = values.len();
    let undefined = || PipelineError::StatisticsUndefined { t, observations: n };
    if n < 2 {
        return Err(undefined());
    }

    let mean = mean(values);
    let std_err = sample_std_dev(values) / (n as f64).sqrt();
    if std_err == 0.0 {
        return Ok(Interval {
            mean,
            low: mean,
            high: mean,
        });
    }

    let half_width = t_critical((n - 1) as f64).ok_or_else(undefined)? * std_err;
    Ok(Interval {
        mean,
        low: mean - half_width,
        high: mean + half_width,
    })
}
