//! Two-sample Student t-test used by the validation schema.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Expected relationship between the means of `sample1` and `sample2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    GreaterThan,
    LessThan,
}

/// Outcome of the t-test on two samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TTestOutcome {
    pub statistic: f64,
    pub degrees_of_freedom: f64,
    /// Two-sided p-value.
    pub p_value: f64,
}

impl TTestOutcome {
    /// Decide the one-sided hypothesis at `alpha` using half the two-sided p-value.
    pub fn supports(&self, relationship: Relationship, alpha: f64) -> bool {
        match relationship {
            Relationship::GreaterThan => self.statistic > 0.0 && self.p_value / 2.0 < alpha,
            Relationship::LessThan => self.statistic < 0.0 && self.p_value / 2.0 < alpha,
        }
    }
}

fn mean_var(sample: &[f64]) -> (f64, f64) {
    let n = sample.len() as f64;
    let mean = sample.iter().sum::<f64>() / n;
    let var = sample.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var)
}

/// Independent two-sample t-test. Returns `None` when a sample has fewer than two values.
///
/// With `equal_var` the pooled-variance Student test is used, otherwise Welch's test.
pub fn ttest_ind(a: &[f64], b: &[f64], equal_var: bool) -> Option<TTestOutcome> {
    if a.len() < 2 || b.len() < 2 {
        return None;
    }
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (m1, v1) = mean_var(a);
    let (m2, v2) = mean_var(b);

    let (se, df) = if equal_var {
        let df = n1 + n2 - 2.0;
        let pooled = ((n1 - 1.0) * v1 + (n2 - 1.0) * v2) / df;
        ((pooled * (1.0 / n1 + 1.0 / n2)).sqrt(), df)
    } else {
        let (s1, s2) = (v1 / n1, v2 / n2);
        let df = (s1 + s2).powi(2) / (s1.powi(2) / (n1 - 1.0) + s2.powi(2) / (n2 - 1.0));
        ((s1 + s2).sqrt(), df)
    };

    let diff = m1 - m2;
    if se == 0.0 || !se.is_finite() {
        // Constant samples: either identical or infinitely far apart.
        let (statistic, p_value) = if diff == 0.0 {
            (0.0, 1.0)
        } else {
            (diff.signum() * f64::INFINITY, 0.0)
        };
        return Some(TTestOutcome {
            statistic,
            degrees_of_freedom: n1 + n2 - 2.0,
            p_value,
        });
    }

    let statistic = diff / se;
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    let p_value = (2.0 * (1.0 - dist.cdf(statistic.abs()))).clamp(0.0, 1.0);
    Some(TTestOutcome {
        statistic,
        degrees_of_freedom: df,
        p_value,
    })
}
