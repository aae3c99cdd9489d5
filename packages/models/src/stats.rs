//! Summary statistics of a station's results.

use serde::{Deserialize, Serialize};

use crate::validation::{Rule, Violations};

/// Summary statistics over `count` result values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Median (approximate once merged).
    pub median: f64,
    /// Number of values summarised.
    pub count: u64,
}

impl Stats {
    /// Statistics of zero values.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            median: 0.0,
            count: 0,
        }
    }

    /// Statistics of a slice of values; non-finite values are skipped.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_values(values: &[f64]) -> Self {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return Self::empty();
        }
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            f64::midpoint(sorted[n / 2 - 1], sorted[n / 2])
        };
        Self {
            min: sorted[0],
            max: sorted[n - 1],
            mean: sorted.iter().sum::<f64>() / n as f64,
            median,
            count: n as u64,
        }
    }

    /// Combines the statistics of two disjoint sets of values.
    ///
    /// `min`, `max`, `mean` and `count` are exact. The median of the union
    /// cannot be recovered from two medians, so it is approximated by the
    /// count-weighted mean of both medians, clamped to `[min, max]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn merge(&self, other: &Self) -> Self {
        if other.count == 0 {
            return *self;
        }
        if self.count == 0 {
            return *other;
        }

        let (a, b) = (self.count as f64, other.count as f64);
        let total = a + b;
        let min = self.min.min(other.min);
        let max = self.max.max(other.max);
        Self {
            min,
            max,
            mean: self.mean.mul_add(a, other.mean * b) / total,
            median: (self.median.mul_add(a, other.median * b) / total).clamp(min, max),
            count: self.count.saturating_add(other.count),
        }
    }

    pub(crate) fn check(&self, field: &str, violations: &mut Violations) {
        let mut finite = true;
        for (name, value) in [
            ("min", self.min),
            ("max", self.max),
            ("mean", self.mean),
            ("median", self.median),
        ] {
            finite &= violations.finite(&format!("{field}.{name}"), value);
        }
        if !finite || self.count == 0 {
            return;
        }

        for (name, value) in [("mean", self.mean), ("median", self.median)] {
            violations.ensure(
                self.min <= value && value <= self.max,
                &format!("{field}.{name}"),
                Rule::StatsOrder,
                format!("{value} is outside [{}, {}]", self.min, self.max),
            );
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(values: &[f64]) -> Stats {
        Stats::from_values(values)
    }

    #[test]
    fn from_values_handles_odd_and_even_counts() {
        let odd = stats(&[3.0, 1.0, 2.0]);
        assert_eq!(odd.median, 2.0);
        assert_eq!(odd.count, 3);

        let even = stats(&[4.0, 1.0, 2.0, 3.0]);
        assert_eq!(even.median, 2.5);
        assert_eq!(even.mean, 2.5);
        assert_eq!(even.min, 1.0);
        assert_eq!(even.max, 4.0);

        assert_eq!(stats(&[f64::NAN]), Stats::empty());
    }

    #[test]
    fn merge_is_exact_for_extremes_mean_and_count() {
        let a = stats(&[1.0, 2.0, 3.0]);
        let b = stats(&[10.0]);
        let merged = a.merge(&b);

        assert_eq!(merged.min, 1.0);
        assert_eq!(merged.max, 10.0);
        assert_eq!(merged.count, 4);
        assert!((merged.mean - 4.0).abs() < 1e-12);
        assert!((merged.median - 4.0).abs() < 1e-12);
    }

    #[test]
    fn merge_with_empty_is_identity() {
        let a = stats(&[1.0, 5.0]);
        assert_eq!(a.merge(&Stats::empty()), a);
        assert_eq!(Stats::empty().merge(&a), a);
    }

    #[test]
    fn check_reports_ordering() {
        let mut v = Violations::new();
        Stats {
            min: 5.0,
            max: 1.0,
            mean: 3.0,
            median: 3.0,
            count: 2,
        }
        .check("stats", &mut v);
        let violations = v.into_vec();
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().all(|v| v.rule == Rule::StatsOrder));

        let mut v = Violations::new();
        Stats::empty().check("stats", &mut v);
        assert!(v.is_empty());
    }
}
