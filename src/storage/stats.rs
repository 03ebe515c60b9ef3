//! Statistics over a window of samples

/// Statistics for one field of a series over a time window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SeriesStats {
    pub avg: f32,
    pub min: f32,
    pub max: f32,
    /// Number of samples that contributed
    pub count: usize,
}

impl SeriesStats {
    /// Fold values into statistics, ignoring non-finite ones
    pub fn from_values<I: IntoIterator<Item = f32>>(values: I) -> Self {
        let mut sum = 0f64;
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        let mut count = 0usize;

        for value in values.into_iter().filter(|v| v.is_finite()) {
            sum += value as f64;
            min = min.min(value);
            max = max.max(value);
            count += 1;
        }

        if count == 0 {
            return Self::default();
        }

        Self {
            avg: (sum / count as f64) as f32,
            min,
            max,
            count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
