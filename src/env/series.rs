//! Index-aligned feature/outcome series.
//!
//! A [`MarketSeries`] pairs one feature row with the outcome realised at the
//! same index. Rows are time-ordered; nothing here ever shuffles them.

use serde::{Deserialize, Serialize};

use crate::core::{TrainError, TrainResult};

/// Realised side of a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The low outcome.
    Low,
    /// The high outcome.
    High,
}

impl Side {
    /// Map a boolean "is high" flag to a side.
    #[inline]
    #[must_use]
    pub fn from_is_high(is_high: bool) -> Self {
        if is_high {
            Side::High
        } else {
            Side::Low
        }
    }
}

/// Validated, time-ordered feature rows with their realised outcomes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketSeries {
    features: Vec<Vec<f32>>,
    outcomes: Vec<Side>,
    width: usize,
}

impl MarketSeries {
    /// Build a series from aligned features and outcomes.
    ///
    /// # Errors
    ///
    /// `Precondition` for empty input, mismatched lengths, ragged or
    /// zero-width rows, and non-finite feature values.
    pub fn new(features: Vec<Vec<f32>>, outcomes: Vec<Side>) -> TrainResult<Self> {
        if features.is_empty() {
            return Err(TrainError::precondition("series is empty"));
        }
        if features.len() != outcomes.len() {
            return Err(TrainError::precondition(format!(
                "{} feature rows but {} outcomes",
                features.len(),
                outcomes.len()
            )));
        }
        let width = features[0].len();
        if width == 0 {
            return Err(TrainError::precondition("feature rows have no columns"));
        }
        for (i, row) in features.iter().enumerate() {
            if row.len() != width {
                return Err(TrainError::precondition(format!(
                    "row {i} has {} columns, expected {width}",
                    row.len()
                )));
            }
            if let Some(col) = row.iter().position(|v| !v.is_finite()) {
                return Err(TrainError::precondition(format!(
                    "non-finite feature at row {i}, column {col}"
                )));
            }
        }
        Ok(Self {
            features,
            outcomes,
            width,
        })
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Always false for a constructed series.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Features per row.
    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Feature row at an index.
    #[must_use]
    pub fn row(&self, index: usize) -> &[f32] {
        &self.features[index]
    }

    /// Outcome realised at an index.
    #[must_use]
    pub fn outcome(&self, index: usize) -> Side {
        self.outcomes[index]
    }

    /// All outcomes in order.
    #[must_use]
    pub fn outcomes(&self) -> &[Side] {
        &self.outcomes
    }

    fn slice(&self, start: usize, end: usize) -> TrainResult<Self> {
        Self::new(
            self.features[start..end].to_vec(),
            self.outcomes[start..end].to_vec(),
        )
    }

    /// Split into consecutive train / validation / test segments.
    ///
    /// Boundaries are `floor(len·train_ratio)` and that plus
    /// `floor(len·val_ratio)`; the test segment takes the remainder.
    ///
    /// # Errors
    ///
    /// `Precondition` if the ratios are out of range or any segment would
    /// be empty.
    pub fn split_chronological(&self, train_ratio: f64, val_ratio: f64) -> TrainResult<SeriesSplit> {
        if !(train_ratio > 0.0 && val_ratio > 0.0 && train_ratio + val_ratio < 1.0) {
            return Err(TrainError::precondition(format!(
                "split ratios {train_ratio}/{val_ratio} must be positive and sum below 1"
            )));
        }
        let len = self.len();
        let train_end = (len as f64 * train_ratio) as usize;
        let val_end = train_end + (len as f64 * val_ratio) as usize;
        if train_end == 0 || val_end == train_end || val_end >= len {
            return Err(TrainError::precondition(format!(
                "series of {len} rows is too short for a {train_ratio}/{val_ratio} split"
            )));
        }
        Ok(SeriesSplit {
            train: self.slice(0, train_end)?,
            validation: self.slice(train_end, val_end)?,
            test: self.slice(val_end, len)?,
        })
    }
}

/// Chronological partition of one series.
#[derive(Clone, Debug)]
pub struct SeriesSplit {
    /// Earliest rows.
    pub train: MarketSeries,
    /// Rows after training.
    pub validation: MarketSeries,
    /// Latest rows.
    pub test: MarketSeries,
}

/// Per-column min–max scaling into `[0, 1]` over the fitted rows.
///
/// Fit on training rows only; later segments may fall outside `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Vec<f32>,
    max: Vec<f32>,
}

impl MinMaxScaler {
    /// Learn column ranges from a series.
    #[must_use]
    pub fn fit(series: &MarketSeries) -> Self {
        let mut min = vec![f32::INFINITY; series.width()];
        let mut max = vec![f32::NEG_INFINITY; series.width()];
        for row in &series.features {
            for (col, &v) in row.iter().enumerate() {
                min[col] = min[col].min(v);
                max[col] = max[col].max(v);
            }
        }
        Self { min, max }
    }

    /// Scale a series with the fitted ranges. Constant columns map to 0.
    ///
    /// # Errors
    ///
    /// `Precondition` if the series width differs from the fitted width.
    pub fn transform(&self, series: &MarketSeries) -> TrainResult<MarketSeries> {
        if series.width() != self.min.len() {
            return Err(TrainError::precondition(format!(
                "scaler fitted on {} columns cannot transform {}",
                self.min.len(),
                series.width()
            )));
        }
        let features = series
            .features
            .iter()
            .map(|row| {
                row.iter()
                    .zip(self.min.iter().zip(&self.max))
                    .map(|(&v, (&lo, &hi))| if hi > lo { (v - lo) / (hi - lo) } else { 0.0 })
                    .collect()
            })
            .collect();
        MarketSeries::new(features, series.outcomes.clone())
    }
}
