//! Series preparation
//!
//! Turns raw provider observations into the averaged price signal, its first
//! difference, and the train/test partitions the forecaster works on.

use crate::time_series::{DailyObservation, DiffPoint, PricePoint};

/// Share of the series held out for testing.
pub const DEFAULT_TEST_RATIO: f64 = 0.2;

/// Averaged series and its partitions, ready for fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSeries {
    /// Averaged level per day, ascending by date
    pub levels: Vec<PricePoint>,
    /// Older differences the model is fitted on
    pub train: Vec<DiffPoint>,
    /// Most recent differences; the forecast horizon
    pub test: Vec<DiffPoint>,
    /// Split index computed over `levels.len()`
    pub split_index: usize,
}

impl PreparedSeries {
    /// Most recent averaged level.
    pub fn last_level(&self) -> f64 {
        self.levels.last().map(|p| p.level).unwrap_or(f64::NAN)
    }

    pub fn train_values(&self) -> Vec<f64> {
        self.train.iter().map(|p| p.value).collect()
    }

    pub fn test_values(&self) -> Vec<f64> {
        self.test.iter().map(|p| p.value).collect()
    }
}

/// Errors raised while preparing a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareError {
    /// No observation had a usable numeric field
    NoUsableRows,
    /// Train or test partition would be empty
    InsufficientData { rows: usize },
}

impl std::fmt::Display for PrepareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrepareError::NoUsableRows => write!(f, "No usable rows in series"),
            PrepareError::InsufficientData { rows } => {
                write!(f, "Insufficient data: {} rows cannot fill both partitions", rows)
            }
        }
    }
}

impl std::error::Error for PrepareError {}

/// Split index over `n` rows: `floor(ratio * n) + 1`.
///
/// # Examples
/// ```
/// use fx_forecast::preparation::{split_index, DEFAULT_TEST_RATIO};
///
/// assert_eq!(split_index(10, DEFAULT_TEST_RATIO), 3);
/// assert_eq!(split_index(4, DEFAULT_TEST_RATIO), 1);
/// ```
pub fn split_index(n: usize, test_ratio: f64) -> usize {
    (test_ratio * n as f64).floor() as usize + 1
}

/// Averages each observation and sorts the result by ascending date.
///
/// Observations with no finite field are dropped. When a provider reports the
/// same day twice the first report wins.
pub fn average_levels(observations: &[DailyObservation]) -> Vec<PricePoint> {
    let mut levels: Vec<PricePoint> = observations
        .iter()
        .filter_map(|obs| obs.average().map(|level| PricePoint::new(obs.date, level)))
        .collect();
    levels.sort_by_key(|p| p.date);
    levels.dedup_by_key(|p| p.date);
    levels
}

/// First difference of an ascending level series.
///
/// The first level has no predecessor and yields no difference, so the output
/// is one shorter than the input.
pub fn first_difference(levels: &[PricePoint]) -> Vec<DiffPoint> {
    levels
        .windows(2)
        .map(|pair| DiffPoint::new(pair[1].date, pair[1].level - pair[0].level))
        .collect()
}

/// Prepares raw observations for fitting.
///
/// With `N` usable days and `s = split_index(N)`, the `N - 1` differences are
/// split so that the most recent `s - 1` form the test partition and the
/// remaining `N - s` older ones form the training partition.
///
/// # Errors
/// - `NoUsableRows` if no observation has a finite field
/// - `InsufficientData` if either partition would be empty
pub fn prepare(
    observations: &[DailyObservation],
    test_ratio: f64,
) -> Result<PreparedSeries, PrepareError> {
    let levels = average_levels(observations);
    if levels.is_empty() {
        return Err(PrepareError::NoUsableRows);
    }

    let n = levels.len();
    let split = split_index(n, test_ratio);
    let diffs = first_difference(&levels);

    // The undefined first difference belongs to the split-index block.
    let test_len = split - 1;
    if test_len == 0 || test_len >= diffs.len() {
        return Err(PrepareError::InsufficientData { rows: n });
    }

    let boundary = diffs.len() - test_len;
    let test = diffs[boundary..].to_vec();
    let train = diffs[..boundary].to_vec();

    Ok(PreparedSeries {
        levels,
        train,
        test,
        split_index: split,
    })
}
