//! Out-of-sample accuracy of predicted differences.

use serde::Serialize;

/// Error metrics over the test horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastMetrics {
    /// Mean absolute error
    pub mae: f64,
    /// Mean squared error
    pub mse: f64,
    /// Root mean squared error
    pub rmse: f64,
}

/// Errors raised by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    /// Actual and predicted sequences differ in length
    ShapeMismatch { actual: usize, predicted: usize },
    /// Nothing to evaluate
    Empty,
}

impl std::fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluationError::ShapeMismatch { actual, predicted } => write!(
                f,
                "Shape mismatch: {} actual values vs {} predictions",
                actual, predicted
            ),
            EvaluationError::Empty => write!(f, "No values to evaluate"),
        }
    }
}

impl std::error::Error for EvaluationError {}

/// Computes MAE, MSE and RMSE of `predicted` against `actual`.
///
/// # Errors
/// Returns `ShapeMismatch` when the lengths differ and `Empty` when both are
/// empty.
///
/// # Examples
/// ```
/// use fx_forecast::evaluation::evaluate;
///
/// let metrics = evaluate(&[1.0, 2.0], &[1.5, 1.0]).unwrap();
/// assert_eq!(metrics.mae, 0.75);
/// assert_eq!(metrics.mse, 0.625);
/// ```
pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Result<ForecastMetrics, EvaluationError> {
    if actual.len() != predicted.len() {
        return Err(EvaluationError::ShapeMismatch {
            actual: actual.len(),
            predicted: predicted.len(),
        });
    }
    if actual.is_empty() {
        return Err(EvaluationError::Empty);
    }

    let n = actual.len() as f64;
    let (abs_sum, sq_sum) = actual
        .iter()
        .zip(predicted)
        .fold((0.0, 0.0), |(abs_sum, sq_sum), (a, p)| {
            let err = a - p;
            (abs_sum + err.abs(), sq_sum + err * err)
        });

    let mse = sq_sum / n;
    Ok(ForecastMetrics {
        mae: abs_sum / n,
        mse,
        rmse: mse.sqrt(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_prediction() {
        let metrics = evaluate(&[0.01, 0.02, -0.01], &[0.01, 0.02, -0.01]).unwrap();
        assert_eq!(metrics.mae, 0.0);
        assert_eq!(metrics.mse, 0.0);
        assert_eq!(metrics.rmse, 0.0);
    }

    #[test]
    fn test_known_errors() {
        let metrics = evaluate(&[1.0, -1.0, 2.0, 0.0], &[0.0, 1.0, 2.0, 3.0]).unwrap();
        // errors: 1, -2, 0, -3
        assert!((metrics.mae - 1.5).abs() < 1e-12);
        assert!((metrics.mse - 3.5).abs() < 1e-12);
        assert!((metrics.rmse - 3.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch() {
        assert_eq!(
            evaluate(&[1.0, 2.0], &[1.0]),
            Err(EvaluationError::ShapeMismatch { actual: 2, predicted: 1 })
        );
    }

    #[test]
    fn test_empty() {
        assert_eq!(evaluate(&[], &[]), Err(EvaluationError::Empty));
    }
}
