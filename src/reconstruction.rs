use crate::time_series::{DiffPoint, PricePoint};

/// Turns predicted differences back into absolute levels.
///
/// `forecast[i] = last_level + predicted[0] + ... + predicted[i]`, paired with
/// the date of `predicted[i]`. Output order follows the input order, which the
/// preparer guarantees is ascending by date.
pub fn reconstruct(last_level: f64, predicted: &[DiffPoint]) -> Vec<PricePoint> {
    predicted
        .iter()
        .scan(last_level, |level, point| {
            *level += point.value;
            Some(PricePoint::new(point.date, *level))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn predicted(values: &[f64]) -> Vec<DiffPoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| DiffPoint::new(start + Duration::days(i as i64), *v))
            .collect()
    }

    #[test]
    fn test_cumulative_sum_on_last_level() {
        let forecast = reconstruct(1.09, &predicted(&[0.01, 0.01, -0.02]));
        let levels: Vec<f64> = forecast.iter().map(|p| p.level).collect();
        assert!((levels[0] - 1.10).abs() < 1e-12);
        assert!((levels[1] - 1.11).abs() < 1e-12);
        assert!((levels[2] - 1.09).abs() < 1e-12);
    }

    #[test]
    fn test_dates_preserved_in_order() {
        let input = predicted(&[0.5, 0.5, 0.5]);
        let forecast = reconstruct(10.0, &input);
        let dates: Vec<NaiveDate> = forecast.iter().map(|p| p.date).collect();
        let expected: Vec<NaiveDate> = input.iter().map(|p| p.date).collect();
        assert_eq!(dates, expected);
    }

    #[test]
    fn test_rerun_is_bit_identical() {
        let input = predicted(&[0.013, -0.0071, 0.0029, 0.1]);
        let first = reconstruct(1.2345, &input);
        let second = reconstruct(1.2345, &input);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.level.to_bits(), b.level.to_bits());
        }
    }

    #[test]
    fn test_empty_prediction() {
        assert!(reconstruct(1.0, &[]).is_empty());
    }
}
