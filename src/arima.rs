//! ARIMA forecasting
//!
//! Fits an ARIMA(p, d, q) model with a constant to a univariate series and
//! produces chained out-of-sample forecasts.
//!
//! ## Estimation
//!
//! After `d` rounds of differencing, the series `w_t` with mean `mu` is modelled
//! as
//!
//! ```text
//! (w_t - mu) = sum_i phi_i (w_{t-i} - mu) + e_t + sum_j theta_j e_{t-j}
//! ```
//!
//! Parameters are estimated by conditional maximum likelihood: the sum of
//! squared one-step innovations is minimised with Nelder-Mead. AR and MA
//! coefficients are optimised through partial autocorrelations squashed with
//! `tanh`, so every candidate is stationary and invertible. The search starts
//! from the series mean and the Yule-Walker partial autocorrelations.
//!
//! ## Example
//!
//! ```rust
//! use fx_forecast::arima::{ArimaModel, ArimaOrder};
//!
//! let data: Vec<f64> = (0..40).map(|i| (i as f64 * 0.7).sin()).collect();
//! let model = ArimaModel::new(ArimaOrder::new(1, 0, 1)).unwrap();
//! let fit = model.fit(&data).unwrap();
//! assert_eq!(fit.forecast(5).len(), 5);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Model order (p, d, q).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArimaOrder {
    /// AR order
    pub p: usize,
    /// Differencing order
    pub d: usize,
    /// MA order
    pub q: usize,
}

impl ArimaOrder {
    pub const fn new(p: usize, d: usize, q: usize) -> Self {
        ArimaOrder { p, d, q }
    }
}

impl Default for ArimaOrder {
    fn default() -> Self {
        ArimaOrder::new(1, 0, 1)
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.p, self.d, self.q)
    }
}

impl FromStr for ArimaOrder {
    type Err = ModelError;

    /// Parses "1,0,1" or "(2, 0, 4)".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s.trim().trim_start_matches('(').trim_end_matches(')');
        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(ModelError::InvalidOrder(format!(
                "expected three comma-separated values, got '{}'",
                s
            )));
        }

        let parse = |raw: &str| {
            raw.parse::<usize>()
                .map_err(|_| ModelError::InvalidOrder(format!("'{}' is not a non-negative integer", raw)))
        };
        Ok(ArimaOrder::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

/// Errors raised while fitting a model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Order outside the supported range
    InvalidOrder(String),
    /// Not enough observations to estimate the parameters
    TooFewObservations { required: usize, actual: usize },
    /// Input contains NaN or infinite values
    NonFiniteInput,
    /// Optimiser hit its iteration limit
    NonConvergence { iterations: usize },
    /// Optimiser ended on a non-finite objective
    Numerical(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidOrder(msg) => write!(f, "Invalid order: {}", msg),
            ModelError::TooFewObservations { required, actual } => write!(
                f,
                "Too few observations: need {}, got {}",
                required, actual
            ),
            ModelError::NonFiniteInput => write!(f, "Series contains NaN or infinite values"),
            ModelError::NonConvergence { iterations } => {
                write!(f, "Optimiser did not converge after {} iterations", iterations)
            }
            ModelError::Numerical(msg) => write!(f, "Numerical error: {}", msg),
        }
    }
}

impl std::error::Error for ModelError {}

/// Unfitted ARIMA model: order plus optimiser settings.
#[derive(Debug, Clone)]
pub struct ArimaModel {
    order: ArimaOrder,
    max_iterations: usize,
    x_tolerance: f64,
    f_tolerance: f64,
}

impl ArimaModel {
    /// Creates a model of the given order.
    ///
    /// # Errors
    /// Returns `InvalidOrder` if p > 10, d > 2 or q > 10.
    pub fn new(order: ArimaOrder) -> Result<Self, ModelError> {
        if order.p > 10 {
            return Err(ModelError::InvalidOrder("AR order must be <= 10".to_string()));
        }
        if order.d > 2 {
            return Err(ModelError::InvalidOrder(
                "Differencing order must be <= 2".to_string(),
            ));
        }
        if order.q > 10 {
            return Err(ModelError::InvalidOrder("MA order must be <= 10".to_string()));
        }

        Ok(ArimaModel {
            order,
            max_iterations: 20_000,
            x_tolerance: 1e-5,
            f_tolerance: 1e-9,
        })
    }

    /// Caps the number of optimiser iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    /// Smallest series length the model accepts: at least one innovation
    /// left after differencing and conditioning on the first `p` values.
    pub fn required_observations(&self) -> usize {
        let ArimaOrder { p, d, .. } = self.order;
        d + p + 1
    }

    /// Fits the model to `data`.
    ///
    /// # Errors
    /// - `TooFewObservations` if `data` is shorter than `required_observations()`
    /// - `NonFiniteInput` if `data` contains NaN or infinities
    /// - `NonConvergence` / `Numerical` if the likelihood search fails
    pub fn fit(&self, data: &[f64]) -> Result<ModelFit, ModelError> {
        let required = self.required_observations();
        if data.len() < required {
            return Err(ModelError::TooFewObservations {
                required,
                actual: data.len(),
            });
        }
        if data.iter().any(|x| !x.is_finite()) {
            return Err(ModelError::NonFiniteInput);
        }

        let ArimaOrder { p, d, q } = self.order;
        let (stationary, tails) = difference(data, d);

        let n = stationary.len() as f64;
        let mean = stationary.iter().sum::<f64>() / n;
        let scale = (stationary.iter().map(|w| (w - mean).powi(2)).sum::<f64>() / n).sqrt();

        // A constant differenced series has nothing left to explain.
        if scale <= 1e-9 * mean.abs() || scale <= f64::EPSILON {
            return Ok(ModelFit {
                order: self.order,
                constant: mean,
                ar: vec![0.0; p],
                ma: vec![0.0; q],
                sigma2: 0.0,
                iterations: 0,
                residuals: vec![0.0; stationary.len()],
                history: stationary,
                tails,
            });
        }

        let standardized: Vec<f64> = stationary.iter().map(|w| (w - mean) / scale).collect();

        let mut start = vec![0.0; 1 + p + q];
        for (slot, r) in start[1..=p]
            .iter_mut()
            .zip(partial_autocorrelations(&standardized, p))
        {
            *slot = r.atanh();
        }

        let objective = |params: &[f64]| {
            let (ar, ma) = constrained_coefficients(&params[1..], p, q);
            let residuals = innovations(&standardized, params[0], &ar, &ma);
            let css = residuals[p..].iter().map(|e| e * e).sum::<f64>();
            let value = css / (standardized.len() - p) as f64;
            if value.is_finite() {
                value
            } else {
                f64::INFINITY
            }
        };

        let minimum = nelder_mead(
            objective,
            &start,
            0.5,
            self.max_iterations,
            self.x_tolerance,
            self.f_tolerance,
        )
        .map_err(|iterations| ModelError::NonConvergence { iterations })?;

        if !minimum.value.is_finite() {
            return Err(ModelError::Numerical(
                "conditional sum of squares is not finite".to_string(),
            ));
        }

        let (ar, ma) = constrained_coefficients(&minimum.point[1..], p, q);
        let constant = mean + scale * minimum.point[0];
        let centered: Vec<f64> = stationary.iter().map(|w| w - constant).collect();
        let residuals = innovations(&centered, 0.0, &ar, &ma);

        Ok(ModelFit {
            order: self.order,
            constant,
            ar,
            ma,
            sigma2: minimum.value * scale * scale,
            iterations: minimum.iterations,
            residuals,
            history: stationary,
            tails,
        })
    }
}

/// Fitted model state for one series.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFit {
    order: ArimaOrder,
    constant: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
    sigma2: f64,
    iterations: usize,
    residuals: Vec<f64>,
    /// Differenced series the model was fitted on
    history: Vec<f64>,
    /// Last value at each differencing level, outermost first
    tails: Vec<f64>,
}

impl ModelFit {
    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    /// Mean of the differenced series.
    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn ar_coefficients(&self) -> &[f64] {
        &self.ar
    }

    pub fn ma_coefficients(&self) -> &[f64] {
        &self.ma
    }

    /// Innovation variance.
    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    /// Conditional Gaussian log-likelihood; infinite for a perfect fit.
    pub fn log_likelihood(&self) -> f64 {
        let n = (self.history.len() - self.order.p) as f64;
        if self.sigma2 <= 0.0 {
            return f64::INFINITY;
        }
        -0.5 * n * ((2.0 * std::f64::consts::PI * self.sigma2).ln() + 1.0)
    }

    /// Akaike information criterion (constant and variance counted).
    pub fn aic(&self) -> f64 {
        let k = (self.order.p + self.order.q + 2) as f64;
        -2.0 * self.log_likelihood() + 2.0 * k
    }

    /// Forecasts `steps` values following the fitted window.
    ///
    /// Each step feeds the previous predictions back in as history; future
    /// innovations are taken as zero. With `d > 0` the forecasts are
    /// integrated back to the scale of the input series.
    pub fn forecast(&self, steps: usize) -> Vec<f64> {
        if steps == 0 {
            return Vec::new();
        }

        let mut centered: Vec<f64> = self.history.iter().map(|w| w - self.constant).collect();
        let mut shocks = self.residuals.clone();
        let mut forecasts = Vec::with_capacity(steps);

        for _ in 0..steps {
            let mut next = 0.0;
            for (i, phi) in self.ar.iter().enumerate() {
                if let Some(value) = centered.len().checked_sub(i + 1).map(|idx| centered[idx]) {
                    next += phi * value;
                }
            }
            for (j, theta) in self.ma.iter().enumerate() {
                if let Some(shock) = shocks.len().checked_sub(j + 1).map(|idx| shocks[idx]) {
                    next += theta * shock;
                }
            }
            centered.push(next);
            shocks.push(0.0);
            forecasts.push(next + self.constant);
        }

        integrate(forecasts, &self.tails)
    }
}

/// Differences `data` `order` times, returning the result and the last value
/// seen at each level before differencing.
fn difference(data: &[f64], order: usize) -> (Vec<f64>, Vec<f64>) {
    let mut series = data.to_vec();
    let mut tails = Vec::with_capacity(order);
    for _ in 0..order {
        tails.push(series[series.len() - 1]);
        series = series.windows(2).map(|w| w[1] - w[0]).collect();
    }
    (series, tails)
}

/// Inverse of `difference` for values that continue the series.
fn integrate(mut values: Vec<f64>, tails: &[f64]) -> Vec<f64> {
    for tail in tails.iter().rev() {
        let mut level = *tail;
        for value in values.iter_mut() {
            level += *value;
            *value = level;
        }
    }
    values
}

/// One-step innovations of `series` around `constant`; the first `ar.len()`
/// innovations are conditioned to zero.
fn innovations(series: &[f64], constant: f64, ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let p = ar.len();
    let mut residuals = vec![0.0; series.len()];
    for t in p..series.len() {
        let mut predicted = 0.0;
        for (i, phi) in ar.iter().enumerate() {
            predicted += phi * (series[t - i - 1] - constant);
        }
        for (j, theta) in ma.iter().enumerate() {
            if t > j {
                predicted += theta * residuals[t - j - 1];
            }
        }
        residuals[t] = series[t] - constant - predicted;
    }
    residuals
}

/// Maps unconstrained values to stationary AR and invertible MA coefficients.
fn constrained_coefficients(unconstrained: &[f64], p: usize, q: usize) -> (Vec<f64>, Vec<f64>) {
    let ar = from_partial_autocorrelations(&unconstrained[..p]);
    let ma = from_partial_autocorrelations(&unconstrained[p..p + q])
        .into_iter()
        .map(|a| -a)
        .collect();
    (ar, ma)
}

/// Durbin-Levinson recursion from `tanh`-squashed partial autocorrelations to
/// the coefficients of a stationary polynomial.
fn from_partial_autocorrelations(values: &[f64]) -> Vec<f64> {
    let mut coeffs = vec![0.0; values.len()];
    for k in 0..values.len() {
        let r = values[k].tanh();
        let previous = coeffs.clone();
        for j in 0..k {
            coeffs[j] = previous[j] - r * previous[k - 1 - j];
        }
        coeffs[k] = r;
    }
    coeffs
}

/// Sample partial autocorrelations up to lag `p`, clamped to (-0.9, 0.9).
fn partial_autocorrelations(series: &[f64], p: usize) -> Vec<f64> {
    let n = series.len();
    let autocov: Vec<f64> = (0..=p)
        .map(|k| {
            series[k..]
                .iter()
                .zip(series.iter())
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / n as f64
        })
        .collect();

    if autocov[0].abs() < 1e-12 {
        return vec![0.0; p];
    }
    let rho: Vec<f64> = autocov.iter().map(|c| c / autocov[0]).collect();

    let mut coeffs: Vec<f64> = Vec::with_capacity(p);
    let mut pacf = Vec::with_capacity(p);
    for k in 1..=p {
        let num = rho[k] - (1..k).map(|j| coeffs[j - 1] * rho[k - j]).sum::<f64>();
        let den = 1.0 - (1..k).map(|j| coeffs[j - 1] * rho[j]).sum::<f64>();
        let r = if den.abs() > 1e-12 { num / den } else { 0.0 };
        let r = r.clamp(-0.9, 0.9);

        let previous = coeffs.clone();
        for j in 1..k {
            coeffs[j - 1] = previous[j - 1] - r * previous[k - j - 1];
        }
        coeffs.push(r);
        pacf.push(r);
    }
    pacf
}

struct Minimum {
    point: Vec<f64>,
    value: f64,
    iterations: usize,
}

/// Nelder-Mead simplex minimisation.
///
/// Stops when both the spread of objective values and the spread of vertices
/// around the best vertex fall below their tolerances. Returns the iteration
/// count as the error when the limit is reached first.
fn nelder_mead<F>(
    objective: F,
    start: &[f64],
    step: f64,
    max_iterations: usize,
    x_tolerance: f64,
    f_tolerance: f64,
) -> Result<Minimum, usize>
where
    F: Fn(&[f64]) -> f64,
{
    const REFLECT: f64 = 1.0;
    const EXPAND: f64 = 2.0;
    const CONTRACT: f64 = 0.5;
    const SHRINK: f64 = 0.5;

    let n = start.len();
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(start.to_vec());
    for i in 0..n {
        let mut vertex = start.to_vec();
        vertex[i] += step;
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| objective(v)).collect();

    for iteration in 0..max_iterations {
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let f_spread = values[n] - values[0];
        let x_spread = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        if f_spread <= f_tolerance && x_spread <= x_tolerance {
            return Ok(Minimum {
                point: simplex[0].clone(),
                value: values[0],
                iterations: iteration,
            });
        }

        let centroid: Vec<f64> = (0..n)
            .map(|i| simplex[..n].iter().map(|v| v[i]).sum::<f64>() / n as f64)
            .collect();
        let toward = |from: &[f64], coeff: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(from)
                .map(|(c, x)| c + coeff * (x - c))
                .collect()
        };

        let reflected = toward(&simplex[n], -REFLECT);
        let f_reflected = objective(&reflected);

        if f_reflected < values[0] {
            let expanded = toward(&reflected, EXPAND);
            let f_expanded = objective(&expanded);
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                values[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                values[n] = f_reflected;
            }
            continue;
        }

        if f_reflected < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_reflected;
            continue;
        }

        let (contracted, f_contracted, accepted) = if f_reflected < values[n] {
            let point = toward(&reflected, CONTRACT);
            let value = objective(&point);
            let accepted = value <= f_reflected;
            (point, value, accepted)
        } else {
            let point = toward(&simplex[n], CONTRACT);
            let value = objective(&point);
            let accepted = value < values[n];
            (point, value, accepted)
        };

        if accepted {
            simplex[n] = contracted;
            values[n] = f_contracted;
            continue;
        }

        let best = simplex[0].clone();
        for i in 1..=n {
            simplex[i] = best
                .iter()
                .zip(&simplex[i])
                .map(|(b, x)| b + SHRINK * (x - b))
                .collect();
            values[i] = objective(&simplex[i]);
        }
    }

    Err(max_iterations)
}
