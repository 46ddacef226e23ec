use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency pair code as submitted on a forecast request (e.g., "EURUSD").
///
/// The code is kept exactly as submitted so that forecast rows are written
/// under the same currency value the upstream system queries by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyPair(String);

impl CurrencyPair {
    /// Creates a new currency pair from a provider code.
    ///
    /// # Arguments
    /// * `code` - The pair code (e.g., "EURUSD", "GBPJPY")
    ///
    /// # Errors
    /// Returns an error if the code is empty or contains characters other than
    /// ASCII letters and digits.
    pub fn new(code: impl Into<String>) -> Result<Self, CurrencyPairError> {
        let code = code.into();
        Self::validate(&code)?;
        Ok(CurrencyPair(code))
    }

    fn validate(code: &str) -> Result<(), CurrencyPairError> {
        if code.is_empty() {
            return Err(CurrencyPairError::EmptyCode);
        }

        if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CurrencyPairError::InvalidCharacters(code.to_string()));
        }

        Ok(())
    }

    /// Returns the pair code as submitted.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits a six-letter code into upper-cased (base, quote) ISO codes.
    ///
    /// Returns `None` for codes that are not two concatenated three-letter
    /// currency codes, e.g. "XAUUSD1" or "SPX500".
    pub fn base_quote(&self) -> Option<(String, String)> {
        if self.0.len() != 6 || !self.0.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        let upper = self.0.to_ascii_uppercase();
        Some((upper[..3].to_string(), upper[3..].to_string()))
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for CurrencyPair {
    type Error = CurrencyPairError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CurrencyPair::new(value)
    }
}

impl From<CurrencyPair> for String {
    fn from(pair: CurrencyPair) -> Self {
        pair.0
    }
}

/// Errors that can occur when validating a currency pair code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrencyPairError {
    /// The code is empty
    EmptyCode,
    /// The code contains characters other than ASCII letters and digits
    InvalidCharacters(String),
}

impl fmt::Display for CurrencyPairError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrencyPairError::EmptyCode => write!(f, "Currency pair cannot be empty"),
            CurrencyPairError::InvalidCharacters(code) => {
                write!(f, "Currency pair '{}' contains invalid characters", code)
            }
        }
    }
}

impl std::error::Error for CurrencyPairError {}
