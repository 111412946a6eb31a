//! Evaluation metrics

use tabex_core::{Error, Result};

fn check_lengths(actual: usize, predicted: usize) -> Result<()> {
    if actual == predicted {
        Ok(())
    } else {
        Err(Error::shape(
            format!("{actual} predictions"),
            format!("{predicted} predictions"),
        ))
    }
}

fn errors<'a>(actual: &'a [f64], predicted: &'a [f64]) -> impl Iterator<Item = f64> + 'a {
    actual.iter().zip(predicted).map(|(a, p)| a - p)
}

/// Root mean squared error
pub fn rmse(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_lengths(actual.len(), predicted.len())?;
    let n = actual.len() as f64;
    Ok((errors(actual, predicted).map(|e| e * e).sum::<f64>() / n).sqrt())
}

/// Mean absolute error
pub fn mae(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_lengths(actual.len(), predicted.len())?;
    let n = actual.len() as f64;
    Ok(errors(actual, predicted).map(f64::abs).sum::<f64>() / n)
}

/// Mean error, `actual - predicted`
pub fn me(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_lengths(actual.len(), predicted.len())?;
    let n = actual.len() as f64;
    Ok(errors(actual, predicted).sum::<f64>() / n)
}

/// Fraction of labels predicted exactly
pub fn accuracy<S: AsRef<str>>(actual: &[S], predicted: &[S]) -> Result<f64> {
    check_lengths(actual.len(), predicted.len())?;
    let hits = actual
        .iter()
        .zip(predicted)
        .filter(|(a, p)| a.as_ref() == p.as_ref())
        .count();
    Ok(hits as f64 / actual.len() as f64)
}
