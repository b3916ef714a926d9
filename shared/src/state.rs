//! Component state values and the linear math used for dead reckoning

use crate::config::DEFAULT_PRECISION_DIGITS;
use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};

/// One synchronizable value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    Text(String),
    List(Vec<Value>),
}

/// Ordered values mirroring a component's sync-property declaration
pub type ComponentState = Vec<Value>;

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// Short name of the value kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::List(_) => "list",
        }
    }

    /// Checks that the value can be encoded: numbers must be finite,
    /// lists are checked recursively.
    pub fn check_serializable(&self) -> Result<(), String> {
        match self {
            Value::Number(n) if !n.is_finite() => Err(format!("number {} is not finite", n)),
            Value::Number(_) | Value::Text(_) => Ok(()),
            Value::List(values) => values.iter().try_for_each(Value::check_serializable),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::List(values)
    }
}

/// Builds a state made only of numbers
pub fn numeric_state(values: &[f64]) -> ComponentState {
    values.iter().map(|v| Value::Number(*v)).collect()
}

fn check_alignment(left: &[Value], right: &[Value]) -> SyncResult<()> {
    if left.len() != right.len() {
        return Err(SyncError::StateLengthMismatch {
            expected: left.len(),
            found: right.len(),
        });
    }

    for (position, (a, b)) in left.iter().zip(right).enumerate() {
        if a.is_list() != b.is_list() {
            return Err(SyncError::StateShapeMismatch {
                position,
                left: a.kind(),
                right: b.kind(),
            });
        }
    }

    Ok(())
}

/// Rate of change from `old` to `new` over `interval` seconds.
///
/// Numeric pairs become `(new - old) / interval`. Any other pair is a
/// discrete field and carries the newer value unchanged.
pub fn calculate_state_gradient(
    old: &[Value],
    new: &[Value],
    interval: f64,
) -> SyncResult<ComponentState> {
    check_alignment(old, new)?;

    if !interval.is_finite() || interval <= 0.0 {
        return Err(SyncError::InvalidInterval {
            interval: interval.to_string(),
        });
    }

    Ok(old
        .iter()
        .zip(new)
        .map(|(a, b)| match (a, b) {
            (Value::Number(a), Value::Number(b)) => Value::Number((b - a) / interval),
            _ => b.clone(),
        })
        .collect())
}

/// First-order step of `state` along `gradient` for `dt` seconds.
///
/// Non-numeric positions take the gradient-side value, which already holds
/// the newest discrete value.
pub fn integrate_state(state: &[Value], gradient: &[Value], dt: f64) -> SyncResult<ComponentState> {
    check_alignment(state, gradient)?;

    Ok(state
        .iter()
        .zip(gradient)
        .map(|(value, grad)| match (value, grad) {
            (Value::Number(v), Value::Number(g)) => Value::Number(v + g * dt),
            _ => grad.clone(),
        })
        .collect())
}

/// Rounds a non-integer to `digits` significant digits.
/// Integers, zero and non-finite numbers pass through.
pub fn round_to_significant(value: f64, digits: u32) -> f64 {
    if !value.is_finite() || value.fract() == 0.0 || digits == 0 {
        return value;
    }

    let magnitude = value.abs().log10().floor() as i32;
    let exponent = digits as i32 - 1 - magnitude;

    // Dividing by the power keeps results such as 1.2346 exact in the
    // nearest-double sense, multiplying by its inverse would not.
    if exponent >= 0 {
        let scale = 10f64.powi(exponent);
        if !scale.is_finite() {
            // the power of ten overflows for very small values
            return format!("{:.*e}", digits as usize - 1, value)
                .parse()
                .unwrap_or(value);
        }
        (value * scale).round() / scale
    } else {
        let scale = 10f64.powi(-exponent);
        (value / scale).round() * scale
    }
}

/// Wire precision reduction: 5 significant digits for non-integers
pub fn compress_number(value: f64) -> f64 {
    round_to_significant(value, DEFAULT_PRECISION_DIGITS)
}

/// Applies [`round_to_significant`] to every number in the state
pub fn compress_state(state: &mut [Value], digits: u32) {
    for value in state.iter_mut() {
        match value {
            Value::Number(n) => *n = round_to_significant(*n, digits),
            Value::List(values) => compress_state(values, digits),
            Value::Text(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn numbers(state: &[Value]) -> Vec<f64> {
        state.iter().filter_map(Value::as_number).collect()
    }

    #[test]
    fn test_gradient_and_integration() {
        let s0 = numeric_state(&[0.0, 10.0]);
        let s1 = numeric_state(&[2.0, 16.0]);

        let gradient = calculate_state_gradient(&s0, &s1, 2.0).unwrap();
        assert_eq!(gradient, numeric_state(&[1.0, 3.0]));

        let integrated = integrate_state(&s0, &gradient, 1.0).unwrap();
        assert_eq!(integrated, numeric_state(&[1.0, 13.0]));
    }

    #[test]
    fn test_gradient_takes_newer_discrete_value() {
        let old = vec![Value::from(1.0), Value::from("idle")];
        let new = vec![Value::from(3.0), Value::from("left")];

        let gradient = calculate_state_gradient(&old, &new, 1.0).unwrap();
        assert_eq!(gradient, vec![Value::from(2.0), Value::from("left")]);

        let next = integrate_state(&old, &gradient, 0.5).unwrap();
        assert_eq!(next, vec![Value::from(2.0), Value::from("left")]);
    }

    #[test]
    fn test_mixed_number_and_text_takes_newer() {
        let old = vec![Value::from("none")];
        let new = vec![Value::from(4.0)];
        let gradient = calculate_state_gradient(&old, &new, 1.0).unwrap();
        assert_eq!(gradient, vec![Value::from(4.0)]);
    }

    #[test]
    fn test_gradient_length_mismatch_is_fatal() {
        let err = calculate_state_gradient(
            &numeric_state(&[1.0]),
            &numeric_state(&[1.0, 2.0]),
            1.0,
        )
        .unwrap_err();
        assert!(err.is_contract_violation());
        assert_eq!(
            err,
            SyncError::StateLengthMismatch {
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn test_integrate_length_mismatch_is_fatal() {
        let err =
            integrate_state(&numeric_state(&[1.0, 2.0]), &numeric_state(&[1.0]), 1.0).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let old = vec![Value::from(1.0)];
        let new = vec![Value::List(numeric_state(&[1.0]))];
        let err = calculate_state_gradient(&old, &new, 1.0).unwrap_err();
        assert!(matches!(err, SyncError::StateShapeMismatch { position: 0, .. }));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let s = numeric_state(&[1.0]);
        assert!(matches!(
            calculate_state_gradient(&s, &s, 0.0),
            Err(SyncError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn test_compress_number() {
        assert_eq!(compress_number(3.0), 3.0);
        assert_eq!(compress_number(-42.0), -42.0);
        assert_eq!(compress_number(0.0), 0.0);
        assert_eq!(compress_number(1.23456789), 1.2346);
        assert_approx_eq!(compress_number(0.000123456789), 0.00012346, 1e-15);
        assert_approx_eq!(compress_number(123456.789), 123460.0, 1e-9);
        assert_approx_eq!(compress_number(-98.7654321), -98.765, 1e-12);
    }

    #[test]
    fn test_compress_tiny_numbers_stay_finite() {
        for value in [1e-310, -1e-310, 1e-306, 1.234567e-305, 2.5e-300, f64::MIN_POSITIVE] {
            let compressed = compress_number(value);
            assert!(compressed.is_finite(), "{} compressed to {}", value, compressed);
            assert!(Value::from(compressed).check_serializable().is_ok());
            assert!((compressed - value).abs() <= value.abs() * 1e-4);
        }
        assert_eq!(compress_number(1.234567e-305), 1.2346e-305);
        assert_eq!(compress_number(5e-324), 5e-324);
    }

    #[test]
    fn test_compress_state_recurses() {
        let mut state = vec![
            Value::from(1.23456789),
            Value::from("label"),
            Value::List(numeric_state(&[2.0, 3.14159265])),
        ];
        compress_state(&mut state, 5);

        assert_eq!(state[0], Value::from(1.2346));
        assert_eq!(state[1], Value::from("label"));
        assert_eq!(numbers(state[2].as_list().unwrap()), vec![2.0, 3.1416]);
    }

    #[test]
    fn test_serializable_check() {
        assert!(Value::from(1.0).check_serializable().is_ok());
        assert!(Value::from(f64::NAN).check_serializable().is_err());
        let nested = Value::List(vec![Value::from("a"), Value::List(vec![Value::from(f64::INFINITY)])]);
        assert!(nested.check_serializable().is_err());
    }
}
