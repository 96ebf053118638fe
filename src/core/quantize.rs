// Fixed-point quantization of channel values

/// Encodes `value` as an integer tick count under `scale`.
///
/// Rounds half away from zero (`f64::round`). Missing, NaN and infinite
/// inputs, as well as results outside the `i64` range, map to `None`;
/// `Some(0)` is a real measurement and stays distinct from unset.
pub fn quantize(value: Option<f64>, scale: f64) -> Option<i64> {
    let value = value?;
    if !value.is_finite() || !scale.is_finite() || scale <= 0.0 {
        return None;
    }
    let ticks = (value / scale).round();
    if !ticks.is_finite() || ticks < i64::MIN as f64 || ticks >= i64::MAX as f64 {
        return None;
    }
    Some(ticks as i64)
}

/// Inverse of [`quantize`] up to the channel precision.
pub fn decode(encoded: i64, scale: f64) -> f64 {
    encoded as f64 * scale
}
