//! Cross-section normalisation of MC samples.

use mb_core::{Error, Result};

/// Per-tree global weight handed to `AddSignalTree` / `AddBackgroundTree`.
///
/// `lumi × σ ÷ N_eff`, where `N_eff = N_generated − 2·N_negative` is the
/// effective event count of a generator that emits negative-weight events.
/// With `n_negative = 0` this is plain `lumi × σ ÷ N_generated`.
pub fn xsec_weight(lumi_pb: f64, xsec_pb: f64, n_generated: f64, n_negative: f64) -> Result<f64> {
    if !lumi_pb.is_finite() || lumi_pb <= 0.0 {
        return Err(Error::Validation(format!("luminosity must be positive, got {lumi_pb}")));
    }
    if !xsec_pb.is_finite() || xsec_pb < 0.0 {
        return Err(Error::Validation(format!(
            "cross-section must be finite and non-negative, got {xsec_pb}"
        )));
    }
    if !n_generated.is_finite() || !n_negative.is_finite() || n_negative < 0.0 {
        return Err(Error::Validation(format!(
            "invalid event counts: generated={n_generated}, negative={n_negative}"
        )));
    }
    let n_eff = effective_events(n_generated, n_negative);
    if n_eff <= 0.0 {
        return Err(Error::Validation(format!(
            "effective event count must be positive, got {n_eff} \
             (generated={n_generated}, negative={n_negative})"
        )));
    }
    Ok(lumi_pb * xsec_pb / n_eff)
}

/// `N_generated − 2·N_negative`.
pub fn effective_events(n_generated: f64, n_negative: f64) -> f64 {
    n_generated - 2.0 * n_negative
}
