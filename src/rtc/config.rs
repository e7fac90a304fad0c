//! RTCConfig (component C1): immutable configuration of the chunking /
//! guidance policy, validated at construction.

use crate::errors::RtcError;
use serde::{Deserialize, Serialize};

/// How the guidance weight evolves across the denoising ODE as `t -> 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixAttentionSchedule {
    /// `w(t) = max_guidance_weight * exp(-5 * t)` — strongest at `t -> 0`.
    Exp,
    /// `w(t) = max_guidance_weight * (1 - t)`.
    Linear,
    /// `w(t) = max_guidance_weight` for all `t`.
    Const,
    /// `w(t) = 0` for all `t` (degenerates RTC to unguided inference).
    Zero,
}

impl PrefixAttentionSchedule {
    pub fn weight(self, t: f32, max_guidance_weight: f32) -> f32 {
        match self {
            PrefixAttentionSchedule::Exp => max_guidance_weight * (-5.0 * t).exp(),
            PrefixAttentionSchedule::Linear => max_guidance_weight * (1.0 - t),
            PrefixAttentionSchedule::Const => max_guidance_weight,
            PrefixAttentionSchedule::Zero => 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RTCConfig {
    pub enabled: bool,
    /// Number of actions of the previous chunk softly enforced at the head
    /// of the new chunk (recommended 8-12).
    pub execution_horizon: usize,
    /// Scalar strength of guidance at `t -> 0`.
    pub max_guidance_weight: f32,
    pub prefix_attention_schedule: PrefixAttentionSchedule,
    pub debug: bool,
    pub debug_maxlen: usize,
}

impl RTCConfig {
    /// Validate and construct a config. `chunk_size` is required to check
    /// `execution_horizon <= chunk_size`.
    pub fn new(
        enabled: bool,
        execution_horizon: usize,
        max_guidance_weight: f32,
        prefix_attention_schedule: PrefixAttentionSchedule,
        debug: bool,
        debug_maxlen: usize,
        chunk_size: usize,
    ) -> Result<Self, RtcError> {
        if max_guidance_weight < 0.0 {
            return Err(RtcError::InvalidConfig(
                "max_guidance_weight must be >= 0".into(),
            ));
        }
        if execution_horizon > chunk_size {
            return Err(RtcError::InvalidConfig(format!(
                "execution_horizon ({execution_horizon}) must be <= chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            enabled,
            execution_horizon,
            max_guidance_weight,
            prefix_attention_schedule,
            debug,
            debug_maxlen,
        })
    }

    /// A config with RTC disabled, used as the default when a client does
    /// not request it.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            execution_horizon: 0,
            max_guidance_weight: 0.0,
            prefix_attention_schedule: PrefixAttentionSchedule::Zero,
            debug: false,
            debug_maxlen: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_guidance_weight() {
        let err = RTCConfig::new(true, 8, -1.0, PrefixAttentionSchedule::Exp, false, 0, 50);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_horizon_larger_than_chunk_size() {
        let err = RTCConfig::new(true, 60, 1.0, PrefixAttentionSchedule::Exp, false, 0, 50);
        assert!(err.is_err());
    }

    #[test]
    fn accepts_valid_config() {
        let cfg = RTCConfig::new(true, 8, 10.0, PrefixAttentionSchedule::Exp, false, 0, 50);
        assert!(cfg.is_ok());
    }

    #[test]
    fn exp_schedule_decays_towards_zero() {
        let w0 = PrefixAttentionSchedule::Exp.weight(0.0, 10.0);
        let w1 = PrefixAttentionSchedule::Exp.weight(1.0, 10.0);
        assert!(w0 > w1);
        assert!((w0 - 10.0).abs() < 1e-6);
    }

    #[test]
    fn zero_schedule_is_always_zero() {
        assert_eq!(PrefixAttentionSchedule::Zero.weight(0.3, 99.0), 0.0);
    }

    #[test]
    fn const_schedule_is_constant() {
        assert_eq!(
            PrefixAttentionSchedule::Const.weight(0.0, 5.0),
            PrefixAttentionSchedule::Const.weight(0.9, 5.0)
        );
    }
}
