//! The policy model interface.
//!
//! The concrete neural network ("VLM + action expert") is treated as a
//! black box exposing `cache_prefix` and `denoise_step(x_t, t) -> v_t`.
//! This module defines that boundary as a trait so
//! `rtc::denoise::DenoiseLoop` and `engine::InferenceEngine` never need to
//! know which concrete policy (act, pi0, smolvla, ...) is loaded.

use crate::errors::ModelLoadError;
use crate::observation::Observation;
use crate::policy_config::RemotePolicyConfig;
use crate::tensor::Chunk2D;
use rand::Rng;
use std::sync::Arc;

/// Opaque result of `embed_prefix`/`cache_prefix`: the attention-ready
/// embedding of the current observation, computed once per inference and
/// reused across every denoising step.
pub struct PrefixCache {
    pub embedding: Chunk2D,
}

/// Policy kinds `SendPolicyInstructions` is allowed to load.
pub const SUPPORTED_POLICIES: &[&str] = &["act", "pi0", "smolvla", "diffusion"];

pub trait Policy: Send + Sync {
    fn chunk_size(&self) -> usize;
    fn action_dim(&self) -> usize;
    /// The model may operate in a larger padded action space than the
    /// policy's declared `action_dim`.
    fn max_action_dim(&self) -> usize;
    fn num_steps(&self) -> usize;

    /// Compute (or reuse) the prefix key-value cache for the current
    /// observation, done once per inference outside the denoising loop.
    fn cache_prefix(&self, observation: &Observation) -> PrefixCache;

    /// One raw (unguided) denoise step: `v_t = denoise_step(x_t, t)`.
    fn denoise_step(&self, cache: &PrefixCache, x_t: &Chunk2D, t: f32) -> Chunk2D;

    /// Sample the initial Gaussian noise `x_1` the ODE integrates from.
    fn sample_noise(&self, rows: usize, cols: usize) -> Chunk2D {
        let mut rng = rand::rng();
        let mut data = Vec::with_capacity(rows * cols);
        // Box-Muller, paired up two std-normal samples per iteration.
        while data.len() < rows * cols {
            let u1: f32 = rng.random_range(f32::EPSILON..1.0);
            let u2: f32 = rng.random_range(0.0..1.0);
            let r = (-2.0 * u1.ln()).sqrt();
            let theta = std::f32::consts::TAU * u2;
            data.push(r * theta.cos());
            data.push(r * theta.sin());
        }
        data.truncate(rows * cols);
        Chunk2D { rows, cols, data }
    }
}

/// Loads a `Policy` for a given `RemotePolicyConfig`. Loading real weights
/// from `pretrained_name_or_path` onto a device is outside this crate's
/// scope; this trait is the seam a concrete loader plugs into, with
/// `MockPolicyLoader` standing in for development and tests.
pub trait PolicyLoader: Send + Sync {
    fn load(&self, config: &RemotePolicyConfig) -> Result<Arc<dyn Policy>, ModelLoadError>;
}

/// A deterministic stand-in policy: `denoise_step` always returns the
/// negative of `x_t` scaled down, nudging the Euler integration towards
/// zero. Used by `MockPolicyLoader` and throughout the test suite.
pub struct MockPolicy {
    chunk_size: usize,
    action_dim: usize,
    num_steps: usize,
}

impl MockPolicy {
    pub fn new(chunk_size: usize, action_dim: usize, num_steps: usize) -> Self {
        Self {
            chunk_size,
            action_dim,
            num_steps,
        }
    }
}

impl Policy for MockPolicy {
    fn chunk_size(&self) -> usize {
        self.chunk_size
    }
    fn action_dim(&self) -> usize {
        self.action_dim
    }
    fn max_action_dim(&self) -> usize {
        self.action_dim
    }
    fn num_steps(&self) -> usize {
        self.num_steps
    }
    fn cache_prefix(&self, _observation: &Observation) -> PrefixCache {
        PrefixCache {
            embedding: Chunk2D::zeros(1, 1),
        }
    }
    fn denoise_step(&self, _cache: &PrefixCache, x_t: &Chunk2D, _t: f32) -> Chunk2D {
        x_t.add_scaled(-1.0, x_t)
    }
}

pub struct MockPolicyLoader;

impl PolicyLoader for MockPolicyLoader {
    fn load(&self, config: &RemotePolicyConfig) -> Result<Arc<dyn Policy>, ModelLoadError> {
        if !SUPPORTED_POLICIES.contains(&config.policy_type.as_str()) {
            return Err(ModelLoadError::ArtifactNotFound(format!(
                "no mock weights for policy type '{}'",
                config.policy_type
            )));
        }
        let action_dim = config.lerobot_features.len().max(1);
        Ok(Arc::new(MockPolicy::new(config.actions_per_chunk.max(1), action_dim, 10)))
    }
}
