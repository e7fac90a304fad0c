//! Pre/post-processing pipeline interface.
//!
//! The concrete transforms (normalization, image resizing, rename-map
//! application) are policy-specific; what the engine needs is the
//! pure-transform boundary itself so it can be swapped per policy without
//! `engine` knowing the details.

use crate::observation::Observation;
use crate::tensor::Chunk2D;

pub trait Preprocessor: Send + Sync {
    fn preprocess(&self, observation: &Observation) -> Observation;
}

pub trait Postprocessor: Send + Sync {
    fn postprocess(&self, chunk: &Chunk2D) -> Chunk2D;
}

/// The identity pipeline: used when a policy declares no pre/post
/// transform, or in tests that only exercise the chunking/guidance math.
pub struct IdentityPipeline;

impl Preprocessor for IdentityPipeline {
    fn preprocess(&self, observation: &Observation) -> Observation {
        observation.clone()
    }
}

impl Postprocessor for IdentityPipeline {
    fn postprocess(&self, chunk: &Chunk2D) -> Chunk2D {
        chunk.clone()
    }
}

/// Applies a client-supplied rename map (`RemotePolicyConfig::rename_map`)
/// before any other preprocessing.
pub struct RenamingPreprocessor {
    pub rename_map: std::collections::HashMap<String, String>,
}

impl Preprocessor for RenamingPreprocessor {
    fn preprocess(&self, observation: &Observation) -> Observation {
        let mut renamed = Observation::default();
        for (key, tensor) in &observation.tensors {
            let target = self.rename_map.get(key).cloned().unwrap_or_else(|| key.clone());
            renamed.insert(target, tensor.clone());
        }
        renamed
    }
}
