//! `RemotePolicyConfig`: the wire message sent once via
//! `SendPolicyInstructions` to select and parameterize the policy before
//! any observation is accepted.

use crate::inbox::SimilarityConfig;
use crate::model::SUPPORTED_POLICIES;
use crate::rtc::RTCConfig;
use std::collections::HashMap;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemotePolicyConfig {
    pub policy_type: String,
    pub pretrained_name_or_path: String,
    pub actions_per_chunk: usize,
    pub device: String,
    /// Feature names the policy expects, by lerobot convention
    /// (`observation.images.*`, `observation.state`, ...).
    pub lerobot_features: Vec<String>,
    /// Maps a client-side observation key onto the policy's expected
    /// feature name, applied before preprocessing.
    pub rename_map: HashMap<String, String>,
    pub rtc_config: RTCConfig,
    #[serde(default)]
    pub similarity_config: SimilarityConfig,
}

impl RemotePolicyConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !SUPPORTED_POLICIES.contains(&self.policy_type.as_str()) {
            return Err(format!("unsupported policy type '{}'", self.policy_type));
        }
        if self.actions_per_chunk == 0 {
            return Err("actions_per_chunk must be > 0".into());
        }
        Ok(())
    }
}
