//! bincode (de)serialization helpers for the four wire payload types.

use crate::errors::DeserializationError;
use crate::observation::{TimedAction, TimedObservation};
use crate::policy_config::RemotePolicyConfig;
use serde::{Deserialize, Serialize};

pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .expect("in-memory bincode encode is infallible")
}

pub fn decode<T: for<'de> Deserialize<'de>>(
    bytes: &[u8],
) -> Result<T, DeserializationError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| DeserializationError::Malformed(e.to_string()))
}

pub fn encode_policy_config(config: &RemotePolicyConfig) -> Vec<u8> {
    encode(config)
}

pub fn decode_policy_config(bytes: &[u8]) -> Result<RemotePolicyConfig, DeserializationError> {
    decode(bytes)
}

pub fn encode_timed_observation(observation: &TimedObservation) -> Vec<u8> {
    encode(observation)
}

pub fn decode_timed_observation(bytes: &[u8]) -> Result<TimedObservation, DeserializationError> {
    decode(bytes)
}

pub fn encode_actions(actions: &[TimedAction]) -> Vec<u8> {
    encode(&actions.to_vec())
}

pub fn decode_actions(bytes: &[u8]) -> Result<Vec<TimedAction>, DeserializationError> {
    decode(bytes)
}
