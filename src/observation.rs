//! Observations, actions, and the timed variants that travel between the
//! inbox, the engine, and the wire.

use crate::tensor::{Chunk2D, Tensor};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as seconds since the Unix epoch, comparable to
/// a client-supplied `TimedObservation::timestamp`.
pub fn wall_clock_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// An opaque dictionary of named tensors (images, proprioceptive state,
/// language tokens + mask), as received from a client.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Observation {
    pub tensors: HashMap<String, Tensor>,
}

impl Observation {
    pub fn get(&self, key: &str) -> Option<&Tensor> {
        self.tensors.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, tensor: Tensor) {
        self.tensors.insert(key.into(), tensor);
    }
}

/// A single observation as it travels the wire: the raw `Observation` plus
/// the client-assigned timestep/timestamp and the `must_go` override.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TimedObservation {
    pub timestep: u64,
    pub timestamp: f64,
    pub must_go: bool,
    pub observation: Observation,
}

impl TimedObservation {
    pub fn new(timestep: u64, timestamp: f64, observation: Observation, must_go: bool) -> Self {
        Self {
            timestep,
            timestamp,
            must_go,
            observation,
        }
    }
}

/// A single fixed-length action vector, plus the timestamp/timestep it was
/// scheduled for.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimedAction {
    pub timestamp: f64,
    pub timestep: u64,
    pub action: Vec<f32>,
}

/// Turn a chunk of actions into `TimedAction`s: `timestamps[i] = t0 + i *
/// environment_dt`, `timesteps[i] = k0 + i`.
pub fn time_action_chunk(
    t0: f64,
    k0: u64,
    environment_dt: f64,
    chunk: &Chunk2D,
) -> Vec<TimedAction> {
    chunk
        .rows_iter()
        .enumerate()
        .map(|(i, row)| TimedAction {
            timestamp: t0 + i as f64 * environment_dt,
            timestep: k0 + i as u64,
            action: row.to_vec(),
        })
        .collect()
}
