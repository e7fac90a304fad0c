//! ObservationInbox (component C5): the depth-1 "freshest wins" admission
//! discipline between `SendObservations` and `InferenceEngine`.
//!
//! Lock order is `predicted_timesteps` -> `inbox`; every method below
//! acquires them in that order to avoid deadlocks against concurrent
//! `SendObservations` tasks.

use crate::errors::InboxError;
use crate::observation::{Observation, TimedObservation};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;

/// Similarity tolerances for the redundant-observation filter (Open
/// Question resolved, see DESIGN.md): an observation is dropped as a
/// near-duplicate of the currently held one when every shared tensor key's
/// mean absolute difference is under the relevant epsilon and the key sets
/// match exactly.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct SimilarityConfig {
    pub state_similarity_epsilon: f32,
    pub image_similarity_epsilon: f32,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            state_similarity_epsilon: 1e-4,
            image_similarity_epsilon: 2.0,
        }
    }
}

fn is_image_like(tensor: &crate::tensor::Tensor) -> bool {
    tensor.shape.len() >= 3
}

fn observations_similar(a: &Observation, b: &Observation, cfg: &SimilarityConfig) -> bool {
    if a.tensors.len() != b.tensors.len() {
        return false;
    }
    for (key, ta) in &a.tensors {
        let Some(tb) = b.tensors.get(key) else {
            return false;
        };
        let Some(diff) = ta.mean_abs_diff(tb) else {
            return false;
        };
        let epsilon = if is_image_like(ta) {
            cfg.image_similarity_epsilon
        } else {
            cfg.state_similarity_epsilon
        };
        if diff >= epsilon {
            return false;
        }
    }
    true
}

struct InboxState {
    held: Option<TimedObservation>,
    predicted_timesteps: HashSet<u64>,
}

/// Depth-1 observation queue: at most one observation is ever held, and a
/// newly arrived observation can displace it only per the admission rules
/// in `offer`.
pub struct ObservationInbox {
    state: Mutex<InboxState>,
    similarity: SimilarityConfig,
    notify: Notify,
}

impl ObservationInbox {
    pub fn new(similarity: SimilarityConfig) -> Self {
        Self {
            state: Mutex::new(InboxState {
                held: None,
                predicted_timesteps: HashSet::new(),
            }),
            similarity,
            notify: Notify::new(),
        }
    }

    /// Attempt to admit an incoming observation. Returns `true` if it
    /// replaced (or became) the held observation, `false` if it was
    /// dropped as a duplicate/stale/near-identical frame.
    ///
    /// Admission rules, in order:
    /// 1. `must_go` always admits, bypassing every other check.
    /// 2. The first observation ever received always admits.
    /// 3. An observation whose `timestep` has already been predicted on
    ///    (i.e. already consumed by an in-flight or completed inference)
    ///    is dropped.
    /// 4. An observation that is near-identical to the currently held one
    ///    (per `observations_similar`) is dropped, since inference on it
    ///    would reproduce the same action chunk.
    /// 5. Otherwise, freshest wins: the new observation replaces whatever
    ///    is currently held.
    pub fn offer(&self, incoming: TimedObservation) -> bool {
        let mut state = self.state.lock();

        if !incoming.must_go {
            if state.predicted_timesteps.contains(&incoming.timestep) {
                return false;
            }
            if let Some(held) = &state.held {
                if observations_similar(&held.observation, &incoming.observation, &self.similarity)
                {
                    return false;
                }
            }
        }

        state.held = Some(incoming);
        drop(state);
        self.notify.notify_one();
        true
    }

    /// Wait up to `timeout_duration` for a held observation, removing and
    /// returning it. Marks its timestep as predicted so a late duplicate
    /// arriving afterwards is rejected by rule 3 above.
    pub async fn get(
        &self,
        timeout_duration: Duration,
    ) -> Result<TimedObservation, InboxError> {
        if let Some(obs) = self.take() {
            return Ok(obs);
        }

        let wait = timeout(timeout_duration, self.notify.notified());
        if wait.await.is_err() {
            return Err(InboxError::Empty);
        }

        self.take().ok_or(InboxError::Empty)
    }

    fn take(&self) -> Option<TimedObservation> {
        let mut state = self.state.lock();
        let obs = state.held.take()?;
        state.predicted_timesteps.insert(obs.timestep);
        Some(obs)
    }

    /// Clear all held state: the held observation and the predicted-
    /// timesteps set. Called on a `Ready`-triggered server reset.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.held = None;
        state.predicted_timesteps.clear();
    }
}
