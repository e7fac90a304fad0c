//! InferenceEngine (component C6): turns one admitted observation into a
//! merged update of the `ActionQueue`, running preprocessing, the
//! (optionally RTC-guided) denoise loop, and postprocessing in sequence.

use crate::model::Policy;
use crate::observation::{time_action_chunk, TimedAction, TimedObservation};
use crate::processors::{Postprocessor, Preprocessor};
use crate::rtc::{ActionQueue, DenoiseLoop, RTCConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub struct InferenceEngine {
    policy: Arc<dyn Policy>,
    preprocessor: Arc<dyn Preprocessor>,
    postprocessor: Arc<dyn Postprocessor>,
    rtc_config: RTCConfig,
    environment_dt: f64,
    /// The configured `inference_latency`, expressed in actions, used to
    /// shift the RTC guidance window during the denoise loop before the
    /// real measured delay is known. The queue merge afterwards always
    /// uses the real measured delay, not this estimate.
    expected_inference_delay: usize,
    queue: Mutex<ActionQueue>,
}

impl InferenceEngine {
    pub fn new(
        policy: Arc<dyn Policy>,
        preprocessor: Arc<dyn Preprocessor>,
        postprocessor: Arc<dyn Postprocessor>,
        rtc_config: RTCConfig,
        environment_dt: f64,
        inference_latency_s: f64,
    ) -> Self {
        let execution_horizon = rtc_config.execution_horizon;
        let expected_inference_delay = (inference_latency_s / environment_dt).round() as usize;
        Self {
            policy,
            preprocessor,
            postprocessor,
            rtc_config,
            environment_dt,
            expected_inference_delay,
            queue: Mutex::new(ActionQueue::new(execution_horizon)),
        }
    }

    /// Run one full inference cycle for `timed_observation` and merge the
    /// result into the action queue. Returns the real_delay (measured in
    /// actions) that was applied so callers can log/telemetry it.
    pub async fn predict_action_chunk(
        &self,
        timed_observation: TimedObservation,
    ) -> Result<usize, crate::errors::PolicyServerError> {
        let started = Instant::now();
        let action_index_before_inference = self.queue.lock().get_action_index();
        let prev_leftover = self.queue.lock().get_left_over();

        let preprocessed = self.preprocessor.preprocess(&timed_observation.observation);
        let preprocess_done = started.elapsed();

        let original_actions = DenoiseLoop::run(
            self.policy.as_ref(),
            &preprocessed,
            &self.rtc_config,
            prev_leftover.as_ref(),
            self.expected_inference_delay,
        )
        .await;
        let inference_done = started.elapsed();

        let processed_actions = self.postprocessor.postprocess(&original_actions);
        let postprocess_done = started.elapsed();

        let elapsed_s = postprocess_done.as_secs_f64();
        let real_delay = ((elapsed_s / self.environment_dt).round() as usize)
            .min(original_actions.rows.saturating_sub(1));

        {
            let mut queue = self.queue.lock();
            queue.merge(
                &original_actions,
                &processed_actions,
                real_delay,
                action_index_before_inference,
            )?;
        }

        debug!(
            preprocess_s = preprocess_done.as_secs_f64(),
            inference_s = (inference_done - preprocess_done).as_secs_f64(),
            postprocess_s = (postprocess_done - inference_done).as_secs_f64(),
            "inference timing breakdown"
        );
        info!(
            total_s = postprocess_done.as_secs_f64(),
            real_delay, "inference cycle complete"
        );

        Ok(real_delay)
    }

    /// Pop up to `actions_per_chunk` committed actions, timed relative to
    /// `t0`/`k0`: the triggering observation's own timestamp/timestep, not
    /// the queue's internal bookkeeping counter.
    pub fn pop_actions(&self, n: usize, t0: f64, k0: u64) -> Vec<TimedAction> {
        let mut queue = self.queue.lock();
        let popped = queue.pop(n);
        let chunk = crate::tensor::Chunk2D::from_rows(&popped);
        time_action_chunk(t0, k0, self.environment_dt, &chunk)
    }

    pub fn reset(&self) {
        let execution_horizon = self.rtc_config.execution_horizon;
        *self.queue.lock() = ActionQueue::new(execution_horizon);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PrefixCache;
    use crate::observation::Observation;
    use crate::processors::IdentityPipeline;
    use crate::tensor::Chunk2D;
    use std::collections::HashMap;

    struct ConstantPolicy {
        chunk_size: usize,
        action_dim: usize,
    }

    impl Policy for ConstantPolicy {
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
            2
        }
        fn cache_prefix(&self, _observation: &Observation) -> PrefixCache {
            PrefixCache {
                embedding: Chunk2D::zeros(1, 1),
            }
        }
        fn sample_noise(&self, rows: usize, cols: usize) -> Chunk2D {
            Chunk2D::zeros(rows, cols)
        }
        fn denoise_step(&self, _cache: &PrefixCache, x_t: &Chunk2D, _t: f32) -> Chunk2D {
            Chunk2D::from_rows(&vec![vec![1.0; x_t.cols]; x_t.rows])
        }
    }

    #[tokio::test]
    async fn predict_action_chunk_populates_the_queue() {
        let policy = Arc::new(ConstantPolicy {
            chunk_size: 10,
            action_dim: 2,
        });
        let rtc = RTCConfig::disabled();
        let engine = InferenceEngine::new(
            policy,
            Arc::new(IdentityPipeline),
            Arc::new(IdentityPipeline),
            rtc,
            1.0 / 30.0,
            0.0,
        );
        let observation = TimedObservation::new(0, 0.0, Observation { tensors: HashMap::new() }, false);
        let real_delay = engine.predict_action_chunk(observation).await.unwrap();
        assert!(real_delay < 10);

        let actions = engine.pop_actions(3, 0.0, 0);
        assert_eq!(actions.len(), 3);
    }

    #[tokio::test]
    async fn reset_drops_queued_actions() {
        let policy = Arc::new(ConstantPolicy {
            chunk_size: 5,
            action_dim: 1,
        });
        let engine = InferenceEngine::new(
            policy,
            Arc::new(IdentityPipeline),
            Arc::new(IdentityPipeline),
            RTCConfig::disabled(),
            1.0 / 30.0,
            0.0,
        );
        let observation = TimedObservation::new(0, 0.0, Observation { tensors: HashMap::new() }, false);
        engine.predict_action_chunk(observation).await.unwrap();
        engine.reset();
        assert_eq!(engine.pop_actions(10, 0.0, 0).len(), 0);
    }
}
