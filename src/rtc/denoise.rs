//! DenoiseLoop (component C4): the Euler ODE integration that turns an
//! observation into a full action chunk, optionally stitched to the
//! leftover suffix of the previous chunk via `RTCProcessor`.

use super::config::RTCConfig;
use super::processor::RTCProcessor;
use crate::model::Policy;
use crate::observation::Observation;
use crate::tensor::Chunk2D;

pub struct DenoiseLoop;

impl DenoiseLoop {
    /// Integrate `x_1 -> x_0` over `policy.num_steps()` Euler steps of size
    /// `dt = -1 / num_steps`, guiding each step with `prev_leftover` when RTC
    /// is enabled.
    ///
    /// Yields to the runtime between steps so a long denoising loop never
    /// starves the rest of the server's async tasks.
    pub async fn run(
        policy: &dyn Policy,
        observation: &Observation,
        rtc_config: &RTCConfig,
        prev_leftover: Option<&Chunk2D>,
        inference_delay: usize,
    ) -> Chunk2D {
        let cache = policy.cache_prefix(observation);
        let num_steps = policy.num_steps();
        let dt = -1.0_f32 / num_steps as f32;

        let mut x_t = policy.sample_noise(policy.chunk_size(), policy.max_action_dim());
        let mut t = 1.0_f32;

        let mut processor = rtc_config
            .enabled
            .then(|| RTCProcessor::new(rtc_config.clone()));

        while t >= -dt / 2.0 {
            let v_t = match processor.as_mut() {
                Some(proc) => proc.denoise_step(
                    &x_t,
                    prev_leftover,
                    inference_delay,
                    t,
                    |x| policy.denoise_step(&cache, x, t),
                    rtc_config.execution_horizon,
                ),
                None => policy.denoise_step(&cache, &x_t, t),
            };
            x_t = x_t.add_scaled(dt, &v_t);
            t += dt;
            tokio::task::yield_now().await;
        }

        x_t.slice_cols(0, policy.action_dim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PrefixCache;
    use crate::rtc::config::PrefixAttentionSchedule;
    use std::collections::HashMap;

    struct StepToZero {
        chunk_size: usize,
        action_dim: usize,
        num_steps: usize,
    }

    impl Policy for StepToZero {
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
        fn sample_noise(&self, rows: usize, cols: usize) -> Chunk2D {
            Chunk2D::from_rows(&vec![vec![1.0; cols]; rows])
        }
        /// `v_t = x_t`, so Euler integration drives `x_t` toward `0` as
        /// `t -> 0`: a predictable fixed point to assert against.
        fn denoise_step(&self, _cache: &PrefixCache, x_t: &Chunk2D, _t: f32) -> Chunk2D {
            x_t.clone()
        }
    }

    fn empty_observation() -> Observation {
        Observation {
            tensors: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn unguided_loop_converges_towards_zero() {
        let policy = StepToZero {
            chunk_size: 4,
            action_dim: 2,
            num_steps: 50,
        };
        let out = DenoiseLoop::run(
            &policy,
            &empty_observation(),
            &RTCConfig::disabled(),
            None,
            0,
        )
        .await;
        for v in &out.data {
            assert!(v.abs() < 0.1, "expected convergence towards 0, got {v}");
        }
    }

    #[tokio::test]
    async fn output_is_truncated_to_action_dim() {
        let policy = StepToZero {
            chunk_size: 3,
            action_dim: 2,
            num_steps: 5,
        };
        let out = DenoiseLoop::run(
            &policy,
            &empty_observation(),
            &RTCConfig::disabled(),
            None,
            0,
        )
        .await;
        assert_eq!(out.cols, 2);
        assert_eq!(out.rows, 3);
    }

    #[tokio::test]
    async fn guided_loop_runs_with_leftover_present() {
        let policy = StepToZero {
            chunk_size: 4,
            action_dim: 1,
            num_steps: 10,
        };
        let rtc = RTCConfig::new(true, 2, 5.0, PrefixAttentionSchedule::Exp, false, 0, 4).unwrap();
        let leftover = Chunk2D::from_rows(&[vec![3.0], vec![3.0]]);
        let out = DenoiseLoop::run(&policy, &empty_observation(), &rtc, Some(&leftover), 0).await;
        assert_eq!(out.rows, 4);
        assert_eq!(out.cols, 1);
    }
}
