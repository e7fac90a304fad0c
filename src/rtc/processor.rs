//! RTCProcessor (component C3): wraps one denoise step with
//! prefix-attention guidance so the new chunk stitches onto the remaining,
//! unexecuted suffix of the previous one.

use super::config::RTCConfig;
use crate::tensor::Chunk2D;
use std::collections::VecDeque;

/// One entry of the debug ring buffer: `(t, w(t), ||m ⊙ (y - x_t)||)`.
pub type DebugSample = (f32, f32, f32);

pub struct RTCProcessor {
    config: RTCConfig,
    debug_log: VecDeque<DebugSample>,
}

impl RTCProcessor {
    pub fn new(config: RTCConfig) -> Self {
        Self {
            config,
            debug_log: VecDeque::new(),
        }
    }

    pub fn debug_log(&self) -> &VecDeque<DebugSample> {
        &self.debug_log
    }

    /// One guided denoise step.
    ///
    /// `original_step` is the model's unwrapped `denoise_step(x_t) -> v_t`;
    /// it is called exactly once regardless of whether guidance is applied.
    pub fn denoise_step<F>(
        &mut self,
        x_t: &Chunk2D,
        prev_leftover: Option<&Chunk2D>,
        inference_delay: usize,
        time: f32,
        original_step: F,
        execution_horizon: usize,
    ) -> Chunk2D
    where
        F: FnOnce(&Chunk2D) -> Chunk2D,
    {
        let v_orig = original_step(x_t);

        let leftover = match prev_leftover {
            Some(l) if l.rows > 0 => l,
            _ => return v_orig,
        };

        let chunk_size = x_t.rows;
        let action_dim = x_t.cols;
        let l = leftover.rows;
        let take = execution_horizon.min(l);
        let start = inference_delay.min(l);
        let end = (inference_delay + take).min(l);
        let guided_rows = end.saturating_sub(start).min(chunk_size);

        let mut y = Chunk2D::zeros(chunk_size, action_dim);
        for i in 0..guided_rows {
            y.row_mut(i).copy_from_slice(leftover.row(start + i));
        }

        let w = self
            .config
            .prefix_attention_schedule
            .weight(time, self.config.max_guidance_weight);

        let mut v_t = v_orig;
        let mut guidance_norm_sq = 0.0f32;
        for i in 0..guided_rows {
            for c in 0..action_dim {
                let diff = y.row(i)[c] - x_t.row(i)[c];
                let contribution = w * diff;
                v_t.row_mut(i)[c] += contribution;
                guidance_norm_sq += contribution * contribution;
            }
        }

        if self.config.debug {
            self.debug_log
                .push_back((time, w, guidance_norm_sq.sqrt()));
            if self.debug_log.len() > self.config.debug_maxlen {
                self.debug_log.pop_front();
            }
        }

        v_t
    }
}
