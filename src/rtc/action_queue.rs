//! ActionQueue (component C2): tracks committed actions, exposes the
//! leftover suffix, and merges new chunks at the correct index accounting
//! for measured inference delay.

use crate::errors::RtcError;
use crate::tensor::Chunk2D;
use std::collections::VecDeque;

pub struct ActionQueue {
    execution_horizon: usize,
    committed_index: u64,
    pending: VecDeque<Vec<f32>>,
    leftover: Option<Chunk2D>,
}

impl ActionQueue {
    pub fn new(execution_horizon: usize) -> Self {
        Self {
            execution_horizon,
            committed_index: 0,
            pending: VecDeque::new(),
            leftover: None,
        }
    }

    /// The suffix of the most recent chunk not yet consumed by the robot,
    /// or `None` on the first inference (or whenever it has been fully
    /// consumed by `real_delay + execution_horizon`).
    pub fn get_left_over(&self) -> Option<Chunk2D> {
        self.leftover.clone()
    }

    /// The index in the logical trajectory at which the next inference
    /// will start.
    pub fn get_action_index(&self) -> u64 {
        self.committed_index
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Align the new chunk at offset `real_delay` relative to
    /// `action_index_before_inference`, dropping the leading `real_delay`
    /// actions that were already served from the stale chunk while
    /// inference was in flight.
    ///
    /// `original_actions` and `processed_actions` must both have
    /// `chunk_size` rows.
    pub fn merge(
        &mut self,
        original_actions: &Chunk2D,
        processed_actions: &Chunk2D,
        real_delay: usize,
        action_index_before_inference: u64,
    ) -> Result<(), RtcError> {
        let chunk_size = original_actions.rows;
        if real_delay >= chunk_size {
            return Err(RtcError::StaleInference {
                real_delay,
                chunk_size,
            });
        }

        self.pending = processed_actions
            .slice_rows(real_delay, chunk_size)
            .to_rows()
            .into();

        let leftover_start = real_delay + self.execution_horizon;
        self.leftover = if leftover_start < chunk_size {
            Some(original_actions.slice_rows(leftover_start, chunk_size))
        } else {
            None
        };

        self.committed_index = action_index_before_inference + real_delay as u64;
        Ok(())
    }

    /// Return the next `n` pending actions and advance `committed_index`
    /// by however many were actually available.
    pub fn pop(&mut self, n: usize) -> Vec<Vec<f32>> {
        let n = n.min(self.pending.len());
        let out: Vec<_> = (0..n).filter_map(|_| self.pending.pop_front()).collect();
        self.committed_index += out.len() as u64;
        out
    }
}
