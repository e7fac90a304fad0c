//! A minimal row-major f32 tensor.
//!
//! The model behind `denoise_step` is a black box; all we need on this
//! side of the interface is a flat numeric buffer with a shape, so we do
//! not pull in a general n-dimensional array crate for it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        debug_assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "tensor shape does not match data length"
        );
        Self { shape, data }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Mean absolute difference between two same-shape tensors.
    pub fn mean_abs_diff(&self, other: &Tensor) -> Option<f32> {
        if self.shape != other.shape || self.data.is_empty() {
            return None;
        }
        let sum: f32 = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        Some(sum / self.data.len() as f32)
    }
}

impl From<Vec<f32>> for Tensor {
    fn from(data: Vec<f32>) -> Self {
        let shape = vec![data.len()];
        Self { shape, data }
    }
}

/// A 2D (rows x cols) view over a flat action-chunk buffer: `chunk_size`
/// rows of `action_dim` columns each, used throughout `rtc` for the soft
/// prefix mask and guidance arithmetic.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk2D {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Chunk2D {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn row(&self, i: usize) -> &[f32] {
        let start = i * self.cols;
        &self.data[start..start + self.cols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        let start = i * self.cols;
        &mut self.data[start..start + self.cols]
    }

    pub fn rows_iter(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks(self.cols)
    }

    /// Build a `Chunk2D` from a sequence of equal-length action rows.
    pub fn from_rows(rows: &[Vec<f32>]) -> Self {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for r in rows {
            debug_assert_eq!(r.len(), cols, "ragged action rows");
            data.extend_from_slice(r);
        }
        Self {
            rows: rows.len(),
            cols,
            data,
        }
    }

    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        self.rows_iter().map(|r| r.to_vec()).collect()
    }

    /// Slice `[start..end)` rows into a new, owned `Chunk2D`.
    pub fn slice_rows(&self, start: usize, end: usize) -> Chunk2D {
        let end = end.min(self.rows);
        let start = start.min(end);
        Chunk2D {
            rows: end - start,
            cols: self.cols,
            data: self.data[start * self.cols..end * self.cols].to_vec(),
        }
    }

    /// Slice `[start..end)` columns into a new, owned `Chunk2D`. Used to
    /// truncate a model's padded action space down to the policy's
    /// declared `action_dim`.
    pub fn slice_cols(&self, start: usize, end: usize) -> Chunk2D {
        let end = end.min(self.cols);
        let start = start.min(end);
        let new_cols = end - start;
        let mut data = Vec::with_capacity(self.rows * new_cols);
        for r in 0..self.rows {
            data.extend_from_slice(&self.row(r)[start..end]);
        }
        Chunk2D {
            rows: self.rows,
            cols: new_cols,
            data,
        }
    }

    /// Elementwise `self + scalar * other`.
    pub fn add_scaled(&self, scalar: f32, other: &Chunk2D) -> Chunk2D {
        debug_assert_eq!(self.rows, other.rows);
        debug_assert_eq!(self.cols, other.cols);
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a + scalar * b)
            .collect();
        Chunk2D {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }
}
