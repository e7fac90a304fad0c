//! Rolling-window FPS/latency tracker (component C8).
//!
//! Keeps a short history of observation arrival timestamps and reports the
//! average FPS against the configured target, plus the one-way latency of
//! the most recent observation (`receive_time - obs_timestamp`).

use std::collections::VecDeque;

const DEFAULT_WINDOW: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsMetrics {
    pub avg_fps: f64,
    pub target_fps: f64,
    pub one_way_latency_s: f64,
}

pub struct FpsTracker {
    target_fps: f64,
    window: usize,
    /// Client wall-clock timestamps of the last `window` accepted
    /// observations, oldest first.
    timestamps: VecDeque<f64>,
}

impl FpsTracker {
    pub fn new(target_fps: f64) -> Self {
        Self::with_window(target_fps, DEFAULT_WINDOW)
    }

    pub fn with_window(target_fps: f64, window: usize) -> Self {
        Self {
            target_fps,
            window: window.max(2),
            timestamps: VecDeque::with_capacity(window),
        }
    }

    /// Record an observation's client timestamp and the server's receive
    /// time, returning the current rolling metrics.
    pub fn calculate_fps_metrics(&mut self, obs_timestamp: f64, receive_time: f64) -> FpsMetrics {
        self.timestamps.push_back(obs_timestamp);
        if self.timestamps.len() > self.window {
            self.timestamps.pop_front();
        }

        let avg_fps = if self.timestamps.len() >= 2 {
            let span = self.timestamps.back().unwrap() - self.timestamps.front().unwrap();
            if span > 0.0 {
                (self.timestamps.len() - 1) as f64 / span
            } else {
                0.0
            }
        } else {
            0.0
        };

        FpsMetrics {
            avg_fps,
            target_fps: self.target_fps,
            one_way_latency_s: receive_time - obs_timestamp,
        }
    }
}
