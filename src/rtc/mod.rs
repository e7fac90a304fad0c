//! Real-Time Chunking: configuration, action queue bookkeeping, the
//! prefix-attention guidance operator, and the Euler denoising loop.

pub mod action_queue;
pub mod config;
pub mod denoise;
pub mod processor;

pub use action_queue::ActionQueue;
pub use config::{PrefixAttentionSchedule, RTCConfig};
pub use denoise::DenoiseLoop;
pub use processor::RTCProcessor;
