//! The central error type for the policy server.
//!
//! Errors that originate inside a single RPC are never allowed to tear down
//! the server; only configuration and bind errors are fatal.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolicyServerError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] DeserializationError),

    #[error("unsupported policy type: {0}")]
    UnsupportedPolicy(String),

    #[error("model load error: {0}")]
    ModelLoad(#[from] ModelLoadError),

    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("rtc error: {0}")]
    Rtc(#[from] RtcError),

    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("corrupt frame header")]
    CorruptHeader,

    #[error("premature stream end after {bytes_received} of {bytes_expected} bytes")]
    PrematureEnd {
        bytes_received: usize,
        bytes_expected: usize,
    },

    #[error("frame exceeds maximum payload size ({size} > {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum DeserializationError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("unexpected message type: expected {expected}, got {actual}")]
    WrongMessageType { expected: String, actual: String },
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("policy artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("denoise step failed: {0}")]
    DenoiseStep(String),

    #[error("preprocessor failed: {0}")]
    Preprocess(String),

    #[error("postprocessor failed: {0}")]
    Postprocess(String),

    #[error("observation is missing required feature '{0}'")]
    MissingFeature(String),
}

#[derive(Error, Debug)]
pub enum RtcError {
    #[error(
        "stale inference: real_delay ({real_delay}) >= chunk_size ({chunk_size}); discarding result"
    )]
    StaleInference { real_delay: usize, chunk_size: usize },

    #[error("invalid rtc config: {0}")]
    InvalidConfig(String),
}

/// Raised by `ObservationInbox::get` on timeout. Not logged as an error —
/// it's the expected steady state between observations.
#[derive(Error, Debug)]
pub enum InboxError {
    #[error("no observation available within timeout")]
    Empty,
}

pub type Result<T> = std::result::Result<T, PolicyServerError>;
