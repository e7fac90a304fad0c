//! Wire transport: length-prefixed framing plus bincode payload codecs.

pub mod codec;
pub mod framing;

pub use framing::{read_chunked_payload, read_frame, write_frame, Frame, MethodTag};
