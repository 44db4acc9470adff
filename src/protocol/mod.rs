//! Frame layer: byte-stream framing and the binary command envelope.

mod frame;
mod frame_buffer;
pub mod wire_format;

pub use frame::DecodedFrame;
pub use frame_buffer::FrameBuffer;
