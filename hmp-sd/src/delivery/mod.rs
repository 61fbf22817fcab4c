//! Delivery strategies for one resolved stream
//!
//! - [`progressive`]: pipe as it arrives, length unknown, ranges not honored
//! - [`buffer`] + [`range`]: drain fully, length known, single byte ranges honored

pub mod buffer;
pub mod progressive;
pub mod range;

pub use buffer::drain_stream;
pub use progressive::{prime, PrimedStream};
pub use range::{parse_range_header, ByteRange, RequestedRange, StreamTransferDescriptor};
