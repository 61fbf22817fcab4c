//! Audio output side of the player
//!
//! - `sink`: the [`AudioSink`] seam and its event type
//! - `headless`: reference sink without an output device
//! - `probe`: symphonia probing/decoding of buffered payloads
//! - `analyser`: spectrum analyser for visualizations

pub mod analyser;
pub mod headless;
pub mod probe;
pub mod sink;

pub use analyser::{SharedAnalyser, SpectrumAnalyser};
pub use headless::HeadlessSink;
pub use sink::{
    sink_event_channel, AudioSink, SinkEvent, SinkEventReceiver, SinkEventSender, SinkMessage,
    SinkSource, TimeRange,
};
