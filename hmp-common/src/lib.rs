//! # HMP Common Library
//!
//! Shared code for the hybrid music player crates:
//! - Track descriptor model (what the delivery endpoint resolves)
//! - Typed player events and the EventBus
//! - Byte stream type shared by the server and the client
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod stream;
pub mod track;

pub use error::{Error, Result};
pub use stream::ByteStream;
pub use track::{TrackDescriptor, TrackSource};
