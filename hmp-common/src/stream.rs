//! Byte stream type shared by the delivery endpoint and the playback client

use bytes::Bytes;
use futures::stream::Stream;
use std::pin::Pin;

/// Encoded audio bytes arriving incrementally.
///
/// Errors are `std::io::Error` so that resolver process pipes, HTTP bodies and
/// in-memory test streams can all be expressed with one type.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + 'static>>;

/// Box any compatible stream as a [`ByteStream`]
pub fn boxed<S>(stream: S) -> ByteStream
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
{
    Box::pin(stream)
}
