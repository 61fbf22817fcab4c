//! Progressive delivery body
//!
//! The first chunk is read before headers are committed so that a resolver
//! stream that fails immediately still produces a proper 500. After that the
//! stream is piped as-is:
//! - a mid-transfer error ends the body with an error, which aborts the
//!   connection (headers are already on the wire)
//! - a client disconnect drops the body, which drops the resolved stream and
//!   releases what backs it

use crate::error::{Error, Result};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use hmp_common::ByteStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Resolved stream with its first chunk already read
pub struct PrimedStream {
    first: Option<Bytes>,
    rest: ByteStream,
}

/// Read the first chunk of `stream`
pub async fn prime(mut stream: ByteStream) -> Result<PrimedStream> {
    match stream.next().await {
        Some(Ok(first)) => Ok(PrimedStream {
            first: Some(first),
            rest: stream,
        }),
        Some(Err(e)) => Err(Error::Transfer(format!(
            "Stream failed before first byte: {}",
            e
        ))),
        None => Ok(PrimedStream {
            first: None,
            rest: stream,
        }),
    }
}

impl PrimedStream {
    /// Body stream that accounts for and logs the fate of the transfer
    pub fn into_body(
        self,
        transfer_id: Uuid,
    ) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
        let PrimedStream { first, rest } = self;

        async_stream::stream! {
            let mut guard = TransferGuard::new(transfer_id);
            let mut rest = rest;

            if let Some(first) = first {
                guard.record(first.len());
                yield Ok(first);
            }

            while let Some(chunk) = rest.next().await {
                match chunk {
                    Ok(bytes) => {
                        guard.record(bytes.len());
                        yield Ok(bytes);
                    }
                    Err(e) => {
                        warn!(
                            "Transfer {} failed after {} bytes: {}; terminating connection",
                            transfer_id, guard.bytes_sent, e
                        );
                        guard.finish();
                        yield Err(e);
                        return;
                    }
                }
            }

            guard.finish();
            debug!("Transfer {} complete ({} bytes)", transfer_id, guard.bytes_sent);
        }
    }
}

/// Logs a release when a transfer is dropped before it finished
struct TransferGuard {
    transfer_id: Uuid,
    bytes_sent: u64,
    finished: bool,
}

impl TransferGuard {
    fn new(transfer_id: Uuid) -> Self {
        Self {
            transfer_id,
            bytes_sent: 0,
            finished: false,
        }
    }

    fn record(&mut self, len: usize) {
        self.bytes_sent += len as u64;
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        if !self.finished {
            info!(
                "Client disconnected from transfer {} after {} bytes; resolved stream released",
                self.transfer_id, self.bytes_sent
            );
        }
    }
}
