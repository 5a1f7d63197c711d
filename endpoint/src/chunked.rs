/*
Writes a response body as a series of chunks. Serialized elements accumulate in a
buffer and the buffer is handed to a sink once it reaches the chunk size, so the
memory held per response is about one chunk plus one element no matter how many
messages are streamed. Chunks are only cut between elements, a single element is
never split across two writes to the sink.
*/

use std::{fmt, io};

use bytes::Bytes;
use log::warn;
use serde::Serialize;
use tokio::sync::mpsc::Sender;

#[derive(Debug, PartialEq)]
pub enum ChunkError {
    /// The receiving side went away, nothing more can be delivered
    Closed,
    Serialize { msg: String },
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChunkError::Closed => write!(f, "The response receiver has gone away"),
            ChunkError::Serialize { msg } => write!(f, "Unable to serialize response element: {msg}"),
        }
    }
}

impl std::error::Error for ChunkError {}

pub type ChunkResult = Result<(), ChunkError>;

/// Destination for completed chunks, for example the body of an http response
pub trait ChunkSink {
    fn send_chunk(self: &mut Self, chunk: Bytes) -> ChunkResult;

    /// Tells the receiver the body is broken so that it does not mistake a truncated
    /// stream for a complete one
    fn abort(self: &mut Self, _msg: &str) {}
}

pub struct ChunkedWriter<S: ChunkSink> {
    sink: S,
    chunk_size: usize,
    buffer: Vec<u8>,
    chunk_count: usize,
    byte_count: usize,
}

impl<S: ChunkSink> ChunkedWriter<S> {
    pub fn new(sink: S, chunk_size: usize) -> Self {
        Self {
            sink,
            chunk_size,
            buffer: Vec::with_capacity(chunk_size),
            chunk_count: 0,
            byte_count: 0,
        }
    }

    /// Appends raw bytes, used for the framing around elements
    pub fn write_raw(self: &mut Self, bytes: &[u8]) -> ChunkResult {
        self.buffer.extend_from_slice(bytes);
        self.flush_if_full()
    }

    /// Serializes one element straight into the buffer, optionally preceded by a separator
    pub fn write_json<T: Serialize>(self: &mut Self, separator: Option<u8>, element: &T) -> ChunkResult {
        let rollback_len = self.buffer.len();
        if let Some(separator) = separator {
            self.buffer.push(separator);
        }
        if let Err(err) = serde_json::to_writer(&mut self.buffer, element) {
            self.buffer.truncate(rollback_len);
            return Err(ChunkError::Serialize {
                msg: err.to_string(),
            });
        }
        self.flush_if_full()
    }

    /// Sends whatever is buffered, even if it is less than a full chunk
    pub fn flush(self: &mut Self) -> ChunkResult {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_size));
        self.chunk_count += 1;
        self.byte_count += chunk.len();
        self.sink.send_chunk(Bytes::from(chunk))
    }

    pub fn abort(self: &mut Self, msg: &str) {
        self.buffer.clear();
        self.sink.abort(msg);
    }

    pub fn buffered_len(self: &Self) -> usize {
        self.buffer.len()
    }

    pub fn chunk_count(self: &Self) -> usize {
        self.chunk_count
    }

    pub fn byte_count(self: &Self) -> usize {
        self.byte_count
    }

    pub fn into_sink(self: Self) -> S {
        self.sink
    }

    fn flush_if_full(self: &mut Self) -> ChunkResult {
        if self.buffer.len() >= self.chunk_size {
            self.flush()
        } else {
            Ok(())
        }
    }
}

/// Feeds chunks into a bounded channel that backs a streaming http body. Sending
/// blocks while the channel is full, so this must be used from a blocking thread.
pub struct ChannelSink {
    sender: Sender<Result<Bytes, io::Error>>,
}

impl ChannelSink {
    pub fn new(sender: Sender<Result<Bytes, io::Error>>) -> Self {
        Self { sender }
    }
}

impl ChunkSink for ChannelSink {
    fn send_chunk(self: &mut Self, chunk: Bytes) -> ChunkResult {
        self.sender.blocking_send(Ok(chunk)).map_err(|_| ChunkError::Closed)
    }

    fn abort(self: &mut Self, msg: &str) {
        let error = io::Error::new(io::ErrorKind::Other, msg.to_owned());
        if self.sender.blocking_send(Err(error)).is_err() {
            warn!("ChannelSink: Receiver gone before abort could be delivered");
        }
    }
}
