/*
The metadata response is a JSON array of topic message elements that the endpoint
writes in chunks as it reads from its message store. This decoder accepts the body
one chunk at a time in whatever pieces the transport delivers and hands back each
element as soon as its closing brace arrives, so the receiver never has to hold the
whole response in memory.
*/

use std::{error::Error, fmt};

use log::debug;

use crate::contracts::v1::responses::TopicMessages;

/// Elements are bounded by the endpoint's sub-fetch size, anything bigger than this
/// is treated as a corrupt stream rather than buffered indefinitely.
pub const DEFAULT_MAX_ELEMENT_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, PartialEq)]
pub enum DecodeError {
    UnexpectedByte { offset: usize, byte: u8 },
    BadElement { msg: String },
    ElementTooLarge { size: usize },
    Incomplete,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::UnexpectedByte { offset, byte } => {
                write!(f, "Unexpected '{}' at offset {}", (*byte as char).escape_default(), offset)
            }
            DecodeError::BadElement { msg } => write!(f, "Invalid topic messages element: {msg}"),
            DecodeError::ElementTooLarge { size } => {
                write!(f, "Topic messages element exceeds {size} bytes")
            }
            DecodeError::Incomplete => write!(f, "Response ended before the array was closed"),
        }
    }
}

impl Error for DecodeError {}

pub type DecodeResult<T> = Result<T, DecodeError>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    BeforeArray,
    BeforeFirstElement,
    BeforeElement,
    InElement,
    AfterElement,
    Closed,
}

pub struct TopicMessagesDecoder {
    buffer: Vec<u8>,
    scan_index: usize,
    element_start: usize,
    state: State,
    depth: usize,
    in_string: bool,
    escaped: bool,
    stream_offset: usize,
    max_element_size: usize,
}

impl TopicMessagesDecoder {
    pub fn new() -> Self {
        Self::with_max_element_size(DEFAULT_MAX_ELEMENT_SIZE)
    }

    pub fn with_max_element_size(max_element_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scan_index: 0,
            element_start: 0,
            state: State::BeforeArray,
            depth: 0,
            in_string: false,
            escaped: false,
            stream_offset: 0,
            max_element_size,
        }
    }

    /// Appends a chunk of the response body and returns every element it completed
    pub fn push(self: &mut Self, chunk: &[u8]) -> DecodeResult<Vec<TopicMessages>> {
        self.buffer.extend_from_slice(chunk);

        let mut elements = Vec::new();
        let mut consumed_count = 0;

        while self.scan_index < self.buffer.len() {
            let index = self.scan_index;
            let byte = self.buffer[index];
            self.scan_index += 1;

            match self.state {
                State::InElement => {
                    if self.scan_element_byte(byte) {
                        let element = self.decode_element(index + 1)?;
                        elements.push(element);
                        consumed_count = index + 1;
                        self.state = State::AfterElement;
                    }
                }
                _ if byte.is_ascii_whitespace() => consumed_count = index + 1,
                State::BeforeArray if byte == b'[' => {
                    self.state = State::BeforeFirstElement;
                    consumed_count = index + 1;
                }
                State::BeforeFirstElement | State::BeforeElement if byte == b'{' => {
                    self.state = State::InElement;
                    self.element_start = index;
                    self.depth = 1;
                }
                State::BeforeFirstElement if byte == b']' => {
                    self.state = State::Closed;
                    consumed_count = index + 1;
                }
                State::AfterElement if byte == b',' => {
                    self.state = State::BeforeElement;
                    consumed_count = index + 1;
                }
                State::AfterElement if byte == b']' => {
                    self.state = State::Closed;
                    consumed_count = index + 1;
                }
                _ => {
                    return Err(DecodeError::UnexpectedByte {
                        offset: self.stream_offset + index,
                        byte,
                    })
                }
            }
        }

        if self.state == State::InElement {
            let size = self.buffer.len() - self.element_start;
            if size > self.max_element_size {
                return Err(DecodeError::ElementTooLarge {
                    size: self.max_element_size,
                });
            }
            consumed_count = consumed_count.min(self.element_start);
        }

        self.compact(consumed_count);
        Ok(elements)
    }

    /// Call once the body has ended. Fails if the closing bracket was never seen.
    pub fn finish(self: &Self) -> DecodeResult<()> {
        match self.state {
            State::Closed => Ok(()),
            _ => Err(DecodeError::Incomplete),
        }
    }

    /// Number of bytes currently held waiting for an element to complete
    pub fn buffered_len(self: &Self) -> usize {
        self.buffer.len()
    }

    fn scan_element_byte(self: &mut Self, byte: u8) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
            }
            return false;
        }

        match byte {
            b'"' => self.in_string = true,
            b'{' | b'[' => self.depth += 1,
            b'}' | b']' => {
                self.depth -= 1;
                return self.depth == 0;
            }
            _ => {}
        }
        false
    }

    fn decode_element(self: &Self, end: usize) -> DecodeResult<TopicMessages> {
        let json = &self.buffer[self.element_start..end];
        serde_json::from_slice(json).map_err(|err| DecodeError::BadElement {
            msg: err.to_string(),
        })
    }

    fn compact(self: &mut Self, consumed_count: usize) {
        if consumed_count == 0 {
            return;
        }

        #[cfg(debug_assertions)]
        debug!(
            "Decoder: consumed {consumed_count} of {} buffered bytes",
            self.buffer.len()
        );

        self.buffer.drain(..consumed_count);
        self.scan_index -= consumed_count;
        self.element_start = self.element_start.saturating_sub(consumed_count);
        self.stream_offset += consumed_count;
    }
}

impl Default for TopicMessagesDecoder {
    fn default() -> Self {
        Self::new()
    }
}
