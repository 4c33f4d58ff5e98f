//! Frame encoding and decoding for the display bus.
//!
//! Frame format:
//! - START (1 byte): 0x02 synchronization byte
//! - LENGTH (1 byte): total frame length, START and END included
//! - PAYLOAD (0-251 bytes): message bytes, see [`crate::messages`]
//! - CRC8 (1 byte): Dallas/Maxim CRC-8 over LENGTH and all PAYLOAD bytes
//! - END (1 byte): 0x04 terminator
//!
//! The display firmware's I2C slave stack expects exactly this layout, so the
//! packer below must stay byte-compatible with it.

use heapless::Vec;

/// Frame synchronization byte
pub const FRAME_START: u8 = 0x02;

/// Frame terminator byte
pub const FRAME_END: u8 = 0x04;

/// Bytes added around the payload (START + LENGTH + CRC8 + END)
pub const FRAME_OVERHEAD: usize = 4;

/// Maximum complete frame size; LENGTH is a single byte
pub const MAX_FRAME_SIZE: usize = u8::MAX as usize;

/// Maximum payload size in bytes
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - FRAME_OVERHEAD;

/// Reflected polynomial of CRC-8/MAXIM (0x31)
const CRC8_POLY: u8 = 0x8C;

/// Errors that can occur during frame encoding or parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Writing would overflow the packer's capacity
    CapacityExceeded,
    /// The frame was already finalized; call `reset()` first
    AlreadyFinalized,
    /// Payload cannot be described by its length field
    PayloadTooLarge,
    /// CRC mismatch
    InvalidChecksum,
    /// Frame is incomplete (need more bytes)
    Incomplete,
    /// Invalid frame structure
    InvalidFrame,
}

/// Feed one byte into a running CRC-8/MAXIM
#[inline]
fn crc8_update(mut crc: u8, byte: u8) -> u8 {
    let mut extract = byte;
    for _ in 0..8 {
        let sum = (crc ^ extract) & 0x01;
        crc >>= 1;
        if sum != 0 {
            crc ^= CRC8_POLY;
        }
        extract >>= 1;
    }
    crc
}

/// Compute the Dallas/Maxim CRC-8 of `data`
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0, |crc, &byte| crc8_update(crc, byte))
}

/// Incremental frame builder
///
/// Mirrors the write-then-end flow of the display's packer: bytes are
/// appended one at a time, then [`finalize`](Self::finalize) stamps the
/// length, CRC and terminator. The buffer is inline, so [`reset`](Self::reset)
/// reuses it without reallocating.
#[derive(Debug, Clone)]
pub struct FramePacker {
    buffer: Vec<u8, MAX_FRAME_SIZE>,
    capacity: usize,
    finalized: bool,
}

impl FramePacker {
    /// Start a new frame that may grow to `capacity` bytes in total
    ///
    /// The capacity covers the framing overhead as well as the payload and is
    /// clamped to `FRAME_OVERHEAD..=MAX_FRAME_SIZE`.
    pub fn new(capacity: usize) -> Self {
        let mut packer = Self {
            buffer: Vec::new(),
            capacity: capacity.clamp(FRAME_OVERHEAD, MAX_FRAME_SIZE),
            finalized: false,
        };
        packer.reset();
        packer
    }

    /// Total frame capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard the current frame and start a new one in the same buffer
    pub fn reset(&mut self) {
        self.buffer.clear();
        // START plus a LENGTH placeholder; both always fit
        let _ = self.buffer.push(FRAME_START);
        let _ = self.buffer.push(0);
        self.finalized = false;
    }

    /// Number of payload bytes written so far
    pub fn payload_len(&self) -> usize {
        let trailer = if self.finalized { 2 } else { 0 };
        self.buffer.len() - 2 - trailer
    }

    /// Payload bytes written so far
    pub fn payload(&self) -> &[u8] {
        &self.buffer[2..2 + self.payload_len()]
    }

    /// Remaining payload room before `CapacityExceeded`
    pub fn remaining(&self) -> usize {
        if self.finalized {
            return 0;
        }
        // CRC and END still have to fit
        self.capacity.saturating_sub(self.buffer.len() + 2)
    }

    /// Append one payload byte
    pub fn write(&mut self, byte: u8) -> Result<(), FrameError> {
        if self.finalized {
            return Err(FrameError::AlreadyFinalized);
        }
        if self.remaining() == 0 {
            return Err(FrameError::CapacityExceeded);
        }
        self.buffer
            .push(byte)
            .map_err(|_| FrameError::CapacityExceeded)
    }

    /// Append a run of payload bytes
    ///
    /// Either every byte is written or none is.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), FrameError> {
        if self.finalized {
            return Err(FrameError::AlreadyFinalized);
        }
        if bytes.len() > self.remaining() {
            return Err(FrameError::CapacityExceeded);
        }
        self.buffer
            .extend_from_slice(bytes)
            .map_err(|_| FrameError::CapacityExceeded)
    }

    /// Stamp LENGTH, CRC8 and END onto the frame
    ///
    /// Returns the number of bytes ready to transmit. Calling it again
    /// without a reset returns the same length and changes nothing.
    pub fn finalize(&mut self) -> usize {
        if !self.finalized {
            let total = self.buffer.len() + 2;
            self.buffer[1] = total as u8;
            let crc = crc8(&self.buffer[1..]);
            // write() always leaves room for these two bytes
            let _ = self.buffer.push(crc);
            let _ = self.buffer.push(FRAME_END);
            self.finalized = true;
        }
        self.buffer.len()
    }

    /// Number of bytes ready to transmit (0 until finalized)
    pub fn available(&self) -> usize {
        if self.finalized {
            self.buffer.len()
        } else {
            0
        }
    }

    /// The finished frame, empty until finalized
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.available()]
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload data
    pub payload: Vec<u8, MAX_PAYLOAD_SIZE>,
}

impl Frame {
    /// Create a frame carrying `payload`
    pub fn new(payload: &[u8]) -> Result<Self, FrameError> {
        let mut vec = Vec::new();
        vec.extend_from_slice(payload)
            .map_err(|_| FrameError::PayloadTooLarge)?;
        Ok(Self { payload: vec })
    }

    /// Encode this frame into a byte buffer
    ///
    /// Returns the number of bytes written.
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, FrameError> {
        let mut packer = FramePacker::new(MAX_FRAME_SIZE);
        packer.write_all(&self.payload)?;
        let len = packer.finalize();
        let out = buffer
            .get_mut(..len)
            .ok_or(FrameError::CapacityExceeded)?;
        out.copy_from_slice(packer.as_bytes());
        Ok(len)
    }

    /// Decode exactly one frame from `bytes`
    ///
    /// Leading garbage before the START byte is skipped.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        FrameParser::new()
            .feed_bytes(bytes)?
            .ok_or(FrameError::Incomplete)
    }
}

/// State machine for parsing incoming frames
#[derive(Debug, Clone)]
pub struct FrameParser {
    state: ParseState,
    buffer: Vec<u8, MAX_PAYLOAD_SIZE>,
    expected_length: usize,
    crc: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Waiting for START byte
    WaitingForStart,
    /// Got START, waiting for LENGTH
    WaitingForLength,
    /// Reading payload bytes
    ReadingPayload,
    /// Waiting for CRC8
    WaitingForChecksum,
    /// Waiting for END
    WaitingForEnd,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    /// Create a new frame parser
    pub fn new() -> Self {
        Self {
            state: ParseState::WaitingForStart,
            buffer: Vec::new(),
            expected_length: 0,
            crc: 0,
        }
    }

    /// Reset the parser state
    pub fn reset(&mut self) {
        self.state = ParseState::WaitingForStart;
        self.buffer.clear();
        self.expected_length = 0;
        self.crc = 0;
    }

    /// Feed a single byte to the parser
    ///
    /// Returns `Ok(Some(frame))` when a complete valid frame is parsed,
    /// `Ok(None)` when more bytes are needed, or `Err` on parse error.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Frame>, FrameError> {
        match self.state {
            ParseState::WaitingForStart => {
                if byte == FRAME_START {
                    self.state = ParseState::WaitingForLength;
                }
                // Silently ignore non-START bytes while waiting
                Ok(None)
            }
            ParseState::WaitingForLength => {
                if (byte as usize) < FRAME_OVERHEAD {
                    self.reset();
                    return Err(FrameError::InvalidFrame);
                }
                self.expected_length = byte as usize - FRAME_OVERHEAD;
                self.crc = crc8_update(0, byte);
                self.buffer.clear();
                self.state = if self.expected_length == 0 {
                    ParseState::WaitingForChecksum
                } else {
                    ParseState::ReadingPayload
                };
                Ok(None)
            }
            ParseState::ReadingPayload => {
                // Cannot overflow: expected_length <= MAX_PAYLOAD_SIZE
                let _ = self.buffer.push(byte);
                self.crc = crc8_update(self.crc, byte);
                if self.buffer.len() == self.expected_length {
                    self.state = ParseState::WaitingForChecksum;
                }
                Ok(None)
            }
            ParseState::WaitingForChecksum => {
                if byte != self.crc {
                    self.reset();
                    return Err(FrameError::InvalidChecksum);
                }
                self.state = ParseState::WaitingForEnd;
                Ok(None)
            }
            ParseState::WaitingForEnd => {
                if byte != FRAME_END {
                    self.reset();
                    return Err(FrameError::InvalidFrame);
                }
                let frame = Frame {
                    payload: self.buffer.clone(),
                };
                self.reset();
                Ok(Some(frame))
            }
        }
    }

    /// Feed multiple bytes to the parser
    ///
    /// Returns the first complete frame found, if any.
    /// Remaining bytes after a complete frame are not consumed.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Result<Option<Frame>, FrameError> {
        for &byte in bytes {
            if let Some(frame) = self.feed(byte)? {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}
