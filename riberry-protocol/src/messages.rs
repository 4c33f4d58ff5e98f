//! Message payloads carried inside frames
//!
//! The display tells messages apart by their first payload bytes:
//! - `0x02 LEN ASCII...`: provisioning code (Wi-Fi join string or URL)
//! - `0xFF 0xD8 0xEA ...`: JPEG image header or chunk
//! - anything else: status text, rendered line by line
//!
//! An image is sent as one header frame carrying the big-endian total size
//! and no body, followed by one frame per [`IMAGE_CHUNK_SIZE`]-byte chunk.

use heapless::Vec;

use crate::frame::{FrameError, FramePacker, FRAME_OVERHEAD};

/// Leading byte of a provisioning payload
pub const PROVISIONING_MARKER: u8 = 0x02;

/// Frame capacity used for provisioning payloads
pub const PROVISIONING_FRAME_CAPACITY: usize = 100;

/// Leading bytes of every image frame
pub const IMAGE_MARKER: [u8; 3] = [0xFF, 0xD8, 0xEA];

/// Encoded image bytes per chunk frame
pub const IMAGE_CHUNK_SIZE: usize = 50;

/// Frame capacity used for image frames
pub const IMAGE_FRAME_CAPACITY: usize = FRAME_OVERHEAD + IMAGE_MARKER.len() + IMAGE_CHUNK_SIZE;

/// What a payload is, judged from its leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageKind {
    /// Multi-line status text
    Status,
    /// Scannable provisioning code
    Provisioning,
    /// JPEG header or chunk
    Image,
}

impl MessageKind {
    /// Classify a frame payload
    pub fn classify(payload: &[u8]) -> Self {
        if payload.starts_with(&IMAGE_MARKER) {
            MessageKind::Image
        } else if payload.first() == Some(&PROVISIONING_MARKER) {
            MessageKind::Provisioning
        } else {
            MessageKind::Status
        }
    }
}

/// Messages from the host to the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Message<'a> {
    /// Status text, sent verbatim
    Status(&'a str),
    /// Provisioning string to render as a QR code
    Provisioning(&'a str),
    /// First frame of an image: total encoded size, no body
    ImageHeader {
        /// Encoded image size in bytes
        size: u16,
    },
    /// One piece of the encoded image
    ImageChunk(&'a [u8]),
}

impl<'a> Message<'a> {
    /// Frame capacity to reserve for this message
    pub fn frame_capacity(&self) -> usize {
        match self {
            Message::Status(text) => text.len() + FRAME_OVERHEAD,
            Message::Provisioning(_) => PROVISIONING_FRAME_CAPACITY,
            Message::ImageHeader { .. } | Message::ImageChunk(_) => IMAGE_FRAME_CAPACITY,
        }
    }

    /// Write this message's payload into `packer` and finalize it
    ///
    /// Returns the frame length. Nothing is truncated: a payload that does
    /// not fit fails with [`FrameError::CapacityExceeded`].
    pub fn encode_into(&self, packer: &mut FramePacker) -> Result<usize, FrameError> {
        packer.reset();
        match self {
            Message::Status(text) => {
                if text.len() + FRAME_OVERHEAD > packer.capacity() {
                    return Err(FrameError::CapacityExceeded);
                }
                packer.write_all(text.as_bytes())?;
            }
            Message::Provisioning(text) => {
                let len = u8::try_from(text.len()).map_err(|_| FrameError::PayloadTooLarge)?;
                packer.write(PROVISIONING_MARKER)?;
                packer.write(len)?;
                packer.write_all(text.as_bytes())?;
            }
            Message::ImageHeader { size } => {
                packer.write_all(&IMAGE_MARKER)?;
                packer.write_all(&size.to_be_bytes())?;
            }
            Message::ImageChunk(chunk) => {
                packer.write_all(&IMAGE_MARKER)?;
                packer.write_all(chunk)?;
            }
        }
        Ok(packer.finalize())
    }
}

/// Split an encoded image into its header and chunk messages
///
/// Fails with [`FrameError::PayloadTooLarge`] if the size does not fit the
/// 16-bit header.
pub fn image_messages(encoded: &[u8]) -> Result<ImageMessages<'_>, FrameError> {
    let size = u16::try_from(encoded.len()).map_err(|_| FrameError::PayloadTooLarge)?;
    Ok(ImageMessages {
        size,
        header_sent: false,
        chunks: encoded.chunks(IMAGE_CHUNK_SIZE),
    })
}

/// Iterator over the frames of one image, in transmission order
#[derive(Debug, Clone)]
pub struct ImageMessages<'a> {
    size: u16,
    header_sent: bool,
    chunks: core::slice::Chunks<'a, u8>,
}

impl<'a> ImageMessages<'a> {
    /// Number of chunk frames (header excluded)
    pub fn chunk_count(&self) -> usize {
        (self.size as usize).div_ceil(IMAGE_CHUNK_SIZE)
    }
}

impl<'a> Iterator for ImageMessages<'a> {
    type Item = Message<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.header_sent {
            self.header_sent = true;
            return Some(Message::ImageHeader { size: self.size });
        }
        self.chunks.next().map(Message::ImageChunk)
    }
}

/// Receiver-side reassembly of image frames
///
/// The first image frame after idle is taken as the header; chunks are then
/// appended until the announced size is reached.
#[derive(Debug, Clone, Default)]
pub struct ImageAssembler<const N: usize> {
    buffer: Vec<u8, N>,
    expected: Option<usize>,
}

impl<const N: usize> ImageAssembler<N> {
    /// Create an idle assembler
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            expected: None,
        }
    }

    /// Whether a header has been seen and chunks are still expected
    pub fn in_progress(&self) -> bool {
        self.expected.is_some()
    }

    /// Feed one image frame payload (marker included)
    ///
    /// Returns the complete image once its last chunk arrives.
    pub fn feed(&mut self, payload: &[u8]) -> Result<Option<&[u8]>, FrameError> {
        let body = payload
            .strip_prefix(&IMAGE_MARKER)
            .ok_or(FrameError::InvalidFrame)?;

        let expected = match self.expected {
            None => {
                let size: [u8; 2] = body.try_into().map_err(|_| FrameError::InvalidFrame)?;
                let size = u16::from_be_bytes(size) as usize;
                if size > N {
                    return Err(FrameError::CapacityExceeded);
                }
                self.buffer.clear();
                if size > 0 {
                    self.expected = Some(size);
                    return Ok(None);
                }
                return Ok(Some(self.buffer.as_slice()));
            }
            Some(expected) => expected,
        };

        if self.buffer.len() + body.len() > expected {
            self.expected = None;
            return Err(FrameError::InvalidFrame);
        }
        self.buffer
            .extend_from_slice(body)
            .map_err(|_| FrameError::CapacityExceeded)?;

        if self.buffer.len() == expected {
            self.expected = None;
            Ok(Some(self.buffer.as_slice()))
        } else {
            Ok(None)
        }
    }
}
