//! Riberry I2C Display Protocol
//!
//! This crate defines the byte-level protocol between the host daemon
//! (I2C master) and the companion display (I2C slave). Every bus write is a
//! single self-delimiting frame:
//!
//! ```text
//! ┌───────┬────────┬─────────────┬──────┬──────┐
//! │ START │ LENGTH │ PAYLOAD     │ CRC8 │ END  │
//! │ 0x02  │ 1B     │ 0–251B      │ 1B   │ 0x04 │
//! └───────┴────────┴─────────────┴──────┴──────┘
//! ```
//!
//! The payload's leading bytes tell the display what it is looking at:
//! a provisioning code, a piece of a JPEG image, or plain status text.
//! See [`messages`] for the payload layouts.

#![no_std]
#![deny(unsafe_code)]

pub mod frame;
pub mod messages;

pub use frame::{
    crc8, Frame, FrameError, FramePacker, FrameParser, FRAME_END, FRAME_OVERHEAD, FRAME_START,
    MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE,
};
pub use messages::{
    image_messages, ImageAssembler, ImageMessages, Message, MessageKind, IMAGE_CHUNK_SIZE,
    IMAGE_FRAME_CAPACITY, IMAGE_MARKER, PROVISIONING_FRAME_CAPACITY, PROVISIONING_MARKER,
};
