//! Display session
//!
//! Owns the link to one display and knows how each kind of page becomes
//! frames. Status text and provisioning codes are a single frame; images
//! are a header frame plus one frame per chunk, paced by a short delay so
//! the receiver can drain its buffer.

use std::net::{IpAddr, SocketAddr};

use embedded_hal::delay::DelayNs;
use image::RgbImage;
use riberry_protocol::{
    image_messages, FrameError, FramePacker, Message, IMAGE_FRAME_CAPACITY,
};
use thiserror::Error;
use tracing::{debug, error};

use crate::encoder::{EncodeError, ImageEncoder};
use crate::transport::{FrameSink, SendOutcome};

/// Default pause after each image frame
pub const DEFAULT_FRAME_DELAY_MS: u32 = 5;

/// Page could not be turned into frames
#[derive(Debug, Error)]
pub enum SessionError {
    /// The payload does not fit its frame; it is never truncated
    #[error("{kind} payload does not fit its frame: {error:?}")]
    Frame {
        kind: &'static str,
        error: FrameError,
    },
    /// The image could not be encoded
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// The encoded image is larger than the header can announce
    #[error("encoded image is {size} bytes, more than a 16-bit size header allows")]
    ImageTooLarge { size: usize },
}

/// What a provisioning code points the user at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningTarget<'a> {
    /// Join the host's setup hotspot
    WifiJoin {
        /// Board-specific SSID prefix
        ssid_prefix: &'a str,
        /// Wireless hardware address without separators
        mac: &'a str,
    },
    /// Open the onboarding page served by the host
    Onboarding {
        /// Host address on the network
        address: IpAddr,
        /// Web server port
        port: u16,
        /// Page path, starting with `/`
        path: &'a str,
    },
}

impl ProvisioningTarget<'_> {
    /// Text encoded into the code
    pub fn text(&self) -> String {
        match self {
            ProvisioningTarget::WifiJoin { ssid_prefix, mac } => {
                format!("WIFI:S:{ssid_prefix}-{mac};T:nopass;;")
            }
            ProvisioningTarget::Onboarding {
                address,
                port,
                path,
            } => format!("http://{}{path}", SocketAddr::new(*address, *port)),
        }
    }
}

/// Delivery summary of one image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageReport {
    /// Encoded image size
    pub bytes: usize,
    /// Frames written, header included
    pub sent: usize,
    /// Frames dropped by the transport
    pub skipped: usize,
}

/// One display on one bus address
pub struct DisplaySession<T, D, E> {
    sink: T,
    delay: D,
    encoder: E,
    address: u8,
    frame_delay_ms: u32,
}

impl<T: FrameSink, D: DelayNs, E: ImageEncoder> DisplaySession<T, D, E> {
    /// Create a session for the display at `address`
    pub fn new(sink: T, delay: D, encoder: E, address: u8) -> Self {
        Self {
            sink,
            delay,
            encoder,
            address,
            frame_delay_ms: DEFAULT_FRAME_DELAY_MS,
        }
    }

    /// Override the pause after each image frame
    pub fn with_frame_delay(mut self, ms: u32) -> Self {
        self.frame_delay_ms = ms;
        self
    }

    /// Bus address of the display
    pub fn address(&self) -> u8 {
        self.address
    }

    /// The underlying frame sink
    pub fn sink(&self) -> &T {
        &self.sink
    }

    /// Send a status page as one frame
    pub fn show_status(&mut self, text: &str) -> Result<SendOutcome, SessionError> {
        debug!(target: "riberry::display", len = text.len(), "status page:\n{text}");
        self.send_one("status", Message::Status(text))
    }

    /// Send a provisioning code as one frame
    pub fn show_provisioning(
        &mut self,
        target: ProvisioningTarget<'_>,
    ) -> Result<SendOutcome, SessionError> {
        let text = target.text();
        debug!(target: "riberry::display", %text, "provisioning code");
        self.send_one("provisioning", Message::Provisioning(&text))
    }

    /// Encode `image` and send it as a header frame plus chunk frames
    ///
    /// Frames are sent in order with the configured pause after each one.
    /// There is no acknowledgement; dropped frames are only counted.
    pub fn show_image(&mut self, image: &RgbImage) -> Result<ImageReport, SessionError> {
        let encoded = self.encoder.encode(image)?;
        let messages = image_messages(&encoded).map_err(|_| {
            error!(size = encoded.len(), "encoded image too large for the display");
            SessionError::ImageTooLarge {
                size: encoded.len(),
            }
        })?;

        let mut report = ImageReport {
            bytes: encoded.len(),
            ..ImageReport::default()
        };
        let mut packer = FramePacker::new(IMAGE_FRAME_CAPACITY);
        for message in messages {
            message
                .encode_into(&mut packer)
                .map_err(|error| SessionError::Frame {
                    kind: "image",
                    error,
                })?;
            if self.sink.send(self.address, packer.as_bytes()).is_sent() {
                report.sent += 1;
            } else {
                report.skipped += 1;
            }
            self.delay.delay_ms(self.frame_delay_ms);
        }

        debug!(
            target: "riberry::display",
            bytes = report.bytes,
            sent = report.sent,
            skipped = report.skipped,
            "image sent"
        );
        Ok(report)
    }

    fn send_one(
        &mut self,
        kind: &'static str,
        message: Message<'_>,
    ) -> Result<SendOutcome, SessionError> {
        let mut packer = FramePacker::new(message.frame_capacity());
        if let Err(error) = message.encode_into(&mut packer) {
            error!(kind, ?error, "payload does not fit a frame, not sent");
            return Err(SessionError::Frame { kind, error });
        }
        Ok(self.sink.send(self.address, packer.as_bytes()))
    }
}
