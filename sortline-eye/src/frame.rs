//! Captured frames and the single-capacity slot shared between the
//! acquisition thread and the detection loop.

use crate::error::VisionError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Byte order of the channels in a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelOrder {
    Bgr,
    Rgb,
    Bgra,
    Gray,
}

impl ChannelOrder {
    pub fn channels(self) -> usize {
        match self {
            ChannelOrder::Bgr | ChannelOrder::Rgb => 3,
            ChannelOrder::Bgra => 4,
            ChannelOrder::Gray => 1,
        }
    }

    /// Red, green and blue bytes of the pixel starting at `px[0]`.
    pub(crate) fn to_rgb(self, px: &[u8]) -> [u8; 3] {
        match self {
            ChannelOrder::Rgb => [px[0], px[1], px[2]],
            ChannelOrder::Bgr | ChannelOrder::Bgra => [px[2], px[1], px[0]],
            ChannelOrder::Gray => [px[0], px[0], px[0]],
        }
    }
}

/// An immutable 8-bit interleaved pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Vec<u8>,
}

impl Frame {
    /// Create a frame, checking that `data` holds exactly one image of the
    /// given size and channel order.
    pub fn new(width: u32, height: u32, order: ChannelOrder, data: Vec<u8>) -> Result<Self, VisionError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|p| p.checked_mul(order.channels()))
            .ok_or_else(|| VisionError::InvalidFrame(format!("{}x{} frame size overflows", width, height)))?;

        if data.len() != expected {
            return Err(VisionError::InvalidFrame(format!(
                "{}x{} {:?} frame needs {} bytes, got {}",
                width,
                height,
                order,
                expected,
                data.len()
            )));
        }

        Ok(Self { width, height, order, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Result of reading the frame slot.
#[derive(Debug, Clone)]
pub enum SlotRead {
    /// The latest complete frame and its capture sequence number (starting at 1).
    Frame { frame: Arc<Frame>, sequence: u64 },
    /// Nothing has been captured yet.
    NotReady,
    /// The source was stopped; no further frames will appear.
    Closed,
}

impl SlotRead {
    pub fn is_closed(&self) -> bool {
        matches!(self, SlotRead::Closed)
    }
}

#[derive(Debug, Default)]
struct SlotState {
    frame: Option<Arc<Frame>>,
    sequence: u64,
    closed: bool,
}

/// Single-writer, multi-reader cell holding only the newest frame.
///
/// The frame is swapped in as a whole `Arc` under the lock, so readers see
/// either the previous frame or the new one, never a partial write.
#[derive(Debug, Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held frame. Returns the new sequence number, or `None`
    /// if the slot has been closed and the frame was discarded.
    pub fn publish(&self, frame: Frame) -> Option<u64> {
        let frame = Arc::new(frame);
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        state.sequence += 1;
        state.frame = Some(frame);
        Some(state.sequence)
    }

    /// Snapshot the slot without waiting for a fresher frame.
    pub fn read(&self) -> SlotRead {
        let state = self.state.lock();
        if state.closed {
            return SlotRead::Closed;
        }
        match &state.frame {
            Some(frame) => SlotRead::Frame {
                frame: Arc::clone(frame),
                sequence: state.sequence,
            },
            None => SlotRead::NotReady,
        }
    }

    /// Close the slot and drop the held frame. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.frame = None;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Sequence number of the last published frame (0 if none).
    pub fn sequence(&self) -> u64 {
        self.state.lock().sequence
    }
}

/// Cloneable read handle onto a [`FrameSlot`].
#[derive(Debug, Clone)]
pub struct FrameReader {
    slot: Arc<FrameSlot>,
}

impl FrameReader {
    pub fn new(slot: Arc<FrameSlot>) -> Self {
        Self { slot }
    }

    pub fn read(&self) -> SlotRead {
        self.slot.read()
    }
}
