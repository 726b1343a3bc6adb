//! Frame: fixed 188-byte unit with a 0x47 sync byte at offset 0.

use bytes::Bytes;

/// Length of every frame on the wire.
pub const FRAME_LEN: usize = 188;

/// Expected value of the first byte of a frame.
pub const SYNC_BYTE: u8 = 0x47;

/// Validation outcome for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    WellFormed,
    Malformed,
}

impl Validity {
    pub fn is_well_formed(self) -> bool {
        self == Validity::WellFormed
    }
}

/// Decide whether `frame` starts with the sync byte. Pure and total: any input is accepted,
/// an empty slice is malformed.
pub fn validate(frame: &[u8]) -> Validity {
    match frame.first() {
        Some(&SYNC_BYTE) => Validity::WellFormed,
        _ => Validity::Malformed,
    }
}

/// A complete frame. Only built from exactly `FRAME_LEN` collected bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    pub(crate) fn from_complete(bytes: Bytes) -> Self {
        debug_assert_eq!(bytes.len(), FRAME_LEN);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn validity(&self) -> Validity {
        validate(&self.0)
    }

    /// First two bytes, logged for malformed frames to show how the stream is misaligned.
    pub fn lead(&self) -> (u8, u8) {
        (self.0[0], self.0[1])
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Build a source frame: zero filled, sync byte, then `index` (mod 256) at offset 1.
pub fn source_frame(index: usize) -> [u8; FRAME_LEN] {
    let mut out = [0u8; FRAME_LEN];
    out[0] = SYNC_BYTE;
    out[1] = index as u8;
    out
}
