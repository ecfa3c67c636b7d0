//! In-memory representation of a classic CAN 2.0A data frame and its
//! bit-level codec. The serialized body (identifier through data field)
//! is both the CRC input and the stuffed transmission payload.
use embedded_can::{Id, StandardId};

use crate::error::FrameCodecError;
use crate::infra::codec::bits::{BitCursor, BitSeq};

/// Identifier bits in a base-format frame.
pub const ID_BITS: u8 = 11;
/// RTR, IDE, and reserved bits between identifier and DLC. All three are
/// driven dominant: remote and extended frames are out of scope.
pub const CTRL_BITS: u8 = 3;
/// Data length code bits.
pub const DLC_BITS: u8 = 4;
/// CRC sequence bits.
pub const CRC_BITS: u8 = 15;
/// Identifier, control, and DLC bits preceding the data field.
pub const HEADER_BITS: usize = (ID_BITS + CTRL_BITS + DLC_BITS) as usize;
/// Maximum payload length in bytes.
pub const MAX_DLC: u8 = 8;

/// Classic CAN 2.0A data frame: 11-bit identifier, up to eight data
/// bytes. Only the first `dlc` payload bytes are significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    id: StandardId,
    dlc: u8,
    data: [u8; 8],
}

impl CanFrame {
    /// Build a data frame. Payloads longer than eight bytes are clamped.
    pub fn new(id: StandardId, data: &[u8]) -> Self {
        let dlc = data.len().min(MAX_DLC as usize);
        let mut bytes = [0u8; 8];
        bytes[..dlc].copy_from_slice(&data[..dlc]);
        Self {
            id,
            dlc: dlc as u8,
            data: bytes,
        }
    }

    /// Frame identifier.
    pub fn id(&self) -> StandardId {
        self.id
    }

    /// Raw 11-bit identifier value.
    pub fn id_raw(&self) -> u16 {
        self.id.as_raw()
    }

    /// Data length code (0 to 8).
    pub fn dlc(&self) -> u8 {
        self.dlc
    }

    /// The `dlc` significant payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }

    /// Serialize the frame body as an MSB-first bit sequence: identifier,
    /// RTR, IDE, reserved, DLC, then the data bytes. This pre-stuffing
    /// sequence is exactly the CRC input.
    pub fn to_bits(&self) -> BitSeq {
        let mut bits = BitSeq::new();
        push_field(&mut bits, self.id.as_raw(), ID_BITS);
        push_field(&mut bits, 0, CTRL_BITS);
        push_field(&mut bits, u16::from(self.dlc), DLC_BITS);
        for byte in self.data() {
            push_field(&mut bits, u16::from(*byte), 8);
        }
        bits
    }

    /// Rebuild a frame from a destuffed bit sequence: the inverse of
    /// [`CanFrame::to_bits`] followed by the 15 received CRC bits.
    ///
    /// A DLC larger than eight decodes clamped, never as an error; the
    /// caller is expected to verify the CRC separately, since corrupted
    /// DLC bits desynchronize everything after them. Bits trailing the
    /// CRC field (stored end-of-frame flag bits) are ignored.
    pub fn from_bits(bits: &BitSeq) -> Result<DecodedFrame, FrameCodecError> {
        let truncated = FrameCodecError::Truncated { bits: bits.len() };
        let mut cursor = BitCursor::new(bits);
        let id_raw = cursor.read_u16(ID_BITS).map_err(|_| truncated)?;
        cursor.skip(CTRL_BITS as usize).map_err(|_| truncated)?;
        let dlc = (cursor.read_u16(DLC_BITS).map_err(|_| truncated)? as u8).min(MAX_DLC);
        let mut data = [0u8; 8];
        for byte in data.iter_mut().take(dlc as usize) {
            *byte = cursor.read_u16(8).map_err(|_| truncated)? as u8;
        }
        let crc_len = cursor.position();
        let crc = cursor.read_u16(CRC_BITS).map_err(|_| truncated)?;
        let id = StandardId::new(id_raw).expect("an 11-bit read is always a valid standard id");
        Ok(DecodedFrame {
            frame: CanFrame { id, dlc, data },
            crc,
            crc_len,
        })
    }
}

/// Frame plus the CRC material needed to validate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame {
    /// The rebuilt data frame.
    pub frame: CanFrame,
    /// CRC value read from the wire.
    pub crc: u16,
    /// Number of leading bits the CRC covers (identifier through data).
    pub crc_len: usize,
}

fn push_field(bits: &mut BitSeq, value: u16, width: u8) {
    for shift in (0..width).rev() {
        let bit = (value >> shift) & 1 == 1;
        bits.push(bit)
            .expect("a frame body is at most 82 bits and fits the accumulator");
    }
}

//==================================================================================EMBEDDED_CAN

impl embedded_can::Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        match id.into() {
            Id::Standard(id) if data.len() <= MAX_DLC as usize => Some(CanFrame::new(id, data)),
            // Extended identifiers are out of scope for this link layer.
            _ => None,
        }
    }

    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        // The RTR bit exists on the wire but carries no semantics here.
        None
    }

    fn is_extended(&self) -> bool {
        false
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        Id::Standard(self.id)
    }

    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    fn data(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }
}
