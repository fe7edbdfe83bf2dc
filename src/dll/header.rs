//! # DLL Frame Header
//!
//! Encodes and decodes the data-link header that precedes the payload of
//! every D7A frame. Parsing is done with `nom`.
//!
//! ## Layout
//!
//! ```text
//! byte 0       subnet
//! byte 1       bit 0     target address present
//!              bit 1     VID used
//!              bits 7:2  EIRP index (6-bit two's complement)
//! bytes 2..10  target address (only if bit 0 of byte 1 is set)
//! ```

use bitflags::bitflags;
use nom::{
    bytes::complete::take,
    combinator::cond,
    number::complete::u8 as byte,
    IResult,
};
use thiserror::Error;

/// Length of a unique (UID) target address.
pub const TARGET_ADDRESS_LEN: usize = 8;

const EIRP_SHIFT: u8 = 2;
const EIRP_MIN: i8 = -32;
const EIRP_MAX: i8 = 31;

bitflags! {
    /// Flag bits of the control byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlFlags: u8 {
        const TARGET_ADDRESS_SET = 0b0000_0001;
        const VID_USED = 0b0000_0010;
    }
}

/// Errors decoding or encoding a [`DllHeader`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("Header truncated")]
    Truncated,

    #[error("EIRP index {0} outside -32..=31")]
    EirpIndexOutOfRange(i8),
}

/// Data-link header of a D7A frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DllHeader {
    pub subnet: u8,
    pub target_address_set: bool,
    pub vid_used: bool,
    /// Only meaningful when the frame uses a per-frame EIRP override.
    pub eirp_index: i8,
    /// Only meaningful when `target_address_set` is true.
    pub target_address: [u8; TARGET_ADDRESS_LEN],
}

impl DllHeader {
    /// Header for a broadcast frame (no target address).
    pub fn broadcast(subnet: u8, eirp_index: i8) -> Self {
        Self {
            subnet,
            target_address_set: false,
            vid_used: false,
            eirp_index,
            target_address: [0; TARGET_ADDRESS_LEN],
        }
    }

    /// Header addressed to a UID.
    pub fn unicast(subnet: u8, eirp_index: i8, target: [u8; TARGET_ADDRESS_LEN]) -> Self {
        Self {
            target_address_set: true,
            target_address: target,
            ..Self::broadcast(subnet, eirp_index)
        }
    }

    pub fn target(&self) -> Option<&[u8; TARGET_ADDRESS_LEN]> {
        self.target_address_set.then_some(&self.target_address)
    }

    /// Number of bytes this header occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        if self.target_address_set {
            2 + TARGET_ADDRESS_LEN
        } else {
            2
        }
    }

    pub fn control_flags(&self) -> ControlFlags {
        let mut flags = ControlFlags::empty();
        flags.set(ControlFlags::TARGET_ADDRESS_SET, self.target_address_set);
        flags.set(ControlFlags::VID_USED, self.vid_used);
        flags
    }

    /// Pack the control byte.
    pub fn control_byte(&self) -> Result<u8, HeaderError> {
        if !(EIRP_MIN..=EIRP_MAX).contains(&self.eirp_index) {
            return Err(HeaderError::EirpIndexOutOfRange(self.eirp_index));
        }
        Ok(self.control_flags().bits() | ((self.eirp_index as u8) << EIRP_SHIFT))
    }

    /// Append the encoded header to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), HeaderError> {
        let control = self.control_byte()?;
        out.push(self.subnet);
        out.push(control);
        if self.target_address_set {
            out.extend_from_slice(&self.target_address);
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, HeaderError> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Decode a header, returning it with the remaining payload.
    pub fn decode(input: &[u8]) -> Result<(Self, &[u8]), HeaderError> {
        let (rest, header) = parse_dll_header(input).map_err(|_| HeaderError::Truncated)?;
        Ok((header, rest))
    }
}

/// Sign-extend the upper six bits of the control byte.
fn eirp_index_from_control(control: u8) -> i8 {
    (control as i8) >> EIRP_SHIFT
}

/// `nom` parser for a [`DllHeader`].
pub fn parse_dll_header(input: &[u8]) -> IResult<&[u8], DllHeader> {
    let (input, subnet) = byte(input)?;
    let (input, control) = byte(input)?;
    let flags = ControlFlags::from_bits_truncate(control);
    let target_address_set = flags.contains(ControlFlags::TARGET_ADDRESS_SET);
    let (input, address) = cond(target_address_set, take(TARGET_ADDRESS_LEN))(input)?;

    let mut target_address = [0u8; TARGET_ADDRESS_LEN];
    if let Some(address) = address {
        target_address.copy_from_slice(address);
    }

    Ok((
        input,
        DllHeader {
            subnet,
            target_address_set,
            vid_used: flags.contains(ControlFlags::VID_USED),
            eirp_index: eirp_index_from_control(control),
            target_address,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_control_byte_layout() {
        let header = DllHeader {
            vid_used: true,
            ..DllHeader::unicast(0x05, -1, [1, 2, 3, 4, 5, 6, 7, 8])
        };
        // eirp -1 -> 0b111111 << 2, VID bit 1, address bit 0
        assert_eq!(header.control_byte(), Ok(0xFF));

        let header = DllHeader::broadcast(0x00, 10);
        assert_eq!(header.control_byte(), Ok(0x28));
    }

    #[test]
    fn test_decode_broadcast() {
        let (header, rest) = DllHeader::decode(&[0x12, 0x80, 0xAA, 0xBB]).unwrap();
        assert_eq!(header.subnet, 0x12);
        assert!(!header.target_address_set);
        assert!(!header.vid_used);
        assert_eq!(header.eirp_index, -32);
        assert_eq!(header.target(), None);
        assert_eq!(rest, &[0xAA, 0xBB]);
    }

    #[test]
    fn test_decode_unicast() {
        let bytes = [0x01, 0x29, 8, 7, 6, 5, 4, 3, 2, 1, 0x42];
        let (header, rest) = DllHeader::decode(&bytes).unwrap();
        assert_eq!(header.eirp_index, 10);
        assert_eq!(header.target(), Some(&[8, 7, 6, 5, 4, 3, 2, 1]));
        assert_eq!(rest, &[0x42]);
        assert_eq!(header.encode().unwrap(), bytes[..10].to_vec());
    }

    #[test]
    fn test_truncated() {
        assert_eq!(DllHeader::decode(&[0x01]), Err(HeaderError::Truncated));
        assert_eq!(DllHeader::decode(&[0x01, 0x01, 1, 2, 3]), Err(HeaderError::Truncated));
    }

    #[test]
    fn test_eirp_out_of_range() {
        assert_eq!(
            DllHeader::broadcast(0, 32).encode(),
            Err(HeaderError::EirpIndexOutOfRange(32))
        );
        assert_eq!(
            DllHeader::broadcast(0, -33).encode(),
            Err(HeaderError::EirpIndexOutOfRange(-33))
        );
    }

    proptest! {
        #[test]
        fn prop_header_bytes_roundtrip(
            subnet in any::<u8>(),
            control in any::<u8>(),
            address in any::<[u8; 8]>(),
        ) {
            let mut bytes = vec![subnet, control];
            if control & 0x01 != 0 {
                bytes.extend_from_slice(&address);
            }
            let (header, rest) = DllHeader::decode(&bytes).unwrap();
            prop_assert!(rest.is_empty());
            prop_assert_eq!(header.encode().unwrap(), bytes);
        }
    }
}
