/*!
 # Frame codec

 Every message exchanged with the bulb is one frame:

 ```text
 55 aa  len  category  function  payload...  checksum
 ```

 The checksum is `(256 * n - (sum + 1)) mod 256`, where `n` is the number of
 bytes before the checksum and `sum` is their sum. The bulb silently ignores
 frames with a wrong checksum, so [`encode`] always appends it.
*/

use thiserror::Error;
use tracing::warn;

use crate::command::{Category, Direction};

/// Magic bytes opening every frame
pub const HEADER: [u8; 2] = [0x55, 0xaa];

pub(crate) const LENGTH_OFFSET: usize = 2;
pub(crate) const CATEGORY_OFFSET: usize = 3;
pub(crate) const FUNCTION_OFFSET: usize = 4;
pub(crate) const PAYLOAD_OFFSET: usize = 5;

/// Header, length, category, function and checksum
const MIN_FRAME_LEN: usize = PAYLOAD_OFFSET + 1;

/// Errors returned by the frame codec
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Nothing was received
    #[error("frame is empty")]
    Empty,
    /// The frame ends before a field that must be present
    #[error("frame of {len} bytes is shorter than the {needed} bytes required")]
    Truncated { len: usize, needed: usize },
    /// The frame does not start with `55 aa`
    #[error("frame does not start with the 55 aa header")]
    BadHeader,
    /// The category byte is not part of the taxonomy
    #[error("unknown category code {0:#04x}")]
    UnknownCategory(u8),
    /// The payload does not fit the single length byte
    #[error("payload of {0} bytes is too long for one frame")]
    PayloadTooLong(usize),
}

/// Frame payload. A lone byte becomes a one-byte payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<u8> for Payload {
    fn from(value: u8) -> Self {
        Self(vec![value])
    }
}

impl<const N: usize> From<[u8; N]> for Payload {
    fn from(value: [u8; N]) -> Self {
        Self(value.to_vec())
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

/// Computes the checksum byte for `bytes` (everything before the checksum).
///
/// `256 * n` is a multiple of 256, so the formula reduces to the negated
/// low byte of `sum + 1`.
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes
        .iter()
        .fold(1u8, |acc, &byte| acc.wrapping_add(byte));
    0u8.wrapping_sub(sum)
}

/// Checks the trailing checksum byte of a complete frame
pub fn verify_checksum(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((&received, body)) => checksum(body) == received,
        None => false,
    }
}

/// Encodes a command frame for `category`/`function`, checksum included
pub fn encode(
    category: Category,
    function: u8,
    payload: impl Into<Payload>,
) -> Result<Vec<u8>, FrameError> {
    Frame::command(category, function, payload).encode()
}

/// A parsed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub category: Category,
    pub direction: Direction,
    pub function: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds an outbound frame
    pub fn command(category: Category, function: u8, payload: impl Into<Payload>) -> Self {
        Self {
            category,
            direction: Direction::Command,
            function,
            payload: payload.into().0,
        }
    }

    /// Serializes the frame and appends its checksum
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let len = u8::try_from(self.payload.len())
            .map_err(|_| FrameError::PayloadTooLong(self.payload.len()))?;

        let mut bytes = Vec::with_capacity(MIN_FRAME_LEN + self.payload.len());
        bytes.extend_from_slice(&HEADER);
        bytes.push(len);
        bytes.push(self.category.code_for(self.direction));
        bytes.push(self.function);
        bytes.extend_from_slice(&self.payload);
        bytes.push(checksum(&bytes));
        Ok(bytes)
    }

    /// Splits a raw frame into its fields.
    ///
    /// The payload is everything between the function byte and the checksum;
    /// the length byte is not trusted since some replies misreport it. A
    /// checksum mismatch is logged but not rejected.
    pub fn parse(raw: &[u8]) -> Result<Frame, FrameError> {
        if raw.is_empty() {
            return Err(FrameError::Empty);
        }
        if raw.len() < MIN_FRAME_LEN {
            return Err(FrameError::Truncated {
                len: raw.len(),
                needed: MIN_FRAME_LEN,
            });
        }
        if raw[..HEADER.len()] != HEADER {
            return Err(FrameError::BadHeader);
        }

        let (category, direction) = Category::from_code(raw[CATEGORY_OFFSET])
            .ok_or(FrameError::UnknownCategory(raw[CATEGORY_OFFSET]))?;

        if !verify_checksum(raw) {
            warn!(
                "Checksum mismatch on frame {:02x?} (length byte {})",
                raw, raw[LENGTH_OFFSET]
            );
        }

        Ok(Frame {
            category,
            direction,
            function: raw[FUNCTION_OFFSET],
            payload: raw[PAYLOAD_OFFSET..raw.len() - 1].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const LIGHT_STATUS: [u8; 15] = [
        0x55, 0xaa, 0x09, 0x88, 0x15, 0x00, 0x00, 0x00, 0x75, 0x8a, 0x8d, 0x01, 0x00, 0x50, 0x7d,
    ];

    #[test]
    fn lone_byte_becomes_single_byte_payload() {
        let frame = encode(Category::Light, 0x05, 0x01u8).unwrap();
        assert_eq!(vec![0x55, 0xaa, 0x01, 0x08, 0x05, 0x01, checksum(&frame[..6])], frame);
    }

    #[test]
    fn zero_payload_frame_keeps_length_field() {
        let frame = encode(Category::Timer, 0x16, Payload::empty()).unwrap();
        assert_eq!(6, frame.len());
        assert_eq!(0x00, frame[LENGTH_OFFSET]);
        assert!(verify_checksum(&frame));
    }

    #[test]
    fn checksum_matches_captured_status_frames() {
        assert_eq!(0x7d, checksum(&LIGHT_STATUS[..14]));
        assert!(verify_checksum(&LIGHT_STATUS));
        // speaker volume reply
        assert!(verify_checksum(&[0x55, 0xaa, 0x01, 0x84, 0x04, 0x20, 0x57]));
        // auto-light timer reply
        assert!(verify_checksum(&[
            0x55, 0xaa, 0x05, 0x85, 0x23, 0x00, 0x0c, 0x00, 0x0c, 0x00, 0x3b
        ]));
    }

    #[test]
    fn checksum_follows_the_formula() {
        let body = [0x55, 0xaa, 0x03, 0x08, 0x02, 0xff, 0x10, 0x00];
        let sum: usize = body.iter().map(|&b| usize::from(b)).sum();
        let expected = ((256 * body.len()) - (sum + 1)) % 256;
        assert_eq!(expected as u8, checksum(&body));
        assert_eq!(checksum(&body), checksum(&body));
    }

    #[test]
    fn checksum_changes_when_any_byte_changes() {
        let body = &LIGHT_STATUS[..14];
        let original = checksum(body);
        for index in 0..body.len() {
            let mut flipped = body.to_vec();
            flipped[index] ^= 0x01;
            assert_ne!(original, checksum(&flipped), "byte {index}");
        }
    }

    #[rstest]
    #[case::power(Category::Light, 0x05, vec![0x01])]
    #[case::color(Category::Light, 0x02, vec![0xff, 0x80, 0x00])]
    #[case::volume(Category::Speaker, 0x03, vec![0x1f])]
    #[case::timer_toggle(Category::Timer, 0x17, vec![])]
    #[case::device_state(Category::DeviceState, 0x01, vec![0x06])]
    fn parse_recovers_encoded_fields(
        #[case] category: Category,
        #[case] function: u8,
        #[case] payload: Vec<u8>,
    ) {
        let bytes = encode(category, function, payload.clone()).unwrap();
        let frame = Frame::parse(&bytes).unwrap();
        assert_eq!(
            Frame {
                category,
                direction: Direction::Command,
                function,
                payload,
            },
            frame
        );
        assert!(verify_checksum(&bytes));
    }

    #[test]
    fn parse_reads_reply_direction() {
        let frame = Frame::parse(&LIGHT_STATUS).unwrap();
        assert_eq!(Category::Light, frame.category);
        assert_eq!(Direction::Reply, frame.direction);
        assert_eq!(0x15, frame.function);
        assert_eq!(9, frame.payload.len());
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert_matches!(Frame::parse(&[]), Err(FrameError::Empty));
        assert_matches!(
            Frame::parse(&[0x55, 0xaa, 0x00]),
            Err(FrameError::Truncated { len: 3, needed: 6 })
        );
        assert_matches!(
            Frame::parse(&[0x7e, 0x00, 0x00, 0x08, 0x05, 0x00]),
            Err(FrameError::BadHeader)
        );
        assert_matches!(
            Frame::parse(&[0x55, 0xaa, 0x00, 0x42, 0x05, 0x00]),
            Err(FrameError::UnknownCategory(0x42))
        );
    }

    #[test]
    fn oversized_payload_is_rejected() {
        assert_matches!(
            encode(Category::Light, 0x02, vec![0u8; 256]),
            Err(FrameError::PayloadTooLong(256))
        );
    }
}
