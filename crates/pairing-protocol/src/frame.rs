//! Frame codec for the pairing wire format
//!
//! Wire format (all integers little-endian):
//! ```text
//! +------------------+---------+---------------------+
//! | LENGTH (4B LE)   | TAG (1B)| PAYLOAD (LENGTH B)  |
//! +------------------+---------+---------------------+
//! ```
//!
//! Application writes are wrapped in an [`Envelope`], which prefixes the
//! frame with a single encrypt-flag byte.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    FRAME_HEADER_SIZE, LENGTH_PREFIX_SIZE, MAX_FRAME_PAYLOAD, ProtocolError, ProtocolResult,
};

/// Type of frame being transmitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    /// Application data (only valid once the channel is secure)
    Application = 0x00,
    /// Ephemeral public key
    KeyExchange = 0x02,
    /// PIN confirmation hash
    Confirmation = 0x03,
}

impl Tag {
    /// Parse a tag byte. Unknown values are rejected, never defaulted.
    pub fn from_byte(byte: u8) -> ProtocolResult<Self> {
        match byte {
            0x00 => Ok(Self::Application),
            0x02 => Ok(Self::KeyExchange),
            0x03 => Ok(Self::Confirmation),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// A decoded wire frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: Tag,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(tag: Tag, payload: impl Into<Bytes>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    /// Encoded size of this frame on the wire
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    /// Serialize to bytes for transmission
    pub fn encode(&self) -> ProtocolResult<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    fn encode_into(&self, buf: &mut BytesMut) -> ProtocolResult<()> {
        if self.payload.len() > MAX_FRAME_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_FRAME_PAYLOAD,
            });
        }

        buf.put_u32_le(self.payload.len() as u32);
        buf.put_u8(self.tag.to_byte());
        buf.put_slice(&self.payload);
        Ok(())
    }

    /// Parse a frame from a complete transport message.
    ///
    /// The declared length must match the bytes that follow the header
    /// exactly; both truncated and padded frames are rejected.
    pub fn decode(data: &[u8]) -> ProtocolResult<Self> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::FrameTooShort {
                len: data.len(),
                min: FRAME_HEADER_SIZE,
            });
        }

        let (prefix, rest) = data.split_at(LENGTH_PREFIX_SIZE);
        let mut length = [0u8; LENGTH_PREFIX_SIZE];
        length.copy_from_slice(prefix);
        let declared = u32::from_le_bytes(length) as usize;

        let tag_byte = rest[0];
        let body = &rest[1..];

        if declared != body.len() {
            return Err(ProtocolError::FrameLengthMismatch {
                declared,
                available: body.len(),
            });
        }

        let tag = Tag::from_byte(tag_byte)?;

        Ok(Self {
            tag,
            payload: Bytes::copy_from_slice(body),
        })
    }
}

/// Encode a frame from its parts
pub fn encode_frame(tag: Tag, payload: &[u8]) -> ProtocolResult<Bytes> {
    Frame::new(tag, Bytes::copy_from_slice(payload)).encode()
}

/// Decode a frame from a complete transport message
pub fn decode_frame(data: &[u8]) -> ProtocolResult<Frame> {
    Frame::decode(data)
}

/// Application write: one encrypt-flag byte followed by a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub encrypted: bool,
    pub frame: Frame,
}

impl Envelope {
    const FLAG_PLAINTEXT: u8 = 0x00;
    const FLAG_ENCRYPTED: u8 = 0x01;

    /// Wrap an already-sealed record in an encrypted application envelope
    pub fn encrypted(record: impl Into<Bytes>) -> Self {
        Self {
            encrypted: true,
            frame: Frame::new(Tag::Application, record),
        }
    }

    pub fn encode(&self) -> ProtocolResult<Bytes> {
        let mut buf = BytesMut::with_capacity(1 + self.frame.encoded_len());
        buf.put_u8(if self.encrypted {
            Self::FLAG_ENCRYPTED
        } else {
            Self::FLAG_PLAINTEXT
        });
        self.frame.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    pub fn decode(data: &[u8]) -> ProtocolResult<Self> {
        let (&flag, rest) = data.split_first().ok_or(ProtocolError::EmptyEnvelope)?;

        let encrypted = match flag {
            Self::FLAG_PLAINTEXT => false,
            Self::FLAG_ENCRYPTED => true,
            other => return Err(ProtocolError::UnknownEncryptFlag(other)),
        };

        Ok(Self {
            encrypted,
            frame: Frame::decode(rest)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_tag() -> impl Strategy<Value = Tag> {
        prop_oneof![
            Just(Tag::Application),
            Just(Tag::KeyExchange),
            Just(Tag::Confirmation),
        ]
    }

    proptest! {
        #[test]
        fn prop_frame_round_trip(tag in any_tag(), payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let encoded = encode_frame(tag, &payload).unwrap();
            let frame = decode_frame(&encoded).unwrap();
            prop_assert_eq!(frame.tag, tag);
            prop_assert_eq!(frame.payload.as_ref(), payload.as_slice());
        }

        #[test]
        fn prop_decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode_frame(&data);
            let _ = Envelope::decode(&data);
        }
    }

    #[test]
    fn test_wire_layout() {
        let encoded = encode_frame(Tag::KeyExchange, &[0xAA, 0xBB, 0xCC]).unwrap();
        assert_eq!(
            encoded.as_ref(),
            &[0x03, 0x00, 0x00, 0x00, 0x02, 0xAA, 0xBB, 0xCC]
        );
    }

    #[test]
    fn test_declared_length_exceeds_available() {
        let mut encoded = encode_frame(Tag::Confirmation, &[1u8; 32]).unwrap().to_vec();
        encoded.truncate(20);

        match decode_frame(&encoded) {
            Err(ProtocolError::FrameLengthMismatch {
                declared,
                available,
            }) => {
                assert_eq!(declared, 32);
                assert_eq!(available, 15);
            }
            other => panic!("expected FrameLengthMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut encoded = encode_frame(Tag::Application, b"abc").unwrap().to_vec();
        encoded.push(0xFF);

        assert!(matches!(
            decode_frame(&encoded),
            Err(ProtocolError::FrameLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_short_header_rejected() {
        assert!(matches!(
            decode_frame(&[0x01, 0x00, 0x00]),
            Err(ProtocolError::FrameTooShort { len: 3, .. })
        ));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert!(matches!(
            decode_frame(&[0x00, 0x00, 0x00, 0x00, 0x07]),
            Err(ProtocolError::UnknownTag(0x07))
        ));
    }

    #[test]
    fn test_envelope_flag() {
        let envelope = Envelope::encrypted(Bytes::from_static(b"sealed"));
        let encoded = envelope.encode().unwrap();
        assert_eq!(encoded[0], 0x01);
        assert_eq!(Envelope::decode(&encoded).unwrap(), envelope);

        let mut bogus = encoded.to_vec();
        bogus[0] = 0x02;
        assert!(matches!(
            Envelope::decode(&bogus),
            Err(ProtocolError::UnknownEncryptFlag(0x02))
        ));
        assert!(matches!(
            Envelope::decode(&[]),
            Err(ProtocolError::EmptyEnvelope)
        ));
    }
}
