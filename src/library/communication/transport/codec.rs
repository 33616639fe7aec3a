//! Framing of [`Messages`](Message) on a byte stream
//!
//! Each frame carries exactly one message: a four byte big-endian length prefix followed
//! by the [`bincode`] encoding of the message.

use super::TransportError;
use crate::library::communication::Message;
use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Upper bound for a single frame if nothing else is configured
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// Length-delimited [`Message`] codec
#[derive(Debug)]
pub struct MessageCodec {
    frames: LengthDelimitedCodec,
}

impl MessageCodec {
    /// Creates a codec which rejects frames larger than `max_frame_length` bytes
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            frames: LengthDelimitedCodec::builder()
                .max_frame_length(max_frame_length)
                .new_codec(),
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LENGTH)
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, TransportError> {
        match self.frames.decode(src)? {
            Some(frame) => Ok(Some(bincode::deserialize(&frame)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = TransportError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), TransportError> {
        let raw = bincode::serialize(&message)?;
        self.frames.encode(Bytes::from(raw), dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::communication::{Payload, RemoteError, NO_REPLY};
    use pretty_assertions::assert_eq;

    #[test]
    fn decode_frames_split_across_reads() {
        let mut codec = MessageCodec::default();
        let message = Message::new("c", "a", "b", 3, Ok(Payload::encode(&42u32).unwrap()));

        let mut encoded = BytesMut::new();
        codec.encode(message.clone(), &mut encoded).unwrap();

        let mut partial = encoded.split_to(encoded.len() / 2);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.unsplit(encoded);
        assert_eq!(codec.decode(&mut partial).unwrap(), Some(message));
    }

    #[test]
    fn carry_error_bodies() {
        let mut codec = MessageCodec::default();
        let message = Message::new("c", "a", "b", NO_REPLY, Err(RemoteError::unsupported("x")))
            .with_response_id(9);

        let mut buffer = BytesMut::new();
        codec.encode(message.clone(), &mut buffer).unwrap();

        assert_eq!(codec.decode(&mut buffer).unwrap(), Some(message));
    }

    #[test]
    fn reject_oversized_frames() {
        let mut codec = MessageCodec::new(16);
        let message = Message::new(
            "conversation",
            "sender",
            "recipient",
            1,
            Ok(Payload::from_raw(vec![0; 64])),
        );

        let mut buffer = BytesMut::new();
        assert!(matches!(
            codec.encode(message, &mut buffer),
            Err(TransportError::Io(_))
        ));
    }
}
