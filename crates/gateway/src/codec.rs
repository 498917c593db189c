//! SOH/NUL wire codec.
//!
//! A message is a sequence of attributes separated by `0x01` (SOH) and
//! terminated by `0x00` (NUL). Each attribute is `key` or `key=value`; the
//! first attribute is the keyless kind tag. Values may not contain the
//! delimiter bytes. A NUL with no payload is a graceful close. An
//! unfinished message growing past the configured cap is a protocol error
//! and kills the connection.

use std::io;

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use rg_core::message::Message;

/// Attribute separator.
pub const SOH: u8 = 0x01;
/// Message terminator.
pub const NUL: u8 = 0x00;

/// One decoded wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete attribute message.
    Message(Message),
    /// Empty frame: the peer requested a graceful close.
    Close,
}

/// Protocol errors that tear the connection down.
#[derive(Debug, Error)]
pub enum WireError {
    /// An unfinished message exceeded the size cap.
    #[error("message exceeds {limit} bytes")]
    MessageTooLarge { limit: usize },
    /// Underlying socket error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Framing codec for the RiskGate wire protocol.
pub struct WireCodec {
    max_message_bytes: usize,
}

impl WireCodec {
    /// Codec with the given per-message size cap.
    pub fn new(max_message_bytes: usize) -> Self {
        Self { max_message_bytes }
    }
}

fn parse_payload(payload: &[u8]) -> Message {
    let attrs = payload
        .split(|byte| *byte == SOH)
        .map(|attr| {
            let text = String::from_utf8_lossy(attr);
            match text.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (text.into_owned(), String::new()),
            }
        })
        .collect();
    Message::new(attrs)
}

impl Decoder for WireCodec {
    type Item = Frame;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, WireError> {
        let Some(end) = src.iter().position(|byte| *byte == NUL) else {
            if src.len() > self.max_message_bytes {
                return Err(WireError::MessageTooLarge {
                    limit: self.max_message_bytes,
                });
            }
            return Ok(None);
        };

        let frame = src.split_to(end + 1);
        let payload = &frame[..end];
        if payload.is_empty() {
            return Ok(Some(Frame::Close));
        }
        Ok(Some(Frame::Message(parse_payload(payload))))
    }
}

impl Encoder<&Message> for WireCodec {
    type Error = WireError;

    fn encode(&mut self, msg: &Message, dst: &mut BytesMut) -> Result<(), WireError> {
        for (i, (key, value)) in msg.attrs().iter().enumerate() {
            if i > 0 {
                dst.put_u8(SOH);
            }
            dst.put_slice(key.as_bytes());
            if !value.is_empty() {
                dst.put_u8(b'=');
                dst.put_slice(value.as_bytes());
            }
        }
        dst.put_u8(NUL);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> WireCodec {
        WireCodec::new(1024)
    }

    fn decode_all(codec: &mut WireCodec, bytes: &[u8]) -> Vec<Frame> {
        let mut buf = BytesMut::from(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).expect("decode") {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn decodes_one_message() {
        let mut c = codec();
        let frames = decode_all(&mut c, b"Quote\x01symbol=X\x01price=100\x00");
        assert_eq!(frames.len(), 1);
        let Frame::Message(msg) = &frames[0] else {
            panic!("expected message frame");
        };
        assert_eq!(msg.kind(), "Quote");
        assert_eq!(msg.get("symbol"), Some("X"));
        assert_eq!(msg.get("price"), Some("100"));
    }

    #[test]
    fn decodes_split_delivery() {
        let mut c = codec();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"Quote\x01symbol=X");
        assert!(c.decode(&mut buf).expect("decode").is_none());
        buf.extend_from_slice(b"\x01price=100\x00");
        let frame = c.decode(&mut buf).expect("decode").expect("frame");
        let Frame::Message(msg) = frame else {
            panic!("expected message frame");
        };
        assert_eq!(msg.get("price"), Some("100"));
    }

    #[test]
    fn decodes_back_to_back_messages() {
        let mut c = codec();
        let frames = decode_all(&mut c, b"Quote\x01symbol=X\x00Quote\x01symbol=Y\x00");
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn bare_nul_is_graceful_close() {
        let mut c = codec();
        let frames = decode_all(&mut c, b"\x00");
        assert_eq!(frames, vec![Frame::Close]);
    }

    #[test]
    fn oversize_message_is_an_error() {
        let mut c = WireCodec::new(8);
        let mut buf = BytesMut::from(&b"0123456789abcdef"[..]);
        assert!(matches!(
            c.decode(&mut buf),
            Err(WireError::MessageTooLarge { limit: 8 })
        ));
    }

    #[test]
    fn encode_decode_roundtrip() {
        let msg = Message::build(
            "Order",
            [
                ("order_id", "O1"),
                ("user_id", "U1"),
                ("symbol", "X"),
                ("reject", "PriceCheck, 100"),
            ],
        );
        let mut c = codec();
        let mut buf = BytesMut::new();
        c.encode(&msg, &mut buf).expect("encode");
        let frame = c.decode(&mut buf).expect("decode").expect("frame");
        assert_eq!(frame, Frame::Message(msg));
    }

    #[test]
    fn keyless_attribute_roundtrip() {
        // The kind tag is keyless; it must encode without `=`.
        let msg = Message::build("Quote", [("symbol", "X")]);
        let mut c = codec();
        let mut buf = BytesMut::new();
        c.encode(&msg, &mut buf).expect("encode");
        assert_eq!(&buf[..], b"Quote\x01symbol=X\x00");
    }
}
