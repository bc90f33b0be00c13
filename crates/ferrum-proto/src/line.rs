//! CRLF line codec.
//!
//! Decodes newline-terminated lines (tolerating bare `\n`), strips the
//! terminator, and enforces the RFC 2812 512-byte limit. Encoded lines
//! get `\r\n` appended. Empty lines decode to empty strings; the
//! session skips them.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;

/// Maximum line length including CRLF (RFC 2812).
pub const MAX_LINE_LEN: usize = 512;

/// Tokio codec for IRC wire lines.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Index of the next byte to scan for `\n`.
    next_index: usize,
}

impl LineCodec {
    /// Create a codec.
    pub fn new() -> LineCodec {
        LineCodec::default()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, ProtocolError> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > MAX_LINE_LEN {
                return Err(ProtocolError::LineTooLong {
                    actual: line.len(),
                    limit: MAX_LINE_LEN,
                });
            }

            let text = std::str::from_utf8(&line)
                .map_err(|e| ProtocolError::InvalidUtf8(e.valid_up_to()))?;
            Ok(Some(text.trim_end_matches(['\r', '\n']).to_string()))
        } else {
            self.next_index = src.len();
            if src.len() > MAX_LINE_LEN {
                return Err(ProtocolError::LineTooLong {
                    actual: src.len(),
                    limit: MAX_LINE_LEN,
                });
            }
            Ok(None)
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_crlf_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("NICK alice\r\nUSER".as_bytes());
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("NICK alice".into()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"USER");
    }

    #[test]
    fn decodes_bare_lf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PING x\n".as_bytes());
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING x".into()));
    }

    #[test]
    fn empty_line_decodes_empty() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("\r\n".as_bytes());
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(String::new()));
    }

    #[test]
    fn rejects_oversized_lines() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&vec![b'a'; 600]);
        buf.extend_from_slice(b"\n");
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::LineTooLong { .. })
        ));
    }

    #[test]
    fn encodes_with_crlf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("PONG :x".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"PONG :x\r\n");
    }
}
