//! Tokio codec for newline-delimited protocol lines

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;

/// Maximum accepted length of a single incoming line (64 KiB)
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Codec that splits a byte stream into `\n`-terminated lines
///
/// A trailing `\r` is stripped so CRLF peers interoperate. Bytes that are not
/// valid UTF-8 are decoded lossily rather than failing the stream: the peer
/// may be relaying arbitrary process output.
#[derive(Debug, Clone)]
pub struct LineCodec {
    /// Offset already scanned for a newline in the current buffer
    next_index: usize,
    /// Maximum line length
    max_length: usize,
}

impl LineCodec {
    /// Create a codec with the default maximum line length
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    /// Create a codec with a custom maximum line length
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
        }
    }

    /// Maximum line length accepted by this codec
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let newline = src[self.next_index..].iter().position(|b| *b == b'\n');

        match newline {
            Some(offset) => {
                let end = self.next_index + offset;
                self.next_index = 0;

                let line = src.split_to(end + 1);
                if end > self.max_length {
                    tracing::warn!("Discarded {} byte line, limit is {}", end, self.max_length);
                    return Err(ProtocolError::LineTooLong {
                        max: self.max_length,
                    });
                }
                Ok(Some(decode_line(&line[..end])))
            }
            None if src.len() > self.max_length => {
                // Drop what we have; the stream is no longer line-aligned
                tracing::warn!("Discarded {} bytes without a newline", src.len());
                src.advance(src.len());
                self.next_index = 0;
                Err(ProtocolError::LineTooLong {
                    max: self.max_length,
                })
            }
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        if src.is_empty() {
            return Ok(None);
        }

        // Peer closed mid-line: surface the unterminated tail as a final line
        self.next_index = 0;
        let rest = src.split_to(src.len());
        Ok(Some(decode_line(&rest)))
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if line.contains('\n') {
            return Err(ProtocolError::EmbeddedNewline);
        }

        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    #[test]
    fn test_decode_single_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("alice\n");

        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("alice"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_strips_carriage_return() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("-h\r\nexit\n");

        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("-h"));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("exit"));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_partial_read() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("echo he");

        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"llo\nnext");
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("echo hello")
        );
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], b"next");
    }

    #[test]
    fn test_decode_empty_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("\n");

        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_decode_eof_returns_unterminated_tail() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("Goodbye!");

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap().as_deref(),
            Some("Goodbye!")
        );
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_invalid_utf8_is_lossy() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"ok \xff\n"[..]);

        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert!(line.starts_with("ok "));
        assert!(line.contains('\u{FFFD}'));
    }

    #[test]
    fn test_decode_line_too_long() {
        let mut codec = LineCodec::with_max_length(8);
        let mut buf = BytesMut::from("0123456789");

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::LineTooLong { max: 8 }));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_framed_stream_ends_after_line_too_long() {
        let (mut client, server) = tokio::io::duplex(256);
        let mut lines = FramedRead::new(server, LineCodec::with_max_length(8));

        client.write_all(b"ok\n0123456789\nlater\n").await.unwrap();
        drop(client);

        assert_eq!(lines.next().await.unwrap().unwrap(), "ok");
        assert!(matches!(
            lines.next().await,
            Some(Err(ProtocolError::LineTooLong { max: 8 }))
        ));
        assert!(lines.next().await.is_none());
    }

    #[tokio::test]
    async fn test_framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(256);
        let mut writer = FramedWrite::new(client, LineCodec::new());
        let mut reader = FramedRead::new(server, LineCodec::new());

        writer.send("alice".to_string()).await.unwrap();
        writer.send("-h".to_string()).await.unwrap();
        writer.close().await.unwrap();
        drop(writer);

        let received: Vec<String> = reader.map(|line| line.unwrap()).collect().await;
        assert_eq!(received, vec!["alice", "-h"]);
    }

    #[test]
    fn test_encode_appends_newline() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();

        codec.encode("echo a".to_string(), &mut buf).unwrap();
        codec.encode(String::from("exit"), &mut buf).unwrap();
        assert_eq!(&buf[..], b"echo a\nexit\n");
    }

    #[test]
    fn test_encode_rejects_embedded_newline() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();

        let err = codec.encode("a\nb".to_string(), &mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::EmbeddedNewline));
        assert!(buf.is_empty());
    }
}
