//! Length-prefixed frame codec for the d2d socket.
//!
//! Wire layout of one frame:
//!
//! ```text
//! u32 BE header_len | header_len bytes of UTF-8 JSON header | fileLength bytes of payload
//! ```

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Duration;

use crate::error::ProtocolError;
use crate::types::FrameHeader;

/// Deadline for a single `read_exactly` call.
pub const READ_TIMEOUT: Duration = Duration::from_millis(5000);

/// Upper bound on the JSON header block.
pub const MAX_HEADER_LEN: u32 = 64 * 1024;

/// Upper bound on a frame payload. Art-mode images stay well below it.
pub const MAX_PAYLOAD_LEN: u64 = 64 * 1024 * 1024;

const READ_CHUNK: usize = 16 * 1024;

/// One decoded frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Whether this frame closes a list transfer (`num == total - 1`).
    ///
    /// Frames without `num`/`total` are single-frame transfers.
    pub fn is_last(&self) -> bool {
        match (self.header.num, self.header.total) {
            (Some(num), Some(total)) => num.saturating_add(1) >= total,
            _ => true,
        }
    }
}

/// Reads exactly `len` bytes, accumulating across short reads.
///
/// Fails with `Timeout` when `len` bytes have not arrived within `timeout`
/// and with `ShortRead` when the stream ends first. The buffer grows with the
/// bytes actually received, so a bogus `len` costs nothing up front.
pub async fn read_exactly<R>(
    reader: &mut R,
    len: usize,
    timeout: Duration,
) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf: Vec<u8> = Vec::with_capacity(len.min(READ_CHUNK));
    let mut chunk = [0u8; READ_CHUNK];

    let fill = async {
        while buf.len() < len {
            let want = (len - buf.len()).min(READ_CHUNK);
            let n = reader.read(&mut chunk[..want]).await?;
            if n == 0 {
                return Err(ProtocolError::ShortRead {
                    expected: len,
                    received: buf.len(),
                });
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    };
    let outcome = tokio::time::timeout(timeout, fill).await;

    match outcome {
        Ok(Ok(())) => Ok(buf),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(ProtocolError::Timeout {
            expected: len,
            received: buf.len(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Reads one `(header, payload)` frame.
pub async fn read_frame<R>(reader: &mut R, timeout: Duration) -> Result<Frame, ProtocolError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let prefix = read_exactly(reader, 4, timeout).await?;
    let header_len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    if header_len == 0 || header_len > MAX_HEADER_LEN {
        return Err(ProtocolError::InvalidLengthPrefix(header_len));
    }

    let header_bytes = read_exactly(reader, header_len as usize, timeout).await?;
    let header_text = std::str::from_utf8(&header_bytes)
        .map_err(|e| ProtocolError::invalid_header(format!("not UTF-8: {}", e)))?;
    let header: FrameHeader = serde_json::from_str(header_text)
        .map_err(|e| ProtocolError::invalid_header(e.to_string()))?;

    if header.file_length > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::invalid_header(format!(
            "fileLength {} exceeds {} bytes",
            header.file_length, MAX_PAYLOAD_LEN
        )));
    }
    let file_length = usize::try_from(header.file_length)
        .map_err(|_| ProtocolError::invalid_header("fileLength does not fit in memory"))?;
    let payload = read_exactly(reader, file_length, timeout).await?;

    Ok(Frame { header, payload })
}

/// Reads frames until the one with `num == total - 1`, returning the payloads
/// in received order.
pub async fn read_frame_list<R>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Vec<Vec<u8>>, ProtocolError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut payloads = Vec::new();
    loop {
        let frame = read_frame(reader, timeout).await?;
        let last = frame.is_last();
        payloads.push(frame.payload);
        if last {
            return Ok(payloads);
        }
    }
}

/// Writes one frame and flushes the writer.
pub async fn write_frame<W, H>(writer: &mut W, header: &H, payload: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin + ?Sized,
    H: Serialize,
{
    let header = serde_json::to_vec(header).map_err(|e| ProtocolError::invalid_header(e.to_string()))?;
    let header_len = u32::try_from(header.len())
        .ok()
        .filter(|len| *len <= MAX_HEADER_LEN)
        .ok_or(ProtocolError::InvalidLengthPrefix(u32::MAX))?;

    writer.write_all(&header_len.to_be_bytes()).await?;
    writer.write_all(&header).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::duplex;
    use tokio::time::Instant;

    fn encode(header: serde_json::Value, payload: &[u8]) -> Vec<u8> {
        let header = serde_json::to_vec(&header).unwrap();
        let mut bytes = (header.len() as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(payload);
        bytes
    }

    #[tokio::test]
    async fn test_read_exactly_accumulates_partial_writes() {
        let (mut client, mut server) = duplex(64);
        let writer = tokio::spawn(async move {
            for chunk in [&[0u8, 1, 2][..], &[3, 4, 5, 6][..], &[7, 8, 9][..]] {
                server.write_all(chunk).await.unwrap();
                server.flush().await.unwrap();
                tokio::task::yield_now().await;
            }
            server
        });

        let bytes = read_exactly(&mut client, 10, READ_TIMEOUT).await.unwrap();

        assert_eq!(bytes, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        writer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_exactly_times_out_after_five_seconds() {
        let (mut client, mut server) = duplex(64);
        server.write_all(&[1, 2]).await.unwrap();

        let started = Instant::now();
        let result = read_exactly(&mut client, 10, READ_TIMEOUT).await;
        let elapsed = started.elapsed();

        match result {
            Err(ProtocolError::Timeout {
                expected,
                received,
                timeout_ms,
            }) => {
                assert_eq!(expected, 10);
                assert_eq!(received, 2);
                assert_eq!(timeout_ms, 5000);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(elapsed >= Duration::from_millis(5000));
        assert!(elapsed < Duration::from_millis(5100));
        drop(server);
    }

    #[tokio::test]
    async fn test_read_exactly_reports_short_read_on_close() {
        let (mut client, mut server) = duplex(64);
        server.write_all(&[1, 2, 3]).await.unwrap();
        drop(server);

        let result = read_exactly(&mut client, 10, READ_TIMEOUT).await;

        assert!(matches!(
            result,
            Err(ProtocolError::ShortRead {
                expected: 10,
                received: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_read_frame_single_payload() {
        let bytes = encode(json!({ "fileLength": 4 }), &[1, 2, 3, 4]);
        let mut reader = &bytes[..];

        let frame = read_frame(&mut reader, READ_TIMEOUT).await.unwrap();

        assert_eq!(frame.payload, vec![1, 2, 3, 4]);
        assert!(frame.is_last());
    }

    #[tokio::test]
    async fn test_read_frame_accepts_string_file_length() {
        let bytes = encode(json!({ "fileLength": "3", "num": "0", "total": "1" }), b"abc");
        let mut reader = &bytes[..];

        let frame = read_frame(&mut reader, READ_TIMEOUT).await.unwrap();

        assert_eq!(frame.payload, b"abc".to_vec());
        assert_eq!(frame.header.total, Some(1));
    }

    #[tokio::test]
    async fn test_read_frame_list_stops_at_last_index() {
        let mut bytes = encode(json!({ "fileLength": 1, "num": 0, "total": 3 }), &[10]);
        bytes.extend(encode(json!({ "fileLength": 2, "num": 1, "total": 3 }), &[20, 21]));
        bytes.extend(encode(json!({ "fileLength": 1, "num": 2, "total": 3 }), &[30]));
        // Trailing bytes after the last frame are never read.
        bytes.extend_from_slice(&[0xFF; 8]);
        let mut reader = &bytes[..];

        let payloads = read_frame_list(&mut reader, READ_TIMEOUT).await.unwrap();

        assert_eq!(payloads, vec![vec![10], vec![20, 21], vec![30]]);
        assert_eq!(reader.len(), 8);
    }

    #[tokio::test]
    async fn test_rejects_bad_length_prefix() {
        let bytes = 0u32.to_be_bytes();
        let mut reader = &bytes[..];
        assert!(matches!(
            read_frame(&mut reader, READ_TIMEOUT).await,
            Err(ProtocolError::InvalidLengthPrefix(0))
        ));
    }

    #[tokio::test]
    async fn test_rejects_malformed_header_json() {
        let mut bytes = 5u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"{nope");
        let mut reader = &bytes[..];
        assert!(matches!(
            read_frame(&mut reader, READ_TIMEOUT).await,
            Err(ProtocolError::InvalidHeader(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_oversized_file_length() {
        let bytes = encode(json!({ "fileLength": u64::MAX }), &[1, 2, 3]);
        let mut reader = &bytes[..];
        assert!(matches!(
            read_frame(&mut reader, READ_TIMEOUT).await,
            Err(ProtocolError::InvalidHeader(_))
        ));

        let bytes = encode(json!({ "fileLength": MAX_PAYLOAD_LEN + 1 }), &[]);
        let mut reader = &bytes[..];
        assert!(matches!(
            read_frame(&mut reader, READ_TIMEOUT).await,
            Err(ProtocolError::InvalidHeader(_))
        ));
    }

    #[tokio::test]
    async fn test_read_exactly_large_len_on_short_stream_is_short_read() {
        let bytes = [9u8; 5];
        let mut reader = &bytes[..];

        let result = read_exactly(&mut reader, usize::MAX, READ_TIMEOUT).await;

        assert!(matches!(
            result,
            Err(ProtocolError::ShortRead { received: 5, .. })
        ));
    }

    #[tokio::test]
    async fn test_write_frame_layout() {
        let mut out = Vec::new();
        write_frame(&mut out, &json!({ "fileLength": 2 }), &[7, 8])
            .await
            .unwrap();

        let header = br#"{"fileLength":2}"#;
        assert_eq!(&out[..4], &(header.len() as u32).to_be_bytes());
        assert_eq!(&out[4..4 + header.len()], header);
        assert_eq!(&out[4 + header.len()..], &[7, 8]);
    }
}
