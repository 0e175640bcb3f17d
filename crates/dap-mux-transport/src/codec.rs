//! `Content-Length` framing used on debug adapter byte streams.

use dap_mux_core::{ProtocolMessage, TransportError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const CONTENT_LENGTH: &str = "Content-Length";

/// Read one framed message.
///
/// Returns `Ok(None)` on a clean end of stream between messages.
///
/// # Errors
/// Returns error on I/O failure, a malformed header block or a body that
/// is not a valid message.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<ProtocolMessage>, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let mut content_length: Option<usize> = None;
    let mut in_headers = false;

    let length = loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            if in_headers {
                return Err(TransportError::InvalidFrame(
                    "stream ended inside header block".into(),
                ));
            }
            return Ok(None);
        }

        let header = line.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            match content_length {
                Some(length) => break length,
                None if in_headers => {
                    return Err(TransportError::InvalidFrame(format!(
                        "missing {CONTENT_LENGTH} header"
                    )));
                }
                // stray separator between messages
                None => continue,
            }
        }

        in_headers = true;
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| TransportError::InvalidFrame(format!("bad header line: {header}")))?;
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            let length = value.trim().parse().map_err(|_| {
                TransportError::InvalidFrame(format!("bad {CONTENT_LENGTH}: {}", value.trim()))
            })?;
            content_length = Some(length);
        }
    };

    let mut body = vec![0; length];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}

/// Write one framed message and flush.
///
/// # Errors
/// Returns error if serialization or the write fails.
pub async fn write_message<W>(writer: &mut W, message: &ProtocolMessage) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let body = serde_json::to_vec(message)?;
    let header = format!("{CONTENT_LENGTH}: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use dap_mux_core::{Event, Request};
    use tokio::io::BufReader;

    use super::*;

    fn frame(json: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{json}", json.len()).into_bytes()
    }

    #[tokio::test]
    async fn test_read_consecutive_messages() {
        let first = r#"{"seq":1,"type":"event","event":"initialized"}"#;
        let second = r#"{"seq":2,"type":"request","command":"threads"}"#;
        let mock = tokio_test::io::Builder::new()
            .read(&frame(first))
            .read(&frame(second))
            .build();
        let mut reader = BufReader::new(mock);

        let msg = read_message(&mut reader).await.unwrap().unwrap();
        assert!(matches!(msg, ProtocolMessage::Event(ref e) if e.event == "initialized"));
        let msg = read_message(&mut reader).await.unwrap().unwrap();
        assert!(matches!(msg, ProtocolMessage::Request(ref r) if r.command == "threads"));
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_split_across_chunks_with_extra_headers() {
        let body = r#"{"seq":5,"type":"event","event":"stopped","body":{"reason":"step"}}"#;
        let head = format!(
            "Content-Type: application/vscode-jsonrpc; charset=utf-8\r\ncontent-length: {}\r\n\r\n",
            body.len()
        );
        let (a, b) = body.split_at(10);
        let mock = tokio_test::io::Builder::new()
            .read(head.as_bytes())
            .read(a.as_bytes())
            .read(b.as_bytes())
            .build();
        let mut reader = BufReader::new(mock);

        let msg = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(msg.seq(), 5);
    }

    #[tokio::test]
    async fn test_missing_length_is_an_error() {
        let mock = tokio_test::io::Builder::new()
            .read(b"Content-Type: text/plain\r\n\r\n{}")
            .build();
        let mut reader = BufReader::new(mock);
        assert!(matches!(
            read_message(&mut reader).await,
            Err(TransportError::InvalidFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_write_frames_message() {
        let message: ProtocolMessage = Request::new(3, "threads", None).into();
        let json = serde_json::to_string(&message).unwrap();
        let mut mock = tokio_test::io::Builder::new().write(&frame(&json)).build();

        write_message(&mut mock, &message).await.unwrap();
    }

    #[tokio::test]
    async fn test_written_frame_reads_back() {
        let mut event = Event::new("output", Some(serde_json::json!({ "output": "hi\n" })));
        event.seq = 9;
        let message = ProtocolMessage::Event(event);

        let mut buf = Vec::new();
        write_message(&mut buf, &message).await.unwrap();
        let mut reader = BufReader::new(buf.as_slice());
        assert_eq!(read_message(&mut reader).await.unwrap(), Some(message));
    }
}
