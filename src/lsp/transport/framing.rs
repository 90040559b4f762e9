//! LSP base protocol framing: `Content-Length: N\r\n\r\n{json}`.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Writes a JSON-RPC message with LSP Base Protocol framing.
pub async fn write_message<W>(writer: &mut W, message: &serde_json::Value) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json_str = serde_json::to_string(message)?;
    let content = format!("Content-Length: {}\r\n\r\n{}", json_str.len(), json_str);

    writer.write_all(content.as_bytes()).await?;
    writer.flush().await
}

/// Reads a JSON-RPC message with LSP Base Protocol framing.
///
/// Header fields other than `Content-Length` (e.g. `Content-Type`) are
/// skipped. End of stream before a header yields
/// [`io::ErrorKind::UnexpectedEof`].
pub async fn read_message<R>(reader: &mut R) -> io::Result<serde_json::Value>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length = None;
    loop {
        let mut header_line = String::new();
        if reader.read_line(&mut header_line).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed while reading headers",
            ));
        }

        let header = header_line.trim();
        if header.is_empty() {
            break;
        }
        if let Some(value) = header.strip_prefix("Content-Length:") {
            let length = value.trim().parse::<usize>().map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid Content-Length value: {}", e),
                )
            })?;
            content_length = Some(length);
        }
    }

    let content_length = content_length.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "Missing Content-Length header")
    })?;

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    Ok(serde_json::from_slice(&body)?)
}
