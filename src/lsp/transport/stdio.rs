//! Language servers spawned as child processes speaking over stdio.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Socket, SocketEvent, Transport, framing};
use crate::config::ServerConfig;
use crate::lsp::protocol::CloseCode;

/// Time a server gets to exit after its stdin was closed.
const EXIT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Spawns `ServerConfig::cmd` and frames messages over its stdin/stdout.
///
/// Process exit is reported as [`CloseCode::NORMAL`] for a zero status and
/// [`CloseCode::ABNORMAL`] otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioTransport;

impl StdioTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for StdioTransport {
    async fn connect(&self, server_id: &str, config: &ServerConfig) -> io::Result<Socket> {
        let (program, args) = config.cmd.split_first().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no command configured for {}", server_id),
            )
        })?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other(format!("Failed to obtain stdin for {}", program)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other(format!("Failed to obtain stdout for {}", program)))?;

        log::debug!(
            target: "polylsp::transport",
            "Spawned {} for {} (pid {:?})",
            program,
            server_id,
            child.id()
        );

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let writer_done = CancellationToken::new();

        tokio::spawn(writer_loop(stdin, outbound_rx, writer_done.clone()));
        let reader = tokio::spawn(reader_loop(stdout, inbound_tx.clone()));
        tokio::spawn(supervise(
            server_id.to_string(),
            child,
            reader,
            inbound_tx,
            writer_done,
        ));

        Ok(Socket {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Write queued messages until every sender is gone, then close stdin.
async fn writer_loop(
    mut stdin: ChildStdin,
    mut outbound: mpsc::UnboundedReceiver<Value>,
    writer_done: CancellationToken,
) {
    while let Some(message) = outbound.recv().await {
        if let Err(e) = framing::write_message(&mut stdin, &message).await {
            log::warn!(target: "polylsp::transport", "Failed to write message: {}", e);
            break;
        }
    }
    drop(stdin);
    writer_done.cancel();
}

async fn reader_loop(stdout: ChildStdout, inbound: mpsc::UnboundedSender<SocketEvent>) {
    let mut reader = BufReader::new(stdout);
    loop {
        match framing::read_message(&mut reader).await {
            Ok(message) => {
                if inbound.send(SocketEvent::Message(message)).is_err() {
                    break;
                }
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::UnexpectedEof {
                    log::warn!(target: "polylsp::transport", "Failed to read message: {}", e);
                }
                break;
            }
        }
    }
}

/// Wait for the process to end and report the close code last.
async fn supervise(
    server_id: String,
    mut child: Child,
    reader: tokio::task::JoinHandle<()>,
    inbound: mpsc::UnboundedSender<SocketEvent>,
    writer_done: CancellationToken,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = writer_done.cancelled() => None,
    };
    let status = match exited {
        Some(status) => status,
        None => match tokio::time::timeout(EXIT_GRACE_PERIOD, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                log::debug!(
                    target: "polylsp::transport",
                    "{} did not exit after its input closed; killing it",
                    server_id
                );
                let _ = child.kill().await;
                child.wait().await
            }
        },
    };

    // Everything the server wrote goes out before the close event
    let _ = reader.await;

    let code = match status {
        Ok(status) if status.success() => CloseCode::NORMAL,
        Ok(status) => {
            log::info!(target: "polylsp::transport", "{} exited with {}", server_id, status);
            CloseCode::ABNORMAL
        }
        Err(e) => {
            log::warn!(target: "polylsp::transport", "Failed to wait for {}: {}", server_id, e);
            CloseCode::ABNORMAL
        }
    };
    let _ = inbound.send(SocketEvent::Closed(code));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(cmd: &[&str]) -> ServerConfig {
        ServerConfig {
            cmd: cmd.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_program_is_not_found() {
        let err = StdioTransport::new()
            .connect("ghost", &config(&["nonexistent-binary-xyz123"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn empty_command_is_not_found() {
        let err = StdioTransport::new()
            .connect("empty", &config(&[]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn echoing_process_round_trips_frames() {
        let mut socket = StdioTransport::new()
            .connect("cat", &config(&["cat"]))
            .await
            .unwrap();

        let message = serde_json::json!({"jsonrpc": "2.0", "method": "ping"});
        socket.outbound.send(message.clone()).unwrap();
        assert_eq!(
            socket.inbound.recv().await,
            Some(SocketEvent::Message(message))
        );

        drop(socket.outbound);
        assert_eq!(
            socket.inbound.recv().await,
            Some(SocketEvent::Closed(CloseCode::NORMAL))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_process_closes_abnormally() {
        let mut socket = StdioTransport::new()
            .connect("false", &config(&["false"]))
            .await
            .unwrap();
        assert_eq!(
            socket.inbound.recv().await,
            Some(SocketEvent::Closed(CloseCode::ABNORMAL))
        );
    }
}
