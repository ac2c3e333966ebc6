//! Newline-delimited JSON transport to the parent bus.
//!
//! One JSON object per line in each direction. Lines that do not parse as
//! a known control message are logged and skipped; the reader only stops
//! when its input reaches end of file.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::messages::{BusMessage, ControlMessage};

/// Read control messages line by line until end of input.
pub async fn read_loop<R>(input: R, control: mpsc::Sender<ControlMessage>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<ControlMessage>(line) {
                    Ok(msg) => {
                        if control.send(msg).await.is_err() {
                            debug!("Control channel closed; bus reader exiting");
                            return;
                        }
                    }
                    Err(err) => warn!("Unrecognized bus message ({err}): {line}"),
                }
            }
            Ok(None) => {
                debug!("Bus input closed; reader exiting");
                return;
            }
            Err(err) => {
                warn!("Bus read failed: {err}");
                return;
            }
        }
    }
}

/// Write outbound messages as JSON lines, flushing after each one.
pub async fn write_loop<W>(mut output: W, mut outbound: mpsc::Receiver<BusMessage>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = outbound.recv().await {
        let mut line = match serde_json::to_vec(&msg) {
            Ok(line) => line,
            Err(err) => {
                warn!("Failed to encode bus message: {err}");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(err) = output.write_all(&line).await {
            warn!("Bus write failed: {err}");
            return;
        }
        if let Err(err) = output.flush().await {
            warn!("Bus flush failed: {err}");
            return;
        }
    }
    debug!("Outbound channel closed; bus writer exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::StateNotification;
    use bedwatch_types::LifecycleState;

    #[tokio::test]
    async fn test_read_loop_skips_garbage() {
        let input: &[u8] = b"{\"type\": \"configure\"}\n\
            not json\n\
            \n\
            {\"type\": \"reboot\"}\n\
            {\"type\": \"app_init\", \"id\": \"app1\"}\n";
        let (tx, mut rx) = mpsc::channel(8);
        read_loop(input, tx).await;

        assert_eq!(rx.recv().await, Some(ControlMessage::Configure));
        assert_eq!(
            rx.recv().await,
            Some(ControlMessage::AppInit { id: "app1".into() })
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_write_loop_emits_one_line_per_message() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(BusMessage::State(StateNotification::new(
            "bedwatch",
            LifecycleState::Starting,
        )))
        .await
        .unwrap();
        tx.send(BusMessage::State(StateNotification::new(
            "bedwatch",
            LifecycleState::Running,
        )))
        .await
        .unwrap();
        drop(tx);

        let mut output = Vec::new();
        write_loop(&mut output, rx).await;

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["state"], "starting");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["state"], "running");
    }
}
