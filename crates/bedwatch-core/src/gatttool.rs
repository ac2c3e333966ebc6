//! Spawned interactive-tool session backend.
//!
//! Drives a `gatttool -I` child process over its stdin/stdout pipes. The
//! child holds the BLE link; this module speaks its line protocol: a
//! `connect` handshake at open, `char-read-hnd` for each poll, `connect`
//! again for the soft retry, and `disconnect`/`exit` at close. Every wait on
//! the child's output is bounded by the session timeouts.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use bedwatch_types::DeviceIdentity;
use bedwatch_types::uuid::SWITCH_HANDLE;

use crate::error::{Error, Result};
use crate::session::{PeripheralSession, SessionConfig, SessionFactory};

/// Marker gatttool prints after a successful connect handshake.
const CONNECTED_MARKER: &str = "Connection successful";

/// Prefix of the line carrying a characteristic value.
const VALUE_MARKER: &str = "Characteristic value/descriptor:";

/// Quiet window used to flush late output after a timed-out read.
const STALE_DRAIN: Duration = Duration::from_millis(100);

/// Opens interactive `gatttool` sessions against the occupancy sensor.
pub struct ToolSessionFactory {
    config: SessionConfig,
    /// Program to spawn; overridable for tests.
    program: String,
}

impl ToolSessionFactory {
    /// Create a factory with the given session timeouts.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            program: "gatttool".to_string(),
        }
    }

    /// Override the spawned program (used by tests).
    #[must_use]
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl SessionFactory for ToolSessionFactory {
    async fn open(&self, identity: &DeviceIdentity) -> Result<Box<dyn PeripheralSession>> {
        let session = ToolSession::open(&self.program, identity.clone(), self.config.clone()).await?;
        Ok(Box::new(session))
    }
}

/// A live interactive-tool session.
pub struct ToolSession {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    identity: DeviceIdentity,
    config: SessionConfig,
    /// Set when a read timed out: its response may still arrive and must
    /// not satisfy the next read.
    stale: bool,
}

impl ToolSession {
    /// Spawn the tool and perform the connect handshake.
    async fn open(program: &str, identity: DeviceIdentity, config: SessionConfig) -> Result<Self> {
        let mut command = Command::new(program);
        command
            .arg("-I")
            .arg("-b")
            .arg(&identity.address)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(adapter) = &identity.adapter {
            command.arg("-i").arg(adapter);
        }

        let mut child = command
            .spawn()
            .map_err(|e| Error::no_connect(&identity.address, format!("spawn {program}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::no_connect(&identity.address, "tool stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::no_connect(&identity.address, "tool stdout not captured"))?;

        let mut session = Self {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            identity,
            config,
            stale: false,
        };

        session.handshake().await?;
        info!("Tool session open against {}", session.identity);
        Ok(session)
    }

    /// Send `connect` and wait for the success marker within the init
    /// timeout.
    async fn handshake(&mut self) -> Result<()> {
        self.send("connect").await?;
        let deadline = self.config.init_timeout;
        timeout(deadline, self.wait_for(CONNECTED_MARKER))
            .await
            .map_err(|_| Error::timeout("connect handshake", deadline))??;
        // The tool answers commands in order, so reaching the marker means
        // any response to an abandoned read has already been consumed.
        self.stale = false;
        Ok(())
    }

    /// Write one command line to the child's stdin.
    async fn send(&mut self, command: &str) -> Result<()> {
        self.stdin.write_all(command.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Consume output lines until one contains `marker`.
    ///
    /// An explicit connect error from the tool is surfaced as a protocol
    /// error; end-of-stream means the child died.
    async fn wait_for(&mut self, marker: &str) -> Result<()> {
        loop {
            match self.lines.next_line().await? {
                Some(line) if line.contains(marker) => return Ok(()),
                Some(line) if line.contains("connect error") || line.contains("Connection refused") => {
                    return Err(Error::protocol(format!("tool reported: {}", line.trim())));
                }
                Some(line) => debug!("tool: {}", line.trim()),
                None => return Err(Error::protocol("tool process closed its output")),
            }
        }
    }

    /// Consume output lines until a characteristic value line arrives, then
    /// parse its hex bytes.
    async fn wait_for_value(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.lines.next_line().await? {
                Some(line) => {
                    if let Some(hex) = line.find(VALUE_MARKER).map(|i| &line[i + VALUE_MARKER.len()..]) {
                        return parse_hex_bytes(hex);
                    }
                    if line.contains("error") || line.contains("Disconnected") {
                        return Err(Error::protocol(format!("tool reported: {}", line.trim())));
                    }
                    debug!("tool: {}", line.trim());
                }
                None => return Err(Error::protocol("tool process closed its output")),
            }
        }
    }

    /// Discard buffered output left behind by a timed-out read.
    async fn drain_stale(&mut self) {
        while let Ok(Ok(Some(line))) = timeout(STALE_DRAIN, self.lines.next_line()).await {
            debug!("Discarding stale tool output: {}", line.trim());
        }
    }
}

#[async_trait]
impl PeripheralSession for ToolSession {
    async fn read_switch(&mut self) -> Result<Vec<u8>> {
        if self.stale {
            self.drain_stale().await;
            self.stale = false;
        }
        self.send(&format!("char-read-hnd 0x{SWITCH_HANDLE:04x}")).await?;
        let deadline = self.config.read_timeout;
        match timeout(deadline, self.wait_for_value()).await {
            Ok(result) => result,
            Err(_) => {
                self.stale = true;
                Err(Error::timeout("read_switch", deadline))
            }
        }
    }

    async fn reconnect(&mut self) -> Result<()> {
        // Re-run the handshake on the existing child; the tool keeps its
        // prompt alive after a link drop.
        self.handshake().await?;
        debug!("Soft reconnect to {} succeeded", self.identity);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // The child may already be gone; report the first failure but keep
        // going so the process is always reaped.
        let sent = async {
            self.send("disconnect").await?;
            self.send("exit").await
        }
        .await;

        if let Err(e) = &sent {
            warn!("Tool session close handshake failed: {}", e);
        }
        self.child.kill().await.ok();
        sent
    }

    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }
}

/// Parse gatttool's space-separated hex byte dump (e.g. `"01 00"`).
fn parse_hex_bytes(hex: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for token in hex.split_whitespace() {
        let byte = u8::from_str_radix(token, 16)
            .map_err(|_| Error::protocol(format!("malformed hex byte '{token}' in value dump")))?;
        bytes.push(byte);
    }
    Ok(bytes)
}
