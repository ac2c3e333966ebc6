//! Mock session implementation for testing.
//!
//! Provides a scriptable [`PeripheralSession`] and a matching factory so
//! the supervisor and poll loop can be exercised without BLE hardware.
//!
//! # Features
//!
//! - **Failure injection**: fail the next N connect attempts, fail the soft
//!   reconnect handshake, fail close
//! - **Scripted reads**: queue per-read outcomes (value, timeout, protocol
//!   error)
//! - **Call log**: shared ordered record of session operations, for
//!   asserting recovery ordering

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use bedwatch_types::DeviceIdentity;

use crate::error::{Error, Result};
use crate::session::{PeripheralSession, SessionFactory};

/// Outcome of one scripted read.
#[derive(Debug, Clone)]
pub enum ReadScript {
    /// Return this raw payload.
    Ok(Vec<u8>),
    /// Fail with a read timeout.
    Timeout,
    /// Fail with a protocol error.
    Protocol,
}

/// Shared ordered record of mock session operations.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl CallLog {
    fn push(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    /// Snapshot of the calls made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls matching `name`.
    pub fn count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == name).count()
    }
}

#[derive(Debug, Default)]
struct MockState {
    fail_connects: AtomicU32,
    fail_soft_reconnect: AtomicBool,
    fail_close: AtomicBool,
    reads: Mutex<VecDeque<ReadScript>>,
    log: CallLog,
}

/// A scriptable session factory for tests.
///
/// Cloning shares the script and call log, so a test can keep a handle
/// after moving the factory into the supervisor.
#[derive(Debug, Clone, Default)]
pub struct MockSessionFactory {
    state: Arc<MockState>,
}

impl MockSessionFactory {
    /// Create a factory whose sessions succeed at everything and read `[0]`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` connect attempts with `NoConnect`.
    pub fn fail_next_connects(&self, n: u32) {
        self.state.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Make every soft reconnect handshake fail (or succeed again).
    pub fn fail_soft_reconnect(&self, fail: bool) {
        self.state.fail_soft_reconnect.store(fail, Ordering::SeqCst);
    }

    /// Make session close fail.
    pub fn fail_close(&self, fail: bool) {
        self.state.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Queue scripted read outcomes. Once the queue is drained, reads
    /// return `[0]`.
    pub fn script_reads(&self, scripts: Vec<ReadScript>) {
        self.state.reads.lock().unwrap().extend(scripts);
    }

    /// Handle to the shared call log.
    pub fn call_log(&self) -> CallLog {
        self.state.log.clone()
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn open(&self, identity: &DeviceIdentity) -> Result<Box<dyn PeripheralSession>> {
        self.state.log.push("open");

        let remaining = self.state.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state.fail_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::no_connect(&identity.address, "scripted connect failure"));
        }

        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            identity: identity.clone(),
        }))
    }
}

/// A scriptable peripheral session handed out by [`MockSessionFactory`].
pub struct MockSession {
    state: Arc<MockState>,
    identity: DeviceIdentity,
}

#[async_trait]
impl PeripheralSession for MockSession {
    async fn read_switch(&mut self) -> Result<Vec<u8>> {
        self.state.log.push("read");
        let script = self.state.reads.lock().unwrap().pop_front();
        match script {
            Some(ReadScript::Ok(bytes)) => Ok(bytes),
            Some(ReadScript::Timeout) => {
                Err(Error::timeout("read_switch", Duration::from_secs(3)))
            }
            Some(ReadScript::Protocol) => Err(Error::protocol("scripted protocol error")),
            None => Ok(vec![0]),
        }
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.state.log.push("reconnect");
        if self.state.fail_soft_reconnect.load(Ordering::SeqCst) {
            Err(Error::timeout("soft reconnect", Duration::from_secs(16)))
        } else {
            Ok(())
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.state.log.push("close");
        if self.state.fail_close.load(Ordering::SeqCst) {
            Err(Error::protocol("scripted close failure"))
        } else {
            Ok(())
        }
    }

    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new("AA:BB:CC:DD:EE:FF")
    }

    #[tokio::test]
    async fn test_default_session_reads_zero() {
        let factory = MockSessionFactory::new();
        let mut session = factory.open(&identity()).await.unwrap();
        assert_eq!(session.read_switch().await.unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_scripted_reads_in_order() {
        let factory = MockSessionFactory::new();
        factory.script_reads(vec![
            ReadScript::Ok(vec![1]),
            ReadScript::Timeout,
            ReadScript::Protocol,
        ]);
        let mut session = factory.open(&identity()).await.unwrap();

        assert_eq!(session.read_switch().await.unwrap(), vec![1]);
        assert!(matches!(
            session.read_switch().await,
            Err(Error::Timeout { .. })
        ));
        assert!(matches!(
            session.read_switch().await,
            Err(Error::Protocol(_))
        ));
        // drained: back to the default
        assert_eq!(session.read_switch().await.unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_fail_next_connects_decrements() {
        let factory = MockSessionFactory::new();
        factory.fail_next_connects(2);

        assert!(factory.open(&identity()).await.is_err());
        assert!(factory.open(&identity()).await.is_err());
        assert!(factory.open(&identity()).await.is_ok());
        assert_eq!(factory.call_log().count("open"), 3);
    }
}
