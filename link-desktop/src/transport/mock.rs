//! Mock transport for testing.
//!
//! Plays the part of the phone: tests push inbound frames and inspect
//! what the desktop sent.

use super::{Transport, TransportError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Mock transport for testing.
///
/// Frames pushed with [`push_frame`](MockTransport::push_frame) are
/// delivered to `recv()` in order. `recv()` waits for the next frame
/// rather than failing when none is queued, so a dispatch loop can
/// block on it like it would on a real connection.
#[derive(Debug)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    inbound_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

#[derive(Debug)]
struct MockTransportInner {
    connected: bool,
    connected_address: Option<String>,
    sent_messages: Vec<Vec<u8>>,
    inbound_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    fail_next_connect: Option<String>,
    fail_next_send: Option<String>,
    fail_next_recv: Option<String>,
    sends_before_failure: Option<usize>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner {
                connected: false,
                connected_address: None,
                sent_messages: Vec::new(),
                inbound_tx: Some(tx),
                fail_next_connect: None,
                fail_next_send: None,
                fail_next_recv: None,
                sends_before_failure: None,
            })),
            inbound_rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }

    /// Push a frame to be delivered by `recv()`.
    pub fn push_frame(&self, data: Vec<u8>) {
        let inner = self.inner.lock().unwrap();
        if let Some(tx) = &inner.inbound_tx {
            let _ = tx.send(data);
        }
    }

    /// Simulate the phone dropping the link.
    ///
    /// Pending and future `recv()` calls observe `ConnectionClosed`
    /// once the queued frames are drained.
    pub fn drop_link(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
        inner.inbound_tx = None;
    }

    /// Get all messages that were sent.
    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.sent_messages.clone()
    }

    /// Get the last message that was sent.
    pub fn last_sent(&self) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.sent_messages.last().cloned()
    }

    /// Get the address that was connected to.
    pub fn connected_address(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.connected_address.clone()
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_connect = Some(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(error.to_string());
    }

    /// Cause the next recv() to fail with the given error.
    pub fn fail_next_recv(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_recv = Some(error.to_string());
    }

    /// Allow `successful` more sends, then fail every later one until
    /// [`clear_send_failures`](MockTransport::clear_send_failures).
    pub fn fail_sends_after(&self, successful: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.sends_before_failure = Some(successful);
    }

    /// Let sends succeed again.
    pub fn clear_send_failures(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = None;
        inner.sends_before_failure = None;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            inbound_rx: Arc::clone(&self.inbound_rx),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_connect.take() {
            return Err(TransportError::ConnectionFailed(error));
        }

        inner.connected = true;
        inner.connected_address = Some(address.to_string());
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        if let Some(remaining) = inner.sends_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(TransportError::SendFailed("simulated link break".into()));
            }
            *remaining -= 1;
        }

        inner.sent_messages.push(data.to_vec());
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        // Check flags under the sync lock, then wait without holding it.
        {
            let mut inner = self.inner.lock().unwrap();

            if let Some(error) = inner.fail_next_recv.take() {
                return Err(TransportError::ReceiveFailed(error));
            }

            if !inner.connected && inner.inbound_tx.is_some() {
                return Err(TransportError::NotConnected);
            }
        }

        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
        inner.inbound_tx = None;
        Ok(())
    }
}
