//! Transport abstraction for the device link.
//!
//! This module provides a pluggable transport layer that abstracts
//! the underlying connection to the phone (Bluetooth, TCP, mock for
//! testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` establishes a connection
//! - `send()` transmits envelope bytes
//! - `recv()` waits for the next envelope from the phone
//! - `close()` terminates the session
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.connect("phone").await?;
//! transport.send(&envelope_bytes).await?;
//! let frame = transport.recv().await?;
//! ```

mod mock;

pub use mock::MockTransport;

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// Transport trait for exchanging link envelopes with the phone.
///
/// Implementations handle the underlying connection mechanism
/// (Bluetooth RFCOMM, TCP, mock, etc).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the phone identified by the given address.
    ///
    /// The address format is implementation-specific. For testing,
    /// it's arbitrary.
    async fn connect(&self, address: &str) -> Result<(), TransportError>;

    /// Send envelope bytes over the connection.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Receive the next envelope bytes from the phone.
    ///
    /// Blocks until a frame arrives or the connection closes.
    async fn recv(&self) -> Result<Vec<u8>, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection.
    async fn close(&self) -> Result<(), TransportError>;
}
