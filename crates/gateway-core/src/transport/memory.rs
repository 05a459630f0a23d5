//! In-process control channel
//!
//! [`pair`] returns the client half of a control channel together with a
//! [`MemoryPeer`] that plays the gateway: it observes every request the client
//! writes and injects frames or a close. Useful for embedding the client behind a
//! custom transport and for exercising the state machine without a socket.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use super::{Connection, OutboundFrame, TransportChannels, TransportEvent};

/// Gateway side of an in-process control channel
#[derive(Debug)]
pub struct MemoryPeer {
    sent: mpsc::UnboundedReceiver<OutboundFrame>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
}

/// Create a connected client half and gateway half
pub fn pair() -> (TransportChannels, MemoryPeer) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    (
        TransportChannels {
            connection: Connection::new(outbound_tx),
            inbound: inbound_rx,
        },
        MemoryPeer {
            sent: outbound_rx,
            inbound: inbound_tx,
        },
    )
}

impl MemoryPeer {
    /// Next frame written by the client, waiting at most `timeout`
    pub async fn recv_frame(&mut self, timeout: Duration) -> Option<OutboundFrame> {
        tokio::time::timeout(timeout, self.sent.recv()).await.ok().flatten()
    }

    /// Next request written by the client, decoded as JSON
    ///
    /// Returns `None` on timeout, on a close frame, or when the client is gone.
    pub async fn recv_request(&mut self, timeout: Duration) -> Option<Value> {
        match self.recv_frame(timeout).await? {
            OutboundFrame::Text(text) => serde_json::from_str(&text).ok(),
            OutboundFrame::Close => None,
        }
    }

    /// A frame the client has already written, without waiting
    pub fn try_recv_frame(&mut self) -> Option<OutboundFrame> {
        self.sent.try_recv().ok()
    }

    /// Deliver a JSON frame to the client
    pub fn deliver(&self, frame: Value) -> bool {
        self.inbound.send(TransportEvent::Frame(frame.to_string())).is_ok()
    }

    /// Deliver raw text, which need not be valid JSON
    pub fn deliver_text(&self, frame: impl Into<String>) -> bool {
        self.inbound.send(TransportEvent::Frame(frame.into())).is_ok()
    }

    /// Simulate the channel going away
    pub fn close(&self, reason: impl Into<String>) -> bool {
        self.inbound
            .send(TransportEvent::Closed {
                reason: reason.into(),
            })
            .is_ok()
    }
}
