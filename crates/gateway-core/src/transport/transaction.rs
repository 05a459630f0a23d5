//! Request/response correlation
//!
//! Every outbound request carries a fresh transaction id and is remembered together
//! with the kind of response it expects. Responses are matched by id, so a success
//! to `create` and a success to `attach` are told apart by what was asked, not by
//! the shape of the reply.

use std::collections::HashMap;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::time::Instant;
use tracing::trace;

const TRANSACTION_ID_LEN: usize = 12;

/// Generate a random transaction id
pub fn new_transaction_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TRANSACTION_ID_LEN)
        .map(char::from)
        .collect()
}

/// What an outbound request was for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    /// `create`
    CreateSession,
    /// `attach`
    AttachHandle,
    /// SIP `register`
    Register,
    /// SIP `unregister`
    Unregister,
    /// SIP `call`
    Call,
    /// SIP `accept`
    Accept,
    /// SIP `decline`
    Decline,
    /// SIP `hangup`
    Hangup,
    /// SIP `update`
    Update,
    /// `trickle`
    Trickle,
    /// `keepalive`
    Keepalive,
    /// `destroy`
    Destroy,
}

impl TransactionKind {
    /// Session bootstrap steps; their failure is fatal
    pub fn is_bootstrap(self) -> bool {
        matches!(self, TransactionKind::CreateSession | TransactionKind::AttachHandle)
    }

    /// Requests fully answered by an `ack`
    pub fn completes_on_ack(self) -> bool {
        matches!(
            self,
            TransactionKind::Trickle | TransactionKind::Keepalive | TransactionKind::Destroy
        )
    }

    /// Requests belonging to the call state machine
    pub fn is_call_scoped(self) -> bool {
        matches!(
            self,
            TransactionKind::Call
                | TransactionKind::Accept
                | TransactionKind::Decline
                | TransactionKind::Hangup
                | TransactionKind::Update
        )
    }
}

/// One request waiting for its answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    /// What the request was for
    pub kind: TransactionKind,
    /// When it was sent
    pub sent_at: Instant,
    /// Whether the gateway already acknowledged it
    pub acknowledged: bool,
}

/// Pending transactions keyed by id
#[derive(Debug, Default)]
pub struct TransactionTracker {
    pending: HashMap<String, PendingTransaction>,
}

impl TransactionTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a request sent at `now`
    pub fn insert(&mut self, id: String, kind: TransactionKind, now: Instant) {
        trace!(transaction = %id, ?kind, "Tracking transaction");
        self.pending.insert(
            id,
            PendingTransaction {
                kind,
                sent_at: now,
                acknowledged: false,
            },
        );
    }

    /// Remove a request that got its final answer
    pub fn complete(&mut self, id: &str) -> Option<TransactionKind> {
        self.pending.remove(id).map(|p| p.kind)
    }

    /// Record an `ack`; requests that expect nothing more are completed
    pub fn acknowledge(&mut self, id: &str) -> Option<TransactionKind> {
        let kind = self.pending.get(id)?.kind;
        if kind.completes_on_ack() {
            self.pending.remove(id);
        } else if let Some(pending) = self.pending.get_mut(id) {
            pending.acknowledged = true;
        }
        Some(kind)
    }

    /// Drop every request older than `timeout`
    ///
    /// Returns the ones that were never acknowledged; acknowledged requests whose
    /// final event never came are dropped silently.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<(String, TransactionKind)> {
        let mut expired = Vec::new();
        self.pending.retain(|id, pending| {
            if now.saturating_duration_since(pending.sent_at) < timeout {
                return true;
            }
            if !pending.acknowledged {
                expired.push((id.clone(), pending.kind));
            }
            false
        });
        expired
    }

    /// Number of pending requests
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
