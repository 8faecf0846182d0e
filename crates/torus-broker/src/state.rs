//! Broker-wide mutable state.
//!
//! One instance lives for the whole broker process. The worker set and the
//! controller slot are guarded separately so turn dispatch never blocks
//! worker registration or keypress relay. The parking_lot locks are held
//! only for set mutation and handle snapshots, never across an RPC.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use torus_comm::RpcConnection;
use torus_core::Board;

/// Capacity of the keypress queue. Producers drop on overflow, which is
/// acceptable at human input rates.
const KEYPRESS_QUEUE: usize = 10;

/// A registered worker: its dial-back address and the live connection.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pub address: String,
    pub conn: Arc<RpcConnection>,
}

/// The last committed board, kept across controller sessions so a new
/// session can resume where the previous one quit.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub board: Board,
    pub turn: u64,
}

pub struct BrokerState {
    pub(crate) workers: Mutex<Vec<WorkerHandle>>,
    pub(crate) controller: tokio::sync::Mutex<Option<Arc<RpcConnection>>>,
    keypress_tx: mpsc::Sender<char>,
    keypress_rx: tokio::sync::Mutex<mpsc::Receiver<char>>,
    snapshot: Mutex<Option<Snapshot>>,
    shutdown_tx: watch::Sender<bool>,
}

impl BrokerState {
    pub fn new() -> Self {
        let (keypress_tx, keypress_rx) = mpsc::channel(KEYPRESS_QUEUE);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            workers: Mutex::new(Vec::new()),
            controller: tokio::sync::Mutex::new(None),
            keypress_tx,
            keypress_rx: tokio::sync::Mutex::new(keypress_rx),
            snapshot: Mutex::new(None),
            shutdown_tx,
        }
    }

    /// Queue a keypress for the controller loop. Overflow drops the key.
    pub fn push_keypress(&self, key: char) {
        if self.keypress_tx.try_send(key).is_err() {
            tracing::warn!(key = %key, "keypress queue full, dropping");
        }
    }

    /// Exclusive access to the keypress queue; held by the controller loop
    /// for the lifetime of a session (there is never more than one).
    pub(crate) async fn lock_keypresses(
        &self,
    ) -> tokio::sync::MutexGuard<'_, mpsc::Receiver<char>> {
        self.keypress_rx.lock().await
    }

    pub(crate) async fn clear_controller(&self) {
        self.controller.lock().await.take();
    }

    pub fn store_snapshot(&self, board: &Board, turn: u64) {
        *self.snapshot.lock() = Some(Snapshot {
            board: board.clone(),
            turn,
        });
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        self.snapshot.lock().clone()
    }

    /// Ask the accept loop (and anything else watching) to stop.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}

impl Default for BrokerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keypress_queue_drops_on_overflow() {
        let state = BrokerState::new();
        for _ in 0..15 {
            state.push_keypress('s');
        }

        let mut queue = state.lock_keypresses().await;
        let mut delivered = 0;
        while queue.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(delivered, 10);
    }

    #[test]
    fn snapshot_is_a_deep_copy() {
        let state = BrokerState::new();
        let mut board = Board::empty(4, 4);
        board.set(1, 1, true);
        state.store_snapshot(&board, 3);

        // Mutating the live board must not reach the stored snapshot.
        board.set(2, 2, true);

        let snapshot = state.snapshot().unwrap();
        assert_eq!(snapshot.turn, 3);
        assert_eq!(snapshot.board.alive_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_signal_reaches_subscribers() {
        let state = BrokerState::new();
        let mut shutdown = state.subscribe_shutdown();
        state.trigger_shutdown();
        shutdown.wait_for(|&stop| stop).await.unwrap();
    }
}
