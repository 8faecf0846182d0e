//! Worker membership.
//!
//! Workers announce a listening address; the broker dials back and keeps
//! the resulting connection in its worker set. Addresses are unique within
//! the set: a re-registration replaces the old record, which covers workers
//! that restarted faster than their connection died.

use std::sync::Arc;

use tracing::{info, warn};

use torus_comm::{RpcConnection, ServerResponse, WorkerRequest, WorkerResponse};

use crate::state::{BrokerState, WorkerHandle};

impl BrokerState {
    /// Dial a worker back and add it to the set.
    pub async fn connect_worker(&self, address: &str) -> ServerResponse {
        info!(worker = %address, "worker wants to connect");
        let conn = match RpcConnection::dial(address).await {
            Ok(conn) => Arc::new(conn),
            Err(err) => {
                warn!(worker = %address, error = %err, "failed to dial worker back");
                return ServerResponse::rejected(format!("failed to connect to worker: {err}"));
            }
        };

        let total = {
            let mut workers = self.workers.lock();
            if let Some(existing) = workers.iter_mut().find(|w| w.address == address) {
                info!(worker = %address, "duplicate worker, replacing connection");
                existing.conn = conn;
            } else {
                workers.push(WorkerHandle {
                    address: address.to_string(),
                    conn,
                });
            }
            workers.len()
        };
        info!(worker = %address, total, "worker registered");
        ServerResponse::ok("connected")
    }

    /// Drop a worker from the set. Its connection closes when the last
    /// in-flight handle goes away.
    pub fn disconnect_worker(&self, address: &str) {
        let mut workers = self.workers.lock();
        let before = workers.len();
        workers.retain(|w| w.address != address);
        if workers.len() < before {
            info!(worker = %address, remaining = workers.len(), "worker disconnected");
        } else {
            warn!(worker = %address, "not connected to that worker");
        }
    }

    /// Snapshot the current handles for one turn of dispatch.
    pub fn worker_handles(&self) -> Vec<WorkerHandle> {
        self.workers.lock().clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Tell every worker to terminate and empty the set.
    pub async fn shutdown_workers(&self) {
        let drained = std::mem::take(&mut *self.workers.lock());
        for worker in drained {
            info!(worker = %worker.address, "shutting down worker");
            let _ = worker
                .conn
                .call::<_, WorkerResponse>(&WorkerRequest::Shutdown)
                .await;
        }
    }
}
