//! Connection identity and tracking.
//!
//! The listener records every accepted connection here, exclusively for
//! shutdown bookkeeping and observability. It never reads or writes
//! connection I/O through this table: each transport is owned solely by
//! its handler task.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

/// Unique identifier for a connection, assigned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Immutable bookkeeping record for one accepted connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection identifier assigned by the registry.
    pub id: ConnectionId,
    /// Peer address reported at accept time.
    pub peer_addr: SocketAddr,
    /// When this connection was accepted.
    pub accepted_at: Instant,
}

/// Thread-safe registry of in-flight connections.
///
/// Entries are inserted by the accept loop before the handler task is
/// spawned and removed by the handler task on every completion path, so
/// the table always reflects at least the set of live connections.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Creates a new empty registry.
    ///
    /// Connection IDs start at 1 (0 is reserved as "no connection").
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a newly accepted connection and returns its handle.
    pub fn register(&self, peer_addr: SocketAddr) -> Arc<ConnectionHandle> {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = Arc::new(ConnectionHandle {
            id,
            peer_addr,
            accepted_at: Instant::now(),
        });
        self.connections.insert(id, Arc::clone(&handle));
        handle
    }

    /// Removes a connection from the registry, returning its handle if found.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.remove(&id).map(|(_, handle)| handle)
    }

    /// Looks up a connection by ID.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the number of tracked connections.
    #[must_use]
    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
