//! Per-key connection pooling.
//!
//! One [`ConnectionPool`] exists per [`ConnectionKey`], which pairs the
//! owner identity with the connection string. Pooling is by exact key:
//! two owners never share a physical connection, and two spellings of the
//! same connection string are two pools.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::connection::Connection;
use crate::error::Result;
use crate::factory::ConnectionSource;

/// Identity of one pool: the owner plus the exact connection string.
///
/// Comparison is case-sensitive on both components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey {
    /// Owner identity, when connections are partitioned per caller.
    pub owner: Option<String>,
    /// The raw connection string, compared verbatim.
    pub connection_string: String,
}

impl ConnectionKey {
    /// Build a key from an optional owner and a connection string.
    #[must_use]
    pub fn new(owner: Option<&str>, connection_string: impl Into<String>) -> Self {
        Self {
            owner: owner.map(str::to_string),
            connection_string: connection_string.into(),
        }
    }
}

/// Counts of pooled connections, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatus {
    /// Connections currently checked out.
    pub active: usize,
    /// Connections idle in the pool.
    pub idle: usize,
}

struct PoolSets {
    /// Ids of connections currently checked out. The [`Connection`] itself
    /// lives inside the proxy while active.
    active: HashSet<Uuid>,
    /// Connections available for reuse.
    idle: HashMap<Uuid, Connection>,
}

/// The pool for one [`ConnectionKey`].
pub struct ConnectionPool {
    key: ConnectionKey,
    source: Arc<ConnectionSource>,
    idle_timeout: Duration,
    inner: Mutex<PoolSets>,
}

impl ConnectionPool {
    pub(crate) fn new(
        key: ConnectionKey,
        source: Arc<ConnectionSource>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            key,
            source,
            idle_timeout,
            inner: Mutex::new(PoolSets {
                active: HashSet::new(),
                idle: HashMap::new(),
            }),
        }
    }

    /// The key this pool serves.
    #[must_use]
    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Check out a connection, reusing an idle one when available.
    ///
    /// Idle connections past the idle timeout are evicted first; the pool
    /// then hands out any surviving idle connection, or opens a new one.
    ///
    /// # Errors
    ///
    /// Returns the connection-open error when a new physical connection is
    /// needed and cannot be established.
    pub async fn get_connection(&self) -> Result<Connection> {
        let (mut expired, reused) = {
            let mut sets = self.inner.lock();

            let expired_ids: Vec<Uuid> = sets
                .idle
                .iter()
                .filter(|(_, conn)| conn.last_used().elapsed() > self.idle_timeout)
                .map(|(id, _)| *id)
                .collect();
            let expired: Vec<Connection> = expired_ids
                .iter()
                .filter_map(|id| sets.idle.remove(id))
                .collect();

            let reusable = sets.idle.keys().next().copied();
            let reused = reusable.and_then(|id| {
                let conn = sets.idle.remove(&id)?;
                sets.active.insert(id);
                Some(conn)
            });
            (expired, reused)
        };

        // Driver close can block; it never runs under the pool lock.
        for conn in &mut expired {
            tracing::debug!(connection_id = %conn.id(), "evicting idle connection");
            conn.close();
        }

        if let Some(conn) = reused {
            tracing::debug!(connection_id = %conn.id(), "reusing pooled connection");
            return Ok(conn);
        }

        let conn = self.source.create(&self.key).await?;
        self.inner.lock().active.insert(conn.id());
        Ok(conn)
    }

    /// Check a connection back in.
    ///
    /// The connection is recycled via the profile's teardown hook; on
    /// success it joins the idle set, otherwise it is closed and dropped
    /// from the pool entirely. A connection that was removed from the pool
    /// while checked out is closed rather than re-pooled.
    ///
    /// The teardown hook may call back into the pool (`status`,
    /// `remove_connection`), so the pool lock is never held across it. The
    /// connection is briefly in neither set during recycle; only this call
    /// touches it in that window.
    pub(crate) fn recycle_connection(&self, mut conn: Connection) {
        let id = conn.id();
        let was_active = self.inner.lock().active.remove(&id);

        if was_active && conn.recycle(self.source.profile()) {
            self.inner.lock().idle.insert(id, conn);
        } else {
            tracing::debug!(connection_id = %id, "disposing unrecyclable connection");
            conn.close();
        }
    }

    /// Remove a connection from the pool by id, closing it if it was idle.
    ///
    /// Returns `true` when the id was known to either set.
    pub fn remove_connection(&self, id: Uuid) -> bool {
        let mut sets = self.inner.lock();
        if sets.active.remove(&id) {
            return true;
        }
        if let Some(mut conn) = sets.idle.remove(&id) {
            drop(sets);
            conn.close();
            return true;
        }
        false
    }

    /// Current pool counts.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let sets = self.inner.lock();
        PoolStatus {
            active: sets.active.len(),
            idle: sets.idle.len(),
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("ConnectionPool")
            .field("key", &self.key)
            .field("active", &status.active)
            .field("idle", &status.idle)
            .finish()
    }
}
