//! Per-host connection pool.
//!
//! Every host (`scheme://host:port`) has its own [`HostPool`] that counts the
//! connections open to it, idle or busy, and parks idle ones for reuse.
//! Checking out a connection reuses an idle one, dials a new one while the
//! host is below its cap, or waits for a connection to be released.
//!
//! The open count is taken before dialing and released by a guard, so a dial
//! that fails or whose future is dropped never leaks a slot.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::connection::HttpConnection;
use crate::protocol::HttpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound of open connections per host, `0` means unbounded
    pub max_conns_per_host: usize,
    /// Upper bound of idle connections kept per host
    pub max_idle_per_host: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_conns_per_host: 0, max_idle_per_host: 8 }
    }
}

/// Identifies the host a connection is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl PoolKey {
    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }

    /// `host:port` to connect to
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

pub struct Pool {
    config: PoolConfig,
    hosts: Mutex<HashMap<PoolKey, Arc<HostPool>>>,
}

struct HostPool {
    key: PoolKey,
    config: PoolConfig,
    state: Mutex<HostState>,
    released: Notify,
}

#[derive(Default)]
struct HostState {
    open: usize,
    idle: VecDeque<HttpConnection>,
}

enum Acquire {
    Idle(HttpConnection),
    Dial,
    Wait,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Pool {
    pub fn new(config: PoolConfig) -> Self {
        Self { config, hosts: Mutex::new(HashMap::new()) }
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Number of open connections to `key`, idle ones included.
    pub fn open_connections(&self, key: &PoolKey) -> usize {
        lock(&self.hosts).get(key).map_or(0, |host| lock(&host.state).open)
    }

    /// Number of idle connections parked for `key`.
    pub fn idle_connections(&self, key: &PoolKey) -> usize {
        lock(&self.hosts).get(key).map_or(0, |host| lock(&host.state).idle.len())
    }

    fn host(&self, key: &PoolKey) -> Arc<HostPool> {
        let mut hosts = lock(&self.hosts);
        hosts
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(HostPool {
                    key: key.clone(),
                    config: self.config,
                    state: Mutex::new(HostState::default()),
                    released: Notify::new(),
                })
            })
            .clone()
    }

    /// Hands out a connection to `key`, dialing with `connect` when needed.
    pub async fn checkout<F, Fut>(&self, key: &PoolKey, connect: F) -> Result<PooledConnection, HttpError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<HttpConnection, HttpError>>,
    {
        let host = self.host(key);

        let slot = loop {
            // registered before the state is checked so a release in between isn't missed
            let released = host.released.notified();
            let mut released = std::pin::pin!(released);
            released.as_mut().enable();

            let acquire = {
                let mut state = lock(&host.state);
                if let Some(connection) = state.idle.pop_back() {
                    Acquire::Idle(connection)
                } else if host.config.max_conns_per_host == 0 || state.open < host.config.max_conns_per_host {
                    state.open += 1;
                    Acquire::Dial
                } else {
                    Acquire::Wait
                }
            };

            match acquire {
                Acquire::Idle(mut connection) => {
                    if connection.is_closed() {
                        // the stale connection's slot is reused for a fresh dial
                        debug!(host = %host.key, "discard idle connection closed by peer");
                        break Slot::new(&host);
                    }
                    trace!(host = %host.key, "reuse idle connection");
                    return Ok(PooledConnection { connection: Some(connection), host: Arc::clone(&host), reused: true });
                }
                Acquire::Dial => break Slot::new(&host),
                Acquire::Wait => {
                    trace!(host = %host.key, limit = host.config.max_conns_per_host, "wait for a free connection");
                    released.await;
                }
            }
        };

        let connection = connect().await?;
        debug!(host = %host.key, open = lock(&host.state).open, "opened new connection");
        Ok(slot.fill(connection))
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool").field("config", &self.config).finish_non_exhaustive()
    }
}

impl HostPool {
    fn release(&self, connection: Option<HttpConnection>) {
        let closing = {
            let mut state = lock(&self.state);
            match connection {
                Some(connection) if connection.is_reusable() && state.idle.len() < self.config.max_idle_per_host => {
                    state.idle.push_back(connection);
                    None
                }
                other => Some(other),
            }
        };

        if let Some(connection) = closing {
            // the socket is gone before its slot is handed out again
            drop(connection);
            let mut state = lock(&self.state);
            state.open = state.open.saturating_sub(1);
        }
        self.released.notify_one();
    }
}

/// A reserved connection slot whose dial has not finished yet.
struct Slot {
    host: Arc<HostPool>,
    filled: bool,
}

impl Slot {
    fn new(host: &Arc<HostPool>) -> Self {
        Self { host: host.clone(), filled: false }
    }

    fn fill(mut self, connection: HttpConnection) -> PooledConnection {
        self.filled = true;
        PooledConnection { connection: Some(connection), host: self.host.clone(), reused: false }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if !self.filled {
            self.host.release(None);
        }
    }
}

/// A connection leased from the pool.
///
/// Dropping the lease hands the connection back: it is parked as idle when
/// its last exchange completed and the server keeps it alive, and closed
/// otherwise.
pub struct PooledConnection {
    connection: Option<HttpConnection>,
    host: Arc<HostPool>,
    reused: bool,
}

impl PooledConnection {
    /// Whether the connection already served an earlier exchange.
    pub fn is_reused(&self) -> bool {
        self.reused
    }
}

impl Deref for PooledConnection {
    type Target = HttpConnection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref().expect("connection taken before drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection.as_mut().expect("connection taken before drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.host.release(self.connection.take());
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection").field("host", &self.host.key).field("reused", &self.reused).finish()
    }
}
