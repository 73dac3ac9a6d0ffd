//! Connection pool and sessions
//!
//! Every accepted connection is registered here before its first request.
//! Classification promotes it to CONTROL (creating a session) or AUDIO
//! (attaching to an existing session). The pool owns the cancellation
//! tokens used to stop connections at shutdown.

use crate::error::{Result, ServerError};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tuneshare_dmap::Version;

/// Revision notifications kept per session; older ones are dropped first
pub const PENDING_CAPACITY: usize = 64;

/// Clients at or above this version park update requests
pub const LONG_POLL_VERSION: Version = Version::new(3, 0, 0);

pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Undetermined,
    Control,
    Audio,
}

/// A client session, bound to one CONTROL connection
#[derive(Debug)]
pub struct Session {
    id: u32,
    control: ConnectionId,
    version: Version,
    pending: Mutex<VecDeque<u32>>,
    notify: Notify,
    told: AtomicU32,
    logged_in: AtomicBool,
}

impl Session {
    fn new(id: u32, control: ConnectionId, version: Version) -> Self {
        Self {
            id,
            control,
            version,
            pending: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            told: AtomicU32::new(0),
            logged_in: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn control(&self) -> ConnectionId {
        self.control
    }

    /// Protocol version negotiated on the CONTROL connection
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn is_long_poll(&self) -> bool {
        self.version >= LONG_POLL_VERSION
    }

    pub fn mark_logged_in(&self) {
        self.logged_in.store(true, Ordering::Release);
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::Acquire)
    }

    /// Queue a committed revision and wake a parked update
    pub fn push(&self, revision: u32) {
        {
            let mut pending = self.pending.lock();
            if pending.len() >= PENDING_CAPACITY {
                pending.pop_front();
            }
            pending.push_back(revision);
        }
        self.notify.notify_one();
    }

    /// Empty the queue, returning the highest revision it held
    pub fn drain_pending(&self) -> Option<u32> {
        self.pending.lock().drain(..).max()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Record a revision reported to the client; returns the highest reported
    pub fn tell(&self, revision: u32) -> u32 {
        self.told.fetch_max(revision, Ordering::AcqRel).max(revision)
    }

    /// Highest revision reported to the client so far
    pub fn told(&self) -> u32 {
        self.told.load(Ordering::Acquire)
    }

    /// Resolves after the next `push`
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

/// Handle returned by `register`
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: ConnectionId,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
struct Entry {
    kind: ConnectionKind,
    session: Option<u32>,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct PoolInner {
    next_id: ConnectionId,
    connections: HashMap<ConnectionId, Entry>,
    sessions: HashMap<u32, Arc<Session>>,
}

impl PoolInner {
    fn count(&self, kind: ConnectionKind) -> usize {
        self.connections.values().filter(|e| e.kind == kind).count()
    }

    fn has_audio(&self, session: u32) -> bool {
        self.connections
            .values()
            .any(|e| e.kind == ConnectionKind::Audio && e.session == Some(session))
    }

    fn fresh_session_id(&self) -> u32 {
        loop {
            let id = rand::random::<u32>();
            if id != 0 && !self.sessions.contains_key(&id) {
                return id;
            }
        }
    }
}

#[derive(Debug)]
pub struct ConnectionPool {
    inner: Mutex<PoolInner>,
    max_connections: usize,
    root: CancellationToken,
    shutting_down: AtomicBool,
}

impl ConnectionPool {
    pub fn new(max_connections: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            max_connections,
            root: CancellationToken::new(),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Register an accepted connection as UNDETERMINED
    pub fn register(&self) -> Result<Registration> {
        let mut inner = self.inner.lock();
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(ServerError::ShuttingDown);
        }

        inner.next_id += 1;
        let id = inner.next_id;
        let cancel = self.root.child_token();
        inner.connections.insert(
            id,
            Entry {
                kind: ConnectionKind::Undetermined,
                session: None,
                cancel: cancel.clone(),
            },
        );
        Ok(Registration { id, cancel })
    }

    /// Classify a connection as CONTROL and open its session
    pub fn promote_control(&self, id: ConnectionId, version: Version) -> Result<Arc<Session>> {
        let mut inner = self.inner.lock();
        let controls = inner.count(ConnectionKind::Control);
        if controls >= self.max_connections {
            return Err(ServerError::Capacity(self.max_connections));
        }

        let session_id = inner.fresh_session_id();
        let entry = inner
            .connections
            .get_mut(&id)
            .ok_or_else(|| ServerError::Session(format!("connection {} is not registered", id)))?;
        if entry.kind != ConnectionKind::Undetermined {
            return Err(ServerError::Session(format!("connection {} already classified", id)));
        }
        entry.kind = ConnectionKind::Control;
        entry.session = Some(session_id);

        let session = Arc::new(Session::new(session_id, id, version));
        inner.sessions.insert(session_id, session.clone());
        tracing::debug!(connection = id, session = session_id, %version, "Session opened");
        Ok(session)
    }

    /// Classify a connection as AUDIO for an existing session
    pub fn promote_audio(&self, id: ConnectionId, session_id: Option<u32>) -> Result<Arc<Session>> {
        let mut inner = self.inner.lock();
        let session_id =
            session_id.ok_or_else(|| ServerError::Session("audio request without session id".to_string()))?;
        let session = inner
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or_else(|| ServerError::Session(format!("unknown session {}", session_id)))?;

        let control_live = inner
            .connections
            .get(&session.control())
            .is_some_and(|e| e.kind == ConnectionKind::Control && e.session == Some(session_id));
        if !control_live {
            return Err(ServerError::Session(format!(
                "session {} has no control connection",
                session_id
            )));
        }
        if inner.has_audio(session_id) {
            return Err(ServerError::Session(format!(
                "session {} already has an audio connection",
                session_id
            )));
        }

        let entry = inner
            .connections
            .get_mut(&id)
            .ok_or_else(|| ServerError::Session(format!("connection {} is not registered", id)))?;
        if entry.kind != ConnectionKind::Undetermined {
            return Err(ServerError::Session(format!("connection {} already classified", id)));
        }
        entry.kind = ConnectionKind::Audio;
        entry.session = Some(session_id);
        Ok(session)
    }

    /// Remove a connection; removing a CONTROL connection ends its session
    /// and stops the attached AUDIO connection
    pub fn unregister(&self, id: ConnectionId) {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.connections.remove(&id) else {
            return;
        };

        if entry.kind == ConnectionKind::Control {
            if let Some(session_id) = entry.session {
                inner.sessions.remove(&session_id);
                for other in inner.connections.values() {
                    if other.kind == ConnectionKind::Audio && other.session == Some(session_id) {
                        other.cancel.cancel();
                    }
                }
                tracing::debug!(connection = id, session = session_id, "Session closed");
            }
        }
    }

    pub fn session(&self, session_id: u32) -> Option<Arc<Session>> {
        self.inner.lock().sessions.get(&session_id).cloned()
    }

    /// Queue a revision on every live session
    pub fn broadcast(&self, revision: u32) {
        let sessions: Vec<_> = self.inner.lock().sessions.values().cloned().collect();
        tracing::trace!(revision, sessions = sessions.len(), "Broadcasting revision");
        for session in sessions {
            session.push(revision);
        }
    }

    /// Stop every connection and refuse new ones
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        self.shutting_down.store(true, Ordering::Release);
        self.root.cancel();
        inner.connections.clear();
        inner.sessions.clear();
        tracing::info!("Connection pool shut down");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Token cancelled at shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.root.clone()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    pub fn control_count(&self) -> usize {
        self.inner.lock().count(ConnectionKind::Control)
    }

    pub fn audio_count(&self) -> usize {
        self.inner.lock().count(ConnectionKind::Audio)
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }
}
