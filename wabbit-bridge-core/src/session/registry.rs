// Session Registry
//
// Maps opaque handles to owned sessions. Handles are non-zero, issued in
// increasing order and never reused, so a handle below the next one to be
// issued that is no longer present has been closed.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use tracing::{debug, info, warn};

use crate::dispatch::Mode;
use crate::error::{BridgeResult, ErrorEnvelope, translate};
use crate::label::LabelKind;
use crate::session::{CoreFactory, ManagedSession};

/// Opaque session identifier handed to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(u64);

impl SessionHandle {
    /// Value the host uses for "no session"
    pub const NONE: u64 = 0;

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Information about an open session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub handle: SessionHandle,
    pub label_kind: LabelKind,
    pub core: String,
    pub opened_at: DateTime<Utc>,
    pub examples: u64,
}

/// Registry entry
struct SessionEntry {
    session: Mutex<Option<Box<dyn ManagedSession>>>,
    label_kind: LabelKind,
    core: &'static str,
    opened_at: DateTime<Utc>,
    examples: AtomicU64,
}

impl SessionEntry {
    fn info(&self, handle: SessionHandle) -> SessionInfo {
        SessionInfo {
            handle,
            label_kind: self.label_kind,
            core: self.core.to_string(),
            opened_at: self.opened_at,
            examples: self.examples.load(Ordering::Relaxed),
        }
    }
}

/// Slot taken for a session under construction
///
/// Given back on drop unless the session was registered, so failed and
/// unwinding constructions never hold on to it.
struct Slot<'r> {
    reserved: &'r AtomicUsize,
    kept: bool,
}

impl Slot<'_> {
    fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        if !self.kept {
            self.reserved.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// Registry of open sessions
pub struct SessionRegistry {
    sessions: DashMap<u64, Arc<SessionEntry>>,
    next_handle: AtomicU64,
    // Slots taken by open sessions and by constructions in flight.
    reserved: AtomicUsize,
    max_sessions: Option<usize>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_handle: AtomicU64::new(1),
            reserved: AtomicUsize::new(0),
            max_sessions: None,
        }
    }

    /// Create a registry that refuses to hold more than `limit` sessions
    pub fn with_max_sessions(limit: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            next_handle: AtomicU64::new(1),
            reserved: AtomicUsize::new(0),
            max_sessions: Some(limit),
        }
    }

    /// Construct a session and register it under a fresh handle
    pub fn initialize(&self, factory: &dyn CoreFactory, config: &str) -> BridgeResult<SessionHandle> {
        let slot = self.reserve()?;

        let session = factory.construct(config).map_err(|failure| {
            let envelope = translate(failure);
            warn!(core = factory.name(), kind = %envelope.kind, "session construction failed: {}", envelope.message);
            envelope
        })?;

        let label_kind = session.label_kind();
        let handle = SessionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let entry = SessionEntry {
            session: Mutex::new(Some(session)),
            label_kind,
            core: factory.name(),
            opened_at: Utc::now(),
            examples: AtomicU64::new(0),
        };
        self.sessions.insert(handle.0, Arc::new(entry));
        slot.keep();

        info!(%handle, %label_kind, core = factory.name(), "session initialized");
        Ok(handle)
    }

    /// Run one example through the session behind `handle`
    ///
    /// Calls against the same session are not serialized here: a call that
    /// finds the session busy is rejected instead of waiting.
    pub fn predict_or_learn(&self, handle: SessionHandle, text: &str, learn: bool) -> BridgeResult<f32> {
        let entry = self.entry(handle)?;
        let mut slot = Self::lock(&entry, handle)?;
        let session = slot.as_mut().ok_or_else(|| self.missing(handle))?;

        let prediction = session.predict_or_learn(text, Mode::from_learn_flag(learn))?;
        entry.examples.fetch_add(1, Ordering::Relaxed);
        Ok(prediction)
    }

    /// Close the session behind `handle`, releasing everything it owns
    pub fn close(&self, handle: SessionHandle) -> BridgeResult<()> {
        let entry = self.entry(handle)?;

        let session = match entry.session.try_lock() {
            Ok(mut slot) => slot.take(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().take(),
            Err(TryLockError::WouldBlock) => return Err(Self::busy(handle)),
        };
        if self.sessions.remove(&handle.0).is_some() {
            self.release();
        }

        let session = session.ok_or_else(|| self.missing(handle))?;
        let examples = entry.examples.load(Ordering::Relaxed);
        let result = session.close();

        match &result {
            Ok(()) => info!(%handle, examples, "session closed"),
            Err(err) => warn!(%handle, kind = %err.kind, "session closed with error: {}", err.message),
        }
        result
    }

    /// Label kind of an open session
    pub fn label_kind(&self, handle: SessionHandle) -> BridgeResult<LabelKind> {
        Ok(self.entry(handle)?.label_kind)
    }

    /// Information about an open session
    pub fn info(&self, handle: SessionHandle) -> BridgeResult<SessionInfo> {
        Ok(self.entry(handle)?.info(handle))
    }

    /// Information about every open session, ordered by handle
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|item| item.value().info(SessionHandle(*item.key())))
            .collect();
        sessions.sort_by_key(|info| info.handle);
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Take a slot for a session about to be constructed
    fn reserve(&self) -> BridgeResult<Slot<'_>> {
        let limit = self.max_sessions.unwrap_or(usize::MAX);
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |taken| {
                (taken < limit).then_some(taken + 1)
            })
            .map(|_| Slot { reserved: &self.reserved, kept: false })
            .map_err(|_| ErrorEnvelope::resource_exhausted(format!("session limit of {limit} reached")))
    }

    fn release(&self) {
        self.reserved.fetch_sub(1, Ordering::AcqRel);
    }

    fn entry(&self, handle: SessionHandle) -> BridgeResult<Arc<SessionEntry>> {
        self.sessions
            .get(&handle.0)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| self.missing(handle))
    }

    fn lock<'e>(
        entry: &'e SessionEntry,
        handle: SessionHandle,
    ) -> BridgeResult<MutexGuard<'e, Option<Box<dyn ManagedSession>>>> {
        entry.session.try_lock().map_err(|err| match err {
            TryLockError::WouldBlock => Self::busy(handle),
            TryLockError::Poisoned(_) => ErrorEnvelope::runtime(format!(
                "session {handle} was left inconsistent by an earlier failure; close it"
            )),
        })
    }

    fn busy(handle: SessionHandle) -> ErrorEnvelope {
        ErrorEnvelope::runtime(format!(
            "session {handle} is in use by another call; calls on one session must be serialized"
        ))
    }

    fn missing(&self, handle: SessionHandle) -> ErrorEnvelope {
        let raw = handle.0;
        if raw != SessionHandle::NONE && raw < self.next_handle.load(Ordering::Relaxed) {
            ErrorEnvelope::invalid_handle(format!("session {handle} has been closed"))
        } else {
            ErrorEnvelope::invalid_handle(format!("unknown session handle {handle}"))
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        let handles: Vec<u64> = self.sessions.iter().map(|item| *item.key()).collect();
        for raw in handles {
            let handle = SessionHandle(raw);
            debug!(%handle, "closing session left open at registry drop");
            if let Err(err) = self.close(handle) {
                warn!(%handle, "failed to close session: {err}");
            }
        }
    }
}
