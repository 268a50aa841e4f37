//! Session cache.
//!
//! Owns the loaded inference sessions, at most `capacity` of them (one by
//! default). All mutation goes through [`SessionCache::acquire`] and
//! [`SessionCache::evict`].
//!
//! # Single-flight loading
//!
//! Slots live in an arena keyed by model id behind one synchronous mutex that
//! is never held across an await. A `Loading` slot stores a shared future of
//! the load outcome: a caller either clones the in-flight future or installs
//! a new one while holding the mutex, so no identifier is ever loaded twice
//! at the same time.
//!
//! # Eviction
//!
//! Taking a slot for a new model removes the least recently acquired
//! occupant first. The new load does not start until the occupant is
//! released: a ready session once every [`SessionHandle`] on it is dropped,
//! a loading one once its cancelled load task has finished.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ChatError;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use modeldesk_model_loader::InferenceSession;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Builds the session for a model id. Implemented over the session factory.
#[async_trait]
pub trait SessionLoader: Send + Sync + 'static {
    async fn load(
        &self,
        model_id: &str,
        cancel: CancellationToken,
    ) -> Result<InferenceSession, ChatError>;
}

type LoadOutcome = Result<Arc<InferenceSession>, ChatError>;
type SharedLoad = Shared<BoxFuture<'static, LoadOutcome>>;

enum SlotState {
    Loading {
        load: SharedLoad,
        cancel: CancellationToken,
    },
    Ready {
        session: Arc<InferenceSession>,
        lease: Arc<RwLock<()>>,
    },
}

struct Slot {
    state: SlotState,
    generation: u64,
    last_used: u64,
}

#[derive(Default)]
struct Arena {
    slots: HashMap<String, Slot>,
    next_generation: u64,
    tick: u64,
}

/// Observable state of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SlotStatus {
    Loading,
    Ready { loaded_at: DateTime<Utc> },
}

/// Shared access to a ready session.
///
/// Holding a handle keeps the session alive and delays its release on
/// eviction until the handle is dropped.
pub struct SessionHandle {
    // Declared before the lease so the session reference is gone by the time
    // the evicting writer is let in
    session: Arc<InferenceSession>,
    _lease: OwnedRwLockReadGuard<()>,
}

impl Deref for SessionHandle {
    type Target = InferenceSession;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionHandle").field(&self.session.model_id()).finish()
    }
}

#[derive(Clone)]
pub struct SessionCache {
    arena: Arc<Mutex<Arena>>,
    loader: Arc<dyn SessionLoader>,
    capacity: usize,
    loads_started: Arc<AtomicUsize>,
}

impl SessionCache {
    /// Single-slot cache.
    pub fn new(loader: Arc<dyn SessionLoader>) -> Self {
        Self::with_capacity(loader, 1)
    }

    pub fn with_capacity(loader: Arc<dyn SessionLoader>, capacity: usize) -> Self {
        Self {
            arena: Arc::new(Mutex::new(Arena::default())),
            loader,
            capacity: capacity.max(1),
            loads_started: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of session builds started since creation.
    pub fn load_count(&self) -> usize {
        self.loads_started.load(Ordering::SeqCst)
    }

    /// Get a ready session for `model_id`, loading it if needed.
    ///
    /// Concurrent callers for the same id share one load and observe the
    /// same outcome. A caller whose load is evicted before it completes gets
    /// `Cancelled`.
    pub async fn acquire(&self, model_id: &str) -> Result<SessionHandle, ChatError> {
        let (load, generation) = {
            let mut arena = self.arena.lock();
            arena.tick += 1;
            let tick = arena.tick;

            match arena.slots.get_mut(model_id) {
                Some(slot) => {
                    slot.last_used = tick;
                    match &slot.state {
                        SlotState::Ready { session, lease } => {
                            debug!(model_id, "Session cache hit");
                            return lease_session(model_id, session, lease);
                        }
                        SlotState::Loading { load, .. } => {
                            debug!(model_id, "Joining in-flight load");
                            (load.clone(), slot.generation)
                        }
                    }
                }
                None => self.start_load(&mut arena, model_id, tick),
            }
        };

        load.await?;

        let arena = self.arena.lock();
        match arena.slots.get(model_id) {
            Some(Slot { state: SlotState::Ready { session, lease }, generation: current, .. })
                if *current == generation =>
            {
                lease_session(model_id, session, lease)
            }
            // Evicted between load completion and this caller waking up
            _ => Err(ChatError::cancelled(model_id)),
        }
    }

    /// Release a model. A loading model is cancelled and its waiters get
    /// `Cancelled`; a ready one is dropped once its handles are gone.
    ///
    /// Returns whether anything was evicted.
    pub async fn evict(&self, model_id: &str) -> bool {
        let release = {
            let mut arena = self.arena.lock();
            arena.slots.remove(model_id).map(|slot| release_slot(model_id, slot))
        };

        match release {
            Some(release) => {
                release.await;
                true
            }
            None => false,
        }
    }

    pub async fn evict_all(&self) {
        let releases: Vec<_> = {
            let mut arena = self.arena.lock();
            arena
                .slots
                .drain()
                .map(|(model_id, slot)| release_slot(&model_id, slot))
                .collect()
        };
        join_all(releases).await;
    }

    pub fn status(&self, model_id: &str) -> Option<SlotStatus> {
        self.arena.lock().slots.get(model_id).map(slot_status)
    }

    /// Every occupied slot, sorted by model id.
    pub fn snapshot(&self) -> Vec<(String, SlotStatus)> {
        let arena = self.arena.lock();
        let mut entries: Vec<_> = arena
            .slots
            .iter()
            .map(|(id, slot)| (id.clone(), slot_status(slot)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn is_ready(&self, model_id: &str) -> bool {
        matches!(self.status(model_id), Some(SlotStatus::Ready { .. }))
    }

    /// Evict down to free capacity, then install a `Loading` slot whose task
    /// waits for those evictions before building.
    fn start_load(&self, arena: &mut Arena, model_id: &str, tick: u64) -> (SharedLoad, u64) {
        let mut releases = Vec::new();
        while arena.slots.len() >= self.capacity {
            let victim = arena
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(id, _)| id.clone());
            let Some(victim) = victim else { break };
            if let Some(slot) = arena.slots.remove(&victim) {
                info!(evicted = %victim, incoming = model_id, "Evicting session to free a slot");
                releases.push(release_slot(&victim, slot));
            }
        }

        arena.next_generation += 1;
        let generation = arena.next_generation;
        let cancel = CancellationToken::new();
        self.loads_started.fetch_add(1, Ordering::SeqCst);

        let task = tokio::spawn(run_load(
            self.arena.clone(),
            self.loader.clone(),
            model_id.to_string(),
            generation,
            cancel.clone(),
            releases,
        ));

        let id = model_id.to_string();
        let load = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(join_error) => Err(ChatError::session_build(id, join_error)),
            }
        }
        .boxed()
        .shared();

        arena.slots.insert(
            model_id.to_string(),
            Slot {
                state: SlotState::Loading { load: load.clone(), cancel },
                generation,
                last_used: tick,
            },
        );
        (load, generation)
    }
}

/// Body of the spawned load task. Runs to completion even if every waiter
/// goes away.
async fn run_load(
    arena: Arc<Mutex<Arena>>,
    loader: Arc<dyn SessionLoader>,
    model_id: String,
    generation: u64,
    cancel: CancellationToken,
    releases: Vec<BoxFuture<'static, ()>>,
) -> LoadOutcome {
    info!(model_id = %model_id, "Loading session");

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ChatError::cancelled(&model_id)),
        result = async {
            join_all(releases).await;
            // A panicking engine must still reach the slot cleanup below
            match AssertUnwindSafe(loader.load(&model_id, cancel.clone()))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => {
                    Err(ChatError::session_build(&model_id, panic_message(panic.as_ref())))
                }
            }
        } => result.map(Arc::new),
    };

    let mut arena = arena.lock();
    let owns_slot = arena
        .slots
        .get(&model_id)
        .map(|slot| slot.generation == generation)
        .unwrap_or(false);

    match &outcome {
        Ok(session) if owns_slot => {
            if let Some(slot) = arena.slots.get_mut(&model_id) {
                slot.state = SlotState::Ready {
                    session: session.clone(),
                    lease: Arc::new(RwLock::new(())),
                };
            }
            info!(model_id = %model_id, "✅ Session ready");
        }
        Ok(_) => {
            // Evicted while loading; the session is dropped with the last waiter
            debug!(model_id = %model_id, "Loaded session no longer wanted");
        }
        Err(e) => {
            if owns_slot {
                arena.slots.remove(&model_id);
            }
            warn!(model_id = %model_id, error = %e, "Session load failed");
        }
    }

    outcome
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("loader panicked: {}", detail)
}

fn lease_session(
    model_id: &str,
    session: &Arc<InferenceSession>,
    lease: &Arc<RwLock<()>>,
) -> Result<SessionHandle, ChatError> {
    // Only evicted slots are ever write-locked, and those are out of the arena
    match lease.clone().try_read_owned() {
        Ok(guard) => Ok(SessionHandle {
            session: session.clone(),
            _lease: guard,
        }),
        Err(_) => Err(ChatError::cancelled(model_id)),
    }
}

/// Future that completes once an evicted slot's resources are released.
fn release_slot(model_id: &str, slot: Slot) -> BoxFuture<'static, ()> {
    let model_id = model_id.to_string();
    match slot.state {
        SlotState::Loading { load, cancel } => {
            info!(model_id = %model_id, "Cancelling in-flight load");
            cancel.cancel();
            async move {
                let _ = load.await;
                debug!(model_id = %model_id, "Cancelled load finished");
            }
            .boxed()
        }
        SlotState::Ready { session, lease } => async move {
            let _exclusive = lease.write_owned().await;
            drop(session);
            info!(model_id = %model_id, "Session released");
        }
        .boxed(),
    }
}

fn slot_status(slot: &Slot) -> SlotStatus {
    match &slot.state {
        SlotState::Loading { .. } => SlotStatus::Loading,
        SlotState::Ready { session, .. } => SlotStatus::Ready {
            loaded_at: session.loaded_at(),
        },
    }
}
