//! # Session State Store
//!
//! Single-writer cell holding the reconciled [`SessionState`].
//!
//! ## Overview
//!
//! Readers get snapshots or a `tokio::sync::watch` receiver; only the
//! [`SessionManager`](crate::SessionManager) writes, and only through
//! [`SessionStore::commit`] and [`SessionStore::finish_loading`].
//!
//! ## Generations
//!
//! Every reconciliation attempt draws a [`Generation`] from
//! [`SessionStore::begin`] when it starts. A commit is applied only if its
//! generation is newer than the last applied one, so a slow attempt can never
//! overwrite the result of an attempt started after it. Clearing
//! `is_loading` is monotone and is applied regardless of generation.
//!
//! Once [`SessionStore::close`] has been called, every write is dropped.

use crate::error::{AuthError, Result};
use crate::types::{ApplicationUser, SessionState};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus, SessionEvent};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{watch, Mutex};
use tracing::debug;

/// Ordering tag of a reconciliation attempt. Higher means started later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A state change produced by a completed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Passive reconciliation confirmed the provider session.
    Restored(ApplicationUser),
    /// Explicit login confirmed by the backend.
    SignedIn(ApplicationUser),
    /// Explicit signup registered with the backend.
    SignedUp(ApplicationUser),
    /// The provider reported no session.
    Cleared,
    /// Explicit logout.
    SignedOut,
}

impl Transition {
    fn user(&self) -> Option<&ApplicationUser> {
        match self {
            Transition::Restored(user) | Transition::SignedIn(user) | Transition::SignedUp(user) => {
                Some(user)
            }
            Transition::Cleared | Transition::SignedOut => None,
        }
    }

    /// Completing this transition also completes session resolution.
    fn finishes_loading(&self) -> bool {
        matches!(
            self,
            Transition::Restored(_) | Transition::SignedIn(_) | Transition::Cleared
        )
    }

    fn event(&self, previous: Option<&ApplicationUser>) -> CoreEvent {
        match self {
            Transition::Restored(user) => CoreEvent::Session(SessionEvent::Restored {
                uid: user.uid.clone(),
            }),
            Transition::SignedIn(user) => CoreEvent::Auth(AuthEvent::SignedIn {
                uid: user.uid.clone(),
                username: user.username.clone(),
            }),
            Transition::SignedUp(user) => CoreEvent::Auth(AuthEvent::SignedUp {
                uid: user.uid.clone(),
            }),
            Transition::Cleared => CoreEvent::Session(SessionEvent::Cleared),
            Transition::SignedOut => CoreEvent::Auth(AuthEvent::SignedOut {
                uid: previous.map(|user| user.uid.clone()),
            }),
        }
    }
}

/// Owner of the shared session cell.
pub struct SessionStore {
    sender: watch::Sender<SessionState>,
    next_generation: AtomicU64,
    /// Last applied generation; held for the whole commit
    applied: Mutex<u64>,
    closed: AtomicBool,
    event_bus: EventBus,
}

impl SessionStore {
    pub fn new(event_bus: EventBus) -> Self {
        let (sender, _) = watch::channel(SessionState::default());
        Self {
            sender,
            next_generation: AtomicU64::new(0),
            applied: Mutex::new(0),
            closed: AtomicBool::new(false),
            event_bus,
        }
    }

    /// Draws the generation for an attempt that starts now.
    pub fn begin(&self) -> Generation {
        Generation(self.next_generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Applies `transition` unless a newer attempt already committed.
    ///
    /// # Errors
    ///
    /// - `AuthError::Superseded` - a newer generation has been applied; only
    ///   the loading flag was updated
    /// - `AuthError::ShutDown` - the store is closed; nothing was written
    pub async fn commit(&self, generation: Generation, transition: Transition) -> Result<()> {
        let mut applied = self.applied.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            debug!(%generation, "Dropping commit after shutdown");
            return Err(AuthError::ShutDown);
        }

        if generation.0 <= *applied {
            let applied = *applied;
            debug!(%generation, applied, "Discarding stale session update");
            if transition.finishes_loading() {
                self.clear_loading();
            }
            let _ = self
                .event_bus
                .emit(CoreEvent::Session(SessionEvent::Superseded {
                    generation: generation.0,
                    applied,
                }));
            return Err(AuthError::Superseded {
                generation: generation.0,
            });
        }

        *applied = generation.0;

        let user = transition.user().cloned();
        let finishes_loading = transition.finishes_loading();
        let mut previous = None;
        let mut loading_finished = false;
        self.sender.send_modify(|state| {
            previous = state.authenticated_user.take();
            state.authenticated_user = user;
            if finishes_loading && state.is_loading {
                state.is_loading = false;
                loading_finished = true;
            }
        });
        drop(applied);

        let _ = self.event_bus.emit(transition.event(previous.as_ref()));
        if loading_finished {
            let _ = self
                .event_bus
                .emit(CoreEvent::Session(SessionEvent::LoadingFinished));
        }

        debug!(%generation, "Session state committed");
        Ok(())
    }

    /// Marks the first session resolution as complete. No-op once closed.
    pub async fn finish_loading(&self) {
        let _applied = self.applied.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        self.clear_loading();
    }

    fn clear_loading(&self) {
        let changed = self.sender.send_if_modified(|state| {
            if state.is_loading {
                state.is_loading = false;
                true
            } else {
                false
            }
        });

        if changed {
            let _ = self
                .event_bus
                .emit(CoreEvent::Session(SessionEvent::LoadingFinished));
        }
    }

    /// Refuses all further writes. Waits for an in-flight commit to finish.
    pub async fn close(&self) {
        let _applied = self.applied.lock().await;
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Non-waiting variant of [`close`](Self::close) for drop paths.
    pub(crate) fn close_now(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Generation of the last applied commit (0 before the first one).
    pub async fn applied_generation(&self) -> u64 {
        *self.applied.lock().await
    }

    pub fn snapshot(&self) -> SessionState {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.sender.subscribe()
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &*self.sender.borrow())
            .field(
                "next_generation",
                &self.next_generation.load(Ordering::SeqCst),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(uid: &str) -> ApplicationUser {
        ApplicationUser::new(uid).with_username(format!("{}-name", uid))
    }

    #[tokio::test]
    async fn test_initial_state_is_loading() {
        let store = SessionStore::new(EventBus::new(16));
        let state = store.snapshot();
        assert!(state.is_loading);
        assert!(state.authenticated_user.is_none());
    }

    #[tokio::test]
    async fn test_generations_increase() {
        let store = SessionStore::new(EventBus::new(16));
        let first = store.begin();
        let second = store.begin();
        assert!(second > first);
        assert_eq!(first.value(), 1);
    }

    #[tokio::test]
    async fn test_commit_restored_sets_user_and_loading() {
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let store = SessionStore::new(bus);

        let generation = store.begin();
        store
            .commit(generation, Transition::Restored(user("u1")))
            .await
            .unwrap();

        let state = store.snapshot();
        assert_eq!(state.authenticated_user, Some(user("u1")));
        assert!(!state.is_loading);

        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Session(SessionEvent::Restored {
                uid: "u1".to_string()
            })
        );
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Session(SessionEvent::LoadingFinished)
        );
    }

    #[tokio::test]
    async fn test_stale_commit_is_discarded() {
        let store = SessionStore::new(EventBus::new(16));
        let older = store.begin();
        let newer = store.begin();

        store
            .commit(newer, Transition::SignedIn(user("new")))
            .await
            .unwrap();
        let result = store
            .commit(older, Transition::Restored(user("old")))
            .await;

        assert!(matches!(
            result,
            Err(AuthError::Superseded { generation: 1 })
        ));
        assert_eq!(store.snapshot().authenticated_user, Some(user("new")));
        assert_eq!(store.applied_generation().await, 2);
    }

    #[tokio::test]
    async fn test_stale_commit_still_finishes_loading() {
        let store = SessionStore::new(EventBus::new(16));
        let older = store.begin();
        let newer = store.begin();

        store
            .commit(newer, Transition::SignedUp(user("u1")))
            .await
            .unwrap();
        assert!(store.snapshot().is_loading);

        let _ = store.commit(older, Transition::Cleared).await;
        let state = store.snapshot();
        assert!(!state.is_loading);
        assert_eq!(state.authenticated_user, Some(user("u1")));
    }

    #[tokio::test]
    async fn test_signup_does_not_touch_loading() {
        let store = SessionStore::new(EventBus::new(16));
        let generation = store.begin();
        store
            .commit(generation, Transition::SignedUp(user("u1")))
            .await
            .unwrap();
        assert!(store.snapshot().is_loading);
    }

    #[tokio::test]
    async fn test_signed_out_event_names_previous_user() {
        let bus = EventBus::new(16);
        let store = SessionStore::new(bus.clone());
        let generation = store.begin();
        store
            .commit(generation, Transition::SignedIn(user("u1")))
            .await
            .unwrap();

        let mut events = bus.subscribe();
        let generation = store.begin();
        store
            .commit(generation, Transition::SignedOut)
            .await
            .unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::SignedOut {
                uid: Some("u1".to_string())
            })
        );
        assert!(store.snapshot().authenticated_user.is_none());
    }

    #[tokio::test]
    async fn test_closed_store_drops_writes() {
        let store = SessionStore::new(EventBus::new(16));
        store.close().await;
        assert!(store.is_closed());

        let generation = store.begin();
        let result = store
            .commit(generation, Transition::Restored(user("u1")))
            .await;
        assert!(matches!(result, Err(AuthError::ShutDown)));

        store.finish_loading().await;
        let state = store.snapshot();
        assert!(state.is_loading);
        assert!(state.authenticated_user.is_none());
    }

    #[tokio::test]
    async fn test_close_now_without_contention() {
        let store = SessionStore::new(EventBus::new(16));
        store.close_now();
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn test_watchers_see_commits() {
        let store = SessionStore::new(EventBus::new(16));
        let mut rx = store.subscribe();

        let generation = store.begin();
        store
            .commit(generation, Transition::SignedIn(user("u1")))
            .await
            .unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().authenticated_user, Some(user("u1")));
    }

    #[tokio::test]
    async fn test_finish_loading_is_monotone() {
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let store = SessionStore::new(bus);

        store.finish_loading().await;
        store.finish_loading().await;

        assert!(!store.snapshot().is_loading);
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Session(SessionEvent::LoadingFinished)
        );
        assert!(events.try_recv().is_err());
    }
}
