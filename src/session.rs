//! Server-side session registry.
//!
//! Keyed by JWT `jti`. Each session carries a watched [`SessionState`] so
//! long-lived responses (the SSE feeds) can observe sign-out and shut down,
//! and so profile resolution can happen off the login path without a stale
//! fetch clobbering a newer sign-in: every sign-in bumps the session epoch,
//! and a profile result is only committed when its epoch is still current.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::models::UserProfile;
use crate::repo::ProfileRepo;

#[derive(Debug, Clone, PartialEq)]
pub enum ProfileState {
    Loading,
    Loaded(UserProfile),
    /// Profile fetch failed; the session stays usable with claims only.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Session id never seen by this process.
    Unresolved,
    SignedOut,
    SignedIn { user_id: String, profile: ProfileState },
}

struct Entry {
    tx: watch::Sender<SessionState>,
    epoch: u64,
}

#[derive(Clone, Default)]
pub struct SessionHub {
    inner: Arc<DashMap<String, Entry>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sign-in and returns the epoch to commit the profile under.
    pub fn signed_in(&self, session: &str, user_id: &str) -> u64 {
        let state = SessionState::SignedIn {
            user_id: user_id.to_string(),
            profile: ProfileState::Loading,
        };
        let mut entry = self.inner.entry(session.to_string()).or_insert_with(|| Entry {
            tx: watch::channel(SessionState::Unresolved).0,
            epoch: 0,
        });
        entry.epoch += 1;
        entry.tx.send_replace(state);
        entry.epoch
    }

    /// Applies a resolved profile if the session is still on `epoch` and
    /// still signed in. Returns whether the result was committed.
    pub fn commit_profile(&self, session: &str, epoch: u64, result: Result<UserProfile, ()>) -> bool {
        let Some(entry) = self.inner.get(session) else {
            return false;
        };
        if entry.epoch != epoch {
            return false;
        }
        let current = entry.tx.borrow().clone();
        let SessionState::SignedIn { user_id, .. } = current else {
            return false;
        };
        let profile = match result {
            Ok(p) => ProfileState::Loaded(p),
            Err(()) => ProfileState::Failed,
        };
        entry.tx.send_replace(SessionState::SignedIn { user_id, profile });
        true
    }

    /// Fetch the profile and commit it under `epoch`.
    pub async fn resolve_profile<R>(&self, session: &str, epoch: u64, repo: &R, user_id: &str)
    where
        R: ProfileRepo + ?Sized,
    {
        match repo.get_profile(user_id).await {
            Ok(profile) => {
                self.commit_profile(session, epoch, Ok(profile));
            }
            Err(e) => {
                // Sign-in survives a missing or unreadable profile.
                log::warn!("profile load failed for {user_id}: {e}");
                self.commit_profile(session, epoch, Err(()));
            }
        }
    }

    pub fn signed_out(&self, session: &str) {
        let mut entry = self.inner.entry(session.to_string()).or_insert_with(|| Entry {
            tx: watch::channel(SessionState::Unresolved).0,
            epoch: 0,
        });
        entry.epoch += 1;
        entry.tx.send_replace(SessionState::SignedOut);
    }

    pub fn state(&self, session: &str) -> SessionState {
        match self.inner.get(session) {
            Some(entry) => entry.tx.borrow().clone(),
            None => SessionState::Unresolved,
        }
    }

    /// Watch a session, registering it as signed in if this process has not
    /// seen it yet (a valid token can outlive a restart).
    pub fn watch(&self, session: &str, user_id: &str) -> watch::Receiver<SessionState> {
        let entry = self.inner.entry(session.to_string()).or_insert_with(|| {
            let (tx, _rx) = watch::channel(SessionState::SignedIn {
                user_id: user_id.to_string(),
                profile: ProfileState::Loading,
            });
            Entry { tx, epoch: 1 }
        });
        entry.tx.subscribe()
    }
}

/// Resolves once the watched session signs out (or the hub goes away).
/// Used as the cut-off future for SSE streams.
pub fn until_signed_out(mut rx: watch::Receiver<SessionState>) -> impl Future<Output = ()> + Send {
    async move {
        loop {
            if matches!(&*rx.borrow(), SessionState::SignedOut) {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
