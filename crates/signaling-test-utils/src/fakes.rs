//! Fake collaborator implementations.
//!
//! Both fakes default to the happy path (everyone is authorized, everyone
//! has a push target, every push succeeds) and expose switches to flip on
//! the failure modes the core must survive.

use async_trait::async_trait;
use signaling_core::collaborators::{CollaboratorError, Directory, PushGateway, PushToken};
use signaling_protocol::envelope::IncomingCall;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// In-memory directory. Authorizes every member and resolves a push token
/// for every identity unless told otherwise.
#[derive(Debug, Default)]
pub struct FakeDirectory {
    denied: Mutex<HashSet<(String, String)>>,
    missing_targets: Mutex<HashSet<String>>,
    fail: AtomicBool,
}

impl FakeDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an identity as not authorized for a channel.
    pub fn deny(&self, identity: &str, channel_id: &str) {
        self.denied
            .lock()
            .unwrap()
            .insert((identity.to_owned(), channel_id.to_owned()));
    }

    /// Remove the push target for an identity (lookups return `None`).
    pub fn drop_push_target(&self, identity: &str) {
        self.missing_targets.lock().unwrap().insert(identity.to_owned());
    }

    /// Make every lookup fail with a collaborator error.
    pub fn fail_lookups(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn is_authorized_member(
        &self,
        identity: &str,
        channel_id: &str,
    ) -> Result<bool, CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError("directory unavailable".to_owned()));
        }
        let denied = self
            .denied
            .lock()
            .unwrap()
            .contains(&(identity.to_owned(), channel_id.to_owned()));
        Ok(!denied)
    }

    async fn resolve_push_target(
        &self,
        identity: &str,
    ) -> Result<Option<PushToken>, CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError("directory unavailable".to_owned()));
        }
        if self.missing_targets.lock().unwrap().contains(identity) {
            return Ok(None);
        }
        Ok(Some(PushToken(format!("push-{identity}"))))
    }
}

/// In-memory push gateway that records every delivery.
#[derive(Debug, Default)]
pub struct FakePushGateway {
    pushes: Mutex<Vec<(PushToken, IncomingCall)>>,
    fail: AtomicBool,
}

impl FakePushGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every push fail with a collaborator error.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Everything pushed so far, in order.
    #[must_use]
    pub fn pushed(&self) -> Vec<(PushToken, IncomingCall)> {
        self.pushes.lock().unwrap().clone()
    }

    /// The most recently pushed incoming call.
    #[must_use]
    pub fn last_incoming(&self) -> Option<IncomingCall> {
        self.pushes
            .lock()
            .unwrap()
            .last()
            .map(|(_, incoming)| incoming.clone())
    }

    /// Wait for the next incoming-call push past the first `seen` ones.
    /// Panics after five seconds of silence.
    pub async fn wait_for_incoming(&self, seen: usize) -> IncomingCall {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            {
                let pushes = self.pushes.lock().unwrap();
                if let Some((_, incoming)) = pushes.get(seen) {
                    return incoming.clone();
                }
            }
            assert!(
                std::time::Instant::now() < deadline,
                "timed out waiting for an incoming-call push"
            );
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl PushGateway for FakePushGateway {
    async fn push_incoming_call(
        &self,
        token: &PushToken,
        incoming: &IncomingCall,
    ) -> Result<(), CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError("push gateway unavailable".to_owned()));
        }
        self.pushes
            .lock()
            .unwrap()
            .push((token.clone(), incoming.clone()));
        Ok(())
    }
}
