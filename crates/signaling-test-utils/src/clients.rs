//! Test clients driving real endpoint tasks.
//!
//! Each client spawns the actual endpoint `run` loop and talks to it over
//! the same in-process channels a transport would use: raw JSON frames in,
//! raw JSON frames out. Dropping a client (or calling `disconnect`) closes
//! the frame channel, which is exactly how a real socket close looks to
//! the endpoint.

use signaling_core::actors::messages::{ChannelNotice, ChannelPeer};
use signaling_core::actors::registry::RegistryHandle;
use signaling_core::collaborators::{Directory, PushGateway};
use signaling_core::endpoint::{CallEndpoint, CallSink, ChannelEndpoint, ChannelSink};
use signaling_protocol::envelope::CallId;

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const CHANNEL_BUFFER: usize = 64;

/// A connected call client.
pub struct TestCallClient {
    frames_tx: Option<mpsc::Sender<String>>,
    out_rx: mpsc::Receiver<String>,
    task: JoinHandle<()>,
}

impl TestCallClient {
    /// Spawn a call endpoint wired to this client.
    #[must_use]
    pub fn connect(
        registry: &RegistryHandle,
        directory: &Arc<dyn Directory>,
        push: &Arc<dyn PushGateway>,
    ) -> Self {
        let (sink, out_rx) = CallSink::new(CHANNEL_BUFFER);
        let endpoint = CallEndpoint::new(
            registry.clone(),
            Arc::clone(directory),
            Arc::clone(push),
            sink,
            CHANNEL_BUFFER,
        );
        let (frames_tx, frames_rx) = mpsc::channel(CHANNEL_BUFFER);
        let task = tokio::spawn(endpoint.run(frames_rx));
        Self {
            frames_tx: Some(frames_tx),
            out_rx,
            task,
        }
    }

    /// Send one frame to the server.
    pub async fn send(&self, frame: &Value) {
        self.frames_tx
            .as_ref()
            .expect("client already disconnected")
            .send(frame.to_string())
            .await
            .expect("endpoint task gone");
    }

    /// Receive the next frame from the server, panicking on timeout.
    pub async fn recv(&mut self) -> Value {
        let raw = timeout(RECV_TIMEOUT, self.out_rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed");
        serde_json::from_str(&raw).expect("server sent invalid JSON")
    }

    /// Assert that no frame arrives within a short window.
    pub async fn expect_silence(&mut self) {
        let outcome = timeout(Duration::from_millis(100), self.out_rx.recv()).await;
        assert!(
            outcome.is_err(),
            "expected no frame, got: {:?}",
            outcome.unwrap()
        );
    }

    /// Wait for the server to close the connection.
    pub async fn expect_close(&mut self) {
        let frame = timeout(RECV_TIMEOUT, self.out_rx.recv())
            .await
            .expect("timed out waiting for the connection to close");
        assert!(
            frame.is_none(),
            "expected the connection to close, got: {frame:?}"
        );
    }

    pub async fn login(&self, nick: &str) {
        self.send(&json!({"type": "LOGIN", "payload": {"nick": nick}}))
            .await;
    }

    pub async fn call(&self, to: &str) {
        self.send(&json!({"type": "CALL", "payload": {"to": to}}))
            .await;
    }

    pub async fn accept(&self, to: &str, call_id: &CallId) {
        self.send(&json!({
            "type": "ACCEPT",
            "payload": {"to": to, "call_id": call_id.as_str()}
        }))
        .await;
    }

    pub async fn refuse(&self, to: &str, call_id: &CallId) {
        self.send(&json!({
            "type": "REFUSE",
            "payload": {"to": to, "call_id": call_id.as_str()}
        }))
        .await;
    }

    pub async fn cancel(&self) {
        self.send(&json!({"type": "CANCEL", "payload": {}})).await;
    }

    pub async fn hangup(&self) {
        self.send(&json!({"type": "HANGUP", "payload": {}})).await;
    }

    pub async fn offer(&self, body: Value) {
        self.send(&json!({"type": "OFFER", "payload": body})).await;
    }

    pub async fn answer(&self, body: Value) {
        self.send(&json!({"type": "ANSWER", "payload": body})).await;
    }

    pub async fn ice(&self, body: Value) {
        self.send(&json!({"type": "ICE_CANDIDATE", "payload": body}))
            .await;
    }

    /// Close the connection and wait for the endpoint task to finish its
    /// cleanup, so follow-up assertions see the post-disconnect state.
    pub async fn disconnect(mut self) {
        self.frames_tx.take();
        let _ = timeout(RECV_TIMEOUT, self.task).await;
    }
}

/// A connected channel client.
pub struct TestChannelClient {
    frames_tx: Option<mpsc::Sender<String>>,
    out_rx: mpsc::Receiver<String>,
    task: JoinHandle<()>,
}

impl TestChannelClient {
    /// Spawn a channel endpoint for `nick` wired to this client.
    #[must_use]
    pub fn connect(nick: &str, registry: &RegistryHandle, directory: &Arc<dyn Directory>) -> Self {
        let (sink, out_rx) = ChannelSink::new(CHANNEL_BUFFER);
        let endpoint = ChannelEndpoint::new(
            nick,
            registry.clone(),
            Arc::clone(directory),
            sink,
            CHANNEL_BUFFER,
        );
        let (frames_tx, frames_rx) = mpsc::channel(CHANNEL_BUFFER);
        let task = tokio::spawn(endpoint.run(frames_rx));
        Self {
            frames_tx: Some(frames_tx),
            out_rx,
            task,
        }
    }

    /// Send one frame to the server.
    pub async fn send(&self, frame: &Value) {
        self.frames_tx
            .as_ref()
            .expect("client already disconnected")
            .send(frame.to_string())
            .await
            .expect("endpoint task gone");
    }

    /// Receive the next frame from the server, panicking on timeout.
    pub async fn recv(&mut self) -> Value {
        let raw = timeout(RECV_TIMEOUT, self.out_rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed");
        serde_json::from_str(&raw).expect("server sent invalid JSON")
    }

    /// Assert that no frame arrives within a short window.
    pub async fn expect_silence(&mut self) {
        let outcome = timeout(Duration::from_millis(100), self.out_rx.recv()).await;
        assert!(
            outcome.is_err(),
            "expected no frame, got: {:?}",
            outcome.unwrap()
        );
    }

    pub async fn join(&self, channel_id: &str) {
        self.send(&json!({"type": "JOIN", "payload": {"channelId": channel_id}}))
            .await;
    }

    pub async fn leave(&self) {
        self.send(&json!({"type": "LEAVE", "payload": {}})).await;
    }

    pub async fn offer_to(&self, to_user: &str, mut body: Value) {
        body.as_object_mut()
            .expect("body must be an object")
            .insert("toUser".to_owned(), Value::String(to_user.to_owned()));
        self.send(&json!({"type": "OFFER", "payload": body})).await;
    }

    pub async fn ice_to(&self, to_user: &str, mut body: Value) {
        body.as_object_mut()
            .expect("body must be an object")
            .insert("toUser".to_owned(), Value::String(to_user.to_owned()));
        self.send(&json!({"type": "ICE_CANDIDATE", "payload": body}))
            .await;
    }

    /// Close the connection and wait for the endpoint task to finish its
    /// cleanup.
    pub async fn disconnect(mut self) {
        self.frames_tx.take();
        let _ = timeout(RECV_TIMEOUT, self.task).await;
    }
}

/// A resident (bot) channel member.
///
/// Residents are not protocol clients; they are peers seeded directly into
/// every channel the registry creates. The fixture records every notice the
/// bot receives.
pub struct ResidentBot {
    peer: ChannelPeer,
    notices: Arc<Mutex<Vec<ChannelNotice>>>,
    _task: JoinHandle<()>,
}

impl ResidentBot {
    /// Spawn a bot that drains and records its mailbox.
    #[must_use]
    pub fn spawn(nick: &str) -> Self {
        let (tx, mut rx) = mpsc::channel(CHANNEL_BUFFER);
        let peer = ChannelPeer::new(nick, tx);
        let notices = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&notices);
        let task = tokio::spawn(async move {
            while let Some(notice) = rx.recv().await {
                recorded.lock().unwrap().push(notice);
            }
        });
        Self {
            peer,
            notices,
            _task: task,
        }
    }

    /// The peer handle to seed into the registry.
    #[must_use]
    pub fn peer(&self) -> ChannelPeer {
        self.peer.clone()
    }

    /// Everything the bot has received so far.
    #[must_use]
    pub fn notices(&self) -> Vec<ChannelNotice> {
        self.notices.lock().unwrap().clone()
    }

    /// Wait until the bot has received at least `count` notices.
    pub async fn wait_for_notices(&self, count: usize) -> Vec<ChannelNotice> {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        loop {
            let current = self.notices.lock().unwrap().clone();
            if current.len() >= count {
                return current;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {count} notices, got {}",
                current.len()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
