//! # Signaling Test Utilities
//!
//! Shared test utilities for the Switchboard signaling core.
//!
//! This crate provides fake collaborator implementations and connection
//! fixtures for exercising the signaling core without real infrastructure.
//!
//! ## Modules
//!
//! - `fakes` - In-memory `Directory` and `PushGateway` implementations
//!   with switchable failure modes
//! - `clients` - Test clients that drive real endpoint tasks over
//!   in-process channels, plus a resident-bot fixture
//!
//! ## Usage
//!
//! ```rust,ignore
//! use signaling_test_utils::clients::TestCallClient;
//! use signaling_test_utils::fakes::{FakeDirectory, FakePushGateway};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let directory = Arc::new(FakeDirectory::new());
//!     let push = Arc::new(FakePushGateway::new());
//!     let registry = RegistryHandle::spawn(&Config::default(), vec![], RegistryMetrics::new());
//!
//!     let mut alice = TestCallClient::connect(&registry, &directory, &push);
//!     alice.login("alice").await;
//!     // ...
//! }
//! ```

pub mod clients;
pub mod fakes;

pub use clients::{ResidentBot, TestCallClient, TestChannelClient};
pub use fakes::{FakeDirectory, FakePushGateway};

/// Initializes a tracing subscriber for test runs.
///
/// Honors `RUST_LOG`, defaults to debug output for the signaling crates,
/// and is safe to call from every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
            |_| "signaling_core=debug,signaling_test_utils=debug".into(),
        ))
        .with_test_writer()
        .try_init();
}
