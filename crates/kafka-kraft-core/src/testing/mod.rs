//! Test utilities for the broker container pipeline.
//!
//! This module provides infrastructure for testing without a container engine:
//!
//! - [`MockRuntime`] - An in-memory container runtime that records calls
//! - [`BootstrapHarness`] - A mock runtime plus helpers to run brokers on it
//! - [`TestHarnessBuilder`] - Builder pattern for custom runtime behavior
//!
//! # Example
//!
//! ```rust,ignore
//! use kafka_kraft_core::testing::{BootstrapHarness, RuntimeOperation};
//!
//! #[tokio::test]
//! async fn test_run() {
//!     let harness = BootstrapHarness::new();
//!     let container = harness.run_default().await.unwrap();
//!
//!     let calls = harness.runtime.calls_for(RuntimeOperation::CopyToContainer).await;
//!     assert_eq!(calls.len(), 1);
//! }
//! ```

pub mod harness;
pub mod mock_runtime;

pub use harness::{BootstrapHarness, TestHarnessBuilder};
pub use mock_runtime::{
    MockRuntime, RuntimeCall, RuntimeOperation, StartupBehavior, READY_LOG_LINE,
};
