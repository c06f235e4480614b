//! Scripted fakes for testing against the remote capability traits.
//!
//! [`FakeCluster`] holds in-memory parcels and records every trigger and
//! poll, so engine and orchestration tests can assert exactly which remote
//! operations a run performed without any network dependency.

mod fakes;

pub use fakes::{FakeCluster, FakeManager};
