//! Test doubles for the remote and local sides of the query layer.

mod fake_remote;
mod flaky_collection;

pub use fake_remote::FakeRemote;
pub use flaky_collection::FlakyCollection;
