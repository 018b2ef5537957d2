//! Local reactive document storage

pub mod collection;
pub mod collections;
pub mod memory;
pub mod merge;

pub use collection::{Collection, ObserverCallback, ObserverHandle, Snapshot, UpsertOptions};
pub use collections::Collections;
pub use memory::MemoryCollection;
pub use merge::merge_document;
