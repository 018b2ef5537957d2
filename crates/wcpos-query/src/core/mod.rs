//! Pure query machinery: cache keys, selector compilation, live local
//! evaluation and timers.

pub mod executor;
pub mod fingerprint;
pub mod selector;
pub mod timer;

pub use executor::{LocalExecutor, Subscription};
pub use fingerprint::{description_fingerprint, fingerprint};
pub use selector::{compare_documents, compile, CompiledQuery, Selector, SortField};
pub use timer::{DebounceTimer, TimerHandle};
