use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

use crate::Document;

/// Position in a remote collection's pagination.
///
/// A checkpoint is opaque to the query layer: the remote source hands out the
/// cursor for the next page and gets it back on the following request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Checkpoint {
    /// Nothing fetched yet for the current parameter set
    #[default]
    Beginning,
    /// Cursor or page token returned by the last successful page
    Cursor(String),
}

impl Checkpoint {
    pub fn cursor(&self) -> Option<&str> {
        match self {
            Checkpoint::Beginning => None,
            Checkpoint::Cursor(c) => Some(c),
        }
    }

    pub fn is_beginning(&self) -> bool {
        matches!(self, Checkpoint::Beginning)
    }
}

/// Origin of a change event (local vs. remote).
///
/// Lets observers tell optimistic local writes apart from documents merged in
/// by a sync pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Change initiated by this client
    Local {
        /// Identifier of the operation that produced the write, if known
        operation_id: Option<String>,
    },
    /// Change received from the remote source
    Remote {
        /// Fingerprint of the query whose sync produced the write
        operation_id: Option<String>,
    },
}

impl ChangeOrigin {
    pub fn local() -> Self {
        Self::Local { operation_id: None }
    }

    pub fn remote(operation_id: Option<String>) -> Self {
        Self::Remote { operation_id }
    }

    pub fn operation_id(&self) -> Option<&str> {
        match self {
            Self::Local { operation_id } | Self::Remote { operation_id } => operation_id.as_deref(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }
}

/// Change notification event emitted by a collection for every accepted write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Change<T> {
    /// Document was inserted
    Created { data: T, origin: ChangeOrigin },
    /// Existing document was overwritten (after merge)
    Updated {
        id: String,
        data: T,
        origin: ChangeOrigin,
    },
    /// Document was removed
    Deleted { id: String, origin: ChangeOrigin },
}

impl<T> Change<T> {
    pub fn origin(&self) -> &ChangeOrigin {
        match self {
            Change::Created { origin, .. }
            | Change::Updated { origin, .. }
            | Change::Deleted { origin, .. } => origin,
        }
    }
}

pub type DocumentChange = Change<Document>;

/// Generic wrapper for adding metadata to any type
///
/// Implements Deref/DerefMut for ergonomic access to the inner type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithMetadata<T, M> {
    pub inner: T,
    pub metadata: M,
}

impl<T, M> Deref for WithMetadata<T, M> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T, M> DerefMut for WithMetadata<T, M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

/// Changes applied atomically by one collection write.
pub type ChangeBatch = WithMetadata<Vec<DocumentChange>, BatchMetadata>;

/// Metadata attached to every change batch a collection publishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchMetadata {
    /// Collection that applied the batch
    pub collection: String,
    /// Collection version after the batch was applied
    pub version: u64,
}
