use crate::model::filename::Filename;

/// Kind of change observed locally or reported by a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Upload,
    Delete,
}

/// A change record handed from the protocol engine to the fan-out engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    pub user: String,
    pub name: Filename,
}

impl Change {
    pub fn upload(user: impl Into<String>, name: Filename) -> Self {
        Change { kind: ChangeKind::Upload, user: user.into(), name }
    }

    pub fn delete(user: impl Into<String>, name: Filename) -> Self {
        Change { kind: ChangeKind::Delete, user: user.into(), name }
    }
}
