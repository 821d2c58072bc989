pub mod change;
pub mod filename;
pub mod listing;

pub use change::{Change, ChangeKind};
pub use filename::{Filename, FilenameError};
pub use listing::FileEntry;
