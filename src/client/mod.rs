pub mod cli;
pub mod echo;
pub mod error;
pub mod listener;
pub mod ops;
pub mod reconciler;
pub mod session;
pub mod transport;
pub mod watcher;

pub use error::SyncError;
pub use session::Session;
