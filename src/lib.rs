pub mod client;
pub mod codec;
pub mod connection;
pub mod frame;
pub mod model;
pub mod server;
pub mod store;

pub use codec::{CodecError, FrameType, MAX_PAYLOAD};
pub use frame::Frame;
pub use model::change::{Change, ChangeKind};
pub use model::filename::{Filename, FilenameError};

/// Maximum number of simultaneous connections a single user account may hold
/// in the server's session registry.
pub const MAX_CONNS_PER_USER: usize = 2;

/// Error returned by code that doesn't need to match on a specific cause.
///
/// Boxing is avoided on the hot path: frame parsing has its own
/// `codec::CodecError`, the server engine has `server::ServerError`, and the
/// client has `client::error::SyncError`. This alias is reserved for the
/// outer layers (binaries, tests) that just want to propagate with `?`.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for top-level sync operations.
pub type Result<T> = std::result::Result<T, Error>;
