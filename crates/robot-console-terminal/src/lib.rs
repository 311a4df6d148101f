#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod error;
mod pty;

pub use error::PtyError;
pub use error::SpawnErrorKind;
pub use pty::DEFAULT_COLS;
pub use pty::DEFAULT_ROWS;
pub use pty::PtyHandle;
pub use pty::PtyWriter;
pub use pty::ReadEvent;

pub type Result<T> = std::result::Result<T, PtyError>;
