//! Command implementations for the CLI.

mod pair;
mod read;
mod set;
mod sync_clock;
mod watch;

pub use pair::cmd_pair;
pub use read::cmd_read;
pub use set::cmd_set;
pub use sync_clock::cmd_sync_clock;
pub use watch::cmd_watch;
