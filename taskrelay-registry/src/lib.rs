//! Task tree storage and propagation
//!
//! - [`TaskStore`] reads and writes task definitions under the task root.
//! - [`Packager`] zips the tree into the distribution archive and restores it
//!   on workers.
//! - [`TreeWatcher`] rebuilds the archive when the tree changes.
//! - [`ChangeStamp`] tells workers when the archive moved on.

pub mod encoding;
pub mod error;
pub mod packager;
pub mod stamp;
pub mod store;
pub mod watcher;

pub use error::{RegistryError, Result};
pub use packager::{archive_stamp, build_archive, restore_archive, Packager, STAMP_FORMAT};
pub use stamp::ChangeStamp;
pub use store::TaskStore;
pub use watcher::TreeWatcher;
