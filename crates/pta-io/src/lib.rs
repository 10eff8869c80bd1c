//! Integrity-verified I/O primitives for PyTerrier artifacts.
//!
//! Provides the building blocks the artifact resolver uses to move bundles
//! on and off disk safely:
//! - **Hashing streams**: [`HashWriter`] and [`HashReader`] keep a running
//!   digest of every byte that passes through them; a reader can verify the
//!   digest against an expected value when it is closed.
//! - **Atomic publication**: [`finalized_directory`] and [`finalized_open`]
//!   hand out a temporary sibling of the destination that is renamed into
//!   place only on success, so a destination is either fully present or absent.
//! - **Path safety**: [`path_is_under_base`] rejects archive members that
//!   would escape their extraction root.
//! - **Stream plumbing**: [`MultiReader`] stitches segmented files back
//!   together and [`ProgressReader`] reports transfer progress.

pub mod error;
pub mod finalize;
pub mod hash;
pub mod multi;
pub mod path;
pub mod progress;

// Re-exports for convenience.
pub use error::IntegrityError;
pub use finalize::{
    finalized_directory, finalized_open, with_finalized_directory, with_finalized_file,
    FinalizedDir, FinalizedFile,
};
pub use hash::{ContentHash, HashReader, HashWriter};
pub use multi::MultiReader;
pub use path::path_is_under_base;
pub use progress::{human_bytes, ProgressReader};
