// LogWeave - sources/merged/mod.rs
//
// Multi-source chronological merge: the source itself, its sorted index and
// the change-set computation shared by both.

pub mod changes;
pub mod index;
pub mod source;

pub use index::{MergedIndex, MergedLineIndex};
pub use source::MergedLogSource;
