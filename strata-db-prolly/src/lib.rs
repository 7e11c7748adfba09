//! # Strata DB Prolly
//!
//! Persistent, content-addressed, ordered tuple maps for Strata DB,
//! built on probabilistic B-trees ("prolly trees").
//!
//! This crate provides:
//! - The canonical node format and content-defined chunk splitter
//! - [`TreeChunker`]: streaming construction from ascending pair streams
//! - [`Cursor`]: positioned navigation (seek, next, prev)
//! - [`Map`] / [`MutableMap`]: the public map surface with a skip-list
//!   overlay for pending edits
//! - [`TreeDiffer`] and [`three_way_merge`]: structural diff and the
//!   streaming merge pipeline
//!
//! Node boundaries are chosen by a rolling hash over the pair stream, so
//! equal logical content yields equal physical trees regardless of edit
//! history. That determinism is what makes diff linear in the size of the
//! change and merge proportional to the work actually merged.

pub mod chunker;
pub mod cursor;
pub mod diff;
pub mod error;
pub mod map;
mod materialize;
pub mod merge;
pub mod mutable_map;
pub mod node;
pub mod overlay;
pub mod range;
pub mod splitter;

pub use chunker::TreeChunker;
pub use cursor::Cursor;
pub use diff::{Diff, DiffKind, TreeDiffer};
pub use error::{Error, Result};
pub use map::{Map, MapIter};
pub use merge::{three_way_merge, MergeConflict, MergeResult, PATCH_BUFFER_SIZE};
pub use mutable_map::{MergedIter, MutableMap};
pub use node::{MetaValue, Node, NODE_MAGIC};
pub use overlay::{Overlay, OverlayIter, MAX_PENDING};
pub use range::{Cut, Range};
pub use splitter::RollingSplitter;
