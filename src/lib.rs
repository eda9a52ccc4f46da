//! **wiggle** - apply patches that `patch(1)` rejects
//!
//! Finds the best placement for every hunk of a patch even when the
//! surrounding text has changed, merges at word or line granularity, and
//! marks what could not be merged with conflict markers.

/// Command-line interface with clap integration
pub mod cli;

/// Core pipeline - tokenising, diffing, placing, merging, rendering
pub mod core {
    /// Streams, elements and the word/line tokenizer
    pub mod tokens;

    /// Myers LCS engine producing common-subsequence lists
    pub mod diff;

    /// Best-match placement of patch hunks against an original
    pub mod bestmatch;

    /// Three-way merger and conflict isolation
    pub mod merge;

    /// Merge stream rendering, conflict markers included
    pub mod render;

    /// Unified/context patch and diff3 merge-file splitters
    pub mod split;

    /// Per-file segmentation of multi-file patches
    pub mod patchset;

    /// The --extract mode
    pub mod extract;

    /// The --diff mode
    pub mod diff_cmd;

    /// The --merge mode, including -p multi-file application
    pub mod merge_cmd;

    /// Human and JSON run summaries
    pub mod report;
}

/// Infrastructure - file I/O and configuration
pub mod infra {
    /// Whole-file and segment loading, atomic --replace with backups
    pub mod io;

    /// Optional defaults from .wiggle.toml
    pub mod config;
}

// Strategic re-exports for the binary and for library consumers
pub use crate::cli::{AppContext, Cli};
pub use crate::core::bestmatch::pdiff;
pub use crate::core::diff::{Csl, csl_join, diff, diff_partial, diff_patch};
pub use crate::core::merge::{Merge, MergeKind, MergeResult, make_merger};
pub use crate::core::tokens::{Element, Granularity, SplitMode, Stream, TokenFile};
