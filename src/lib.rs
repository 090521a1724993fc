//! Core library for the bohm-sync command line application.
//!
//! Building element metadata lives in three places: the authoring tool's
//! project file, a document store, and collaborator review spreadsheets.
//! This crate keeps them reconciled. Adapters for each representation live
//! under [`bohm::tools::io`], the element model in [`bohm::tools::model`],
//! the push and pull algorithms in [`bohm::tools::reconcile`], and the
//! file-level orchestration used by the binary in [`bohm::tools::sync`].

pub mod bohm;

pub use bohm::tools::{
    Result, ToolError, error, io, layout, migrate, model, path, reconcile, schema, settings,
    sheets, store, sync,
};
