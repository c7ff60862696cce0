#![forbid(unsafe_code)]

//! The Rill compilation driver: the multi-phase pipeline over a parsed
//! program, backend selection, and interactive sessions.

mod pipeline;
mod session;

pub use pipeline::{compile_and_run, Backend, PackageMetadata, RunOutput};
pub use session::Session;

pub use rill_core::SemanticError;
