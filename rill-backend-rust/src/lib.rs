#![forbid(unsafe_code)]

mod emit;
mod fragment;

pub use emit::{wrap_module, Emitter};
pub use fragment::Fragment;
