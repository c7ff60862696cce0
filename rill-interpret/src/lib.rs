#![forbid(unsafe_code)]

mod env;
mod value;
mod vm;

pub use env::Env;
pub use value::{ProcedureValue, Value};
pub use vm::Vm;
