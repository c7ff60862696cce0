#![forbid(unsafe_code)]

mod check;
mod contract;
mod error;
mod provider;
mod scope;
mod signature;
mod types;

pub use check::{Checker, ProgramInfo, RETURN_FLAG};
pub use contract::{impl_key, member_key, ContractGroup, ContractMember, SignatureType};
pub use error::SemanticError;
pub use provider::{resolve_type_expr, TypeProvider};
pub use scope::SymbolTable;
pub use signature::ResolvedSignature;
pub use types::{type_from_expr, Type};
