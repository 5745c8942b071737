//! Tree-walking interpreter for the ripple cell language.
//!
//! One [`Interp`] lives for the whole kernel process and owns the globals
//! mapping shared by every cell of the notebook.

pub mod builtins;
pub mod env;
pub mod eval;
pub mod methods;
pub mod value;

pub use eval::{Interp, RuntimeError};
pub use value::Value;
