//! Input language of the memory analysis: C types, expressions and the
//! edges of a control flow automaton. These are plain data; building them
//! from source code is the job of a front end.

pub mod cfa;
pub mod expression;
pub mod types;

pub use cfa::*;
pub use expression::*;
pub use types::*;
