#[macro_use]
pub mod util;

pub mod ast;
pub mod config;
pub mod machine;
pub mod smg;
pub mod transfer;
