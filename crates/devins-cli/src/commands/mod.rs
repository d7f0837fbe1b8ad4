//! CLI command implementations

pub mod compile;
pub mod init;
pub mod parse;
pub mod validate;
