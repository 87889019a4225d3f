//! CLI Commands

pub mod export;
pub mod list;
pub mod run;
pub mod validate;
