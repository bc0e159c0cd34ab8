// Command implementations

pub mod check;
pub mod config;
pub mod run;
