//! The CLI surface (spec.md §6 "CLI surface"): a config path argument,
//! `run` (the default) and `config init`, matching the exit-code
//! contract the outer spec holds the engine to — 0 on clean shutdown,
//! non-zero on a configuration error or fatal runtime error.

pub mod config;
pub mod run;
