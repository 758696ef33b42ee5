//! Test support: disposable SQLite databases with migrations applied.

pub mod prepare_env;
