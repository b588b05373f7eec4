//! Core modules: progress data, the engine and session boundaries, and the
//! game pipeline that ties the rule engines together.

pub mod assets;
pub mod autosave;
pub mod cipher;
pub mod config;
pub mod engine;
pub mod error;
pub mod game;
pub mod journal;
pub mod output;
pub mod progress;
pub mod session;
pub mod sql;
pub mod store;
pub mod tui;
pub mod world;
