//! Rule engines consulted by the game pipeline.

pub mod authorize;
pub mod catalog;
pub mod challenge;
pub mod narrative;
pub mod observer;
pub mod suggest;
