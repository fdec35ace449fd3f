//! I/O helpers for the lab player.

pub mod config;
pub mod lab_store;
pub mod render;
pub mod script;
