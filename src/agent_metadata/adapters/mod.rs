//! Adapter implementations for agent metadata ports.

pub mod memory;
pub mod sqlite;
