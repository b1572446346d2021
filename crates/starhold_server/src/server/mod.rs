//! Server assembly and the reactor loop.

pub mod core;
pub mod reactor;

pub use core::GameServer;
