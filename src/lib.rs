pub mod api;
pub mod bridge;
pub mod config;
pub mod controller;
pub mod delivery;
pub mod error;
pub mod events;
pub mod mailbox;
pub mod mcp;
pub mod monitor;
pub mod queue;
pub mod setup;
pub mod types;
