//! Mirrors Twitch broadcast schedules into Discord guild scheduled events.

pub mod bot_info;
pub mod clock;
pub mod config;
pub mod db;
pub mod discord;
pub mod error;
pub mod health;
pub mod link_store;
pub mod models;
pub mod ops;
pub mod schema;
pub mod sync;
pub mod twitch;

#[cfg(test)]
mod testing;
