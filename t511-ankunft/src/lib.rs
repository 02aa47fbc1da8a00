//! Polls 511.org StopMonitoring feeds, colors the predicted arrivals by route
//! and direction, and keeps an up-to-date arrival board for displays.

pub mod errors;
pub mod config;
pub mod sources;
pub mod buffer;
pub mod fetch;
pub mod classify;
pub mod board;
pub mod scheduler;
pub mod server;
#[cfg(test)]
mod tests;
