//! Library crate for async-race, exposing the race client core to the binary and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod state;
#[cfg(test)]
mod test_support;
