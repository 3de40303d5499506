//! Client for the PokeAPI-compatible catalog service.

pub mod cache;
pub mod cached_client;
pub mod client;
pub mod detail;
mod error;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use error::FetchError;
