pub mod client;
pub mod provider;
#[cfg(test)]
pub mod testing;

pub use client::BackendClient;
pub use provider::ReviewBackend;
