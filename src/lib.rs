pub mod aggregate;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod fallback;
pub mod gateway;
pub mod models;
pub mod poller;

#[cfg(test)]
mod testing;
