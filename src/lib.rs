pub mod client;
pub mod config;
pub mod error;
pub mod meta;
pub mod query;
pub mod server;
pub mod tools;

pub use server::CubeMcpServer;
