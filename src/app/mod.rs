pub mod server;

pub use server::Server;

pub type Result<T> = anyhow::Result<T>;
