pub mod app;
pub mod cmd;
pub mod core;
pub mod envconfig;
pub mod infra;
pub mod middleware;
pub mod openai;
pub mod server;
pub mod template;

pub use crate::core::{
    BackendKind, Device, Generator, GeneratorError, GeneratorRegistry, ModelRuntime, Parameters,
    Result,
};
pub use crate::infra::HubRuntime;
pub use crate::server::{router, AppState};
