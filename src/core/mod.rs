pub mod device;
pub mod error;
pub mod generator;
pub mod params;
pub mod runtime;

pub use device::Device;
pub use error::{GeneratorError, ParseDeviceError, Result};
pub use generator::{BackendKind, Generator, GeneratorRegistry};
pub use params::{normalize, Parameters};
pub use runtime::{CausalLm, ModelRuntime, TextTokenizer, TokenId};
