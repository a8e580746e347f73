//! Built-in generator names and the checkpoints they serve.

use std::sync::Arc;

use serde_json::json;

use super::{BackendKind, Generator, GeneratorRegistry};
use crate::core::device::Device;
use crate::core::params::{parameters, Parameters};
use crate::core::runtime::ModelRuntime;

pub struct CatalogEntry {
    pub name: &'static str,
    pub kind: BackendKind,
    pub checkpoint: &'static str,
    overrides: fn() -> Parameters,
}

impl CatalogEntry {
    pub fn build(&self, runtime: Arc<dyn ModelRuntime>, device: Device) -> Generator {
        Generator::new(self.kind, self.checkpoint, runtime)
            .with_defaults((self.overrides)())
            .on_device(device)
    }
}

fn no_overrides() -> Parameters {
    Parameters::new()
}

fn codellama_overrides() -> Parameters {
    parameters([("max_new_tokens", json!(100)), ("temperature", json!(0.7))])
}

pub static CATALOG: [CatalogEntry; 5] = [
    CatalogEntry {
        name: "codellama",
        kind: BackendKind::Completion,
        checkpoint: "codellama/CodeLlama-7b-Python-hf",
        overrides: codellama_overrides,
    },
    CatalogEntry {
        name: "deepseekcoder",
        kind: BackendKind::Completion,
        checkpoint: "deepseek-ai/deepseek-coder-6.7b-base",
        overrides: no_overrides,
    },
    CatalogEntry {
        name: "tinystarcoder",
        kind: BackendKind::Completion,
        checkpoint: "bigcode/tiny_starcoder_py",
        overrides: no_overrides,
    },
    CatalogEntry {
        name: "starcoder",
        kind: BackendKind::Pipeline,
        checkpoint: "bigcode/starcoder",
        overrides: no_overrides,
    },
    CatalogEntry {
        name: "qwen",
        kind: BackendKind::Instruct,
        checkpoint: "Qwen/Qwen2.5-Coder-3B-Instruct",
        overrides: no_overrides,
    },
];

pub fn lookup(name: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|entry| entry.name == name)
}

/// Registers every catalog entry on `registry`, all sharing `device`.
pub fn register_all(registry: &GeneratorRegistry, runtime: Arc<dyn ModelRuntime>, device: Device) {
    for entry in &CATALOG {
        registry.register(entry.name, entry.build(runtime.clone(), device));
    }
}
