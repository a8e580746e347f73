use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::app::Server;
use crate::core::generator::catalog::{self, CATALOG};
use crate::core::{Device, Generator, GeneratorRegistry, ModelRuntime, Parameters};
use crate::envconfig::Settings;
use crate::infra::HubRuntime;
use crate::server::{self, AppState};

/// Registers the catalog with `default_name` as the default generator.
///
/// Fails when `default_name` is not one of the catalog names.
pub fn build_registry(
    default_name: &str,
    device: Device,
    runtime: Arc<dyn ModelRuntime>,
) -> Result<GeneratorRegistry> {
    let registry = GeneratorRegistry::with_default(default_name);
    catalog::register_all(&registry, runtime, device);

    if !registry.list_names().contains(default_name) {
        bail!(
            "unknown model '{}', expected one of: {}",
            default_name,
            catalog_names().join(", ")
        );
    }
    Ok(registry)
}

fn catalog_names() -> Vec<&'static str> {
    CATALOG.iter().map(|entry| entry.name).collect()
}

pub async fn serve(settings: Settings) -> Result<()> {
    let registry = Arc::new(build_registry(
        &settings.default_generator,
        settings.device,
        Arc::new(HubRuntime::new()),
    )?);

    tracing::info!(
        default = %settings.default_generator,
        chat = ?settings.chat_generator,
        device = %settings.device,
        "starting server"
    );

    let warm = registry.clone();
    let names: Vec<String> = settings.warm_models().into_iter().map(String::from).collect();
    let failures = tokio::task::spawn_blocking(move || {
        warm.load_models(names.iter().map(String::as_str))
    })
    .await
    .context("model warm-up panicked")?;

    for (name, err) in &failures {
        tracing::warn!(name = %name, error = %err, "serving without preloaded model");
    }

    Server::new()
        .bind(&settings.host)
        .routes(server::router(AppState::new(registry)))
        .run()
        .await
}

pub async fn list() -> Result<()> {
    println!("{:<16} {:<12} CHECKPOINT", "NAME", "KIND");
    for entry in CATALOG.iter() {
        println!("{:<16} {:<12} {}", entry.name, entry.kind.to_string(), entry.checkpoint);
    }
    Ok(())
}

async fn load(model: &str, device: Device) -> Result<Arc<Generator>> {
    let registry = build_registry(model, device, Arc::new(HubRuntime::new()))?;
    let generator = tokio::task::spawn_blocking(move || registry.get_default())
        .await
        .context("model load panicked")??;
    Ok(generator)
}

pub async fn run(model: &str, prompt: &str, device: Device) -> Result<()> {
    let generator = load(model, device).await?;
    let prompt = prompt.to_string();

    let text = tokio::task::spawn_blocking(move || generator.generate(&prompt, &Parameters::new()))
        .await
        .context("generation panicked")??;

    println!("{}", text);
    Ok(())
}

pub async fn embed(model: &str, input: &str, device: Device) -> Result<()> {
    let generator = load(model, device).await?;
    let input = input.to_string();

    let embedding = tokio::task::spawn_blocking(move || generator.generate_embeddings(&input))
        .await
        .context("embedding panicked")??;

    println!(
        "{:?}, ... (total {})",
        &embedding[..5.min(embedding.len())],
        embedding.len()
    );
    Ok(())
}

pub async fn version() -> Result<()> {
    println!("mai version {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::runtime::{CausalLm, TextTokenizer};

    struct NoRuntime;

    impl ModelRuntime for NoRuntime {
        fn load_tokenizer(&self, checkpoint: &str) -> Result<Box<dyn TextTokenizer>> {
            bail!("no tokenizer for {}", checkpoint)
        }

        fn load_causal_lm(&self, checkpoint: &str, _device: Device) -> Result<Box<dyn CausalLm>> {
            bail!("no model for {}", checkpoint)
        }
    }

    #[test]
    fn test_build_registry_requires_known_default() {
        let registry = build_registry("qwen", Device::Cpu, Arc::new(NoRuntime)).unwrap();
        assert_eq!(registry.default_name(), Some("qwen"));
        assert_eq!(registry.list_names().len(), CATALOG.len());

        let err = build_registry("gpt2", Device::Cpu, Arc::new(NoRuntime)).unwrap_err();
        assert!(err.to_string().contains("codellama"));
    }
}
