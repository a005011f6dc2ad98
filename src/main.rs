mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use pith_config::Config;
use pith_core::{EventBus, Runtime};
use pith_model::mock::MockModel;
use pith_model::Model;
use pith_store::Store;
use pith_tools::builtin::{
    edit::EditTool, file_search::FileSearchTool, list_dir::ListDirTool, memory_save::MemorySaveTool,
    memory_search::MemorySearchTool, read::ReadTool, run_python::RunPythonTool, set_profile::SetProfileTool,
    tool_call::ToolCallTool, write::WriteTool,
};
use pith_tools::ToolRegistry;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

    match cli.command {
        None => runtime.block_on(run(None)),
        Some(Commands::Run { config }) => runtime.block_on(run(config)),
        Some(Commands::Status { config }) => runtime.block_on(status(config)),
    }
}

/// Loads config, assembles the Store/Registry/Model/Runtime, starts
/// configured channels, and serves the HTTP/SSE API until killed.
async fn run(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let config = pith_config::load(config_path.as_deref())?;

    std::fs::create_dir_all(&config.runtime.workspace_path)
        .with_context(|| format!("creating workspace dir {}", config.runtime.workspace_path.display()))?;
    if let Some(parent) = config.runtime.memory_db_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }

    let store = Arc::new(Store::open(&config.runtime.memory_db_path)?);
    let bus = Arc::new(EventBus::new());
    let tools = build_registry(&config, store.clone(), bus.clone()).await;
    let model = build_model(&config.model);

    let api_runtime = Arc::new(Runtime::new(
        store.clone(),
        tools,
        model,
        bus,
        config.runtime.workspace_path.clone(),
        config.runtime.context.clone(),
        config.runtime.turn.clone(),
    ));

    for (name, channel_config) in &config.channels {
        let channel = match build_channel(name, channel_config, store.clone()) {
            Ok(channel) => channel,
            Err(e) => {
                warn!(channel = name.as_str(), error = %e, "skipping misconfigured channel");
                continue;
            }
        };
        let channel_runtime = api_runtime.clone();
        let channel_store = store.clone();
        tokio::spawn(pith_channels::run_channel(channel, channel_runtime, channel_store));
    }

    info!(bind_addr = config.api.bind_addr.as_str(), "starting pith");
    pith_api::serve(&config.api.bind_addr, api_runtime).await
}

/// `pith status` is a thin client for operators: it never touches the
/// Store or Runtime directly, only the HTTP API of an already-running
/// instance.
async fn status(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let config = pith_config::load(config_path.as_deref())?;
    let url = format!("http://{}/status", config.api.bind_addr);
    let response = reqwest::get(&url).await.with_context(|| format!("requesting {url}"))?;
    let body: serde_json::Value = response.json().await.context("decoding status response")?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn build_registry(config: &Config, store: Arc<Store>, bus: Arc<EventBus>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register_builtin(ReadTool);
    registry.register_builtin(WriteTool);
    registry.register_builtin(EditTool);
    registry.register_builtin(ListDirTool);
    registry.register_builtin(FileSearchTool);
    registry.register_builtin(RunPythonTool::default());
    registry.register_builtin(MemorySaveTool::new(store.clone()));
    registry.register_builtin(MemorySearchTool::new(store.clone()));
    registry.register_builtin(SetProfileTool::new(store));

    pith_mcp::discover_and_register(&config.mcp, &mut registry).await;

    // `ToolCallTool` dispatches into this same registry, so the registry
    // has to exist before the tool does; `new_cyclic` hands the closure a
    // `Weak` it can hand to the tool before the `Arc` itself is built.
    let registry = Arc::new_cyclic(|weak| {
        registry.register_builtin(ToolCallTool::from_weak(weak.clone()));
        registry
    });

    let extensions_path = config.tools.extensions_path.clone().unwrap_or_else(|| config.runtime.workspace_path.join("extensions/tools"));
    let (report_tx, mut report_rx) = tokio::sync::mpsc::unbounded_channel();
    match pith_tools::watch_and_register(&extensions_path, registry.clone(), report_tx) {
        Ok(watcher) => {
            tokio::spawn(async move {
                let _watcher = watcher;
                while let Some(outcome) = report_rx.recv().await {
                    match outcome {
                        pith_tools::ReloadOutcome::Registered(name) => info!(tool = name.as_str(), "extension tool (re)registered"),
                        pith_tools::ReloadOutcome::Removed(name) => info!(tool = name.as_str(), "extension tool deregistered"),
                        pith_tools::ReloadOutcome::Failed { path, error } => {
                            let kind = match &error {
                                pith_tools::RegistryError::ReservedPrefix(_) => "reserved_prefix",
                                pith_tools::RegistryError::NameCollision(_) => "name_collision",
                                pith_tools::RegistryError::LoadFailure { .. } => "load_failure",
                            };
                            warn!(path = %path.display(), %error, "extension reload failed");
                            bus.publish_all("", pith_core::TurnEvent::ReloadFailure { kind: kind.to_string(), detail: error.to_string() }).await;
                        }
                    }
                }
            });
        }
        Err(e) => warn!(error = %e, path = %extensions_path.display(), "failed to start extension watcher"),
    }

    registry
}

/// No concrete provider client ships in this crate (the Model interface is
/// an external-collaborator seam); `pith run` always drives the runtime
/// with the deterministic echo model until a provider crate is wired in.
fn build_model(model_config: &pith_config::ModelConfig) -> Arc<dyn Model> {
    warn!(
        provider = model_config.provider.as_str(),
        model = model_config.model.as_str(),
        "no concrete model provider is linked into this build; replies are generated by the echo model"
    );
    Arc::new(MockModel)
}

fn build_channel(
    name: &str,
    config: &pith_config::ChannelConfig,
    store: Arc<Store>,
) -> anyhow::Result<Box<dyn pith_channels::Channel>> {
    match config.kind.as_str() {
        "long_poll" => {
            let url = config
                .url
                .clone()
                .with_context(|| format!("channel '{name}' is kind long_poll but has no url"))?;
            let poll_interval = config.poll_interval_seconds.map(std::time::Duration::from_secs);
            Ok(Box::new(pith_channels::LongPollChannel::new(name.to_string(), url, poll_interval, store)))
        }
        other => anyhow::bail!("channel '{name}' has unknown kind '{other}'"),
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
