use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::RegistryError;
use crate::extension::ExtensionTool;
use crate::registry::{ToolOrigin, ToolRegistry};

/// Debounce window for coalescing bursts of filesystem events into one
/// reload per file (editors commonly emit several events per save).
const DEBOUNCE: Duration = Duration::from_millis(200);

/// A single extension file change, already debounced and filtered to the
/// extension tools directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionChange {
    /// File created or modified; caller should (re)load it.
    Upserted(PathBuf),
    /// File removed; caller should deregister the tool named after its stem.
    Removed(PathBuf),
}

/// Watches an extension-tools directory and reports debounced add/modify/
/// remove events. Does not itself parse or register tools — loading a file
/// into a `Tool` is the caller's concern; this type only tells the caller
/// *when* to do it.
pub struct ExtensionWatcher {
    _watcher: RecommendedWatcher,
}

impl ExtensionWatcher {
    /// Start watching `dir` non-recursively. Returns the watcher (keep it
    /// alive for as long as watching should continue) and a channel of
    /// debounced changes.
    pub fn watch(dir: &Path) -> Result<(Self, mpsc::UnboundedReceiver<ExtensionChange>), RegistryError> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Event>();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = raw_tx.send(event);
                }
                Err(e) => warn!(error = %e, "extension watcher error"),
            },
            notify::Config::default(),
        )
        .map_err(|e| RegistryError::LoadFailure { path: dir.display().to_string(), detail: e.to_string() })?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| RegistryError::LoadFailure { path: dir.display().to_string(), detail: e.to_string() })?;

        let (out_tx, out_rx) = mpsc::unbounded_channel::<ExtensionChange>();
        tokio::spawn(async move {
            let mut pending: Vec<Event> = Vec::new();
            loop {
                tokio::select! {
                    maybe_event = raw_rx.recv() => {
                        match maybe_event {
                            Some(event) => pending.push(event),
                            None => break,
                        }
                    }
                    _ = tokio::time::sleep(DEBOUNCE), if !pending.is_empty() => {
                        for change in coalesce(pending.drain(..).collect()) {
                            debug!(?change, "extension file changed");
                            if out_tx.send(change).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher }, out_rx))
    }
}

fn coalesce(events: Vec<Event>) -> Vec<ExtensionChange> {
    use std::collections::HashMap;
    let mut last: HashMap<PathBuf, ExtensionChange> = HashMap::new();
    for event in events {
        let kind = event.kind;
        for path in event.paths {
            let change = if matches!(kind, EventKind::Remove(_)) {
                ExtensionChange::Removed(path.clone())
            } else {
                ExtensionChange::Upserted(path.clone())
            };
            last.insert(path, change);
        }
    }
    last.into_values().collect()
}

/// One outcome of an extension file's initial scan or later hot-reload,
/// reported to the caller so it can surface a `reload_failure` event (§8,
/// scenario S3) or an audit log entry. A `Failed` outcome always leaves
/// whatever descriptor was previously registered under that name (if any)
/// untouched — the registry itself enforces that (invariant 4, §8).
#[derive(Debug)]
pub enum ReloadOutcome {
    Registered(String),
    Removed(String),
    Failed { path: PathBuf, error: RegistryError },
}

/// Scans `dir` for `.py` files, registering each as an extension tool, then
/// keeps watching it and applies every subsequent change to `registry` as
/// it arrives. `registry` must already be shared behind an `Arc` (built-in
/// and MCP-discovered tools are expected to already be registered). Returns
/// the watcher; drop it to stop watching. Every outcome is sent to
/// `report`, including the initial scan's.
pub fn watch_and_register(
    dir: &Path,
    registry: Arc<ToolRegistry>,
    report: mpsc::UnboundedSender<ReloadOutcome>,
) -> Result<ExtensionWatcher, RegistryError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| RegistryError::LoadFailure { path: dir.display().to_string(), detail: e.to_string() })?;

    if let Ok(read_dir) = std::fs::read_dir(dir) {
        let mut paths: Vec<PathBuf> = read_dir
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("py"))
            .collect();
        paths.sort();
        for path in &paths {
            apply_upsert(path, &registry, &report);
        }
    }

    let (watcher, mut changes) = ExtensionWatcher::watch(dir)?;
    let registry = registry.clone();
    tokio::spawn(async move {
        while let Some(change) = changes.recv().await {
            match change {
                ExtensionChange::Upserted(path) => apply_upsert(&path, &registry, &report),
                ExtensionChange::Removed(path) => {
                    if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                        if registry.remove_dynamic(name) {
                            let _ = report.send(ReloadOutcome::Removed(name.to_string()));
                        }
                    }
                }
            }
        }
    });

    Ok(watcher)
}

fn apply_upsert(path: &Path, registry: &ToolRegistry, report: &mpsc::UnboundedSender<ReloadOutcome>) {
    let loaded = ExtensionTool::load(path).and_then(|tool| {
        let name = tool.name().to_string();
        registry.upsert_dynamic(tool, ToolOrigin::Extension).map(|()| name)
    });
    match loaded {
        Ok(name) => {
            let _ = report.send(ReloadOutcome::Registered(name));
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "extension tool reload failed, previous descriptor retained");
            let _ = report.send(ReloadOutcome::Failed { path: path.to_path_buf(), error });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn reports_new_file_as_upserted() {
        let dir = tempfile::tempdir().unwrap();
        let (_watcher, mut rx) = ExtensionWatcher::watch(dir.path()).unwrap();

        std::fs::write(dir.path().join("greet.py"), "def run(): pass").unwrap();

        let change = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;
        let change = change.expect("timed out waiting for event").expect("channel closed");
        match change {
            ExtensionChange::Upserted(path) => assert!(path.ends_with("greet.py")),
            other => panic!("expected Upserted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reports_removed_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("temp_tool.py");
        std::fs::write(&file, "def run(): pass").unwrap();

        let (_watcher, mut rx) = ExtensionWatcher::watch(dir.path()).unwrap();
        std::fs::remove_file(&file).unwrap();

        let mut saw_removed = false;
        for _ in 0..5 {
            let Ok(Some(change)) = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await else {
                break;
            };
            if matches!(change, ExtensionChange::Removed(ref p) if p.ends_with("temp_tool.py")) {
                saw_removed = true;
                break;
            }
        }
        assert!(saw_removed, "expected a Removed event for temp_tool.py");
    }

    const ECHO_SRC: &str = r#""""
description: Echoes the given text back.
params:
  text:
    type: string
"""
async def run(text: str) -> str:
    return text
"#;

    #[tokio::test]
    async fn self_growth_new_extension_becomes_callable() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ToolRegistry::new());
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let _watcher = watch_and_register(dir.path(), registry.clone(), report_tx).unwrap();

        std::fs::write(dir.path().join("echo.py"), ECHO_SRC).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(1), report_rx.recv())
            .await
            .expect("reload did not complete within 1s")
            .expect("channel closed");
        assert!(matches!(outcome, ReloadOutcome::Registered(name) if name == "echo"));

        let out = registry
            .execute(crate::tool::ToolCall { id: "1".into(), name: "echo".into(), args: serde_json::json!({"text": "ok"}) })
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(out.content, "ok");
    }

    #[tokio::test]
    async fn reserved_prefix_reload_failure_leaves_registry_size_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ToolRegistry::new());
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let _watcher = watch_and_register(dir.path(), registry.clone(), report_tx).unwrap();

        std::fs::write(dir.path().join("MCP__x.py"), ECHO_SRC).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(1), report_rx.recv())
            .await
            .expect("reload did not complete within 1s")
            .expect("channel closed");
        match outcome {
            ReloadOutcome::Failed { error: RegistryError::ReservedPrefix(name), .. } => assert_eq!(name, "MCP__x"),
            other => panic!("expected a reserved-prefix Failed outcome, got {other:?}"),
        }
        assert!(registry.names().is_empty());
    }

    #[tokio::test]
    async fn initial_scan_registers_pre_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("echo.py"), ECHO_SRC).unwrap();

        let registry = Arc::new(ToolRegistry::new());
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let _watcher = watch_and_register(dir.path(), registry.clone(), report_tx).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(1), report_rx.recv())
            .await
            .expect("initial scan did not report within 1s")
            .expect("channel closed");
        assert!(matches!(outcome, ReloadOutcome::Registered(name) if name == "echo"));
        assert!(registry.get("echo").is_some());
    }

    #[tokio::test]
    async fn removed_file_deregisters_the_tool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("echo.py");
        std::fs::write(&path, ECHO_SRC).unwrap();

        let registry = Arc::new(ToolRegistry::new());
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let _watcher = watch_and_register(dir.path(), registry.clone(), report_tx).unwrap();
        tokio::time::timeout(Duration::from_secs(1), report_rx.recv()).await.unwrap();
        assert!(registry.get("echo").is_some());

        std::fs::remove_file(&path).unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(1), report_rx.recv())
            .await
            .expect("removal did not report within 1s")
            .expect("channel closed");
        assert!(matches!(outcome, ReloadOutcome::Removed(name) if name == "echo"));
        assert!(registry.get("echo").is_none());
    }
}
