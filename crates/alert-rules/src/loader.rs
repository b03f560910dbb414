//! Rule loading and hot reload.
//!
//! The state store is the system of record for rules (`alert_rule:<id>`);
//! this loader's job is to (a) seed it from a directory of YAML rule files
//! on startup and (b) keep the engine's in-memory snapshot current, held as
//! an immutable copy-on-write `ArcSwap<Vec<AlertRule>>` that only changes on
//! an explicit reload.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use alert_core::AlertRule;
use alert_state::StateStore;

use crate::error::RuleError;
use crate::validation::validate_rule;

pub struct RuleLoader {
    rules_dir: PathBuf,
    store: Arc<dyn StateStore>,
    snapshot: Arc<ArcSwap<Vec<AlertRule>>>,
    _watcher: Option<RecommendedWatcher>,
}

impl RuleLoader {
    pub fn new(rules_dir: PathBuf, store: Arc<dyn StateStore>) -> Self {
        if !rules_dir.exists() {
            if let Err(e) = fs::create_dir_all(&rules_dir) {
                warn!(path = %rules_dir.display(), error = %e, "failed to create rules directory");
            }
        }
        Self {
            rules_dir,
            store,
            snapshot: Arc::new(ArcSwap::from_pointee(Vec::new())),
            _watcher: None,
        }
    }

    /// The current immutable rule snapshot. Lock-free read.
    pub fn snapshot(&self) -> Arc<Vec<AlertRule>> {
        self.snapshot.load_full()
    }

    /// Scan `rules_dir` recursively for `*.yml`/`*.yaml` files, parse each
    /// into an [`AlertRule`], validate, and upsert into the state store.
    /// Parse/validation errors are logged per file and do not abort the scan.
    /// Finishes by refreshing the snapshot from the store.
    pub async fn load_all(&self) -> Result<(), RuleError> {
        let mut paths = Vec::new();
        Self::collect_yaml_files(&self.rules_dir, &mut paths);

        for path in paths {
            match self.load_file(&path).await {
                Ok(rule) => info!(rule_id = %rule.id, path = %path.display(), "loaded rule"),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to load rule file"),
            }
        }

        self.refresh_snapshot().await
    }

    fn collect_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    continue;
                }
            }
            if path.is_dir() {
                Self::collect_yaml_files(&path, out);
                continue;
            }
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == "yml" || e == "yaml")
                .unwrap_or(false);
            if is_yaml {
                out.push(path);
            }
        }
    }

    async fn load_file(&self, path: &Path) -> Result<AlertRule, RuleError> {
        let contents = fs::read_to_string(path)?;
        let rule: AlertRule = serde_yaml::from_str(&contents)?;
        let result = validate_rule(&rule);
        if !result.valid {
            return Err(RuleError::Validation(format!(
                "rule '{}' failed validation: {:?}",
                rule.id, result.errors
            )));
        }
        self.store.save_rule(&rule).await?;
        Ok(rule)
    }

    /// Re-read the full rule set from the store and publish it as the new
    /// snapshot.
    pub async fn refresh_snapshot(&self) -> Result<(), RuleError> {
        let rules = self.store.get_rules().await?;
        self.snapshot.store(Arc::new(rules));
        Ok(())
    }

    /// Start watching `rules_dir` for changes with a 500ms debounce. On
    /// create/modify, the file is re-parsed and upserted; on delete, the
    /// rule id (derived from the file stem) is removed from the store.
    /// Either way the in-memory snapshot is refreshed from the store.
    pub fn watch(&mut self, runtime: tokio::runtime::Handle) -> Result<(), RuleError> {
        let store = Arc::clone(&self.store);
        let snapshot = Arc::clone(&self.snapshot);
        let rules_dir = self.rules_dir.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "filesystem watcher error");
                    return;
                }
            };
            let store = Arc::clone(&store);
            let snapshot = Arc::clone(&snapshot);
            runtime.spawn(async move {
                handle_fs_event(event, &store, &snapshot).await;
            });
        })?;

        watcher.watch(&self.rules_dir, RecursiveMode::Recursive)?;
        info!(path = %rules_dir.display(), "watching rules directory for changes");
        self._watcher = Some(watcher);
        Ok(())
    }
}

async fn handle_fs_event(
    event: notify::Event,
    store: &Arc<dyn StateStore>,
    snapshot: &Arc<ArcSwap<Vec<AlertRule>>>,
) {
    use notify::EventKind;

    let mut touched = false;
    for path in &event.paths {
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == "yml" || e == "yaml")
            .unwrap_or(false);
        if !is_yaml {
            continue;
        }

        match &event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {
                match fs::read_to_string(path).and_then(|s| {
                    serde_yaml::from_str::<AlertRule>(&s)
                        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
                }) {
                    Ok(rule) => {
                        let result = validate_rule(&rule);
                        if !result.valid {
                            warn!(path = %path.display(), errors = ?result.errors, "rule failed validation, keeping previous version");
                            continue;
                        }
                        if let Err(e) = store.save_rule(&rule).await {
                            warn!(path = %path.display(), error = %e, "failed to persist hot-reloaded rule");
                            continue;
                        }
                        info!(rule_id = %rule.id, path = %path.display(), "hot-reloaded rule");
                        touched = true;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to parse rule during hot-reload, keeping previous version");
                    }
                }
            }
            EventKind::Remove(_) => {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if store.delete_rule(stem).await.is_ok() {
                        info!(rule_id = %stem, "removed rule after file deletion");
                        touched = true;
                    }
                }
            }
            _ => {}
        }
    }

    if touched {
        if let Ok(rules) = store.get_rules().await {
            snapshot.store(Arc::new(rules));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_state::InMemoryStateStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn loads_valid_yaml_rule_into_snapshot() {
        let dir = tempdir().unwrap();
        let store = InMemoryStateStore::new();
        std::fs::write(
            dir.path().join("r1.yml"),
            r#"
id: r1
name: Error spike
conditions:
  threshold: 2
  operator: gte
actions:
  channel: "#alerts"
  severity: high
created_at: "2025-01-01T00:00:00Z"
updated_at: "2025-01-01T00:00:00Z"
"#,
        )
        .unwrap();

        let loader = RuleLoader::new(dir.path().to_path_buf(), store);
        loader.load_all().await.unwrap();
        let snapshot = loader.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "r1");
    }

    #[tokio::test]
    async fn invalid_yaml_file_is_skipped() {
        let dir = tempdir().unwrap();
        let store = InMemoryStateStore::new();
        std::fs::write(dir.path().join("bad.yml"), "not: [valid").unwrap();

        let loader = RuleLoader::new(dir.path().to_path_buf(), store);
        loader.load_all().await.unwrap();
        assert_eq!(loader.snapshot().len(), 0);
    }
}
