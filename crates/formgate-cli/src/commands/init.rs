use crate::support::{fail, print_json, yes_no};
use formgate_store::{DEFAULT_CONFIG_FILE, EngineConfig, MemoryStore};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct InitOutcome {
    pub root: PathBuf,
    pub store_path: PathBuf,
    pub config_path: PathBuf,
    pub created_root: bool,
    pub created_store: bool,
    pub created_config: bool,
}

fn ensure_dir(path: &Path, label: &str) -> Result<bool, String> {
    if path.exists() {
        if !path.is_dir() {
            return Err(format!("{label} is not a directory: {}", path.display()));
        }
        return Ok(false);
    }
    fs::create_dir_all(path)
        .map_err(|e| format!("failed to create {label} {}: {e}", path.display()))?;
    Ok(true)
}

/// Create the store, upload directories and a default config under `path`.
/// Existing files are left alone.
pub fn init_layout(path: impl AsRef<Path>) -> Result<InitOutcome, String> {
    let root = path.as_ref().to_path_buf();
    let created_root = ensure_dir(&root, "init path")?;

    let config_path = root.join(DEFAULT_CONFIG_FILE);
    let config = if config_path.exists() {
        EngineConfig::load(&config_path).map_err(|e| e.to_string())?
    } else {
        EngineConfig::default()
    };

    for (dir, label) in [
        (&config.uploads.staging_dir, "staging directory"),
        (&config.uploads.storage_dir, "storage directory"),
    ] {
        ensure_dir(&root.join(dir), label)?;
    }

    let store_path = root.join(&config.store.path);
    if let Some(parent) = store_path.parent() {
        ensure_dir(parent, "store directory")?;
    }
    if store_path.exists() && !store_path.is_file() {
        return Err(format!(
            "store path exists but is not a file: {}",
            store_path.display()
        ));
    }
    let mut created_store = false;
    if !store_path.exists() {
        MemoryStore::default()
            .save_jsonl(&store_path)
            .map_err(|e| format!("failed to initialize {}: {e}", store_path.display()))?;
        created_store = true;
    }

    let mut created_config = false;
    if !config_path.exists() {
        let text = toml::to_string_pretty(&config)
            .map_err(|e| format!("failed to render default config: {e}"))?;
        fs::write(&config_path, text)
            .map_err(|e| format!("failed to write {}: {e}", config_path.display()))?;
        created_config = true;
    }

    Ok(InitOutcome {
        root,
        store_path,
        config_path,
        created_root,
        created_store,
        created_config,
    })
}

pub fn run(path: String, json_output: bool) {
    let outcome = init_layout(&path).unwrap_or_else(|e| fail(e));

    if json_output {
        print_json(&json!({
            "action": "init",
            "root": outcome.root.display().to_string(),
            "storePath": outcome.store_path.display().to_string(),
            "configPath": outcome.config_path.display().to_string(),
            "createdStore": outcome.created_store,
            "createdConfig": outcome.created_config,
        }));
        return;
    }

    println!("formgate init {path}");
    println!();
    println!("  store path: {}", outcome.store_path.display());
    println!("  config path: {}", outcome.config_path.display());
    println!("  created root: {}", yes_no(outcome.created_root));
    println!("  created store: {}", yes_no(outcome.created_store));
    println!("  created config: {}", yes_no(outcome.created_config));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "formgate-cli-init-{prefix}-{}-{unique}",
            std::process::id()
        ))
    }

    #[test]
    fn init_layout_creates_store_and_config() {
        let root = temp_dir("create");
        let outcome = init_layout(&root).expect("init should succeed");
        assert!(outcome.created_root);
        assert!(outcome.store_path.is_file());
        assert!(root.join(".formgate/staging").is_dir());
        assert!(root.join(".formgate/files").is_dir());

        let config = EngineConfig::load(&outcome.config_path).expect("written config loads");
        assert_eq!(config, EngineConfig::default());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn init_layout_keeps_existing_config() {
        let root = temp_dir("keep");
        fs::create_dir_all(&root).expect("root");
        fs::write(
            root.join(DEFAULT_CONFIG_FILE),
            "[store]\npath = \"data/forms.jsonl\"\n",
        )
        .expect("config");

        let outcome = init_layout(&root).expect("init should succeed");
        assert!(!outcome.created_config);
        assert_eq!(outcome.store_path, root.join("data/forms.jsonl"));
        assert!(outcome.store_path.is_file());

        let again = init_layout(&root).expect("second init");
        assert!(!again.created_store);
        let _ = fs::remove_dir_all(root);
    }
}
