//! ABI catalog loading.
//!
//! Rules only carry a canonical event signature; when an ABI JSON file for
//! the contract is available, its parameter names and indexed flags make the
//! decoded args readable. Files are loaded once at startup from the
//! configured directories.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use alloy_core::json_abi::{Event, JsonAbi};

use chainwatch_core::WatchError;

/// Loaded ABI events, keyed by event name.
pub type AbiCatalog = BTreeMap<String, Event>;

/// Load ABI JSON files (`*.json`) from the provided directories,
/// recursively. Later files win on event-name collisions.
pub fn load_abi_dirs(dirs: &[String]) -> Result<AbiCatalog, WatchError> {
    let mut catalog = AbiCatalog::new();
    for dir in dirs {
        if dir.is_empty() {
            continue;
        }
        walk(Path::new(dir), &mut catalog)?;
    }
    Ok(catalog)
}

fn walk(dir: &Path, catalog: &mut AbiCatalog) -> Result<(), WatchError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| WatchError::Config(format!("read abi dir {}: {e}", dir.display())))?;
    for entry in entries {
        let entry =
            entry.map_err(|e| WatchError::Config(format!("read abi dir {}: {e}", dir.display())))?;
        let path = entry.path();
        if path.is_dir() {
            walk(&path, catalog)?;
            continue;
        }
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json {
            continue;
        }
        let data = fs::read_to_string(&path)
            .map_err(|e| WatchError::Config(format!("read abi {}: {e}", path.display())))?;
        let abi: JsonAbi = serde_json::from_str(&data)
            .map_err(|e| WatchError::Config(format!("parse abi {}: {e}", path.display())))?;
        for event in abi.events() {
            catalog.insert(event.name.clone(), event.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ERC20_ABI: &str = r#"[
        {
            "type": "event",
            "name": "Transfer",
            "anonymous": false,
            "inputs": [
                {"name": "from", "type": "address", "indexed": true},
                {"name": "to", "type": "address", "indexed": true},
                {"name": "value", "type": "uint256", "indexed": false}
            ]
        }
    ]"#;

    #[test]
    fn loads_events_from_dir() {
        let dir = std::env::temp_dir().join("chainwatch-abi-test");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("erc20.json"), ERC20_ABI).unwrap();

        let catalog = load_abi_dirs(&[dir.to_string_lossy().into_owned()]).unwrap();
        let transfer = catalog.get("Transfer").expect("Transfer event loaded");
        assert_eq!(transfer.inputs.len(), 3);
        assert!(transfer.inputs[0].indexed);
        assert!(!transfer.inputs[2].indexed);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_dir_list_is_empty_catalog() {
        let catalog = load_abi_dirs(&[]).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn missing_dir_errors() {
        assert!(load_abi_dirs(&["/nonexistent/chainwatch".into()]).is_err());
    }
}
