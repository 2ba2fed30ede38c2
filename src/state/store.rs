use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, Result};

// ---------------------------------------------------------------------------
// Persisted shapes
// ---------------------------------------------------------------------------

/// Identities observed for one symbol as of its last successful check.
/// Order is preserved across save/load but carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolState {
    #[serde(default)]
    pub last_seen_filings: Vec<String>,
}

/// The whole state file: `{ "lastChecked": ..., "symbols": { SYM: {...} } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherState {
    /// Missing or unparsable values read as "now" so the symbol map survives.
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub last_checked: DateTime<Utc>,
    pub symbols: BTreeMap<String, SymbolState>,
}

impl WatcherState {
    pub fn empty() -> Self {
        Self {
            last_checked: Utc::now(),
            symbols: BTreeMap::new(),
        }
    }

    pub fn tracked_filings(&self) -> usize {
        self.symbols.values().map(|s| s.last_seen_filings.len()).sum()
    }
}

/// Pre-multi-symbol shape: a flat list with no `symbols` map.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyState {
    #[serde(default)]
    last_checked: Option<String>,
    last_seen_filings: Vec<String>,
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// File-backed store of per-symbol filing identities.
///
/// Holds no state in memory: every operation reloads the file, so the store can
/// be rebuilt from disk at any point. Read-modify-write is not locked; the
/// caller guarantees a single writer (the watcher's cycle guard).
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted state. Never fails: a missing, unreadable or
    /// unparsable file yields a fresh empty state, and the legacy flat shape is
    /// migrated to an empty symbol map (its history is dropped).
    pub fn load(&self) -> WatcherState {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No state file, initializing new state");
                return WatcherState::empty();
            }
            Err(e) => {
                error!(path = %self.path.display(), "Error reading state: {e}");
                return WatcherState::empty();
            }
        };

        match parse_state(&content) {
            Ok(state) => {
                debug!(
                    symbols = state.symbols.len(),
                    filings = state.tracked_filings(),
                    "Loaded state with {} symbol(s), {} total filings tracked",
                    state.symbols.len(),
                    state.tracked_filings(),
                );
                state
            }
            Err(e) => {
                error!(path = %self.path.display(), "Error parsing state, starting fresh: {e}");
                WatcherState::empty()
            }
        }
    }

    /// Overwrites the state file with `state`. Errors are returned, not logged
    /// away: losing durability must stop the caller.
    ///
    /// Writes a sibling temp file and renames it over the target so an
    /// interrupted write leaves the previous state intact.
    pub fn save(&self, state: &WatcherState) -> Result<()> {
        let content = serde_json::to_string_pretty(state)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.persist_error("create directory", e))?;
            }
        }

        let tmp = self.tmp_path();
        fs::write(&tmp, content).map_err(|e| self.persist_error("write", e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.persist_error("rename", e))?;

        debug!(
            symbols = state.symbols.len(),
            filings = state.tracked_filings(),
            "State saved: {} symbol(s), {} filings tracked",
            state.symbols.len(),
            state.tracked_filings(),
        );
        Ok(())
    }

    /// Identities of `symbol` recorded at its last check (empty if never seen).
    pub fn symbol_state(&self, symbol: &str) -> Vec<String> {
        self.load()
            .symbols
            .remove(symbol)
            .map(|s| s.last_seen_filings)
            .unwrap_or_default()
    }

    /// Returns the members of `current_ids` not recorded for `symbol`, in
    /// `current_ids` order. Read-only.
    pub fn find_new_filings(&self, symbol: &str, current_ids: &[String]) -> Vec<String> {
        let previous = self.symbol_state(symbol);
        let seen: HashSet<&str> = previous.iter().map(String::as_str).collect();

        let new_ids: Vec<String> = current_ids
            .iter()
            .filter(|id| !seen.contains(id.as_str()))
            .cloned()
            .collect();

        if new_ids.is_empty() {
            info!(symbol = %symbol, "[{symbol}] No new filings detected");
        } else {
            info!(
                symbol = %symbol,
                new = new_ids.len(),
                "[{symbol}] Found {} new filing(s)",
                new_ids.len(),
            );
        }
        new_ids
    }

    /// Replaces the symbol's identity list with `current_ids` (a snapshot, not
    /// a union), refreshes `lastChecked`, and persists. Duplicate ids are
    /// dropped keeping the first occurrence.
    pub fn update_symbol_state(&self, symbol: &str, current_ids: &[String]) -> Result<WatcherState> {
        let mut state = self.load();

        let mut seen: HashSet<&str> = HashSet::with_capacity(current_ids.len());
        let last_seen_filings: Vec<String> = current_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        state
            .symbols
            .insert(symbol.to_string(), SymbolState { last_seen_filings });
        state.last_checked = Utc::now();

        self.save(&state)?;
        Ok(state)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "watcher-state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn persist_error(&self, op: &str, e: std::io::Error) -> AppError {
        AppError::Persist(format!("{op} {}: {e}", self.path.display()))
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let parsed = raw.as_ref().and_then(|v| v.as_str()).and_then(parse_timestamp);
    if parsed.is_none() {
        warn!("State file has no usable lastChecked, using current time");
    }
    Ok(parsed.unwrap_or_else(Utc::now))
}

/// Parses either the current shape or the legacy flat shape.
fn parse_state(content: &str) -> Result<WatcherState> {
    let value: serde_json::Value = serde_json::from_str(content)?;

    let is_legacy = value.get("symbols").is_none() && value.get("lastSeenFilings").is_some();
    if is_legacy {
        let legacy: LegacyState = serde_json::from_value(value)?;
        warn!(
            discarded = legacy.last_seen_filings.len(),
            "Migrating old state format to multi-symbol format; previous history is not carried over"
        );
        let last_checked = legacy
            .last_checked
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        return Ok(WatcherState {
            last_checked,
            symbols: BTreeMap::new(),
        });
    }

    Ok(serde_json::from_value(value)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn temp_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = StateStore::new(dir.path().join("watcher-state.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_loads_empty_state() {
        let (_dir, store) = temp_store();
        let state = store.load();
        assert!(state.symbols.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn corrupt_file_loads_empty_state() {
        let (_dir, store) = temp_store();
        fs::write(store.path(), "{ not json").unwrap();
        assert!(store.load().symbols.is_empty());
    }

    #[test]
    fn legacy_shape_migrates_to_empty_mapping() {
        let (_dir, store) = temp_store();
        fs::write(
            store.path(),
            r#"{"lastChecked": "2025-01-01T00:00:00.000Z", "lastSeenFilings": ["a_4_company", "b_8-K_Doe"]}"#,
        )
        .unwrap();

        let state = store.load();
        assert!(state.symbols.is_empty());
        assert_eq!(state.last_checked.to_rfc3339(), "2025-01-01T00:00:00+00:00");
        assert_eq!(store.find_new_filings("PCSA", &ids(&["a_4_company"])), ids(&["a_4_company"]));
    }

    #[test]
    fn reads_state_written_with_millisecond_timestamps() {
        let (_dir, store) = temp_store();
        fs::write(
            store.path(),
            r#"{"lastChecked": "2025-10-14T12:30:00.123Z", "symbols": {"PCSA": {"lastSeenFilings": ["x", "y"]}, "AAPL": {}}}"#,
        )
        .unwrap();

        assert_eq!(store.symbol_state("PCSA"), ids(&["x", "y"]));
        assert!(store.symbol_state("AAPL").is_empty());
        assert!(store.symbol_state("TSLA").is_empty());
    }

    #[test]
    fn bad_last_checked_keeps_symbol_history() {
        let (_dir, store) = temp_store();
        for last_checked in [r#""lastChecked": null,"#, r#""lastChecked": "yesterday","#, r#""lastChecked": 42,"#, ""] {
            fs::write(
                store.path(),
                format!(r#"{{{last_checked} "symbols": {{"PCSA": {{"lastSeenFilings": ["x"]}}}}}}"#),
            )
            .unwrap();

            let before = Utc::now();
            let state = store.load();
            assert_eq!(state.symbols["PCSA"].last_seen_filings, ids(&["x"]), "{last_checked}");
            assert!(state.last_checked >= before);
        }
    }

    #[test]
    fn save_then_load_preserves_order() {
        let (_dir, store) = temp_store();
        let mut state = WatcherState::empty();
        state.symbols.insert(
            "AAA".to_string(),
            SymbolState { last_seen_filings: ids(&["z", "a", "m"]) },
        );
        store.save(&state).unwrap();

        let loaded = store.load();
        assert_eq!(loaded, state);
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn written_file_uses_camel_case_keys() {
        let (_dir, store) = temp_store();
        store.update_symbol_state("AAA", &ids(&["i1"])).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert!(raw.get("lastChecked").and_then(|v| v.as_str()).is_some());
        assert_eq!(raw["symbols"]["AAA"]["lastSeenFilings"][0], "i1");
    }

    #[test]
    fn save_creates_missing_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/deeper/state.json"));
        store.update_symbol_state("AAA", &ids(&["i1"])).unwrap();
        assert_eq!(store.symbol_state("AAA"), ids(&["i1"]));
    }

    #[test]
    fn save_surfaces_write_errors() {
        let dir = tempfile::tempdir().unwrap();
        // The target's parent is a regular file, so nothing can be written below it.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let store = StateStore::new(blocker.join("state.json"));

        let err = store.update_symbol_state("AAA", &ids(&["i1"])).unwrap_err();
        assert!(matches!(err, AppError::Persist(_)), "{err}");
    }

    #[test]
    fn find_new_filings_preserves_input_order() {
        let (_dir, store) = temp_store();
        store.update_symbol_state("AAA", &ids(&["b"])).unwrap();
        let new_ids = store.find_new_filings("AAA", &ids(&["d", "b", "a", "c"]));
        assert_eq!(new_ids, ids(&["d", "a", "c"]));
    }

    #[test]
    fn find_new_filings_is_idempotent() {
        let (_dir, store) = temp_store();
        store.update_symbol_state("AAA", &ids(&["i1"])).unwrap();
        let current = ids(&["i1", "i2"]);
        let first = store.find_new_filings("AAA", &current);
        let second = store.find_new_filings("AAA", &current);
        assert_eq!(first, second);
        assert_eq!(first, ids(&["i2"]));
    }

    #[test]
    fn nothing_new_after_update() {
        let (_dir, store) = temp_store();
        let current = ids(&["i1", "i2"]);
        store.update_symbol_state("AAA", &current).unwrap();
        assert!(store.find_new_filings("AAA", &current).is_empty());
    }

    #[test]
    fn update_replaces_rather_than_unions() {
        let (_dir, store) = temp_store();
        store.update_symbol_state("AAA", &ids(&["i1", "i2"])).unwrap();
        store.update_symbol_state("AAA", &ids(&["i2", "i3"])).unwrap();

        assert_eq!(store.symbol_state("AAA"), ids(&["i2", "i3"]));
        assert_eq!(store.find_new_filings("AAA", &ids(&["i1"])), ids(&["i1"]));
    }

    #[test]
    fn update_leaves_other_symbols_alone() {
        let (_dir, store) = temp_store();
        store.update_symbol_state("AAA", &ids(&["i1"])).unwrap();
        let state = store.update_symbol_state("BBB", &ids(&["j1"])).unwrap();

        assert_eq!(state.symbols.len(), 2);
        assert_eq!(store.symbol_state("AAA"), ids(&["i1"]));
    }

    #[test]
    fn update_drops_duplicate_ids() {
        let (_dir, store) = temp_store();
        store.update_symbol_state("AAA", &ids(&["i1", "i2", "i1"])).unwrap();
        assert_eq!(store.symbol_state("AAA"), ids(&["i1", "i2"]));
    }

    #[test]
    fn update_advances_last_checked() {
        let (_dir, store) = temp_store();
        let first = store.update_symbol_state("AAA", &ids(&["i1"])).unwrap();
        let second = store.update_symbol_state("AAA", &ids(&["i1"])).unwrap();
        assert!(second.last_checked >= first.last_checked);
        assert_eq!(first.symbols, second.symbols);
    }
}
