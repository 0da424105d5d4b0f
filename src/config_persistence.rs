//! Comment-preserving config writeback.
//!
//! Only the runtime-mutable keys are rewritten; everything else in the file,
//! including user comments and formatting, is left untouched.

use std::path::Path;

use toml_edit::{value, DocumentMut, Item, Table};

use crate::protocol::SelectionMode;

fn set_table_value_preserving_decor(table: &mut Table, key: &str, item: Item) {
    let existing_value_decor = table
        .get(key)
        .and_then(|current| current.as_value().map(|value| value.decor().clone()));
    table[key] = item;
    if let Some(existing_value_decor) = existing_value_decor {
        if let Some(next_value) = table[key].as_value_mut() {
            *next_value.decor_mut() = existing_value_decor;
        }
    }
}

fn ensure_section_table(document: &mut DocumentMut, key: &str) {
    let root = document.as_table_mut();
    let should_replace = !matches!(root.get(key), Some(item) if item.is_table());
    if should_replace {
        root.insert(key, Item::Table(Table::new()));
    }
}

fn load_document(path: &Path) -> Result<DocumentMut, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {}: {err}", path.display()))?;
    content
        .parse::<DocumentMut>()
        .map_err(|err| format!("failed to parse config {}: {err}", path.display()))
}

fn store_document(path: &Path, document: &DocumentMut) -> Result<(), String> {
    std::fs::write(path, document.to_string())
        .map_err(|err| format!("failed to write config {}: {err}", path.display()))
}

fn update_key(path: &Path, section: &str, key: &str, item: Item) -> Result<(), String> {
    let mut document = load_document(path)?;
    ensure_section_table(&mut document, section);
    let table = document[section]
        .as_table_mut()
        .ok_or_else(|| format!("config section '{section}' is not a table"))?;
    set_table_value_preserving_decor(table, key, item);
    store_document(path, &document)
}

/// Persists the generated per-installation client id.
pub fn persist_client_id(path: &Path, id: &str) -> Result<(), String> {
    update_key(path, "client", "id", value(id))
}

/// Persists the local-only volume preference.
pub fn persist_volume(path: &Path, volume: u8) -> Result<(), String> {
    update_key(path, "playback", "volume", value(i64::from(volume)))
}

/// Persists the queue selection mode.
pub fn persist_selection_mode(path: &Path, mode: SelectionMode) -> Result<(), String> {
    let mode = match mode {
        SelectionMode::RoundRobin => "round_robin",
        SelectionMode::Shuffle => "shuffle",
    };
    update_key(path, "queue", "selection_mode", value(mode))
}
