//! Keyring helpers for the search backend credential.

use keyring::Entry;

const SEARCH_SERVICE_NAME: &str = "auxroom.search";

fn search_entry(username: &str) -> Result<Entry, String> {
    Entry::new(SEARCH_SERVICE_NAME, username)
        .map_err(|err| format!("failed to create keyring entry: {err}"))
}

/// Saves the search backend password for a user into the OS keyring.
#[allow(dead_code)]
pub fn set_search_password(username: &str, password: &str) -> Result<(), String> {
    let entry = search_entry(username)?;
    entry
        .set_password(password)
        .map_err(|err| format!("failed to set keyring password: {err}"))
}

/// Loads the search backend password for a user from the OS keyring.
pub fn get_search_password(username: &str) -> Result<Option<String>, String> {
    let entry = search_entry(username)?;
    match entry.get_password() {
        Ok(password) => Ok(Some(password)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(format!("failed to get keyring password: {err}")),
    }
}

/// Deletes the search backend password for a user from the OS keyring.
#[allow(dead_code)]
pub fn delete_search_password(username: &str) -> Result<(), String> {
    let entry = search_entry(username)?;
    match entry.delete_password() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(err) => Err(format!("failed to delete keyring password: {err}")),
    }
}
