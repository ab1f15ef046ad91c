//! Sync API key storage in the OS keyring.

use crate::error::SyncError;

const SERVICE: &str = "focusguard";

/// Keyring entry holding the sync API key.
pub const API_KEY_ENTRY: &str = "sync_api_key";

/// Environment variable that overrides the keyring.
pub const API_KEY_ENV: &str = "FOCUSGUARD_API_KEY";

fn credentials_error(err: keyring::Error) -> SyncError {
    SyncError::Credentials(err.to_string())
}

pub fn get(key: &str) -> Result<Option<String>, SyncError> {
    let entry = keyring::Entry::new(SERVICE, key).map_err(credentials_error)?;
    match entry.get_password() {
        Ok(pw) => Ok(Some(pw)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(credentials_error(e)),
    }
}

pub fn set(key: &str, value: &str) -> Result<(), SyncError> {
    let entry = keyring::Entry::new(SERVICE, key).map_err(credentials_error)?;
    entry.set_password(value).map_err(credentials_error)
}

pub fn delete(key: &str) -> Result<(), SyncError> {
    let entry = keyring::Entry::new(SERVICE, key).map_err(credentials_error)?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(credentials_error(e)),
    }
}

/// The API key from `FOCUSGUARD_API_KEY`, else the keyring.
pub fn api_key() -> Option<String> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Some(key.trim().to_string());
        }
    }
    match get(API_KEY_ENTRY) {
        Ok(key) => key.filter(|k| !k.is_empty()),
        Err(e) => {
            tracing::debug!("keyring unavailable: {e}");
            None
        }
    }
}
