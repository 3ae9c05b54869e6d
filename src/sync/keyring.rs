use std::collections::HashMap;

use crate::error::KeyringError;

pub(crate) const SERVICE_NAME: &str = "focusai";
const COACH_SERVER: &str = "coach-api";

fn attributes() -> HashMap<&'static str, &'static str> {
    let mut attrs = HashMap::new();
    attrs.insert("service", SERVICE_NAME);
    attrs.insert("server", COACH_SERVER);
    attrs
}

async fn open() -> Result<oo7::Keyring, KeyringError> {
    oo7::Keyring::new()
        .await
        .map_err(|e| KeyringError::Unavailable(e.to_string()))
}

/// Store the coach API key in the system keyring, replacing any old one.
pub async fn store_api_key(key: &str) -> Result<(), KeyringError> {
    let keyring = open().await?;
    keyring
        .create_item("FocusAI Coach API Key", &attributes(), key.as_bytes(), true)
        .await
        .map_err(|e| KeyringError::Operation(e.to_string()))?;
    log::info!("Stored coach API key in keyring");
    Ok(())
}

/// Load the coach API key, if one was stored.
pub async fn load_api_key() -> Result<Option<String>, KeyringError> {
    let keyring = open().await?;
    let items = keyring
        .search_items(&attributes())
        .await
        .map_err(|e| KeyringError::Operation(e.to_string()))?;

    if let Some(item) = items.first() {
        let secret = item
            .secret()
            .await
            .map_err(|e| KeyringError::Operation(e.to_string()))?;
        let key = String::from_utf8(secret.to_vec()).map_err(|_| KeyringError::InvalidSecret)?;
        if !key.is_empty() {
            return Ok(Some(key));
        }
    }

    Ok(None)
}

/// Remove every stored coach API key.
pub async fn delete_api_key() -> Result<(), KeyringError> {
    let keyring = open().await?;
    let items = keyring
        .search_items(&attributes())
        .await
        .map_err(|e| KeyringError::Operation(e.to_string()))?;

    for item in items {
        item.delete()
            .await
            .map_err(|e| KeyringError::Operation(e.to_string()))?;
    }
    log::info!("Removed coach API key from keyring");
    Ok(())
}
