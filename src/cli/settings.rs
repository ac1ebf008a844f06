use anyhow::Result;

use super::SettingsAction;
use crate::core::{ConfigStore, ConnectionConfig};

fn mask_key(key: &str) -> String {
    if key.is_empty() {
        return String::from("(not set)");
    }
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return String::from("****");
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

/// Overwrites only the fields that were given.
pub fn apply(
    mut config: ConnectionConfig,
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
) -> ConnectionConfig {
    if let Some(base_url) = base_url {
        config.base_url = base_url;
    }
    if let Some(api_key) = api_key {
        config.api_key = api_key;
    }
    if let Some(model) = model {
        config.model = model;
    }
    config
}

pub fn run(action: SettingsAction, store: &dyn ConfigStore) -> Result<()> {
    match action {
        SettingsAction::Show {} => {
            let config = store.load()?;
            println!("base_url: {}", config.base_url);
            println!("api_key:  {}", mask_key(&config.api_key));
            println!("model:    {}", config.model);
        }
        SettingsAction::Set {
            base_url,
            api_key,
            model,
        } => {
            let config = apply(store.load()?, base_url, api_key, model);
            store.save(&config)?;
            println!("Settings saved");
        }
    }
    Ok(())
}
