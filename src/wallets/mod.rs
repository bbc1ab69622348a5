/// Wallet secret resolution
///
/// Swap payloads reference a wallet by alias; the worker asks a
/// [`WalletResolver`] for the secret and only falls back to a secret carried
/// in the payload when no alias was given.
use crate::config::{WalletsConfig, ENV_WALLET_PREFIX};
use crate::errors::{BotError, BotResult};
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use std::collections::HashMap;
use std::sync::Arc;

pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub trait WalletResolver: Send + Sync {
    /// Secret key material for `alias` (base58 or JSON byte array)
    fn resolve(&self, alias: &str) -> BotResult<String>;
}

/// Resolves aliases from `[wallets.aliases]`, then `SWAPBOX_WALLET_<ALIAS>`
#[derive(Clone)]
pub struct ConfigWalletResolver {
    aliases: HashMap<String, String>,
    env: EnvLookup,
}

impl ConfigWalletResolver {
    pub fn new(config: &WalletsConfig) -> Self {
        Self::with_env(config, Arc::new(|key: &str| std::env::var(key).ok()))
    }

    pub fn with_env(config: &WalletsConfig, env: EnvLookup) -> Self {
        let aliases = config
            .aliases
            .iter()
            .map(|(alias, secret)| (alias.trim().to_lowercase(), secret.clone()))
            .collect();
        Self { aliases, env }
    }
}

impl WalletResolver for ConfigWalletResolver {
    fn resolve(&self, alias: &str) -> BotResult<String> {
        let key = alias.trim().to_lowercase();
        if key.is_empty() {
            return Err(BotError::validation("walletAlias", "is empty"));
        }

        if let Some(secret) = self.aliases.get(&key).filter(|s| !s.trim().is_empty()) {
            return Ok(secret.trim().to_string());
        }

        let env_key = env_key_for_alias(&key);
        match (self.env)(&env_key).filter(|s| !s.trim().is_empty()) {
            Some(secret) => Ok(secret.trim().to_string()),
            None => Err(BotError::wallet(format!(
                "unknown wallet alias '{}' (not in config, {} not set)",
                alias.trim(),
                env_key
            ))),
        }
    }
}

/// `main-2` -> `SWAPBOX_WALLET_MAIN_2`
pub fn env_key_for_alias(alias: &str) -> String {
    let suffix: String = alias
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}", ENV_WALLET_PREFIX, suffix)
}

/// Build a keypair from a secret in base58 or `[1,2,...]` array format
pub fn parse_keypair(secret: &str) -> BotResult<Keypair> {
    let secret = secret.trim();
    if secret.is_empty() {
        return Err(BotError::wallet("private key is empty"));
    }

    let bytes: Vec<u8> = if secret.starts_with('[') {
        serde_json::from_str(secret)
            .map_err(|e| BotError::wallet(format!("Invalid private key array: {}", e)))?
    } else {
        bs58::decode(secret)
            .into_vec()
            .map_err(|e| BotError::wallet(format!("Invalid private key: {}", e)))?
    };

    if bytes.len() != 64 {
        return Err(BotError::wallet(format!(
            "private key must be 64 bytes, got {}",
            bytes.len()
        )));
    }

    Keypair::try_from(&bytes[..])
        .map_err(|e| BotError::wallet(format!("Failed to create keypair: {}", e)))
}

/// Public address of a keypair, for log lines
pub fn describe(keypair: &Keypair) -> String {
    keypair.pubkey().to_string()
}
