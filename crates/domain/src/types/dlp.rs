//! Redaction gate payloads

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Vault token -> original value, as returned by one scan
pub type TokenMap = BTreeMap<String, String>;

/// One entry of a DLP scan response, parallel to the request batch
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub redacted_text: String,
    #[serde(default)]
    pub token_to_value: TokenMap,
}

/// Append-only vault entry scoped to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultToken {
    pub user_id: String,
    pub token: String,
    pub value: String,
}

impl VaultToken {
    pub fn from_map(user_id: &str, tokens: &TokenMap) -> Vec<Self> {
        tokens
            .iter()
            .map(|(token, value)| Self {
                user_id: user_id.to_string(),
                token: token.clone(),
                value: value.clone(),
            })
            .collect()
    }
}

/// Item after the gate: sanitized fields plus whether DLP actually ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redacted<T> {
    pub item: T,
    pub dlp_verified: bool,
}
