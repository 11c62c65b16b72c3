//! Scanner and vault fakes

use std::sync::Mutex;

use async_trait::async_trait;
use tidemark_core::{DlpScanner, VaultClient};
use tidemark_domain::{Result as DomainResult, ScanResult, TidemarkError, TokenMap};

#[derive(Default)]
struct ScannerState {
    /// secret -> token substituted for it
    secrets: Vec<(String, String)>,
    missing_config: bool,
    failing: bool,
    batches: Vec<usize>,
}

/// Replaces configured secrets with tokens; can be made unreachable
#[derive(Default)]
pub struct FakeScanner {
    state: Mutex<ScannerState>,
}

impl FakeScanner {
    pub fn redact(&self, secret: &str, token: &str) -> &Self {
        self.state.lock().unwrap().secrets.push((secret.to_string(), token.to_string()));
        self
    }

    pub fn fail(&self) {
        self.state.lock().unwrap().failing = true;
    }

    pub fn without_config(&self) {
        self.state.lock().unwrap().missing_config = true;
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state.lock().unwrap().batches.clone()
    }
}

#[async_trait]
impl DlpScanner for FakeScanner {
    fn check_config(&self) -> DomainResult<()> {
        if self.state.lock().unwrap().missing_config {
            return Err(TidemarkError::DlpConfigMissing("scanner key not set".into()));
        }
        Ok(())
    }

    async fn scan(&self, texts: &[String]) -> DomainResult<Vec<ScanResult>> {
        let mut state = self.state.lock().unwrap();
        state.batches.push(texts.len());
        if state.failing {
            return Err(TidemarkError::DlpScanFailed("scanner returned 503".into()));
        }

        Ok(texts
            .iter()
            .map(|text| {
                let mut redacted_text = text.clone();
                let mut token_to_value = TokenMap::new();
                for (secret, token) in &state.secrets {
                    if redacted_text.contains(secret.as_str()) {
                        redacted_text = redacted_text.replace(secret.as_str(), token);
                        token_to_value.insert(token.clone(), secret.clone());
                    }
                }
                ScanResult { redacted_text, token_to_value }
            })
            .collect())
    }
}

#[derive(Default)]
struct VaultState {
    stored: Vec<(String, TokenMap)>,
    missing_config: bool,
    failing: bool,
}

#[derive(Default)]
pub struct FakeVault {
    state: Mutex<VaultState>,
}

impl FakeVault {
    pub fn fail(&self) {
        self.state.lock().unwrap().failing = true;
    }

    pub fn without_config(&self) {
        self.state.lock().unwrap().missing_config = true;
    }

    /// Every upsert as `(user_id, tokens)`
    pub fn stored(&self) -> Vec<(String, TokenMap)> {
        self.state.lock().unwrap().stored.clone()
    }
}

#[async_trait]
impl VaultClient for FakeVault {
    fn check_config(&self) -> DomainResult<()> {
        if self.state.lock().unwrap().missing_config {
            return Err(TidemarkError::DlpConfigMissing("vault url not set".into()));
        }
        Ok(())
    }

    async fn upsert(&self, user_id: &str, tokens: &TokenMap) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing {
            return Err(TidemarkError::Network("vault connection reset".into()));
        }
        state.stored.push((user_id.to_string(), tokens.clone()));
        Ok(())
    }
}
