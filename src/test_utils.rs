use std::{
    env, fs,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::{
    api::{SealApi, SealStatus},
    context::Context,
    errors::{AuError, ConnectionError, VaultError},
};

pub const TEST_DIR: &str = "vault_autounseal_test";

mod tests {
    use super::*;

    #[ctor::ctor]
    fn init() {
        let dir = env::temp_dir().join(TEST_DIR);
        let _ = fs::remove_dir_all(&dir);
        println!("create vault_autounseal_test dir: {}", dir.to_string_lossy().into_owned());
        assert!(fs::create_dir(&dir).is_ok());
    }

    #[ctor::dtor]
    fn cleanup() {
        let dir = env::temp_dir().join(TEST_DIR);
        let _ = fs::remove_dir_all(&dir);
    }
}

/// `n` distinct, well-formed key shares, each decoding to 4 bytes.
pub fn test_keys(n: usize) -> Vec<String> {
    (0..n).map(|i| STANDARD.encode([0x10 + i as u8, 0xa5, 0x3c, 0x7e ^ i as u8])).collect()
}

#[derive(Default)]
struct MockState {
    status: SealStatus,
    status_calls: usize,
    status_failures: usize,
    fail_submit_at: Option<usize>,
    submitted: Vec<usize>,
}

/// In-memory stand-in for a Vault endpoint. Key submissions advance `progress` until the threshold is
/// reached, at which point the mock reports unsealed and resets progress, like Vault does.
pub struct MockSealApi {
    address: String,
    state: Mutex<MockState>,
}

impl MockSealApi {
    pub fn sealed(threshold: usize) -> Self {
        let status = SealStatus {
            seal_type: "shamir".into(),
            initialized: true,
            sealed: true,
            threshold,
            shares: threshold.max(5),
            version: "1.15.2".into(),
            ..Default::default()
        };
        Self::with_status(status)
    }

    pub fn unsealed() -> Self {
        let status = SealStatus { sealed: false, ..Self::sealed(3).status() };
        Self::with_status(status)
    }

    fn with_status(status: SealStatus) -> Self {
        Self {
            address: "http://mock-vault:8200".into(),
            state: Mutex::new(MockState { status, ..Default::default() }),
        }
    }

    /// Makes the next `count` status queries fail with a retryable connection error.
    pub fn fail_status(self, count: usize) -> Self {
        self.lock().status_failures = count;
        self
    }

    /// Makes the submission of the key at `index` fail with a non-retryable error.
    pub fn fail_submit_at(self, index: usize) -> Self {
        self.lock().fail_submit_at = Some(index);
        self
    }

    pub fn submitted(&self) -> Vec<usize> {
        self.lock().submitted.clone()
    }

    pub fn status_calls(&self) -> usize {
        self.lock().status_calls
    }

    pub fn status(&self) -> SealStatus {
        self.lock().status.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SealApi for MockSealApi {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn get_seal_status(&self, _ctx: &Context) -> Result<SealStatus, AuError> {
        let mut state = self.lock();
        state.status_calls += 1;
        if state.status_failures > 0 {
            state.status_failures -= 1;
            let cause = AuError::ResponseStatus { status: 503, errors: vec!["connection reset".into()] };
            return Err(ConnectionError::new(&self.address, cause, Duration::from_secs(1), true).into());
        }
        Ok(state.status.clone())
    }

    async fn submit_single_key(&self, _ctx: &Context, key: &str, key_index: usize) -> Result<SealStatus, AuError> {
        let mut state = self.lock();
        state.submitted.push(key_index);
        if state.fail_submit_at == Some(key_index) {
            let cause = AuError::ResponseStatus { status: 400, errors: vec!["invalid key".into()] };
            return Err(VaultError::new("submit-key", &self.address, cause, false).into());
        }
        if STANDARD.decode(key).is_err() {
            return Err(AuError::ResponseStatus { status: 400, errors: vec!["invalid key".into()] });
        }

        state.status.progress += 1;
        if state.status.progress >= state.status.threshold {
            state.status.sealed = false;
            state.status.progress = 0;
        }
        Ok(state.status.clone())
    }
}
