#![allow(dead_code)]

use keyward_license::{KeyIdGenerator, KeyPolicy, LicenseConfig, LicenseService};
use keyward_storage::{LedgerBackend, MemoryBackend};
use keyward_types::{Fingerprint, Identity, KeyId};
use std::sync::{Arc, Mutex};

pub fn key(s: &str) -> KeyId {
    KeyId::parse(s).unwrap()
}

pub fn who(s: &str) -> Identity {
    Identity::parse(s).unwrap()
}

pub fn fp(s: &str) -> Fingerprint {
    Fingerprint::parse(s).unwrap()
}

/// Yields the given ids in order, repeating the last one forever.
pub struct ScriptedIds(Mutex<Vec<String>>);

impl ScriptedIds {
    pub fn new(ids: &[&str]) -> Self {
        Self(Mutex::new(ids.iter().map(|s| s.to_string()).collect()))
    }
}

impl KeyIdGenerator for ScriptedIds {
    fn next_id(&self, _policy: &KeyPolicy) -> String {
        let mut ids = self.0.lock().unwrap();
        if ids.len() > 1 {
            ids.remove(0)
        } else {
            ids[0].clone()
        }
    }
}

pub fn memory_service() -> (Arc<MemoryBackend>, LicenseService) {
    let backend = Arc::new(MemoryBackend::new());
    let service = LicenseService::new(backend.clone(), LicenseConfig::default()).unwrap();
    (backend, service)
}

/// A service whose generated keys are exactly `ids`.
pub fn service_with_keys(backend: Arc<dyn LedgerBackend>, ids: &[&str]) -> LicenseService {
    let service = LicenseService::with_generator(
        backend,
        LicenseConfig::default(),
        Box::new(ScriptedIds::new(ids)),
    )
    .unwrap();
    service.generate_keys(ids.len()).unwrap();
    service
}
