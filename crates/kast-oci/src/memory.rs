//! In-memory registry.
//!
//! Behaves like a distribution registry for the operations kast needs:
//! unknown repositories, tags and blobs are `NotFound`, and an optional
//! required credential turns every request with another credential into an
//! `Auth` failure. Used by tests and for dry runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::auth::Credential;
use crate::digest::Digest;
use crate::error::TransferError;
use crate::manifest::Descriptor;
use crate::reference::ModuleReference;
use crate::repository::{Connector, Repository};

#[derive(Debug, Default)]
struct RepositoryState {
    blobs: HashMap<Digest, Vec<u8>>,
    manifests: HashMap<Digest, Vec<u8>>,
    tags: BTreeMap<String, Digest>,
}

#[derive(Debug, Default)]
struct RegistryState {
    repositories: BTreeMap<String, RepositoryState>,
    required: Option<Credential>,
}

/// A registry held in memory, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl MemoryRegistry {
    /// Creates an empty registry accepting anonymous access.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry that only accepts `credential`.
    #[must_use]
    pub fn with_required_credential(credential: Credential) -> Self {
        let registry = Self::default();
        registry.lock().required = Some(credential);
        registry
    }

    /// Tags currently present in the repository of `reference`.
    #[must_use]
    pub fn tags(&self, reference: &ModuleReference) -> Vec<String> {
        self.lock()
            .repositories
            .get(&repository_key(reference))
            .map(|repo| repo.tags.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of blobs stored in the repository of `reference`.
    #[must_use]
    pub fn blob_count(&self, reference: &ModuleReference) -> usize {
        self.lock()
            .repositories
            .get(&repository_key(reference))
            .map_or(0, |repo| repo.blobs.len())
    }

    /// Opens a handle on the repository of `reference`.
    #[must_use]
    pub fn repository(
        &self,
        reference: &ModuleReference,
        credential: Option<&Credential>,
    ) -> MemoryRepository {
        MemoryRepository {
            registry: self.clone(),
            reference: reference.clone(),
            credential: credential.cloned(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for MemoryRegistry {
    fn connect(
        &self,
        reference: &ModuleReference,
        credential: Option<&Credential>,
    ) -> Result<Box<dyn Repository>, TransferError> {
        Ok(Box::new(self.repository(reference, credential)))
    }
}

/// Handle on one repository of a [`MemoryRegistry`].
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    registry: MemoryRegistry,
    reference: ModuleReference,
    credential: Option<Credential>,
}

impl MemoryRepository {
    fn with_state<T>(
        &self,
        op: impl FnOnce(&mut RegistryState, &str) -> Result<T, TransferError>,
    ) -> Result<T, TransferError> {
        let mut state = self.registry.lock();
        if let Some(required) = &state.required {
            if self.credential.as_ref() != Some(required) {
                return Err(TransferError::Auth {
                    message: format!("credential rejected by {}", self.reference.registry),
                });
            }
        }
        op(&mut state, &repository_key(&self.reference))
    }
}

impl Repository for MemoryRepository {
    fn reference(&self) -> &ModuleReference {
        &self.reference
    }

    fn blob_exists(&self, digest: &Digest) -> Result<bool, TransferError> {
        self.with_state(|state, key| {
            Ok(state
                .repositories
                .get(key)
                .is_some_and(|repo| repo.blobs.contains_key(digest)))
        })
    }

    fn push_blob(&self, descriptor: &Descriptor, content: &[u8]) -> Result<(), TransferError> {
        self.with_state(|state, key| {
            let repo = state.repositories.entry(key.to_string()).or_default();
            let _ = repo
                .blobs
                .insert(descriptor.digest.clone(), content.to_vec());
            Ok(())
        })
    }

    fn fetch_blob(&self, descriptor: &Descriptor) -> Result<Vec<u8>, TransferError> {
        self.with_state(|state, key| {
            state
                .repositories
                .get(key)
                .and_then(|repo| repo.blobs.get(&descriptor.digest))
                .cloned()
                .ok_or_else(|| TransferError::NotFound {
                    what: format!("blob {} in {key}", descriptor.digest),
                })
        })
    }

    fn push_manifest(&self, tag: &str, manifest: &[u8]) -> Result<Digest, TransferError> {
        let digest = Digest::of(manifest);
        self.with_state(|state, key| {
            let repo = state.repositories.entry(key.to_string()).or_default();
            let _ = repo.manifests.insert(digest.clone(), manifest.to_vec());
            let _ = repo.tags.insert(tag.to_string(), digest.clone());
            Ok(digest)
        })
    }

    fn fetch_manifest(&self, tag: &str) -> Result<Vec<u8>, TransferError> {
        self.with_state(|state, key| {
            let not_found = || TransferError::NotFound {
                what: format!("manifest {key}:{tag}"),
            };
            let repo = state.repositories.get(key).ok_or_else(not_found)?;
            let digest = repo.tags.get(tag).ok_or_else(not_found)?;
            repo.manifests.get(digest).cloned().ok_or_else(not_found)
        })
    }
}

fn repository_key(reference: &ModuleReference) -> String {
    format!("{}/{}", reference.registry, reference.repository)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransferErrorKind;

    fn reference() -> ModuleReference {
        ModuleReference::parse("registry.local/mods/web:v1", false).expect("reference")
    }

    #[test]
    fn unknown_tag_is_not_found() {
        let registry = MemoryRegistry::new();
        let repo = registry.repository(&reference(), None);
        let err = repo.fetch_manifest("v1").expect_err("missing");
        assert_eq!(err.kind(), TransferErrorKind::NotFound);
    }

    #[test]
    fn clones_share_content() {
        let registry = MemoryRegistry::new();
        let writer = registry.repository(&reference(), None);
        let digest = writer.push_manifest("v1", b"{}").expect("push");
        let reader = registry.clone().repository(&reference(), None);
        assert_eq!(reader.fetch_manifest("v1").expect("fetch"), b"{}");
        assert_eq!(digest, Digest::of(b"{}"));
        assert_eq!(registry.tags(&reference()), vec!["v1".to_string()]);
    }

    #[test]
    fn required_credential_rejects_anonymous_access() {
        let cred = Credential {
            username: Some("robot".into()),
            password: Some("pw".into()),
            ..Credential::default()
        };
        let registry = MemoryRegistry::with_required_credential(cred.clone());
        let anonymous = registry.repository(&reference(), None);
        let err = anonymous.blob_exists(&Digest::of(b"x")).expect_err("auth");
        assert_eq!(err.kind(), TransferErrorKind::Auth);

        let authed = registry.repository(&reference(), Some(&cred));
        assert!(!authed.blob_exists(&Digest::of(b"x")).expect("authorized"));
    }
}
