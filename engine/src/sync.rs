//! The synchronization engine.
//!
//! One call to [`SyncEngine::apply_changes`] is one exchange:
//!
//! 1. Read the server-side changes since the client's checkpoint, excluding
//!    the client's own writes (one adapter read)
//! 2. For each client record with a strictly newer server counterpart, ask
//!    the resolver; a resolver error becomes a [`ConflictReport`] and the
//!    record is left out of the write
//! 3. Otherwise the client version is accepted as-is
//! 4. Persist the accepted set tagged with the client's device id (one
//!    batched adapter write)
//!
//! The engine holds no lock between the read and the write. Adapters that
//! need atomicity across that gap provide it internally.

use crate::{
    adapter::{Page, StorageAdapter},
    error::Result,
    resolve::ConflictResolver,
    AttachmentId, AttachmentMeta, ChangeEntry, ConflictReport, Error, LastWriteWins, Record,
    SyncPayload, SyncResult, Timestamp,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

/// Caller-supplied credential check.
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    async fn validate(&self, credential: &str) -> bool;
}

#[async_trait]
impl<F, Fut> CredentialValidator for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send + 'static,
{
    async fn validate(&self, credential: &str) -> bool {
        self(credential.to_string()).await
    }
}

/// Accepts every credential. The default validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl CredentialValidator for AllowAll {
    async fn validate(&self, _credential: &str) -> bool {
        true
    }
}

/// Accepts credentials from a fixed set of API keys.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys(HashSet<String>);

impl ApiKeys {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl CredentialValidator for ApiKeys {
    async fn validate(&self, credential: &str) -> bool {
        self.0.contains(credential)
    }
}

/// Orchestrates sync exchanges against a storage adapter.
///
/// Stateless between calls; safe to share across tasks and to run
/// concurrently for different devices.
pub struct SyncEngine<A> {
    adapter: A,
    resolver: Arc<dyn ConflictResolver>,
    validator: Arc<dyn CredentialValidator>,
}

impl<A: StorageAdapter> SyncEngine<A> {
    /// Engine with last-write-wins resolution and no credential check.
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            resolver: Arc::new(LastWriteWins),
            validator: Arc::new(AllowAll),
        }
    }

    /// Replace the conflict resolver.
    pub fn with_resolver(mut self, resolver: impl ConflictResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Use a resolver that is also shared with the adapter.
    pub fn with_shared_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replace the credential validator.
    pub fn with_validator(mut self, validator: impl CredentialValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// The underlying storage adapter.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Run one sync exchange for the payload's device.
    pub async fn apply_changes(&self, payload: SyncPayload) -> Result<SyncResult> {
        validate_device(&payload.device_id)?;

        // Taken before the read so writes racing this sync are seen next time.
        let sync_timestamp = crate::now();
        let device_id = payload.device_id;

        let server_changes = self
            .adapter
            .changes_since(payload.last_sync_at, &device_id)
            .await?;

        let mut accepted = Vec::with_capacity(payload.records.len());
        let mut conflicts = Vec::new();
        let mut resolved_count = 0usize;
        {
            let server_by_id: HashMap<&str, &Record> =
                server_changes.iter().map(|r| (r.id.as_str(), r)).collect();

            for incoming in payload.records {
                let server = match server_by_id.get(incoming.id.as_str()) {
                    Some(server) if server.updated_at > incoming.updated_at => *server,
                    _ => {
                        accepted.push(incoming);
                        continue;
                    }
                };

                match self.resolver.resolve(server, &incoming) {
                    Ok(resolved) => {
                        resolved_count += 1;
                        accepted.push(resolved);
                    }
                    Err(err) => {
                        tracing::warn!(
                            device_id = %device_id,
                            record_id = %incoming.id,
                            error = %err,
                            "Unresolved conflict"
                        );
                        conflicts.push(ConflictReport {
                            record_id: incoming.id.clone(),
                            local_version: incoming,
                            remote_version: server.clone(),
                        });
                    }
                }
            }
        }

        if !payload.deleted_ids.is_empty() {
            tracing::debug!(
                device_id = %device_id,
                count = payload.deleted_ids.len(),
                "Ignoring deleted ids in sync payload; deletions go through delete_record"
            );
        }

        let applied = accepted.len();
        self.adapter.apply_records(accepted, &device_id).await?;

        tracing::info!(
            device_id = %device_id,
            applied,
            resolved = resolved_count,
            conflicts = conflicts.len(),
            outgoing = server_changes.len(),
            attachments = payload.attachments.len(),
            "Sync completed"
        );

        Ok(SyncResult {
            updated_records: server_changes,
            deleted_ids: Vec::new(),
            updated_attachments: Vec::new(),
            sync_timestamp,
            conflicts: (!conflicts.is_empty()).then_some(conflicts),
        })
    }

    /// Run the configured credential check.
    pub async fn validate_api_key(&self, key: &str) -> bool {
        self.validator.validate(key).await
    }

    /// Reject a missing or invalid credential.
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<()> {
        let key = match credential {
            Some(key) if !key.is_empty() => key,
            _ => return Err(Error::MissingCredential),
        };
        if self.validate_api_key(key).await {
            Ok(())
        } else {
            Err(Error::InvalidCredential)
        }
    }

    /// One page of changes since a checkpoint, ordered by record id.
    pub async fn changes_page(
        &self,
        since: Timestamp,
        device_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Page> {
        validate_device(device_id)?;
        self.adapter
            .changes_since_paginated(since, device_id, limit, offset)
            .await
    }

    /// Logically delete a record on behalf of a device.
    pub async fn delete_record(&self, record_id: &str, device_id: &str) -> Result<()> {
        validate_device(device_id)?;
        self.adapter.delete_record(record_id, device_id).await
    }

    /// Retained change-log entries for one record.
    pub async fn history(&self, record_id: &str) -> Result<Vec<ChangeEntry>> {
        self.adapter.change_history(record_id).await
    }

    /// Every live record.
    pub async fn export(&self) -> Result<Vec<Record>> {
        self.adapter.get_all_records().await
    }

    pub async fn store_attachment(
        &self,
        bytes: Vec<u8>,
        meta: AttachmentMeta,
    ) -> Result<AttachmentId> {
        self.adapter.store_attachment(bytes, meta).await
    }

    pub async fn fetch_attachment(&self, attachment_id: &str) -> Result<(AttachmentMeta, Vec<u8>)> {
        self.adapter.fetch_attachment(attachment_id).await
    }
}

fn validate_device(device_id: &str) -> Result<()> {
    if device_id.trim().is_empty() {
        return Err(Error::MissingDeviceId);
    }
    Ok(())
}
