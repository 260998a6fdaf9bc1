use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    auth::Identity,
    blob::BlobStore,
    config::AttachmentsConfig,
    crypto::{DekProvider, FieldId},
    models::{Attachment, AttachmentStatus, CreateAttachment},
    services::error::{CoreError, CoreResult},
    store::{AttachmentRow, StorePool, truncate_to_millis},
};

type HmacSha256 = Hmac<Sha256>;

/// Attachment lifecycle: pre-upload, URL ingestion, linking, signed
/// download tokens, TTL cleanup.
#[derive(Clone)]
pub struct AttachmentService {
    store: Arc<StorePool>,
    blobs: Arc<dyn BlobStore>,
    crypto: DekProvider,
    config: AttachmentsConfig,
    http: reqwest::Client,
}

impl AttachmentService {
    pub fn new(
        store: Arc<StorePool>,
        blobs: Arc<dyn BlobStore>,
        crypto: DekProvider,
        config: AttachmentsConfig,
        http: reqwest::Client,
    ) -> Self {
        Self {
            store,
            blobs,
            crypto,
            config,
            http,
        }
    }

    fn row_to_attachment(row: &AttachmentRow) -> Attachment {
        Attachment {
            id: row.id,
            entry_id: row.entry_id,
            status: row.status,
            content_type: row.content_type.clone(),
            size_bytes: row.size_bytes,
            sha256: row.sha256.clone(),
            storage_key: row.storage_key.clone(),
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    /// Resolve and bound the caller-supplied TTL.
    fn resolve_expiry(&self, expires_in_secs: Option<u64>) -> CoreResult<DateTime<Utc>> {
        let secs = match expires_in_secs {
            Some(requested) => {
                if requested == 0 || requested > self.config.max_expires_in_secs {
                    return Err(CoreError::Validation(format!(
                        "expiresIn must be between 1 and {} seconds",
                        self.config.max_expires_in_secs
                    )));
                }
                requested
            }
            None => self.config.default_expires_in_secs,
        };
        Ok(truncate_to_millis(Utc::now() + Duration::seconds(secs as i64)))
    }

    /// Create an attachment: pre-upload (uploading) or URL ingest
    /// (downloading; the fetch runs in the background).
    pub async fn create(
        &self,
        _identity: &Identity,
        input: CreateAttachment,
        expires_in_secs: Option<u64>,
    ) -> CoreResult<Attachment> {
        let now = truncate_to_millis(Utc::now());
        let status = if input.source_url.is_some() {
            AttachmentStatus::Downloading
        } else {
            AttachmentStatus::Uploading
        };
        let row = AttachmentRow {
            id: Uuid::new_v4(),
            entry_id: None,
            status,
            content_type: input.content_type.clone(),
            size_bytes: None,
            sha256: None,
            storage_key: None,
            expires_at: Some(self.resolve_expiry(expires_in_secs)?),
            created_at: now,
            updated_at: now,
        };
        self.store.attachments().create(&row).await?;

        if let Some(url) = input.source_url {
            let service = self.clone();
            let id = row.id;
            tokio::spawn(async move {
                if let Err(e) = service.ingest_from_url(id, &url).await {
                    tracing::warn!(attachment_id = %id, error = %e, "URL ingestion failed");
                    if let Err(e) = service
                        .store
                        .attachments()
                        .mark_failed(id, truncate_to_millis(Utc::now()))
                        .await
                    {
                        tracing::error!(attachment_id = %id, error = %e, "failed to mark attachment failed");
                    }
                }
            });
        }

        Ok(Self::row_to_attachment(&row))
    }

    async fn ingest_from_url(&self, id: Uuid, url: &str) -> CoreResult<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| CoreError::Storage(format!("download failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(CoreError::Storage(format!(
                "download returned {}",
                response.status()
            )));
        }
        let data = response
            .bytes()
            .await
            .map_err(|e| CoreError::Storage(format!("download failed: {}", e)))?;
        self.store_payload(id, data).await
    }

    /// Store uploaded payload bytes: enforce the size cap, hash, seal in
    /// the envelope, write to the blob store, and mark the row ready.
    pub async fn store_payload(&self, id: Uuid, data: Bytes) -> CoreResult<()> {
        if data.len() as u64 > self.config.max_size_bytes {
            return Err(CoreError::PayloadTooLarge(format!(
                "attachment exceeds {} bytes",
                self.config.max_size_bytes
            )));
        }
        let row = self
            .store
            .attachments()
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("attachment"))?;
        if !matches!(
            row.status,
            AttachmentStatus::Uploading | AttachmentStatus::Downloading
        ) {
            return Err(CoreError::conflict("attachment payload already stored"));
        }

        let digest = hex::encode(Sha256::digest(&data));
        let size = data.len() as i64;
        let storage_key = format!("att-{}", id);

        let sealed = self
            .crypto
            .envelope()
            .seal(FieldId::AttachmentBlob, &data)?;
        self.blobs
            .put(&storage_key, Bytes::from(sealed))
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;

        self.store
            .attachments()
            .mark_ready(
                id,
                size,
                &digest,
                &storage_key,
                truncate_to_millis(Utc::now()),
            )
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> CoreResult<Attachment> {
        let row = self
            .store
            .attachments()
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("attachment"))?;
        Ok(Self::row_to_attachment(&row))
    }

    /// Link a ready attachment to an entry; clears the TTL.
    pub async fn link(&self, id: Uuid, entry_id: Uuid) -> CoreResult<()> {
        self.store
            .attachments()
            .link(id, entry_id, truncate_to_millis(Utc::now()))
            .await?;
        Ok(())
    }

    /// Fetch and decrypt the payload bytes.
    pub async fn payload(&self, id: Uuid) -> CoreResult<(Attachment, Bytes)> {
        let row = self
            .store
            .attachments()
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("attachment"))?;
        let key = row
            .storage_key
            .as_deref()
            .ok_or_else(|| CoreError::conflict("attachment payload is not stored yet"))?;
        let sealed = self
            .blobs
            .get(key)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?
            .ok_or_else(|| CoreError::not_found("attachment payload"))?;
        let data = self
            .crypto
            .envelope()
            .open(FieldId::AttachmentBlob, &sealed)?;
        Ok((Self::row_to_attachment(&row), Bytes::from(data)))
    }

    pub async fn delete(&self, id: Uuid) -> CoreResult<()> {
        let deleted = self.store.attachments().delete(id).await?;
        let Some(row) = deleted else {
            return Err(CoreError::not_found("attachment"));
        };
        if let Some(key) = &row.storage_key
            && let Err(e) = self.blobs.delete(key).await
        {
            tracing::warn!(attachment_id = %id, error = %e, "failed to delete attachment blob");
        }
        Ok(())
    }

    // ==================== Download tokens ====================

    fn token_secret(&self) -> CoreResult<&str> {
        self.config
            .download_token_secret
            .as_deref()
            .ok_or_else(|| CoreError::Storage("download token secret not configured".to_string()))
    }

    /// Sign a short-lived download token binding the attachment id and
    /// an expiry timestamp.
    pub fn sign_download_token(&self, id: Uuid) -> CoreResult<String> {
        let expires = Utc::now().timestamp() + self.config.download_token_ttl_secs as i64;
        let payload = format!("{}:{}", id, expires);
        let mut mac = HmacSha256::new_from_slice(self.token_secret()?.as_bytes())
            .map_err(|_| CoreError::Storage("invalid download token secret".to_string()))?;
        mac.update(payload.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{}.{}", URL_SAFE_NO_PAD.encode(payload), sig))
    }

    /// Verify a download token for the given attachment id.
    pub fn verify_download_token(&self, id: Uuid, token: &str) -> CoreResult<()> {
        let invalid = || CoreError::AccessDenied("invalid download token".to_string());

        let (payload_b64, sig_b64) = token.split_once('.').ok_or_else(invalid)?;
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| invalid())?;
        let payload = String::from_utf8(payload).map_err(|_| invalid())?;

        let mut mac = HmacSha256::new_from_slice(self.token_secret()?.as_bytes())
            .map_err(|_| CoreError::Storage("invalid download token secret".to_string()))?;
        mac.update(payload.as_bytes());
        let sig = URL_SAFE_NO_PAD.decode(sig_b64).map_err(|_| invalid())?;
        mac.verify_slice(&sig).map_err(|_| invalid())?;

        let (token_id, expires) = payload.split_once(':').ok_or_else(invalid)?;
        if token_id != id.to_string() {
            return Err(invalid());
        }
        let expires: i64 = expires.parse().map_err(|_| invalid())?;
        if Utc::now().timestamp() > expires {
            return Err(CoreError::AccessDenied("download token expired".to_string()));
        }
        Ok(())
    }

    // ==================== TTL cleanup ====================

    /// One cleanup pass: delete expired unlinked attachments and their
    /// blobs. Returns rows removed.
    pub async fn cleanup_expired(&self) -> CoreResult<u64> {
        let now = Utc::now();
        let expired = self.store.attachments().list_expired(now, 500).await?;
        let mut removed = 0u64;
        for row in expired {
            if let Some(key) = &row.storage_key
                && let Err(e) = self.blobs.delete(key).await
            {
                tracing::warn!(attachment_id = %row.id, error = %e, "failed to delete expired blob");
                continue;
            }
            if self.store.attachments().delete(row.id).await?.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Background worker that runs the TTL cleanup pass on an interval.
pub async fn start_attachment_cleanup_worker(service: AttachmentService, interval_secs: u64) {
    let interval = std::time::Duration::from_secs(interval_secs.max(1));
    tracing::info!(interval_secs, "Starting attachment cleanup worker");
    loop {
        match service.cleanup_expired().await {
            Ok(0) => tracing::debug!("Attachment cleanup pass complete, nothing expired"),
            Ok(removed) => tracing::info!(removed, "Attachment cleanup pass complete"),
            Err(e) => tracing::error!(error = %e, "Error running attachment cleanup"),
        }
        tokio::time::sleep(interval).await;
    }
}
