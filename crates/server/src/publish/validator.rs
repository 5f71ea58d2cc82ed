//! Single-use publish key validation.

use crate::auth::{hash_token, parse_bearer};
use crate::error::PublishError;
use packyard_core::PublishCredential;
use packyard_metadata::MetadataStore;
use std::sync::Arc;
use time::OffsetDateTime;

/// Resolves and spends publish keys.
#[derive(Clone)]
pub struct PublishKeyValidator {
    metadata: Arc<dyn MetadataStore>,
}

impl PublishKeyValidator {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Resolve the credential named by an Authorization header value.
    ///
    /// Missing or malformed headers, unknown keys and spent keys are all
    /// `BadAuthorization`.
    pub async fn resolve(
        &self,
        authorization: Option<&str>,
    ) -> Result<PublishCredential, PublishError> {
        let key = authorization
            .and_then(parse_bearer)
            .ok_or_else(|| PublishError::bad_authorization("missing or malformed bearer key"))?;

        let row = self
            .metadata
            .get_publish_key(&hash_token(key))
            .await?
            .ok_or_else(|| PublishError::bad_authorization("unknown publish key"))?;

        let credential = PublishCredential::try_from(row)?;
        if credential.is_spent() {
            return Err(PublishError::bad_authorization("publish key already used"));
        }
        Ok(credential)
    }

    /// Spend the credential.
    ///
    /// Only one caller can win; everyone else sees `BadAuthorization`.
    pub async fn mark_used(
        &self,
        credential: &PublishCredential,
        used_at: OffsetDateTime,
    ) -> Result<(), PublishError> {
        let marked = self
            .metadata
            .mark_publish_key_used(&credential.key_hash, used_at)
            .await?;
        if !marked {
            return Err(PublishError::bad_authorization("publish key already used"));
        }
        tracing::debug!(version = %credential.version, "Publish key spent");
        Ok(())
    }
}
