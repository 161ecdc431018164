use crate::{
    config::Config,
    error::{AppError, Result},
    models::bookmark::{Bookmark, NewBookmark},
};
use reqwest::Client;
use tracing::{debug, error};
use validator::Validate;

/// Client for the managed storage backend's REST interface.
///
/// The backend owns the canonical records, assigns identifiers and
/// timestamps, and enforces row-level authorization; this service only
/// issues owner-scoped queries and forwards the caller's token so the
/// backend can do that enforcement.
#[derive(Clone)]
pub struct StorageService {
    config: Config,
    http_client: Client,
}

impl StorageService {
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config: config.clone(),
            http_client,
        })
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.backend_url.trim_end_matches('/'),
            self.config.bookmark_collection
        )
    }

    /// Full list query scoped to one owner, newest first.
    pub async fn list_bookmarks(&self, access_token: &str, user_id: &str) -> Result<Vec<Bookmark>> {
        debug!("Fetching bookmarks for user: {}", user_id);

        let response = self
            .http_client
            .get(self.collection_url())
            .query(&[
                ("user_id", format!("eq.{}", user_id).as_str()),
                ("order", "created_at.desc"),
            ])
            .header("apikey", &self.config.backend_anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| {
                error!("Failed to reach storage backend: {}", e);
                AppError::ExternalService("Failed to reach storage backend".to_string())
            })?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "Storage backend returned {} for list query",
                response.status()
            )));
        }

        let bookmarks: Vec<Bookmark> = response.json().await.map_err(|e| {
            error!("Failed to parse storage list response: {}", e);
            AppError::ExternalService("Invalid response from storage backend".to_string())
        })?;

        Ok(bookmarks)
    }

    /// Insert one record. The returned representation carries the
    /// backend-assigned id and creation timestamp.
    pub async fn insert_bookmark(
        &self,
        access_token: &str,
        record: NewBookmark,
    ) -> Result<Bookmark> {
        record.validate().map_err(AppError::ValidatorError)?;

        debug!(
            "Inserting bookmark '{}' for user: {}",
            record.title, record.user_id
        );

        let response = self
            .http_client
            .post(self.collection_url())
            .header("apikey", &self.config.backend_anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Prefer", "return=representation")
            .json(&record)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to reach storage backend: {}", e);
                AppError::ExternalService("Failed to reach storage backend".to_string())
            })?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "Storage backend returned {} for insert",
                response.status()
            )));
        }

        let mut created: Vec<Bookmark> = response.json().await.map_err(|e| {
            error!("Failed to parse storage insert response: {}", e);
            AppError::ExternalService("Invalid response from storage backend".to_string())
        })?;

        created
            .pop()
            .ok_or_else(|| AppError::internal("Storage backend returned no created record"))
    }

    /// Delete one record by identifier. Deliberately not re-scoped by owner:
    /// cross-user deletion is rejected by the backend's authorization, not
    /// by this client.
    pub async fn delete_bookmark(&self, access_token: &str, bookmark_id: &str) -> Result<()> {
        debug!("Deleting bookmark: {}", bookmark_id);

        let response = self
            .http_client
            .delete(self.collection_url())
            .query(&[("id", format!("eq.{}", bookmark_id).as_str())])
            .header("apikey", &self.config.backend_anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| {
                error!("Failed to reach storage backend: {}", e);
                AppError::ExternalService("Failed to reach storage backend".to_string())
            })?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "Storage backend returned {} for delete",
                response.status()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_rejects_invalid_record_before_any_request() {
        // Backend URL is unroutable; validation must fail first.
        let mut config = Config::for_tests();
        config.backend_url = "http://127.0.0.1:1".to_string();
        let storage = StorageService::new(&config).unwrap();

        let record = NewBookmark {
            title: String::new(),
            url: "https://example.com".to_string(),
            user_id: "user_1".to_string(),
        };

        match storage.insert_bookmark("token", record).await {
            Err(AppError::ValidatorError(_)) => {}
            other => panic!("expected validation error, got {:?}", other.map(|_| ())),
        }
    }
}
