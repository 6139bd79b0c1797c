use super::StoreError;
use async_trait::async_trait;

/// Turns query text into a vector for [`crate::VectorStore::similarity_search_by_text`].
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;
}

#[async_trait]
impl<F> TextEmbedder for F
where
    F: Fn(&str) -> Result<Vec<f32>, StoreError> + Send + Sync
{
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        self(text)
    }
}
