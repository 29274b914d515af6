use crate::error::Result;
use crate::store::KeyValueStore;
use std::sync::Arc;
use tracing::debug;

/// Bidirectional slug ⇄ numeric post-id mapping plus the chapter-link
/// companion cache, over the shared key-value store.
///
/// Mappings are created lazily on first resolution, never expire, and are
/// overwritten on remapping. At most one live mapping per slug and per post
/// id: writing a new pair first clears any stale reverse entry so two slugs
/// never resolve to the same live id.
pub struct IdentifierResolver {
    store: Arc<dyn KeyValueStore>,
}

impl IdentifierResolver {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Forward lookup only; discovery is the stream client's job.
    pub async fn cached_post_id(&self, slug: &str) -> Result<Option<String>> {
        self.store.get(slug).await
    }

    pub async fn slug_for(&self, post_id: &str) -> Result<Option<String>> {
        self.store.get(post_id).await
    }

    /// Write both directions of a freshly discovered mapping.
    ///
    /// Not atomic: a crash between the remove and the sets can leave an
    /// orphaned reverse entry, which merely triggers re-discovery later.
    pub async fn record_mapping(&self, slug: &str, post_id: &str) -> Result<()> {
        if let Some(old_slug) = self.store.get(post_id).await? {
            if old_slug != slug {
                debug!("post id {} remapped from '{}' to '{}'", post_id, old_slug, slug);
                self.store.remove(&old_slug).await?;
            }
        }
        if let Some(old_id) = self.store.get(slug).await? {
            if old_id != post_id {
                debug!("slug '{}' remapped from {} to {}", slug, old_id, post_id);
                self.store.remove(&old_id).await?;
            }
        }

        self.store.set(post_id, slug).await?;
        self.store.set(slug, post_id).await?;
        Ok(())
    }

    pub async fn chapter_link(&self, manga_id: &str, chapter_id: &str) -> Result<Option<String>> {
        self.store.get(&chapter_key(manga_id, chapter_id)).await
    }

    pub async fn remember_chapter_link(
        &self,
        manga_id: &str,
        chapter_id: &str,
        link: &str,
    ) -> Result<()> {
        self.store.set(&chapter_key(manga_id, chapter_id), link).await
    }
}

fn chapter_key(manga_id: &str, chapter_id: &str) -> String {
    format!("{}:{}", manga_id, chapter_id)
}
