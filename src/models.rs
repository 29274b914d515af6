use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry on a listing page (search results, home sections, view-more).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangaSummary {
    pub id: String,
    pub title: String,
    pub cover_url: String,
    pub subtitle: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MangaDetails {
    pub id: String,
    pub title: String,
    pub cover_url: String,
    pub author: Option<String>,
    pub artist: Option<String>,
    pub status: MangaStatus,
    pub description: String,
    pub tags: Vec<TagSection>,
    pub alt_titles: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MangaStatus {
    Ongoing,
    Completed,
    Unknown,
}

/// One row of a manga's chapter list.
///
/// `id` is the trailing fragment of the chapter link, not a numeric id. The
/// full relative link is recorded in the resolver's chapter-link store so a
/// later detail fetch can recover it from the opaque id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub id: String,
    pub manga_id: String,
    pub name: String,
    pub number: f64,
    pub published: DateTime<Utc>,
    pub link: String,
}

/// Ordered image URLs for a single chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterPages {
    pub manga_id: String,
    pub chapter_id: String,
    pub pages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSection {
    pub id: String,
    pub label: String,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeSection {
    pub id: String,
    pub title: String,
    pub items: Vec<MangaSummary>,
    pub view_more: bool,
}

/// One page of a paginated listing plus the next page number, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResults {
    pub results: Vec<MangaSummary>,
    pub next_page: Option<u32>,
}

/// Search input. Tag ids are namespaced `section:value`, e.g. `genres:action`,
/// `status:ongoing`, `type:manhwa`, `order:popular`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    pub title: Option<String>,
    pub included_tags: Vec<String>,
    pub excluded_tags: Vec<String>,
}

/// A batch of known manga ids that received new chapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatedBatch {
    pub ids: Vec<String>,
}

/// Poll state for one page of the chronological update listing.
#[derive(Debug, Clone, Default)]
pub struct UpdatedPage {
    pub ids: Vec<String>,
    pub load_more: bool,
}

impl std::fmt::Display for MangaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MangaStatus::Ongoing => write!(f, "Ongoing"),
            MangaStatus::Completed => write!(f, "Completed"),
            MangaStatus::Unknown => write!(f, "Unknown"),
        }
    }
}
