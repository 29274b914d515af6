use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub sites: HashMap<String, SiteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub url: String,
}

/// Per-site configuration of the shared engine. A site entry in the config
/// file only carries overrides; every field falls back to the stock
/// manga-stream theme defaults, merged at deserialization time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    /// Site origin without a trailing slash, e.g. `https://mangadark.com`.
    pub base_url: String,
    /// Path segment between the domain and a manga page.
    #[serde(default = "default_traversal_path")]
    pub traversal_path: String,
    /// Whether detail endpoints require the numeric post id (`?p=<id>`).
    #[serde(default = "default_true")]
    pub use_post_ids: bool,
    /// Gates emission of excluded-genre query parameters.
    #[serde(default)]
    pub supports_tag_exclusion: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Safety ceiling for the update-polling loop. The upstream listing is
    /// supposed to signal "no more items" on its own, but not every site does.
    #[serde(default = "default_max_update_pages")]
    pub max_update_pages: u32,
    #[serde(default)]
    pub selectors: Selectors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    /// Fallback image if a listing entry has no usable cover.
    pub fallback_image: String,

    // Manga details
    pub details_title: String,
    pub details_cover: String,
    pub details_description: String,
    /// Boxes holding one labeled field each ("Author", "Status", ...).
    pub detail_item: String,
    pub detail_label: String,
    pub detail_value: String,
    pub author_label: String,
    pub artist_label: String,
    pub status_label: String,
    pub alt_titles_label: String,
    pub status_ongoing: String,
    pub status_completed: String,

    // Date vocabulary
    pub months: Vec<String>,
    pub time_ago: TimeAgoVocab,

    // Chapter list
    pub chapter_box: String,
    pub chapter_item: String,
    pub chapter_name: String,
    pub chapter_date: String,

    // Listing summaries
    pub summary_item: String,
    pub summary_link: String,
    pub summary_subtitle: String,

    // Tag taxonomy page
    pub tags_path: String,
    pub tags_box: String,
    pub tags_item: String,
    /// Optional label override; when set, a trailing "(count)" is stripped.
    pub tags_label: String,
    pub tags_use_label_as_id: bool,
    /// Tag container on the detail page.
    pub manga_tag_box: String,
    pub manga_tag_item: String,

    // Chapter reader
    pub page_images: String,

    // Pagination affordances
    pub search_next_page: String,
    pub view_more_next_page: String,

    // Chronological update listing
    pub update_item: String,
    pub update_link: String,
    pub update_date: String,

    /// Ordered home-section descriptors.
    pub sections: Vec<SectionSelectors>,
}

/// Vocabulary for relative "N units ago" phrasing. Substring matched, case
/// insensitive, so a singular entry also covers the plural form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeAgoVocab {
    pub now: Vec<String>,
    pub yesterday: Vec<String>,
    pub years: Vec<String>,
    pub months: Vec<String>,
    pub weeks: Vec<String>,
    pub days: Vec<String>,
    pub hours: Vec<String>,
    pub minutes: Vec<String>,
    pub seconds: Vec<String>,
}

/// One home-page section. Located either by a CSS container selector or by a
/// heading text (the nearest ancestor of the matching heading that contains
/// summary items becomes the container).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSelectors {
    pub id: String,
    pub title: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub container: Option<String>,
    /// Item selector override for this section.
    #[serde(default)]
    pub item: Option<String>,
    #[serde(default)]
    pub view_more: bool,
}

fn default_true() -> bool {
    true
}

fn default_traversal_path() -> String {
    "manga".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/102.0.5005.124 Safari/537.36 Edg/102.0.1245.44".to_string()
}

fn default_requests_per_second() -> u32 {
    3
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_max_update_pages() -> u32 {
    50
}

impl Default for TimeAgoVocab {
    fn default() -> Self {
        Self {
            now: vec!["less than an hour".to_string(), "just now".to_string()],
            yesterday: vec!["yesterday".to_string()],
            years: vec!["year".to_string()],
            months: vec!["month".to_string()],
            weeks: vec!["week".to_string()],
            days: vec!["day".to_string()],
            hours: vec!["hour".to_string()],
            minutes: vec!["min".to_string()],
            seconds: vec!["second".to_string()],
        }
    }
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            fallback_image: "https://i.imgur.com/GYUxEX8.png".to_string(),

            details_title: "h1.entry-title".to_string(),
            details_cover: "div.thumb img".to_string(),
            details_description: "div.entry-content p".to_string(),
            detail_item: ".imptdt, .fmed, .wd-full".to_string(),
            detail_label: "h1, b".to_string(),
            detail_value: "i, span, td".to_string(),
            author_label: "Author".to_string(),
            artist_label: "Artist".to_string(),
            status_label: "Status".to_string(),
            alt_titles_label: "Alternative Titles".to_string(),
            status_ongoing: "ONGOING".to_string(),
            status_completed: "COMPLETED".to_string(),

            months: vec![
                "January".to_string(),
                "February".to_string(),
                "March".to_string(),
                "April".to_string(),
                "May".to_string(),
                "June".to_string(),
                "July".to_string(),
                "August".to_string(),
                "September".to_string(),
                "October".to_string(),
                "November".to_string(),
                "December".to_string(),
            ],
            time_ago: TimeAgoVocab::default(),

            chapter_box: "div#chapterlist".to_string(),
            chapter_item: "li".to_string(),
            chapter_name: ".chapternum".to_string(),
            chapter_date: ".chapterdate".to_string(),

            summary_item: "div.bsx, div.utao .uta".to_string(),
            summary_link: "a".to_string(),
            summary_subtitle: ".epxs, ul li a".to_string(),

            tags_path: String::new(),
            tags_box: "ul.genre".to_string(),
            tags_item: "li".to_string(),
            tags_label: String::new(),
            tags_use_label_as_id: false,
            manga_tag_box: "span.mgen".to_string(),
            manga_tag_item: "a".to_string(),

            page_images: "div#readerarea img".to_string(),

            search_next_page: "a.next.page-numbers".to_string(),
            view_more_next_page: "div.hpage a.r".to_string(),

            update_item: "div.uta".to_string(),
            update_link: "a.series".to_string(),
            update_date: "ul li span".to_string(),

            sections: default_sections(),
        }
    }
}

/// The six stock sections of the theme, in display order. Sites that lack a
/// section disable it in their config entry.
pub fn default_sections() -> Vec<SectionSelectors> {
    vec![
        SectionSelectors {
            id: "popular_today".to_string(),
            title: "Popular Today".to_string(),
            enabled: true,
            heading: Some("Popular Today".to_string()),
            container: None,
            item: None,
            view_more: true,
        },
        SectionSelectors {
            id: "latest_update".to_string(),
            title: "Latest Updates".to_string(),
            enabled: true,
            heading: Some("Latest Update".to_string()),
            container: None,
            item: Some("div.uta".to_string()),
            view_more: true,
        },
        SectionSelectors {
            id: "new_titles".to_string(),
            title: "New Titles".to_string(),
            enabled: true,
            heading: Some("New Series".to_string()),
            container: None,
            item: None,
            view_more: true,
        },
        SectionSelectors {
            id: "top_alltime".to_string(),
            title: "Top All Time".to_string(),
            enabled: true,
            heading: None,
            container: Some("div.serieslist.pop.wpop.wpop-alltime".to_string()),
            item: None,
            view_more: false,
        },
        SectionSelectors {
            id: "top_monthly".to_string(),
            title: "Top Monthly".to_string(),
            enabled: true,
            heading: None,
            container: Some("div.serieslist.pop.wpop.wpop-monthly".to_string()),
            item: None,
            view_more: false,
        },
        SectionSelectors {
            id: "top_weekly".to_string(),
            title: "Top Weekly".to_string(),
            enabled: true,
            heading: None,
            container: Some("div.serieslist.pop.wpop.wpop-weekly".to_string()),
            item: None,
            view_more: false,
        },
    ]
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn get_site_config(&self, site_name: &str) -> Option<&SiteConfig> {
        self.sites.get(site_name)
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut sites = HashMap::new();

        sites.insert(
            "mangadark".to_string(),
            SiteConfig {
                name: "MangaDark".to_string(),
                base_url: "https://mangadark.com".to_string(),
                traversal_path: default_traversal_path(),
                use_post_ids: true,
                supports_tag_exclusion: false,
                user_agent: default_user_agent(),
                requests_per_second: default_requests_per_second(),
                request_timeout_ms: default_request_timeout_ms(),
                max_update_pages: default_max_update_pages(),
                selectors: Selectors::default(),
            },
        );

        Config {
            store: StoreConfig {
                url: "sqlite:data/wpstream.db".to_string(),
            },
            sites,
        }
    }
}
