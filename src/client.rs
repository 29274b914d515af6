use crate::config::SiteConfig;
use crate::error::{EngineError, Result};
use crate::models::{
    ChapterEntry, ChapterPages, HomeSection, MangaDetails, PagedResults, SearchQuery, TagSection,
    UpdatedBatch,
};
use crate::parser::{self, PageContext};
use crate::resolver::IdentifierResolver;
use crate::store::KeyValueStore;
use crate::transport::{Method, Transport, TransportRequest, TransportResponse};
use crate::urls::{encode_query_value, BuildOptions, UrlBuilder};
use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The shared engine: one instance per configured site. Builds request URLs,
/// issues them through the injected transport, feeds responses to the parser
/// and keeps the identifier resolver current.
pub struct StreamClient {
    site: SiteConfig,
    transport: Arc<dyn Transport>,
    resolver: IdentifierResolver,
}

impl StreamClient {
    pub fn new(
        site: SiteConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            site,
            transport,
            resolver: IdentifierResolver::new(store),
        }
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    fn base_headers(&self) -> Vec<(String, String)> {
        vec![
            ("user-agent".to_string(), self.site.user_agent.clone()),
            ("referer".to_string(), format!("{}/", self.site.base_url)),
        ]
    }

    /// Issue one request and map the response status: 503 is a Cloudflare
    /// challenge, any other non-success aborts the operation.
    async fn fetch(&self, url: &str, method: Method) -> Result<TransportResponse> {
        let response = self
            .transport
            .send(TransportRequest {
                url: url.to_string(),
                method,
                headers: self.base_headers(),
            })
            .await?;

        match response.status {
            503 => Err(EngineError::CloudflareChallenge),
            status if !(200..300).contains(&status) => Err(EngineError::transport(status, url)),
            _ => Ok(response),
        }
    }

    async fn fetch_html(&self, url: &str) -> Result<String> {
        Ok(self.fetch(url, Method::Get).await?.body)
    }

    /// Canonical page URL for a manga id: `?p=<id>` where the site works
    /// with post ids, `/{path}/{slug}/` otherwise.
    pub fn manga_page_url(&self, manga_id: &str) -> String {
        if self.site.use_post_ids {
            format!("{}/?p={}", self.site.base_url, manga_id)
        } else {
            format!(
                "{}/{}/{}/",
                self.site.base_url, self.site.traversal_path, manga_id
            )
        }
    }

    /// Resolve the engine-level manga id for this site: sites that address
    /// detail pages by numeric post id get the slug resolved first.
    async fn ensure_manga_id(&self, manga_id: &str) -> Result<String> {
        let is_numeric = !manga_id.is_empty() && manga_id.chars().all(|c| c.is_ascii_digit());
        if self.site.use_post_ids && !is_numeric {
            self.slug_to_post_id(manga_id, &self.site.traversal_path)
                .await
        } else {
            Ok(manga_id.to_string())
        }
    }

    pub async fn get_manga_details(&self, manga_id: &str) -> Result<MangaDetails> {
        let id = self.ensure_manga_id(manga_id).await?;
        info!("[{}] fetching details for {}", self.site.name, id);
        let body = self.fetch_html(&self.manga_page_url(&id)).await?;
        let doc = Html::parse_document(&body);
        parser::parse_manga_details(&doc, &self.site, &id)
    }

    pub async fn get_chapters(&self, manga_id: &str) -> Result<Vec<ChapterEntry>> {
        let id = self.ensure_manga_id(manga_id).await?;
        info!("[{}] fetching chapter list for {}", self.site.name, id);
        let body = self.fetch_html(&self.manga_page_url(&id)).await?;
        let chapters = {
            let doc = Html::parse_document(&body);
            parser::parse_chapter_list(&doc, &self.site, &id, Utc::now())?
        };

        // Запоминаем ссылки, чтобы потом восстановить их по id главы
        for chapter in &chapters {
            self.resolver
                .remember_chapter_link(&id, &chapter.id, &chapter.link)
                .await?;
        }

        Ok(chapters)
    }

    pub async fn get_chapter_details(
        &self,
        manga_id: &str,
        chapter_id: &str,
    ) -> Result<ChapterPages> {
        let id = self.ensure_manga_id(manga_id).await?;

        let mut link = self.resolver.chapter_link(&id, chapter_id).await?;
        if link.is_none() {
            debug!(
                "no cached link for chapter {}:{}, refetching the chapter list once",
                id, chapter_id
            );
            self.get_chapters(manga_id).await?;
            link = self.resolver.chapter_link(&id, chapter_id).await?;
        }
        let Some(link) = link else {
            return Err(EngineError::chapter_not_found(format!("{}:{}", id, chapter_id)));
        };

        let url = format!("{}/{}/", self.site.base_url, link.trim_matches('/'));
        let body = self.fetch_html(&url).await?;
        let doc = Html::parse_document(&body);
        let pages = parser::parse_chapter_images(&doc, &self.site)?;

        Ok(ChapterPages {
            manga_id: id,
            chapter_id: chapter_id.to_string(),
            pages,
        })
    }

    pub async fn get_search_tags(&self) -> Result<Vec<TagSection>> {
        let url = UrlBuilder::new(&self.site.base_url)
            .push_path(&self.site.selectors.tags_path)
            .build(BuildOptions {
                add_trailing_slash: true,
                include_empty_parameters: false,
            });
        let body = self.fetch_html(&url).await?;
        let doc = Html::parse_document(&body);
        parser::parse_tags(&doc, &self.site)
    }

    pub async fn get_search_results(
        &self,
        query: &SearchQuery,
        page: u32,
    ) -> Result<PagedResults> {
        let url = self.search_url(page, query);
        let body = self.fetch_html(&url).await?;
        let doc = Html::parse_document(&body);
        let results = parser::parse_search_results(&doc, &self.site)?;
        let last = parser::is_last_page(&doc, &self.site, PageContext::SearchRequest)?;
        Ok(PagedResults {
            results,
            next_page: (!last).then(|| page + 1),
        })
    }

    fn search_url(&self, page: u32, query: &SearchQuery) -> String {
        let mut builder = UrlBuilder::new(&self.site.base_url)
            .push_path(&self.site.traversal_path)
            .query("page", page.to_string());

        if let Some(title) = query.title.as_deref().filter(|t| !t.trim().is_empty()) {
            builder = builder.query("s", encode_query_value(&strip_search_noise(title)));
        } else {
            builder = builder
                .query_all(
                    "genre",
                    filter_tags_by_section("genres", &query.included_tags, true, true),
                )
                .query_all(
                    "genre",
                    filter_tags_by_section(
                        "genres",
                        &query.excluded_tags,
                        false,
                        self.site.supports_tag_exclusion,
                    ),
                )
                .query("status", included_tag_by_section("status", &query.included_tags))
                .query("type", included_tag_by_section("type", &query.included_tags))
                .query("order", included_tag_by_section("order", &query.included_tags));
        }

        builder.build(BuildOptions {
            add_trailing_slash: true,
            include_empty_parameters: false,
        })
    }

    /// Single-shot: one homepage fetch, all enabled sections parsed from the
    /// same document, `emit` invoked per populated section.
    pub async fn get_home_page_sections(
        &self,
        emit: &mut dyn FnMut(HomeSection),
    ) -> Result<()> {
        let body = self.fetch_html(&format!("{}/", self.site.base_url)).await?;
        let doc = Html::parse_document(&body);
        parser::parse_home_sections(&doc, &self.site, emit)
    }

    pub async fn get_view_more_items(&self, section_id: &str, page: u32) -> Result<PagedResults> {
        let order = match section_id {
            "new_titles" => "latest",
            "latest_update" => "update",
            "popular_today" => "popular",
            other => return Err(EngineError::section_not_supported(other)),
        };

        let url = UrlBuilder::new(&self.site.base_url)
            .push_path(&self.site.traversal_path)
            .query("page", page.to_string())
            .query("order", order)
            .build(BuildOptions {
                add_trailing_slash: true,
                include_empty_parameters: false,
            });

        let body = self.fetch_html(&url).await?;
        let doc = Html::parse_document(&body);
        let results = parser::parse_view_more(&doc, &self.site)?;
        let last = parser::is_last_page(&doc, &self.site, PageContext::ViewMore)?;
        Ok(PagedResults {
            results,
            next_page: (!last).then(|| page + 1),
        })
    }

    /// Walk the chronological listing page by page, emitting batches of known
    /// ids updated at or after `since`. Stops on the first page that crosses
    /// the time boundary, runs out of items, or hits the safety ceiling.
    pub async fn filter_updated_manga(
        &self,
        emit: &mut dyn FnMut(UpdatedBatch),
        since: DateTime<Utc>,
        known_ids: &[String],
    ) -> Result<()> {
        // Сайт отдаёт слаги, а known_ids могут быть post id
        let mut id_by_slug: HashMap<String, String> = HashMap::new();
        for id in known_ids {
            if self.site.use_post_ids {
                match self.resolver.slug_for(id).await? {
                    Some(slug) => {
                        id_by_slug.insert(slug, id.clone());
                    }
                    None => debug!("no cached slug for post id {}, skipping it this poll", id),
                }
            } else {
                id_by_slug.insert(id.clone(), id.clone());
            }
        }
        let known_slugs: HashSet<String> = id_by_slug.keys().cloned().collect();

        let mut page = 1u32;
        loop {
            if page > self.site.max_update_pages {
                warn!(
                    "[{}] update polling stopped at the {}-page safety ceiling",
                    self.site.name, self.site.max_update_pages
                );
                break;
            }

            let url = format!("{}/page/{}/", self.site.base_url, page);
            let body = self.fetch_html(&url).await?;
            let update_page = {
                let doc = Html::parse_document(&body);
                parser::parse_updated_manga(&doc, &self.site, since, &known_slugs, Utc::now())?
            };

            if !update_page.ids.is_empty() {
                let ids: Vec<String> = update_page
                    .ids
                    .iter()
                    .filter_map(|slug| id_by_slug.get(slug).cloned())
                    .collect();
                emit(UpdatedBatch { ids });
            }

            if !update_page.load_more {
                break;
            }
            page += 1;
        }

        Ok(())
    }

    /// Resolve a slug to its numeric post id, consulting the store first and
    /// running the discovery chain on a miss.
    pub async fn slug_to_post_id(&self, slug: &str, path: &str) -> Result<String> {
        if let Some(id) = self.resolver.cached_post_id(slug).await? {
            return Ok(id);
        }
        let post_id = self.discover_post_id(slug, path).await?;
        self.resolver.record_mapping(slug, &post_id).await?;
        Ok(post_id)
    }

    /// Ordered discovery chain, cheapest first: a HEAD request's `Link`
    /// header, then the shortlink element, the bookmark `data-id` attribute
    /// and finally a raw scan for the `postID` marker.
    async fn discover_post_id(&self, slug: &str, path: &str) -> Result<String> {
        let page_url = format!("{}/{}/{}/", self.site.base_url, path, slug);
        let link_re = Regex::new(r"\?p=(\d+)").expect("static post id pattern");

        let head = self.fetch(&page_url, Method::Head).await?;
        if let Some(post_id) = head
            .headers
            .get("link")
            .and_then(|link| link_re.captures(link))
            .and_then(|c| c.get(1))
            .and_then(|m| valid_post_id(m.as_str()))
        {
            debug!("post id for '{}' found in HEAD Link header", slug);
            return Ok(post_id);
        }

        let body = self.fetch_html(&page_url).await?;
        let post_id = {
            let doc = Html::parse_document(&body);

            let shortlink_sel = Selector::parse("link[rel=shortlink]").unwrap();
            let bookmark_sel = Selector::parse("div.bookmark").unwrap();

            let mut post_id = doc
                .select(&shortlink_sel)
                .next()
                .and_then(|el| el.value().attr("href"))
                .and_then(|href| href.split("?p=").nth(1))
                .and_then(valid_post_id);

            if post_id.is_none() {
                post_id = doc
                    .select(&bookmark_sel)
                    .next()
                    .and_then(|el| el.value().attr("data-id"))
                    .and_then(valid_post_id);
            }
            post_id
        };

        let marker_re = Regex::new(r"postID\D*(\d+)").expect("static postID pattern");
        let post_id = post_id.or_else(|| {
            marker_re
                .captures(&body)
                .and_then(|c| c.get(1))
                .and_then(|m| valid_post_id(m.as_str()))
        });

        post_id.ok_or_else(|| EngineError::resolution(path, slug))
    }

    /// Numeric post id → `(path, slug)` via the canonical URL of the page
    /// addressed by `?p=<id>`.
    pub async fn post_id_to_slug(&self, post_id: &str) -> Result<(String, String)> {
        let body = self
            .fetch_html(&format!("{}/?p={}", self.site.base_url, post_id))
            .await?;

        let canonical = {
            let doc = Html::parse_document(&body);
            let og_sel = Selector::parse(r#"meta[property="og:url"]"#).unwrap();
            let canonical_sel = Selector::parse("link[rel=canonical]").unwrap();

            doc.select(&og_sel)
                .next()
                .and_then(|el| el.value().attr("content"))
                .map(str::to_string)
                .filter(|u| u.contains(&self.site.base_url))
                .or_else(|| {
                    doc.select(&canonical_sel)
                        .next()
                        .and_then(|el| el.value().attr("href"))
                        .map(str::to_string)
                })
        };

        let url = canonical
            .filter(|u| u.contains(&self.site.base_url))
            .ok_or_else(|| {
                EngineError::parse(format!("unable to resolve canonical url for post id {}", post_id))
            })?;

        let trimmed = url.trim_end_matches('/');
        let mut parts = trimmed.rsplit('/');
        let slug = parts.next().filter(|s| !s.is_empty());
        let path = parts.next().filter(|s| !s.is_empty());
        match (path, slug) {
            (Some(path), Some(slug)) => Ok((path.to_string(), slug.to_string())),
            _ => Err(EngineError::parse(format!(
                "canonical url '{}' has no usable path for post id {}",
                url, post_id
            ))),
        }
    }
}

fn valid_post_id(raw: &str) -> Option<String> {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    match digits.parse::<u64>() {
        Ok(n) if n > 0 => Some(digits),
        _ => None,
    }
}

/// First `section:value` tag of a section, with the prefix stripped and
/// spaces turned into `+` for the query string.
pub fn included_tag_by_section(section: &str, tags: &[String]) -> String {
    let prefix = format!("{}:", section);
    tags.iter()
        .find(|tag| tag.starts_with(&prefix))
        .map(|tag| tag[prefix.len()..].replace(' ', "+"))
        .unwrap_or_default()
}

/// All `section:value` tags of a section. Excluded tags are emitted with a
/// leading `-`, and only when the site supports exclusion at all.
pub fn filter_tags_by_section(
    section: &str,
    tags: &[String],
    included: bool,
    supports_exclusion: bool,
) -> Vec<String> {
    if !included && !supports_exclusion {
        return Vec::new();
    }
    let prefix = format!("{}:", section);
    tags.iter()
        .filter(|tag| tag.starts_with(&prefix))
        .map(|tag| {
            let id = &tag[prefix.len()..];
            if included {
                id.to_string()
            } else {
                format!("-{}", id)
            }
        })
        .collect()
}

/// Strip the punctuation-plus-trailing-letters noise some titles carry
/// before they go into the `s=` query parameter.
fn strip_search_noise(title: &str) -> String {
    let noise_re = Regex::new(r"[’–][a-z]*").expect("static noise pattern");
    noise_re.replace_all(title, "").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::MemoryStore;
    use crate::transport::ReqwestTransport;
    use chrono::TimeZone;

    fn test_site(base_url: &str, use_post_ids: bool) -> SiteConfig {
        let mut site = Config::default()
            .get_site_config("mangadark")
            .cloned()
            .unwrap();
        site.base_url = base_url.trim_end_matches('/').to_string();
        site.use_post_ids = use_post_ids;
        site.requests_per_second = 100;
        site.request_timeout_ms = 5_000;
        site
    }

    fn test_client(site: SiteConfig) -> StreamClient {
        StreamClient::new(
            site,
            Arc::new(ReqwestTransport::new(100, 5_000)),
            Arc::new(MemoryStore::new()),
        )
    }

    fn chapter_list_page(base: &str) -> String {
        format!(
            r#"<html><body>
               <h1 class="entry-title">Mashle</h1>
               <div id="chapterlist"><ul>
                 <li><a href="{base}/mashle-chapter-1/">
                   <span class="chapternum">Chapter 1</span>
                   <span class="chapterdate">June 1, 2023</span>
                 </a></li>
               </ul></div>
               </body></html>"#
        )
    }

    const READER_PAGE: &str = r#"
        <div id="readerarea">
          <img src="https://cdn.example.com/ch1/001.jpg">
          <img src="https://cdn.example.com/ch1/002.jpg">
        </div>
    "#;

    #[test]
    fn search_url_encodes_title_and_strips_noise() {
        let site = test_site("https://mangadark.com", true);
        let client = test_client(site);
        let query = SearchQuery {
            title: Some("it’s solo leveling".to_string()),
            ..Default::default()
        };
        assert_eq!(
            client.search_url(1, &query),
            "https://mangadark.com/manga/?page=1&s=it+solo+leveling"
        );
    }

    #[test]
    fn search_url_emits_filters_and_gates_exclusions() {
        let mut site = test_site("https://mangadark.com", true);
        let query = SearchQuery {
            title: None,
            included_tags: vec![
                "genres:action".to_string(),
                "status:ongoing".to_string(),
                "order:popular".to_string(),
            ],
            excluded_tags: vec!["genres:romance".to_string()],
        };

        let client = test_client(site.clone());
        assert_eq!(
            client.search_url(2, &query),
            "https://mangadark.com/manga/?page=2&genre=action&status=ongoing&order=popular"
        );

        site.supports_tag_exclusion = true;
        let client = test_client(site);
        assert_eq!(
            client.search_url(2, &query),
            "https://mangadark.com/manga/?page=2&genre=action&genre=-romance&status=ongoing&order=popular"
        );
    }

    #[test]
    fn tag_helpers_filter_by_section() {
        let tags = vec![
            "genres:action".to_string(),
            "genres:sci fi".to_string(),
            "status:ongoing".to_string(),
        ];
        assert_eq!(included_tag_by_section("status", &tags), "ongoing");
        assert_eq!(included_tag_by_section("order", &tags), "");
        assert_eq!(
            filter_tags_by_section("genres", &tags, true, false),
            vec!["action", "sci fi"]
        );
        assert!(filter_tags_by_section("genres", &tags, false, false).is_empty());
        assert_eq!(
            filter_tags_by_section("genres", &tags, false, true),
            vec!["-action", "-sci fi"]
        );
    }

    #[tokio::test]
    async fn status_503_maps_to_cloudflare_challenge() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/manga/mashle/")
            .with_status(503)
            .create_async()
            .await;

        let client = test_client(test_site(&server.url(), false));
        let err = client.get_manga_details("mashle").await.unwrap_err();
        assert!(matches!(err, EngineError::CloudflareChallenge));
    }

    #[tokio::test]
    async fn other_non_success_statuses_are_transport_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/manga/mashle/")
            .with_status(404)
            .create_async()
            .await;

        let client = test_client(test_site(&server.url(), false));
        let err = client.get_manga_details("mashle").await.unwrap_err();
        assert!(matches!(err, EngineError::Transport { status: 404, .. }));
    }

    #[tokio::test]
    async fn chapter_details_repopulates_the_link_cache_once() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let list_mock = server
            .mock("GET", "/manga/mashle/")
            .with_body(chapter_list_page(&base))
            .expect(1)
            .create_async()
            .await;
        let reader_mock = server
            .mock("GET", "/mashle-chapter-1/")
            .with_body(READER_PAGE)
            .create_async()
            .await;

        let client = test_client(test_site(&base, false));
        let pages = client
            .get_chapter_details("mashle", "mashle-chapter-1")
            .await
            .unwrap();

        list_mock.assert_async().await;
        reader_mock.assert_async().await;
        assert_eq!(pages.manga_id, "mashle");
        assert_eq!(
            pages.pages,
            vec![
                "https://cdn.example.com/ch1/001.jpg",
                "https://cdn.example.com/ch1/002.jpg"
            ]
        );
    }

    #[tokio::test]
    async fn unknown_chapter_fails_after_exactly_one_refetch() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let list_mock = server
            .mock("GET", "/manga/mashle/")
            .with_body(chapter_list_page(&base))
            .expect(1)
            .create_async()
            .await;

        let client = test_client(test_site(&base, false));
        let err = client
            .get_chapter_details("mashle", "mashle-chapter-99")
            .await
            .unwrap_err();

        list_mock.assert_async().await;
        assert!(matches!(err, EngineError::ChapterNotFound(_)));
    }

    #[tokio::test]
    async fn head_link_header_short_circuits_discovery_and_is_cached() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let head_mock = server
            .mock("HEAD", "/manga/mashle/")
            .with_header("link", &format!("<{base}/?p=4452>; rel=shortlink"))
            .expect(1)
            .create_async()
            .await;
        let body_mock = server
            .mock("GET", "/manga/mashle/")
            .expect(0)
            .create_async()
            .await;
        let details_mock = server
            .mock("GET", "/?p=4452")
            .with_body(r#"<h1 class="entry-title">Mashle</h1>"#)
            .expect(2)
            .create_async()
            .await;

        let client = test_client(test_site(&base, true));
        let details = client.get_manga_details("mashle").await.unwrap();
        assert_eq!(details.id, "4452");

        // второй вызов берёт id из стора, без повторного HEAD
        client.get_manga_details("mashle").await.unwrap();
        head_mock.assert_async().await;
        body_mock.assert_async().await;
        details_mock.assert_async().await;
    }

    #[tokio::test]
    async fn discovery_falls_back_to_shortlink_element() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        server
            .mock("HEAD", "/manga/mashle/")
            .create_async()
            .await;
        server
            .mock("GET", "/manga/mashle/")
            .with_body(format!(
                r#"<html><head><link rel="shortlink" href="{base}/?p=777"></head></html>"#
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/?p=777")
            .with_body(r#"<h1 class="entry-title">Mashle</h1>"#)
            .create_async()
            .await;

        let client = test_client(test_site(&base, true));
        let details = client.get_manga_details("mashle").await.unwrap();
        assert_eq!(details.id, "777");
    }

    #[tokio::test]
    async fn exhausted_discovery_chain_is_a_resolution_error() {
        let mut server = mockito::Server::new_async().await;
        server.mock("HEAD", "/manga/mashle/").create_async().await;
        server
            .mock("GET", "/manga/mashle/")
            .with_body("<html><body>nothing to see</body></html>")
            .create_async()
            .await;

        let client = test_client(test_site(&server.url(), true));
        let err = client.get_manga_details("mashle").await.unwrap_err();
        assert!(matches!(err, EngineError::Resolution { .. }));
    }

    #[tokio::test]
    async fn update_polling_stops_at_the_first_stale_page() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let row = |slug: &str, date: &str| {
            format!(
                r##"<div class="uta">
                     <a class="series" href="{base}/manga/{slug}/"><h4>{slug}</h4></a>
                     <ul><li><a href="#">Chapter 9</a><span>{date}</span></li></ul>
                   </div>"##
            )
        };

        let page1 = server
            .mock("GET", "/page/1/")
            .with_body(format!(
                "{}{}",
                row("mashle", "June 14, 2023"),
                row("somebody-else", "June 13, 2023")
            ))
            .expect(1)
            .create_async()
            .await;
        let page2 = server
            .mock("GET", "/page/2/")
            .with_body(row("old-series", "January 1, 2023"))
            .expect(1)
            .create_async()
            .await;
        let page3 = server
            .mock("GET", "/page/3/")
            .expect(0)
            .create_async()
            .await;

        let client = test_client(test_site(&base, false));
        let since = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        let mut batches = Vec::new();
        client
            .filter_updated_manga(
                &mut |batch| batches.push(batch.ids),
                since,
                &["mashle".to_string()],
            )
            .await
            .unwrap();

        page1.assert_async().await;
        page2.assert_async().await;
        page3.assert_async().await;
        assert_eq!(batches, vec![vec!["mashle".to_string()]]);
    }

    #[tokio::test]
    async fn update_polling_respects_the_page_ceiling() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        // every page claims to have fresh rows, so only the ceiling stops us
        let fresh_row = format!(
            r##"<div class="uta">
                 <a class="series" href="{base}/manga/mashle/"><h4>mashle</h4></a>
                 <ul><li><a href="#">Chapter 1</a><span>June 14, 2023</span></li></ul>
               </div>"##
        );
        let page1 = server
            .mock("GET", "/page/1/")
            .with_body(&fresh_row)
            .expect(1)
            .create_async()
            .await;
        let page2 = server
            .mock("GET", "/page/2/")
            .with_body(&fresh_row)
            .expect(1)
            .create_async()
            .await;
        let page3 = server
            .mock("GET", "/page/3/")
            .expect(0)
            .create_async()
            .await;

        let mut site = test_site(&base, false);
        site.max_update_pages = 2;
        let client = test_client(site);
        let since = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        let mut batches = Vec::new();
        client
            .filter_updated_manga(
                &mut |batch| batches.push(batch.ids),
                since,
                &["mashle".to_string()],
            )
            .await
            .unwrap();

        page1.assert_async().await;
        page2.assert_async().await;
        page3.assert_async().await;
        assert_eq!(batches.len(), 2);
    }

    #[tokio::test]
    async fn view_more_maps_sections_to_listing_orders() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let listing = server
            .mock("GET", "/manga/?page=1&order=popular")
            .with_body(format!(
                r#"<div class="bsx"><a href="{base}/manga/mashle/" title="Mashle"><img src="/m.jpg"></a></div>"#
            ))
            .create_async()
            .await;

        let client = test_client(test_site(&base, false));
        let results = client.get_view_more_items("popular_today", 1).await.unwrap();

        listing.assert_async().await;
        assert_eq!(results.results[0].id, "mashle");
        // no pagination affordance on the page means this was the last one
        assert_eq!(results.next_page, None);
    }

    #[tokio::test]
    async fn unknown_view_more_section_is_rejected_without_a_request() {
        let client = test_client(test_site("https://mangadark.com", false));
        let err = client.get_view_more_items("bogus", 1).await.unwrap_err();
        assert!(matches!(err, EngineError::SectionNotSupported(_)));
    }

    #[tokio::test]
    async fn home_sections_come_from_a_single_fetch() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let referer = format!("{base}/");
        let home = server
            .mock("GET", "/")
            .match_header("referer", referer.as_str())
            .match_header("user-agent", mockito::Matcher::Regex("Mozilla".to_string()))
            .with_body(format!(
                r#"<div class="bixbox">
                     <div class="releases"><h2>Popular Today</h2></div>
                     <div class="listupd">
                       <div class="bsx"><a href="{base}/manga/mashle/" title="Mashle"><img src="/m.jpg"></a></div>
                     </div>
                   </div>"#
            ))
            .expect(1)
            .create_async()
            .await;

        let client = test_client(test_site(&base, false));
        let mut sections = Vec::new();
        client
            .get_home_page_sections(&mut |section| sections.push(section))
            .await
            .unwrap();

        home.assert_async().await;
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].id, "popular_today");
        assert_eq!(sections[0].items[0].title, "Mashle");
    }

    #[tokio::test]
    async fn search_tags_use_the_configured_subdirectory() {
        let mut server = mockito::Server::new_async().await;
        let tags_mock = server
            .mock("GET", "/genres/")
            .with_body(
                r#"<ul class="genre">
                     <li><a href="/genres/action/">Action</a></li>
                   </ul>"#,
            )
            .create_async()
            .await;

        let mut site = test_site(&server.url(), false);
        site.selectors.tags_path = "genres".to_string();
        let client = test_client(site);
        let sections = client.get_search_tags().await.unwrap();

        tags_mock.assert_async().await;
        assert_eq!(sections[0].tags[0].id, "genres:action");
    }

    #[tokio::test]
    async fn post_id_reverse_resolves_via_og_url_then_canonical() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        server
            .mock("GET", "/?p=4452")
            .with_body(format!(
                r#"<head><meta property="og:url" content="{base}/manga/mashle/"></head>"#
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/?p=4453")
            .with_body(format!(
                r#"<head>
                     <meta property="og:url" content="https://elsewhere.example/x/">
                     <link rel="canonical" href="{base}/series/frieren/">
                   </head>"#
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/?p=4454")
            .with_body("<head></head>")
            .create_async()
            .await;

        let client = test_client(test_site(&base, true));
        assert_eq!(
            client.post_id_to_slug("4452").await.unwrap(),
            ("manga".to_string(), "mashle".to_string())
        );
        assert_eq!(
            client.post_id_to_slug("4453").await.unwrap(),
            ("series".to_string(), "frieren".to_string())
        );
        assert!(matches!(
            client.post_id_to_slug("4454").await.unwrap_err(),
            EngineError::Parse(_)
        ));
    }
}
