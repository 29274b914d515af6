use crate::config::{SectionSelectors, SiteConfig};
use crate::dates::resolve_date;
use crate::error::{EngineError, Result};
use crate::models::{
    ChapterEntry, HomeSection, MangaDetails, MangaStatus, MangaSummary, Tag, TagSection,
    UpdatedPage,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::debug;

/// Which page layout is being checked for a "next page" affordance. Search
/// result pages and listing pages use different pagination markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageContext {
    SearchRequest,
    ViewMore,
}

fn sel(source: &str) -> Result<Selector> {
    Selector::parse(source)
        .map_err(|e| EngineError::parse(format!("invalid selector '{}': {}", source, e)))
}

fn collapse_text(el: ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn image_attr(el: ElementRef) -> Option<&str> {
    el.value()
        .attr("data-lazy-src")
        .or_else(|| el.value().attr("data-src"))
        .or_else(|| el.value().attr("src"))
}

fn normalize_image(src: &str, base_url: &str) -> Option<String> {
    let src = src.trim();
    if src.is_empty() {
        None
    } else if let Some(rest) = src.strip_prefix("//") {
        Some(format!("https://{}", rest))
    } else if src.starts_with("http") {
        Some(src.to_string())
    } else if src.starts_with('/') {
        Some(format!("{}{}", base_url, src))
    } else {
        None
    }
}

/// Relative link path for an href on this site, without surrounding slashes.
fn relative_link(href: &str, base_url: &str) -> String {
    let trimmed = href.trim();
    if let Some(rest) = trimmed.strip_prefix(base_url) {
        rest.trim_matches('/').to_string()
    } else if let Ok(url) = url::Url::parse(trimmed) {
        url.path().trim_matches('/').to_string()
    } else {
        trimmed.trim_matches('/').to_string()
    }
}

/// Trailing path fragment of an href, used as the slug-style identifier.
fn slug_from_url(href: &str, base_url: &str) -> Option<String> {
    relative_link(href, base_url)
        .split('/')
        .filter(|s| !s.is_empty())
        .last()
        .map(|s| s.to_string())
}

fn slugify(label: &str) -> String {
    let mut out = String::new();
    for c in label.to_lowercase().chars() {
        if c.is_alphanumeric() {
            out.push(c);
        } else if (c == ' ' || c == '-' || c == '_') && !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// Parse the summary items inside one scope (a whole listing page or a home
/// section container). Malformed entries are skipped, never fatal.
fn summaries_in_scope(
    scope: ElementRef,
    site: &SiteConfig,
    item_selector: &str,
) -> Result<Vec<MangaSummary>> {
    let s = &site.selectors;
    let item_sel = sel(item_selector)?;
    let link_sel = sel(&s.summary_link)?;
    let title_sel = sel("h4, h3, .tt")?;
    let subtitle_sel = sel(&s.summary_subtitle)?;
    let img_sel = sel("img")?;

    let mut out = Vec::new();
    for item in scope.select(&item_sel) {
        let Some(link) = item.select(&link_sel).next() else {
            debug!("listing entry without a link, skipping");
            continue;
        };
        let href = link.value().attr("href").unwrap_or("");

        let mut title = link.value().attr("title").unwrap_or("").trim().to_string();
        if title.is_empty() {
            title = item
                .select(&title_sel)
                .next()
                .map(collapse_text)
                .unwrap_or_else(|| collapse_text(link));
        }

        let Some(id) = slug_from_url(href, &site.base_url) else {
            debug!("listing entry with unusable href '{}', skipping", href);
            continue;
        };
        if title.is_empty() {
            debug!("listing entry '{}' without a title, skipping", id);
            continue;
        }

        let cover_url = item
            .select(&img_sel)
            .next()
            .and_then(image_attr)
            .and_then(|src| normalize_image(src, &site.base_url))
            .unwrap_or_else(|| s.fallback_image.clone());

        let subtitle = item
            .select(&subtitle_sel)
            .next()
            .map(collapse_text)
            .filter(|t| !t.is_empty());

        out.push(MangaSummary { id, title, cover_url, subtitle });
    }
    Ok(out)
}

pub fn parse_manga_summaries(doc: &Html, site: &SiteConfig) -> Result<Vec<MangaSummary>> {
    summaries_in_scope(doc.root_element(), site, &site.selectors.summary_item)
}

pub fn parse_search_results(doc: &Html, site: &SiteConfig) -> Result<Vec<MangaSummary>> {
    parse_manga_summaries(doc, site)
}

pub fn parse_view_more(doc: &Html, site: &SiteConfig) -> Result<Vec<MangaSummary>> {
    parse_manga_summaries(doc, site)
}

/// Locate a labeled detail field ("Author", "Status", ...) and return its
/// value text. The label match is case-insensitive; the value is preferably
/// a dedicated child element, otherwise the item text with the label cut off.
fn detail_field(doc: &Html, site: &SiteConfig, label: &str) -> Result<Option<String>> {
    if label.is_empty() {
        return Ok(None);
    }
    let s = &site.selectors;
    let item_sel = sel(&s.detail_item)?;
    let value_sel = sel(&s.detail_value)?;
    let needle = label.to_lowercase();

    for item in doc.select(&item_sel) {
        let text = collapse_text(item);
        if !text.to_lowercase().contains(&needle) {
            continue;
        }

        if let Some(value_el) = item.select(&value_sel).next() {
            let value = collapse_text(value_el);
            if !value.is_empty() && !value.to_lowercase().contains(&needle) {
                return Ok(Some(value));
            }
        }

        if let Some(idx) = text.find(label) {
            let value = text[idx + label.len()..]
                .trim_start_matches([':', ' '])
                .trim()
                .to_string();
            if !value.is_empty() {
                return Ok(Some(value));
            }
        }
    }
    Ok(None)
}

fn parse_status(raw: Option<&str>, site: &SiteConfig) -> MangaStatus {
    let Some(raw) = raw else {
        return MangaStatus::Unknown;
    };
    let text = raw.to_lowercase();
    let s = &site.selectors;
    if text.contains(&s.status_ongoing.to_lowercase()) {
        MangaStatus::Ongoing
    } else if text.contains(&s.status_completed.to_lowercase()) {
        MangaStatus::Completed
    } else {
        MangaStatus::Unknown
    }
}

fn tag_from_anchor(anchor: Option<ElementRef>, label: String, site: &SiteConfig) -> Tag {
    let s = &site.selectors;
    let key = if s.tags_use_label_as_id {
        slugify(&label)
    } else {
        anchor
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| slug_from_url(href, &site.base_url))
            .unwrap_or_else(|| slugify(&label))
    };
    Tag { id: format!("genres:{}", key), label }
}

/// Tags on the manga detail page.
fn parse_detail_tags(doc: &Html, site: &SiteConfig) -> Result<Vec<Tag>> {
    let s = &site.selectors;
    let box_sel = sel(&s.manga_tag_box)?;
    let item_sel = sel(&s.manga_tag_item)?;

    let mut tags = Vec::new();
    if let Some(tag_box) = doc.select(&box_sel).next() {
        for item in tag_box.select(&item_sel) {
            let label = collapse_text(item);
            if label.is_empty() {
                continue;
            }
            tags.push(tag_from_anchor(Some(item), label, site));
        }
    }
    Ok(tags)
}

pub fn parse_manga_details(doc: &Html, site: &SiteConfig, manga_id: &str) -> Result<MangaDetails> {
    let s = &site.selectors;

    // Название
    let title = doc
        .select(&sel(&s.details_title)?)
        .next()
        .map(collapse_text)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| EngineError::parse(format!("manga title not found for id {}", manga_id)))?;

    // Обложка
    let cover_url = doc
        .select(&sel(&s.details_cover)?)
        .next()
        .and_then(image_attr)
        .and_then(|src| normalize_image(src, &site.base_url))
        .unwrap_or_else(|| s.fallback_image.clone());

    let author = detail_field(doc, site, &s.author_label)?;
    let artist = detail_field(doc, site, &s.artist_label)?;
    let status = parse_status(detail_field(doc, site, &s.status_label)?.as_deref(), site);

    let alt_titles = detail_field(doc, site, &s.alt_titles_label)?
        .map(|raw| {
            raw.split('|')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let description = doc
        .select(&sel(&s.details_description)?)
        .map(collapse_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let tags = parse_detail_tags(doc, site)?;
    let tags = if tags.is_empty() {
        Vec::new()
    } else {
        vec![TagSection {
            id: "genres".to_string(),
            label: "Genres".to_string(),
            tags,
        }]
    };

    Ok(MangaDetails {
        id: manga_id.to_string(),
        title,
        cover_url,
        author,
        artist,
        status,
        description,
        tags,
        alt_titles,
    })
}

pub fn parse_chapter_list(
    doc: &Html,
    site: &SiteConfig,
    manga_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<ChapterEntry>> {
    let s = &site.selectors;
    let chapter_box = doc
        .select(&sel(&s.chapter_box)?)
        .next()
        .ok_or_else(|| {
            EngineError::parse(format!("chapter list container not found for id {}", manga_id))
        })?;

    let item_sel = sel(&s.chapter_item)?;
    let link_sel = sel("a")?;
    let name_sel = sel(&s.chapter_name)?;
    let date_sel = sel(&s.chapter_date)?;
    let number_re = Regex::new(r"(\d+(?:\.\d+)?)").expect("static chapter number pattern");

    // Главы, в порядке документа (обычно новые сверху)
    let mut chapters = Vec::new();
    for item in chapter_box.select(&item_sel) {
        let Some(link) = item.select(&link_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            debug!("chapter row without an href, skipping");
            continue;
        };

        let link_path = relative_link(href, &site.base_url);
        let Some(id) = link_path.split('/').filter(|p| !p.is_empty()).last() else {
            debug!("chapter row with unusable href '{}', skipping", href);
            continue;
        };

        let name = item
            .select(&name_sel)
            .next()
            .map(collapse_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| collapse_text(link));

        let number = number_re
            .captures(&name)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0);

        let published = item
            .select(&date_sel)
            .next()
            .map(|el| resolve_date(&collapse_text(el), &s.months, &s.time_ago, now))
            .unwrap_or(now);

        chapters.push(ChapterEntry {
            id: id.to_string(),
            manga_id: manga_id.to_string(),
            name,
            number,
            published,
            link: link_path.clone(),
        });
    }

    Ok(chapters)
}

/// Image URLs for one chapter, in reading order.
pub fn parse_chapter_images(doc: &Html, site: &SiteConfig) -> Result<Vec<String>> {
    let s = &site.selectors;
    let mut seen = HashSet::new();
    let mut pages = Vec::new();

    for img in doc.select(&sel(&s.page_images)?) {
        if let Some(url) = image_attr(img).and_then(|src| normalize_image(src, &site.base_url)) {
            if seen.insert(url.clone()) {
                pages.push(url);
            }
        }
    }

    // Некоторые темы отдают страницы только через ts_reader
    if pages.is_empty() {
        let markup = doc.root_element().html();
        if markup.contains("ts_reader") {
            let images_re =
                Regex::new(r#""images"\s*:\s*\[([^\]]*)\]"#).expect("static images pattern");
            let url_re = Regex::new(r#""([^"]+)""#).expect("static url pattern");
            if let Some(block) = images_re.captures(&markup).and_then(|c| c.get(1)) {
                for cap in url_re.captures_iter(block.as_str()) {
                    let url = cap[1].replace("\\/", "/");
                    if url.starts_with("http") && seen.insert(url.clone()) {
                        pages.push(url);
                    }
                }
            }
        }
    }

    if pages.is_empty() {
        return Err(EngineError::parse("no chapter images found"));
    }
    Ok(pages)
}

/// Tag taxonomy page. The container is required structure; individual rows
/// degrade to skips.
pub fn parse_tags(doc: &Html, site: &SiteConfig) -> Result<Vec<TagSection>> {
    let s = &site.selectors;
    let tag_box = doc
        .select(&sel(&s.tags_box)?)
        .next()
        .ok_or_else(|| EngineError::parse("tag list container not found"))?;

    let item_sel = sel(&s.tags_item)?;
    let anchor_sel = sel("a")?;
    let label_sel = if s.tags_label.is_empty() {
        None
    } else {
        Some(sel(&s.tags_label)?)
    };
    let count_re = Regex::new(r"\s*\(\d+\)\s*$").expect("static count pattern");

    let mut tags = Vec::new();
    for item in tag_box.select(&item_sel) {
        let anchor = item.select(&anchor_sel).next();
        let mut label = match &label_sel {
            Some(label_sel) => item.select(label_sel).next().map(collapse_text),
            None => anchor.map(collapse_text).or_else(|| Some(collapse_text(item))),
        }
        .unwrap_or_default();

        // Сайты дописывают количество тайтлов после имени жанра
        if label_sel.is_some() {
            label = count_re.replace(&label, "").to_string();
        }
        let label = label.trim().to_string();
        if label.is_empty() {
            debug!("tag row without a label, skipping");
            continue;
        }

        tags.push(tag_from_anchor(anchor, label, site));
    }

    Ok(vec![TagSection {
        id: "genres".to_string(),
        label: "Genres".to_string(),
        tags,
    }])
}

fn find_heading_container<'a>(
    doc: &'a Html,
    heading: &str,
    item_sel: &Selector,
) -> Result<Option<ElementRef<'a>>> {
    let heading_sel = sel("h1, h2, h3, h4")?;
    let needle = heading.to_lowercase();

    for h in doc.select(&heading_sel) {
        if !collapse_text(h).to_lowercase().contains(&needle) {
            continue;
        }
        for ancestor in h.ancestors().filter_map(ElementRef::wrap) {
            if ancestor.select(item_sel).next().is_some() {
                return Ok(Some(ancestor));
            }
        }
    }
    Ok(None)
}

/// Parse all enabled home sections from a single homepage document. A section
/// whose container is absent yields no callback; some sites drop sections
/// seasonally.
pub fn parse_home_sections(
    doc: &Html,
    site: &SiteConfig,
    emit: &mut dyn FnMut(HomeSection),
) -> Result<()> {
    for descriptor in site.selectors.sections.iter().filter(|d| d.enabled) {
        let item_selector = descriptor
            .item
            .as_deref()
            .unwrap_or(&site.selectors.summary_item);
        let item_sel = sel(item_selector)?;

        let container = match (&descriptor.container, &descriptor.heading) {
            (Some(css), _) => doc.select(&sel(css)?).next(),
            (None, Some(heading)) => find_heading_container(doc, heading, &item_sel)?,
            (None, None) => None,
        };

        let Some(container) = container else {
            debug!("home section '{}' not present on this page", descriptor.id);
            continue;
        };

        let items = summaries_in_scope(container, site, item_selector)?;
        emit(section_from_descriptor(descriptor, items));
    }
    Ok(())
}

fn section_from_descriptor(descriptor: &SectionSelectors, items: Vec<MangaSummary>) -> HomeSection {
    HomeSection {
        id: descriptor.id.clone(),
        title: descriptor.title.clone(),
        items,
        view_more: descriptor.view_more,
    }
}

/// End-of-pagination detection: the affordance for "next page" is simply
/// absent on the last page.
pub fn is_last_page(doc: &Html, site: &SiteConfig, context: PageContext) -> Result<bool> {
    let s = &site.selectors;
    let next_sel = match context {
        PageContext::SearchRequest => sel(&s.search_next_page)?,
        PageContext::ViewMore => sel(&s.view_more_next_page)?,
    };
    Ok(doc.select(&next_sel).next().is_none())
}

/// One page of the chronological listing, matched against the caller's known
/// slugs. `load_more` stays true only while every item on the page is still
/// at or after `since`; the first older item (or an empty page) ends polling.
pub fn parse_updated_manga(
    doc: &Html,
    site: &SiteConfig,
    since: DateTime<Utc>,
    known_slugs: &HashSet<String>,
    now: DateTime<Utc>,
) -> Result<UpdatedPage> {
    let s = &site.selectors;
    let item_sel = sel(&s.update_item)?;
    let link_sel = sel(&s.update_link)?;
    let fallback_link_sel = sel("a")?;
    let date_sel = sel(&s.update_date)?;

    let mut ids = Vec::new();
    let mut load_more = true;
    let mut item_count = 0usize;

    for item in doc.select(&item_sel) {
        item_count += 1;

        let link = item
            .select(&link_sel)
            .next()
            .or_else(|| item.select(&fallback_link_sel).next());
        let Some(slug) = link
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| slug_from_url(href, &site.base_url))
        else {
            debug!("update row without a usable link, skipping");
            continue;
        };

        let published = item
            .select(&date_sel)
            .next()
            .map(|el| resolve_date(&collapse_text(el), &s.months, &s.time_ago, now))
            .unwrap_or(now);

        if published >= since {
            if known_slugs.contains(&slug) {
                ids.push(slug);
            }
        } else {
            load_more = false;
        }
    }

    if item_count == 0 {
        debug!("update listing page had no items, stopping poll");
        load_more = false;
    }

    Ok(UpdatedPage { ids, load_more })
}
