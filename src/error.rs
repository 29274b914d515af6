use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request to {url} failed with status {status}")]
    Transport { status: u16, url: String },

    #[error("CLOUDFLARE BYPASS ERROR:\nThe site returned a challenge page. Open the source settings and run the Cloudflare bypass, then retry")]
    CloudflareChallenge,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unable to resolve a numeric post id (path: {path}, slug: {slug})")]
    Resolution { path: String, slug: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Chapter not found: {0}")]
    ChapterNotFound(String),

    #[error("Home section not supported: {0}")]
    SectionNotSupported(String),

    #[error("Site not configured: {0}")]
    SiteNotConfigured(String),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

impl EngineError {
    pub fn transport(status: u16, url: impl Into<String>) -> Self {
        Self::Transport { status, url: url.into() }
    }

    pub fn resolution(path: impl Into<String>, slug: impl Into<String>) -> Self {
        Self::Resolution { path: path.into(), slug: slug.into() }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn chapter_not_found(chapter_id: impl Into<String>) -> Self {
        Self::ChapterNotFound(chapter_id.into())
    }

    pub fn section_not_supported(section_id: impl Into<String>) -> Self {
        Self::SectionNotSupported(section_id.into())
    }

    pub fn site_not_configured(site: impl Into<String>) -> Self {
        Self::SiteNotConfigured(site.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
