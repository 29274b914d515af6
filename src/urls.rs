/// Deterministic request-URL assembly.
///
/// Path segments compose left to right in call order; query parameters are
/// emitted in call order and the same key may repeat (multi-genre filters
/// emit one `genre=` pair per value). Values are emitted as given, so
/// callers encode user input before passing it in.
#[derive(Debug, Clone, Default)]
pub struct UrlBuilder {
    base: String,
    path: Vec<String>,
    query: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Append a trailing slash to the path before the query string.
    pub add_trailing_slash: bool,
    /// Emit parameters whose value is empty instead of dropping them.
    pub include_empty_parameters: bool,
}

impl UrlBuilder {
    pub fn new(base: impl AsRef<str>) -> Self {
        Self {
            base: base.as_ref().trim_end_matches('/').to_string(),
            path: Vec::new(),
            query: Vec::new(),
        }
    }

    pub fn push_path(mut self, segment: impl AsRef<str>) -> Self {
        let trimmed = segment.as_ref().trim_matches('/');
        if !trimmed.is_empty() {
            self.path.push(trimmed.to_string());
        }
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn query_all<I, V>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        for value in values {
            self.query.push((key.to_string(), value.into()));
        }
        self
    }

    pub fn build(&self, options: BuildOptions) -> String {
        let mut url = self.base.clone();
        for segment in &self.path {
            url.push('/');
            url.push_str(segment);
        }
        if options.add_trailing_slash {
            url.push('/');
        }

        let mut first = true;
        for (key, value) in &self.query {
            if value.is_empty() && !options.include_empty_parameters {
                continue;
            }
            url.push(if first { '?' } else { '&' });
            url.push_str(key);
            url.push('=');
            url.push_str(value);
            first = false;
        }

        url
    }
}

/// Percent-encode a free-text query value (titles typed by the user).
pub fn encode_query_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
