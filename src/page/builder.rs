//! Page assembly.
//!
//! # Example
//!
//! ```
//! use hub_relay::page::{PageBuilder, ScriptSource};
//!
//! # fn example() -> hub_relay::Result<()> {
//! let page = PageBuilder::empty()
//!     .library(ScriptSource::url("js/jquery.min.js"))
//!     .library(ScriptSource::url("js/jquery.signalR.min.js"))
//!     .base_url("file:///app/bundle/")
//!     .build(None)?;
//!
//! assert!(page.html().contains("jquery.signalR.min.js"));
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

use super::assets::{
    ADAPTER_SCRIPT, DEFAULT_LIBRARIES, DEFAULT_MESSAGE_HANDLER, native_prelude, page_html,
};

// ============================================================================
// ScriptSource
// ============================================================================

/// Where a page script comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// Referenced by URL (`<script src="...">`), resolved against the base URL.
    Url(String),
    /// Embedded in the page.
    Inline(String),
}

impl ScriptSource {
    /// Creates a URL reference.
    #[inline]
    #[must_use]
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// Creates an inline script.
    #[inline]
    #[must_use]
    pub fn inline(source: impl Into<String>) -> Self {
        Self::Inline(source.into())
    }

    /// Reads a bundled script from disk and embeds it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read.
    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::Inline(fs::read_to_string(path)?))
    }

    /// Renders the `<script>` element.
    fn render(&self) -> String {
        match self {
            Self::Url(url) => format!(r#"<script src="{}"></script>"#, escape_attribute(url)),
            Self::Inline(source) => format!("<script>{}</script>", escape_inline(source)),
        }
    }
}

// ============================================================================
// Page
// ============================================================================

/// An assembled page, ready for a script host to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Full HTML document.
    html: String,
    /// Base URL relative script references resolve against.
    base_url: Option<String>,
    /// Message handler name the host should register.
    message_handler: String,
}

impl Page {
    /// Returns the HTML document.
    #[inline]
    #[must_use]
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Returns the base URL, if any.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Returns the message handler name.
    #[inline]
    #[must_use]
    pub fn message_handler(&self) -> &str {
        &self.message_handler
    }

    /// Returns the page as a `data:text/html,...` URI.
    #[must_use]
    pub fn data_uri(&self) -> String {
        format!("data:text/html,{}", urlencoding::encode(&self.html))
    }
}

// ============================================================================
// PageBuilder
// ============================================================================

/// Builder for the relay [`Page`].
///
/// The default builder references the jQuery hub client files by URL and
/// embeds the bundled adapter script.
#[derive(Debug, Clone)]
pub struct PageBuilder {
    /// Protocol libraries, loaded in order.
    libraries: Vec<ScriptSource>,
    /// Adapter script, loaded last.
    adapter: ScriptSource,
    /// Base URL for relative references.
    base_url: Option<String>,
    /// Message handler name.
    message_handler: String,
}

impl Default for PageBuilder {
    fn default() -> Self {
        Self {
            libraries: DEFAULT_LIBRARIES
                .iter()
                .map(|name| ScriptSource::url(*name))
                .collect(),
            adapter: ScriptSource::inline(ADAPTER_SCRIPT),
            base_url: None,
            message_handler: DEFAULT_MESSAGE_HANDLER.to_string(),
        }
    }
}

impl PageBuilder {
    /// Creates a builder with the default libraries and adapter.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder with no libraries and the default adapter.
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            libraries: Vec::new(),
            ..Self::default()
        }
    }

    /// Appends a protocol library.
    #[inline]
    #[must_use]
    pub fn library(mut self, source: ScriptSource) -> Self {
        self.libraries.push(source);
        self
    }

    /// Replaces the adapter script.
    #[inline]
    #[must_use]
    pub fn adapter(mut self, source: ScriptSource) -> Self {
        self.adapter = source;
        self
    }

    /// Sets the base URL relative references resolve against.
    ///
    /// Rendered as `<base href>`, so library URLs resolve even when the
    /// page itself is loaded from a `data:` URI.
    #[inline]
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the message handler name.
    #[inline]
    #[must_use]
    pub fn message_handler(mut self, name: impl Into<String>) -> Self {
        self.message_handler = name.into();
        self
    }

    /// Returns the configured libraries.
    #[inline]
    #[must_use]
    pub fn libraries(&self) -> &[ScriptSource] {
        &self.libraries
    }

    /// Assembles the page.
    ///
    /// `prelude` replaces the default native prelude; hosts that relay over
    /// a socket supply their own.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no library is configured or the message
    /// handler name is empty.
    pub fn build(&self, prelude: Option<&str>) -> Result<Page> {
        if self.libraries.is_empty() {
            return Err(Error::config(
                "At least one protocol library is required. Use .library() to add one.",
            ));
        }

        if self.message_handler.is_empty() {
            return Err(Error::config("Message handler name must not be empty"));
        }

        let prelude = match prelude {
            Some(prelude) => prelude.to_string(),
            None => native_prelude(&self.message_handler),
        };

        let mut scripts = ScriptSource::inline(prelude).render();
        for library in &self.libraries {
            scripts.push_str(&library.render());
        }
        scripts.push_str(&self.adapter.render());

        let head = match &self.base_url {
            Some(url) => format!(r#"<base href="{}">"#, escape_attribute(url)),
            None => String::new(),
        };

        Ok(Page {
            html: page_html(&head, &scripts),
            base_url: self.base_url.clone(),
            message_handler: self.message_handler.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Escapes a value for a double-quoted HTML attribute.
fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Keeps inline source from closing its `<script>` element early.
fn escape_inline(source: &str) -> String {
    const CLOSE: &str = "</script";

    let lower = source.to_ascii_lowercase();
    let mut out = String::with_capacity(source.len());
    let mut last = 0;

    for (index, _) in lower.match_indices(CLOSE) {
        out.push_str(&source[last..index]);
        out.push_str("<\\/");
        last = index + 2;
    }
    out.push_str(&source[last..]);
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_page_order() {
        let page = PageBuilder::new().build(None).expect("build");
        let html = page.html();

        let prelude = html.find("window.hubRelay").expect("prelude");
        let jquery = html.find("jquery-2.1.3.min.js").expect("jquery");
        let signalr = html.find("jquery.signalR-2.2.0.min.js").expect("signalr");
        let adapter = html.find("window.addHandler").expect("adapter");

        assert!(prelude < jquery);
        assert!(jquery < signalr);
        assert!(signalr < adapter);
        assert_eq!(page.message_handler(), "interOp");
    }

    #[test]
    fn test_empty_builder_requires_library() {
        let result = PageBuilder::empty().build(None);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_empty_handler_rejected() {
        let result = PageBuilder::new().message_handler("").build(None);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_custom_prelude_replaces_native() {
        let page = PageBuilder::new()
            .build(Some("window.hubRelay = { post: function () {} };"))
            .expect("build");
        assert!(page.html().contains("post: function () {}"));
        assert!(!page.html().contains("messageHandlers"));
    }

    #[test]
    fn test_url_attribute_escaped() {
        let page = PageBuilder::empty()
            .library(ScriptSource::url(r#"x.js"></script><script>alert(1)</script>"#))
            .build(None)
            .expect("build");
        assert!(!page.html().contains("<script>alert(1)"));
        assert!(page.html().contains("x.js&quot;&gt;"));
    }

    #[test]
    fn test_inline_close_tag_escaped() {
        assert_eq!(escape_inline("var s = '</SCRIPT>';"), r"var s = '<\/SCRIPT>';");
        assert_eq!(escape_inline("a < b"), "a < b");
    }

    #[test]
    fn test_base_url_kept() {
        let page = PageBuilder::new()
            .base_url("file:///bundle/")
            .build(None)
            .expect("build");
        assert_eq!(page.base_url(), Some("file:///bundle/"));
    }

    #[test]
    fn test_base_url_rendered_before_scripts() {
        let page = PageBuilder::new()
            .base_url("https://cdn.example/js/")
            .build(None)
            .expect("build");
        let html = page.html();

        let base = html
            .find(r#"<base href="https://cdn.example/js/">"#)
            .expect("base element");
        let jquery = html.find("jquery-2.1.3.min.js").expect("jquery");
        assert!(base < jquery);

        let uri = page.data_uri();
        assert!(uri.contains(&*urlencoding::encode("https://cdn.example/js/")));
    }

    #[test]
    fn test_base_url_attribute_escaped() {
        let page = PageBuilder::new()
            .base_url(r#"x"><script>alert(1)</script>"#)
            .build(None)
            .expect("build");
        assert!(page.html().contains(r#"<base href="x&quot;&gt;&lt;script&gt;"#));
        assert!(!page.html().contains("<script>alert(1)"));
    }

    #[test]
    fn test_no_base_without_url() {
        let page = PageBuilder::new().build(None).expect("build");
        assert!(!page.html().contains("<base"));
    }

    #[test]
    fn test_data_uri_is_url_encoded() {
        let page = PageBuilder::new().build(None).expect("build");
        let uri = page.data_uri();

        assert!(uri.starts_with("data:text/html,"));
        assert!(!uri.contains('<'));
        assert!(!uri.contains('>'));
    }

    #[test]
    fn test_file_source_missing() {
        let result = ScriptSource::file("/nonexistent/lib.js");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
