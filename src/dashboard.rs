//! Dashboard resolution for a single latent
//!
//! Canonical SAEs have published dashboards on Neuronpedia and resolve to a
//! URL without any file access. Non-canonical dashboards are stored locally;
//! their HTML gets a CSS override for narrow embedding and is escaped so the
//! UI layer can place it inline (e.g. an iframe `srcdoc`) unchanged.

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::sae::{Latent, SaeId, MODEL_ID};
use crate::source::DataSource;
use crate::store::DataStore;

/// Closing tag the override block is inserted before
const STYLE_CLOSE: &str = "</style>";

/// Forces single-column, non-truncated, wrapping layout.
///
/// Contains none of `& < > " '` so escaping leaves it byte-identical.
pub const EMBED_CSS_OVERRIDE: &str = r"
/* embed overrides */
.grid, .container, .row, .columns, [class*=grid] {
    display: block !important;
    grid-template-columns: 1fr !important;
    width: 100% !important;
    max-width: 100% !important;
}
.col, .column, [class*=col-] {
    width: 100% !important;
    float: none !important;
}
body, div, span, td, th, p, pre, code {
    white-space: normal !important;
    overflow-wrap: anywhere !important;
    word-break: break-word !important;
    text-overflow: clip !important;
    max-height: none !important;
}
table {
    table-layout: auto !important;
    width: 100% !important;
}
";

/// What the UI layer should render for one latent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DashboardArtifact {
    /// Published page, embedded by URL
    Remote { url: String },
    /// Local page, escaped for inline embedding
    Inline { escaped_html: String },
}

impl DashboardArtifact {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

/// `https://neuronpedia.org/gemma-2-2b/{layer}-gemmascope-res-{w}k/{latent}?embed=true`
pub fn canonical_url(sae: &SaeId, latent: Latent) -> String {
    format!(
        "https://neuronpedia.org/{MODEL_ID}/{}-gemmascope-res-{}k/{latent}?embed=true",
        sae.layer,
        sae.width_k()
    )
}

/// Insert the override block once, before the first `</style>`.
///
/// Documents without a stylesheet get a `<style>` block before `</head>`, or
/// at the very start if there is no head either.
pub fn inject_css_override(html: &str) -> String {
    let mut out = String::with_capacity(html.len() + EMBED_CSS_OVERRIDE.len() + 32);

    if let Some(pos) = html.find(STYLE_CLOSE) {
        out.push_str(&html[..pos]);
        out.push_str(EMBED_CSS_OVERRIDE);
        out.push_str(&html[pos..]);
        return out;
    }

    let block = format!("<style>{EMBED_CSS_OVERRIDE}</style>");
    match html.find("</head>") {
        Some(pos) => {
            out.push_str(&html[..pos]);
            out.push_str(&block);
            out.push_str(&html[pos..]);
        }
        None => {
            out.push_str(&block);
            out.push_str(html);
        }
    }
    out
}

/// Escape a document for use as an attribute value or inline text.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 8);
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Resolves [`DashboardArtifact`]s through a [`DataStore`].
pub struct DashboardResolver<'a, S: DataSource> {
    store: &'a DataStore<S>,
}

impl<'a, S: DataSource> DashboardResolver<'a, S> {
    pub fn new(store: &'a DataStore<S>) -> Self {
        Self { store }
    }

    /// Resolve the dashboard for `latent` of `sae`.
    ///
    /// Fails with `NotFound` if a non-canonical dashboard file is missing.
    pub fn resolve(&self, sae: &SaeId, latent: Latent) -> Result<DashboardArtifact> {
        if sae.is_canonical() {
            return Ok(DashboardArtifact::Remote {
                url: canonical_url(sae, latent),
            });
        }

        let path = self.store.dashboard_path(sae, latent);
        debug!("Loading non-canonical dashboard {}", path.display());
        let raw = self.store.raw_dashboard_html(&path)?;
        Ok(DashboardArtifact::Inline {
            escaped_html: escape_html(&inject_css_override(&raw)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    #[test]
    fn test_canonical_url() {
        let sae = SaeId::new(5, 65_000, 105);
        assert_eq!(
            canonical_url(&sae, 1234),
            "https://neuronpedia.org/gemma-2-2b/5-gemmascope-res-65k/1234?embed=true"
        );
    }

    #[test]
    fn test_inject_before_first_style_close_only() {
        let html = "<style>a{}</style><style>b{}</style>";
        let patched = inject_css_override(html);
        assert_eq!(patched.matches(EMBED_CSS_OVERRIDE).count(), 1);
        let override_at = patched.find(EMBED_CSS_OVERRIDE).unwrap();
        assert!(override_at < patched.find("</style>").unwrap());
        assert!(patched.ends_with("</style><style>b{}</style>"));
    }

    #[test]
    fn test_inject_without_stylesheet() {
        let patched = inject_css_override("<html><head></head><body>x</body></html>");
        assert!(patched.starts_with("<html><head><style>"));
        assert_eq!(patched.matches(EMBED_CSS_OVERRIDE).count(), 1);

        let patched = inject_css_override("<p>bare</p>");
        assert!(patched.starts_with("<style>"));
        assert!(patched.ends_with("</style><p>bare</p>"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom's & Jerry</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom&#x27;s &amp; Jerry&lt;/a&gt;"
        );
        assert_eq!(escape_html(EMBED_CSS_OVERRIDE), EMBED_CSS_OVERRIDE);
    }

    #[test]
    fn test_canonical_never_reads_files() {
        let store = DataStore::new(MemorySource::new());
        let resolver = DashboardResolver::new(&store);
        let artifact = resolver.resolve(&SaeId::new(0, 16_000, 105), 77).unwrap();
        assert!(artifact.is_remote());
        assert_eq!(store.source().html_reads(), 0);
        assert_eq!(store.source().table_reads(), 0);
    }

    #[test]
    fn test_non_canonical_inline() {
        let sae = SaeId::new(0, 16_000, 40);
        let html = "<html><head><style>body{color:red}</style></head><body><b>hi</b></body></html>";
        let store = DataStore::new(MemorySource::new().with_dashboard(sae, 12, html));
        let resolver = DashboardResolver::new(&store);

        let DashboardArtifact::Inline { escaped_html } = resolver.resolve(&sae, 12).unwrap() else {
            panic!("expected inline artifact");
        };
        assert_eq!(escaped_html.matches(EMBED_CSS_OVERRIDE).count(), 1);
        assert!(!escaped_html.contains('<'));
        assert!(!escaped_html.contains('>'));
        assert!(escaped_html.starts_with("&lt;html&gt;"));
        assert_eq!(store.source().html_reads(), 1);
    }

    #[test]
    fn test_non_canonical_missing_file() {
        let store = DataStore::new(MemorySource::new());
        let resolver = DashboardResolver::new(&store);
        let err = resolver.resolve(&SaeId::new(0, 16_000, 40), 12).unwrap_err();
        assert!(err.is_not_found());
    }
}
