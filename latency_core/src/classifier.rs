use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Content category used for filtering and badge counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Fetch/XHR")]
    FetchXhr,
    #[serde(rename = "JS")]
    Js,
    #[serde(rename = "CSS")]
    Css,
    Doc,
    Img,
    Font,
    Media,
    Wasm,
    Manifest,
    #[serde(rename = "WS")]
    Ws,
    Other,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::FetchXhr,
        Category::Js,
        Category::Css,
        Category::Doc,
        Category::Img,
        Category::Font,
        Category::Media,
        Category::Wasm,
        Category::Manifest,
        Category::Ws,
        Category::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::FetchXhr => "Fetch/XHR",
            Category::Js => "JS",
            Category::Css => "CSS",
            Category::Doc => "Doc",
            Category::Img => "Img",
            Category::Font => "Font",
            Category::Media => "Media",
            Category::Wasm => "Wasm",
            Category::Manifest => "Manifest",
            Category::Ws => "WS",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        match wanted.as_str() {
            "fetch" | "xhr" | "fetchxhr" => return Ok(Category::FetchXhr),
            _ => {}
        }
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.label().to_ascii_lowercase() == wanted)
            .ok_or_else(|| format!("Unknown category '{}'", s))
    }
}

/// The fields of an endpoint the classifier looks at.
#[derive(Debug, Clone, Copy)]
pub struct EndpointDescriptor<'a> {
    pub scheme: &'a str,
    pub path: &'a str,
}

impl<'a> EndpointDescriptor<'a> {
    pub fn new(scheme: &'a str, path: &'a str) -> Self {
        Self { scheme, path }
    }
}

const API_SEGMENTS: [&str; 4] = ["/api/", "/graphql", "/v1/", "/v2/"];
const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "webp", "svg", "ico"];
const FONT_EXTENSIONS: [&str; 5] = ["woff", "woff2", "ttf", "otf", "eot"];
const MEDIA_EXTENSIONS: [&str; 5] = ["mp4", "webm", "ogg", "mp3", "wav"];

/// Classify an endpoint. First match wins:
/// API-shaped path, then file extension, then websocket scheme, then `Other`.
pub fn classify(descriptor: EndpointDescriptor<'_>) -> Category {
    let path = descriptor.path.to_ascii_lowercase();
    let extension = extension_of(&path);

    let api_segment = API_SEGMENTS.iter().any(|segment| path.contains(segment));
    if api_segment || matches!(extension, Some("json" | "xml")) {
        return Category::FetchXhr;
    }

    if let Some(ext) = extension {
        match ext {
            "js" => return Category::Js,
            "css" => return Category::Css,
            "html" | "htm" => return Category::Doc,
            "wasm" => return Category::Wasm,
            ext if IMAGE_EXTENSIONS.contains(&ext) => return Category::Img,
            ext if FONT_EXTENSIONS.contains(&ext) => return Category::Font,
            ext if MEDIA_EXTENSIONS.contains(&ext) => return Category::Media,
            _ => {}
        }
    }

    // Shadowed by the `.json` rule above; kept in its place in the order.
    if path.ends_with("manifest.json") {
        return Category::Manifest;
    }

    if descriptor.scheme.eq_ignore_ascii_case("ws") || descriptor.scheme.eq_ignore_ascii_case("wss") {
        return Category::Ws;
    }

    Category::Other
}

fn extension_of(path: &str) -> Option<&str> {
    let last_segment = path.rsplit('/').next()?;
    let (_, ext) = last_segment.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// Per-profile category selection. `All` is the default and matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryFilter {
    #[default]
    All,
    Only(BTreeSet<Category>),
}

impl CategoryFilter {
    /// An empty selection collapses to `All`.
    pub fn only(categories: impl IntoIterator<Item = Category>) -> Self {
        let set: BTreeSet<Category> = categories.into_iter().collect();
        if set.is_empty() {
            CategoryFilter::All
        } else {
            CategoryFilter::Only(set)
        }
    }

    pub fn matches(&self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(set) => set.contains(&category),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, CategoryFilter::All)
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryFilter::All => f.write_str("All"),
            CategoryFilter::Only(set) => {
                let labels: Vec<&str> = set.iter().map(|c| c.label()).collect();
                f.write_str(&labels.join(","))
            }
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = String;

    /// Comma separated labels, or `All`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut categories = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part.eq_ignore_ascii_case("all") {
                return Ok(CategoryFilter::All);
            }
            categories.push(part.parse::<Category>()?);
        }
        Ok(CategoryFilter::only(categories))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn classify_url(url: &str) -> Category {
        match Url::parse(url) {
            Ok(parsed) => classify(EndpointDescriptor::new(parsed.scheme(), parsed.path())),
            Err(_) => Category::Other,
        }
    }

    #[test]
    fn test_extension_categories() {
        assert_eq!(classify_url("https://x.com/app.js"), Category::Js);
        assert_eq!(classify_url("https://x.com/style.CSS"), Category::Css);
        assert_eq!(classify_url("https://x.com/index.html"), Category::Doc);
        assert_eq!(classify_url("https://x.com/logo.svg"), Category::Img);
        assert_eq!(classify_url("https://x.com/f/inter.woff2"), Category::Font);
        assert_eq!(classify_url("https://x.com/clip.mp4"), Category::Media);
        assert_eq!(classify_url("https://x.com/engine.wasm"), Category::Wasm);
        assert_eq!(classify_url("https://x.com/"), Category::Other);
    }

    #[test]
    fn test_api_shape_wins_over_extension() {
        assert_eq!(classify_url("https://x.com/api/report.json"), Category::FetchXhr);
        assert_eq!(classify_url("https://x.com/api/bundle.js"), Category::FetchXhr);
        assert_eq!(classify_url("https://x.com/v2/items"), Category::FetchXhr);
        assert_eq!(classify_url("https://x.com/graphql"), Category::FetchXhr);
        assert_eq!(classify_url("https://x.com/data/feed.xml"), Category::FetchXhr);
    }

    #[test]
    fn test_manifest_json_counts_as_fetch() {
        assert_eq!(classify_url("https://x.com/manifest.json"), Category::FetchXhr);
        assert_eq!(classify_url("https://x.com/api/manifest.json"), Category::FetchXhr);
        assert_eq!(classify_url("https://x.com/site.webmanifest"), Category::Other);
    }

    #[test]
    fn test_websocket_scheme() {
        assert_eq!(classify_url("wss://x.com/socket"), Category::Ws);
        assert_eq!(classify_url("ws://x.com/live"), Category::Ws);
        assert_eq!(classify_url("not a url"), Category::Other);
    }

    #[test]
    fn test_query_does_not_affect_extension() {
        let descriptor = EndpointDescriptor::new("https", "/app.js");
        assert_eq!(classify(descriptor), Category::Js);
        assert_eq!(classify_url("https://x.com/app.js?v=3"), Category::Js);
    }

    #[test]
    fn test_filter_parsing() {
        let filter: CategoryFilter = "JS, img".parse().unwrap();
        assert!(filter.matches(Category::Js));
        assert!(filter.matches(Category::Img));
        assert!(!filter.matches(Category::Css));
        assert_eq!(filter.to_string(), "JS,Img");

        assert!("All".parse::<CategoryFilter>().unwrap().is_all());
        assert!("".parse::<CategoryFilter>().unwrap().is_all());
        assert!("bogus".parse::<CategoryFilter>().is_err());
        assert_eq!("fetch/xhr".parse::<Category>().unwrap(), Category::FetchXhr);
    }

    #[test]
    fn test_filter_serde_shape() {
        let filter = CategoryFilter::only([Category::FetchXhr]);
        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(json, r#"{"only":["Fetch/XHR"]}"#);
        assert_eq!(serde_json::to_string(&CategoryFilter::All).unwrap(), r#""all""#);
    }
}
