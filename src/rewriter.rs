use anyhow::{Context, Result};
use regex::Regex;
use select::document::Document;
use select::predicate::Name;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use crate::downloader::{url_domain, DownloadOutcome, ResourceDownloader};
use crate::path_mapper::PathMapper;
use crate::safety;

/// Closed set of resource-bearing element/attribute pairs, iterated as one
/// data-driven pass.
const RESOURCE_DESCRIPTORS: &[(&str, &str)] = &[
    ("link", "href"),
    ("script", "src"),
    ("img", "src"),
    ("img", "srcset"),
    ("source", "src"),
    ("source", "srcset"),
    ("video", "src"),
    ("audio", "src"),
    ("iframe", "src"),
    ("embed", "src"),
    ("object", "data"),
    ("form", "action"),
];

/// Schemes and pseudo-references that are never resolved or rewritten.
const SKIPPED_PREFIXES: &[&str] = &["data:", "#", "javascript:", "mailto:", "tel:"];

/// Runtime shim appended to every rewritten page. Rewrites same-origin
/// absolute URLs handed to fetch/XHR/Image at the consuming page's runtime,
/// catching script-constructed resources the static scan cannot see.
/// Best-effort compatibility aid only.
const INTERCEPTOR_SNIPPET: &str = r#"<script>
document.addEventListener('DOMContentLoaded', function() {
  const originalFetch = window.fetch;
  const originalOpen = window.XMLHttpRequest.prototype.open;
  const originalImageSrc = Object.getOwnPropertyDescriptor(Image.prototype, 'src');

  function toLocalPath(url) {
    if (!url || typeof url !== 'string') return url;
    if (url.startsWith('./') || url.startsWith('../') || url.startsWith('data:') ||
        url.startsWith('#') || url.startsWith('javascript:') || url.startsWith('blob:')) {
      return url;
    }
    if (url.startsWith('/') && !url.startsWith('//')) {
      return '.' + url;
    }
    try {
      const parsed = new URL(url);
      if (parsed.hostname === window.location.hostname) {
        return '.' + parsed.pathname + (parsed.search || '') + (parsed.hash || '');
      }
    } catch (e) {
      // leave unparseable URLs alone
    }
    return url;
  }

  window.fetch = function(resource, options) {
    if (typeof resource === 'string') {
      resource = toLocalPath(resource);
    } else if (resource instanceof Request) {
      resource = new Request(toLocalPath(resource.url), resource);
    }
    return originalFetch.call(this, resource, options);
  };

  window.XMLHttpRequest.prototype.open = function(method, url, async, user, password) {
    return originalOpen.call(this, method, toLocalPath(url), async, user, password);
  };

  Object.defineProperty(Image.prototype, 'src', {
    set: function(url) { originalImageSrc.set.call(this, toLocalPath(url)); },
    get: originalImageSrc.get
  });
});
</script>"#;

/// What a scanned reference points at, as far as rewriting cares: only
/// stylesheets and scripts get a recursive content pass after download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Stylesheet,
    Script,
    Image,
    Media,
    Other,
}

/// One resource reference discovered in a page.
#[derive(Debug, Clone)]
pub struct ScannedResource {
    /// The raw value as it appears in the markup.
    pub original: String,
    /// The resolved absolute URL.
    pub absolute: String,
    pub kind: ResourceKind,
}

/// Discovers resource references and navigable links in fetched pages and
/// rewrites references to point at locally mirrored copies.
pub struct PageRewriter {
    target_domain: String,
    link_pattern: Regex,
    css_url_pattern: Regex,
    js_url_pattern: Regex,
}

impl PageRewriter {
    pub fn new(target_domain: &str) -> Result<Self> {
        let escaped = regex::escape(target_domain.strip_prefix("www.").unwrap_or(target_domain));
        let link_pattern =
            Regex::new(&format!(r"https?://(?:www\.)?{}(?::\d+)?/[\w\-/.]+", escaped))
                .context("Failed to compile link pattern")?;
        let css_url_pattern = Regex::new(r#"url\(['"]?([^'")]+)['"]?\)"#)
            .context("Failed to compile CSS url pattern")?;
        let js_url_pattern = Regex::new(r#"(['"])(https?://[^'"]+)['"]"#)
            .context("Failed to compile JS url pattern")?;

        Ok(Self {
            target_domain: target_domain
                .strip_prefix("www.")
                .unwrap_or(target_domain)
                .to_string(),
            link_pattern,
            css_url_pattern,
            js_url_pattern,
        })
    }

    /// Directory-form base URL for a page: query and fragment stripped,
    /// trimmed back to the last `/` so later resolution is
    /// directory-relative.
    pub fn page_base_url(page_url: &str) -> String {
        let mut base = page_url;
        if let Some(idx) = base.find(['?', '#']) {
            base = &base[..idx];
        }
        if base.ends_with('/') {
            return base.to_string();
        }
        // Slashes before this point belong to the scheme separator, not the path.
        let host_start = base.find("://").map_or(0, |idx| idx + 3);
        match base[host_start..].rfind('/') {
            Some(idx) => base[..=host_start + idx].to_string(),
            None => format!("{}/", base),
        }
    }

    /// Same-domain navigable links, deduplicated in discovery order.
    pub fn extract_page_links(&self, html: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.link_pattern
            .find_iter(html)
            .map(|m| m.as_str().to_string())
            .filter(|link| seen.insert(link.clone()))
            .collect()
    }

    /// Resolves a raw in-page reference against the page's base URL.
    /// Returns `None` for skipped schemes and for anything that fails the
    /// safety gate; callers leave such references untouched.
    pub fn resolve_resource_url(&self, base_url: &str, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() || SKIPPED_PREFIXES.iter().any(|p| raw.starts_with(p)) {
            return None;
        }

        let absolute = if raw.starts_with("http://") || raw.starts_with("https://") {
            raw.to_string()
        } else if let Some(rest) = raw.strip_prefix("//") {
            let scheme = url::Url::parse(base_url).ok()?.scheme().to_string();
            format!("{}://{}", scheme, rest)
        } else if raw.starts_with('/') {
            // Root-relative: rebuild from the base's origin so parser quirks
            // cannot drop the leading path.
            let base = url::Url::parse(base_url).ok()?;
            let mut origin = format!("{}://{}", base.scheme(), base.host_str()?);
            if let Some(port) = base.port() {
                origin.push_str(&format!(":{}", port));
            }
            format!("{}{}", origin, raw)
        } else {
            let base = url::Url::parse(base_url).ok()?;
            base.join(raw).ok()?.to_string()
        };

        if !safety::is_url_safe(&absolute) {
            return None;
        }
        Some(absolute)
    }

    /// Single data-driven pass over the resource descriptors plus inline
    /// `style` attributes. Malformed references are skipped, never fatal.
    pub fn scan_resources(&self, html: &str, page_url: &str) -> Vec<ScannedResource> {
        let base_url = Self::page_base_url(page_url);
        let document = Document::from(html);
        let mut resources = Vec::new();

        for &(tag, attr) in RESOURCE_DESCRIPTORS {
            for node in document.find(Name(tag)) {
                let Some(value) = node.attr(attr) else {
                    continue;
                };

                if attr == "srcset" {
                    for candidate in split_srcset(value) {
                        if let Some(absolute) =
                            self.resolve_resource_url(&base_url, &candidate.url)
                        {
                            resources.push(ScannedResource {
                                original: candidate.url,
                                absolute,
                                kind: ResourceKind::Image,
                            });
                        }
                    }
                    continue;
                }

                if let Some(absolute) = self.resolve_resource_url(&base_url, value) {
                    let kind = classify(tag, node.attr("rel"), &absolute);
                    resources.push(ScannedResource {
                        original: value.to_string(),
                        absolute,
                        kind,
                    });
                }
            }
        }

        // Inline style attributes carrying url(...) references.
        for node in document.find(select::predicate::Attr("style", ())) {
            let Some(style) = node.attr("style") else {
                continue;
            };
            if !style.contains("url(") {
                continue;
            }
            for raw in self.extract_css_urls(style) {
                if let Some(absolute) = self.resolve_resource_url(&base_url, &raw) {
                    resources.push(ScannedResource {
                        original: raw,
                        absolute,
                        kind: ResourceKind::Image,
                    });
                }
            }
        }

        resources
    }

    /// Raw targets of `url(...)` references in a CSS body, skip-list applied.
    pub fn extract_css_urls(&self, css: &str) -> Vec<String> {
        self.css_url_pattern
            .captures_iter(css)
            .filter_map(|cap| cap.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|url| {
                !url.is_empty() && !SKIPPED_PREFIXES.iter().any(|p| url.starts_with(p))
            })
            .collect()
    }

    /// Absolute same-origin string literals in a JS body.
    pub fn extract_js_urls(&self, js: &str) -> Vec<String> {
        self.js_url_pattern
            .captures_iter(js)
            .filter_map(|cap| cap.get(2))
            .map(|m| m.as_str().to_string())
            .filter(|url| url_domain(url).as_deref() == Some(self.target_domain.as_str()))
            .collect()
    }

    /// Rewrites every reference with an entry in `resolved` (raw value ->
    /// relative local path) and appends the runtime interception snippet.
    /// References without an entry keep their original value.
    pub fn rewrite_page(
        &self,
        html: &str,
        resolved: &HashMap<String, String>,
    ) -> String {
        let document = Document::from(html);
        let mut rewritten = html.to_string();

        for &(tag, attr) in RESOURCE_DESCRIPTORS {
            for node in document.find(Name(tag)) {
                let Some(value) = node.attr(attr) else {
                    continue;
                };

                let replacement = if attr == "srcset" {
                    let new_value = self.rewrite_srcset(value, resolved);
                    (new_value != value).then_some(new_value)
                } else {
                    resolved.get(value).cloned()
                };

                if let Some(new_value) = replacement {
                    replace_attribute(&mut rewritten, attr, value, &new_value);
                }
            }
        }

        for node in document.find(select::predicate::Attr("style", ())) {
            let Some(style) = node.attr("style") else {
                continue;
            };
            if !style.contains("url(") {
                continue;
            }
            let new_style = self.rewrite_css_urls(style, resolved);
            if new_style != style {
                replace_attribute(&mut rewritten, "style", style, &new_style);
            }
        }

        append_interceptor(&mut rewritten);
        rewritten
    }

    /// Rewrites each srcset candidate independently, preserving descriptor
    /// text and ordering; candidates without a mapping stay as they are.
    pub fn rewrite_srcset(&self, srcset: &str, resolved: &HashMap<String, String>) -> String {
        split_srcset(srcset)
            .into_iter()
            .map(|candidate| {
                let url = resolved
                    .get(&candidate.url)
                    .cloned()
                    .unwrap_or(candidate.url);
                match candidate.descriptor {
                    Some(descriptor) => format!("{} {}", url, descriptor),
                    None => url,
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Rewrites `url(...)` references in CSS text from the resolved map.
    pub fn rewrite_css_urls(&self, css: &str, resolved: &HashMap<String, String>) -> String {
        self.css_url_pattern
            .replace_all(css, |caps: &regex::Captures| {
                let original = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
                match resolved.get(original) {
                    Some(relative) => format!("url({})", relative),
                    None => caps[0].to_string(),
                }
            })
            .to_string()
    }

    /// Rewrites quoted absolute URLs in JS text from the resolved map.
    pub fn rewrite_js_urls(&self, js: &str, resolved: &HashMap<String, String>) -> String {
        self.js_url_pattern
            .replace_all(js, |caps: &regex::Captures| {
                let quote = &caps[1];
                let original = &caps[2];
                match resolved.get(original) {
                    Some(relative) => format!("{}{}{}", quote, relative, quote),
                    None => caps[0].to_string(),
                }
            })
            .to_string()
    }

    /// Rewrites a downloaded stylesheet in place: every `url(...)` it
    /// references is resolved against the stylesheet's own URL, mirrored,
    /// and repointed at a path relative to the stylesheet's location.
    /// Runs only for the worker that actually fetched the file.
    pub async fn process_stylesheet(
        &self,
        local_path: &Path,
        file_url: &str,
        mapper: &Mutex<PathMapper>,
        downloader: &ResourceDownloader,
    ) -> Result<()> {
        let content = std::fs::read_to_string(local_path)
            .with_context(|| format!("Failed to read stylesheet: {:?}", local_path))?;
        let base_url = Self::page_base_url(file_url);

        let mut resolved = HashMap::new();
        for raw in self.extract_css_urls(&content) {
            let Some(absolute) = self.resolve_resource_url(&base_url, &raw) else {
                continue;
            };
            let mapped = {
                let mut mapper = mapper.lock().unwrap();
                match mapper.map_url(&absolute) {
                    Ok(mapped) => mapped,
                    Err(e) => {
                        eprintln!("⚠️  Failed to map {}: {}", absolute, e);
                        continue;
                    }
                }
            };
            if downloader
                .download(&absolute, &mapped.local_path)
                .await
                .is_success()
            {
                let relative =
                    PathMapper::relative_path_between(local_path, &mapped.local_path);
                resolved.insert(raw, relative);
            }
        }

        if !resolved.is_empty() {
            let rewritten = self.rewrite_css_urls(&content, &resolved);
            std::fs::write(local_path, rewritten)
                .with_context(|| format!("Failed to rewrite stylesheet: {:?}", local_path))?;
        }
        Ok(())
    }

    /// Rewrites a downloaded script in place: same-origin absolute string
    /// literals are mirrored and repointed relative to the script's location.
    pub async fn process_script(
        &self,
        local_path: &Path,
        mapper: &Mutex<PathMapper>,
        downloader: &ResourceDownloader,
    ) -> Result<()> {
        let content = std::fs::read_to_string(local_path)
            .with_context(|| format!("Failed to read script: {:?}", local_path))?;

        let mut resolved = HashMap::new();
        for absolute in self.extract_js_urls(&content) {
            let mapped = {
                let mut mapper = mapper.lock().unwrap();
                match mapper.map_url(&absolute) {
                    Ok(mapped) => mapped,
                    Err(e) => {
                        eprintln!("⚠️  Failed to map {}: {}", absolute, e);
                        continue;
                    }
                }
            };
            if downloader
                .download(&absolute, &mapped.local_path)
                .await
                .is_success()
            {
                let relative =
                    PathMapper::relative_path_between(local_path, &mapped.local_path);
                resolved.insert(absolute, relative);
            }
        }

        if !resolved.is_empty() {
            let rewritten = self.rewrite_js_urls(&content, &resolved);
            std::fs::write(local_path, rewritten)
                .with_context(|| format!("Failed to rewrite script: {:?}", local_path))?;
        }
        Ok(())
    }
}

struct SrcsetCandidate {
    url: String,
    descriptor: Option<String>,
}

fn split_srcset(srcset: &str) -> Vec<SrcsetCandidate> {
    srcset
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut pieces = part.splitn(2, char::is_whitespace);
            let url = pieces.next().unwrap_or("").to_string();
            let descriptor = pieces
                .next()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string);
            SrcsetCandidate { url, descriptor }
        })
        .collect()
}

fn classify(tag: &str, rel: Option<&str>, absolute: &str) -> ResourceKind {
    match tag {
        "link" => {
            if rel.map_or(false, |r| r.contains("stylesheet"))
                || absolute.ends_with(".css")
            {
                ResourceKind::Stylesheet
            } else {
                ResourceKind::Other
            }
        }
        "script" => ResourceKind::Script,
        "img" | "source" => ResourceKind::Image,
        "video" | "audio" => ResourceKind::Media,
        _ => {
            if absolute.ends_with(".css") {
                ResourceKind::Stylesheet
            } else if absolute.ends_with(".js") {
                ResourceKind::Script
            } else {
                ResourceKind::Other
            }
        }
    }
}

/// Targeted attribute replacement in serialized markup, both quote styles.
fn replace_attribute(html: &mut String, attr: &str, old_value: &str, new_value: &str) {
    let double_old = format!("{}=\"{}\"", attr, old_value);
    let double_new = format!("{}=\"{}\"", attr, new_value);
    if html.contains(&double_old) {
        *html = html.replace(&double_old, &double_new);
        return;
    }
    let single_old = format!("{}='{}'", attr, old_value);
    let single_new = format!("{}='{}'", attr, new_value);
    *html = html.replace(&single_old, &single_new);
}

fn append_interceptor(html: &mut String) {
    // Case-insensitive search on the raw bytes: a lowercased copy can have a
    // different byte length, so its indices do not transfer to the original.
    let needle = b"</body>";
    let position = html
        .as_bytes()
        .windows(needle.len())
        .rposition(|window| window.eq_ignore_ascii_case(needle));
    match position {
        Some(idx) => html.insert_str(idx, INTERCEPTOR_SNIPPET),
        None => html.push_str(INTERCEPTOR_SNIPPET),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewriter() -> PageRewriter {
        PageRewriter::new("example.com").unwrap()
    }

    #[test]
    fn test_page_base_url_normalization() {
        assert_eq!(
            PageRewriter::page_base_url("https://example.com/blog/post.html"),
            "https://example.com/blog/"
        );
        assert_eq!(
            PageRewriter::page_base_url("https://example.com/blog/"),
            "https://example.com/blog/"
        );
        assert_eq!(
            PageRewriter::page_base_url("https://example.com/page?x=1#top"),
            "https://example.com/"
        );
        assert_eq!(
            PageRewriter::page_base_url("https://example.com"),
            "https://example.com/"
        );
        assert_eq!(
            PageRewriter::page_base_url("http://a/x.html"),
            "http://a/"
        );
        assert_eq!(PageRewriter::page_base_url("http://a"), "http://a/");
    }

    #[test]
    fn test_extract_page_links_dedupes() {
        let rewriter = rewriter();
        let html = r#"
            <a href="https://example.com/about.html">About</a>
            <a href="https://example.com/about.html">About again</a>
            <a href="https://www.example.com/contact.html">Contact</a>
            <a href="https://other.com/page.html">External</a>
        "#;
        let links = rewriter.extract_page_links(html);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0], "https://example.com/about.html");
        assert_eq!(links[1], "https://www.example.com/contact.html");
    }

    #[test]
    fn test_resolve_resource_url_variants() {
        let rewriter = rewriter();
        let base = "https://example.com/subdir/";

        assert_eq!(
            rewriter.resolve_resource_url(base, "../style.css").unwrap(),
            "https://example.com/style.css"
        );
        assert_eq!(
            rewriter.resolve_resource_url(base, "./script.js").unwrap(),
            "https://example.com/subdir/script.js"
        );
        assert_eq!(
            rewriter
                .resolve_resource_url(base, "images/photo.jpg")
                .unwrap(),
            "https://example.com/subdir/images/photo.jpg"
        );
        assert_eq!(
            rewriter
                .resolve_resource_url(base, "//cdn.example.com/lib.js")
                .unwrap(),
            "https://cdn.example.com/lib.js"
        );
        assert_eq!(
            rewriter.resolve_resource_url(base, "/root.css").unwrap(),
            "https://example.com/root.css"
        );
    }

    #[test]
    fn test_resolve_preserves_port() {
        let rewriter = rewriter();
        assert_eq!(
            rewriter
                .resolve_resource_url("https://example.com:8443/dir/", "/asset.js")
                .unwrap(),
            "https://example.com:8443/asset.js"
        );
    }

    #[test]
    fn test_resolve_skips_special_schemes() {
        let rewriter = rewriter();
        let base = "https://example.com/";
        for raw in ["data:image/png;base64,xyz", "#anchor", "javascript:void(0)", "mailto:a@b.c", "tel:+123", ""] {
            assert!(rewriter.resolve_resource_url(base, raw).is_none(), "{}", raw);
        }
    }

    #[test]
    fn test_scan_finds_tag_resources() {
        let rewriter = rewriter();
        let html = r#"
            <html><head>
                <link rel="stylesheet" href="/css/style.css">
                <script src="/js/app.js"></script>
            </head><body>
                <img src="/images/logo.png" alt="logo">
                <video src="/media/clip.mp4"></video>
                <object data="/files/doc.pdf"></object>
            </body></html>
        "#;
        let resources = rewriter.scan_resources(html, "https://example.com/index.html");

        assert_eq!(resources.len(), 5);
        let kinds: Vec<_> = resources.iter().map(|r| r.kind).collect();
        assert!(kinds.contains(&ResourceKind::Stylesheet));
        assert!(kinds.contains(&ResourceKind::Script));
        assert!(kinds.contains(&ResourceKind::Image));
        assert!(kinds.contains(&ResourceKind::Media));
        assert!(resources
            .iter()
            .all(|r| r.absolute.starts_with("https://example.com/")));
    }

    #[test]
    fn test_scan_finds_srcset_candidates() {
        let rewriter = rewriter();
        let html = r#"<img srcset="/small.jpg 480w, /large.jpg 1024w" src="/fallback.jpg">"#;
        let resources = rewriter.scan_resources(html, "https://example.com/");

        let urls: Vec<_> = resources.iter().map(|r| r.absolute.as_str()).collect();
        assert!(urls.contains(&"https://example.com/small.jpg"));
        assert!(urls.contains(&"https://example.com/large.jpg"));
        assert!(urls.contains(&"https://example.com/fallback.jpg"));
    }

    #[test]
    fn test_scan_finds_inline_style_urls() {
        let rewriter = rewriter();
        let html = r#"<div style="background-image: url('/images/bg.jpg')">x</div>"#;
        let resources = rewriter.scan_resources(html, "https://example.com/");

        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].absolute, "https://example.com/images/bg.jpg");
        assert_eq!(resources[0].original, "/images/bg.jpg");
    }

    #[test]
    fn test_extract_css_urls() {
        let rewriter = rewriter();
        let css = r#"
            .a { background-image: url('/images/bg1.jpg'); }
            .b { background: url("/images/bg2.jpg") no-repeat; }
            .c { background: url(/images/bg3.jpg); }
            .d { background: url(data:image/png;base64,abc); }
        "#;
        let urls = rewriter.extract_css_urls(css);
        assert_eq!(
            urls,
            vec!["/images/bg1.jpg", "/images/bg2.jpg", "/images/bg3.jpg"]
        );
    }

    #[test]
    fn test_extract_js_urls_same_origin_only() {
        let rewriter = rewriter();
        let js = r#"
            const api = "https://example.com/api/data.json";
            const cdn = 'https://cdn.other.com/lib.js';
            const rel = "/not/absolute";
        "#;
        let urls = rewriter.extract_js_urls(js);
        assert_eq!(urls, vec!["https://example.com/api/data.json"]);
    }

    #[test]
    fn test_rewrite_page_rewrites_mapped_attributes() {
        let rewriter = rewriter();
        let html = r#"<html><body><img src="/images/logo.png"><link rel="stylesheet" href="/css/style.css"></body></html>"#;

        let mut resolved = HashMap::new();
        resolved.insert("/images/logo.png".to_string(), "images/logo.png".to_string());
        resolved.insert("/css/style.css".to_string(), "css/style.css".to_string());

        let rewritten = rewriter.rewrite_page(html, &resolved);
        assert!(rewritten.contains(r#"src="images/logo.png""#));
        assert!(rewritten.contains(r#"href="css/style.css""#));
        assert!(!rewritten.contains(r#"src="/images/logo.png""#));
    }

    #[test]
    fn test_rewrite_page_leaves_unmapped_untouched() {
        let rewriter = rewriter();
        let html = r#"<html><body><img src="/broken.png"></body></html>"#;
        let rewritten = rewriter.rewrite_page(html, &HashMap::new());
        assert!(rewritten.contains(r#"src="/broken.png""#));
    }

    #[test]
    fn test_rewrite_page_appends_interceptor_before_body_close() {
        let rewriter = rewriter();
        let html = "<html><body><p>hi</p></body></html>";
        let rewritten = rewriter.rewrite_page(html, &HashMap::new());

        let script_at = rewritten.find("document.addEventListener").unwrap();
        let body_close_at = rewritten.rfind("</body>").unwrap();
        assert!(script_at < body_close_at);
    }

    #[test]
    fn test_rewrite_page_handles_multibyte_text_before_body_close() {
        let rewriter = rewriter();
        // Characters like 'İ' grow when lowercased, which must not shift
        // where the snippet lands.
        let html = format!("<html><body>{}</body></html>", "İ".repeat(8));
        let rewritten = rewriter.rewrite_page(&html, &HashMap::new());

        assert!(rewritten.ends_with("</body></html>"));
        let script_at = rewritten.find("document.addEventListener").unwrap();
        assert!(script_at < rewritten.rfind("</body>").unwrap());
    }

    #[test]
    fn test_rewrite_page_appends_interceptor_with_uppercase_body_tag() {
        let rewriter = rewriter();
        let rewritten = rewriter.rewrite_page("<HTML><BODY>hi</BODY></HTML>", &HashMap::new());

        assert!(rewritten.ends_with("</BODY></HTML>"));
        assert!(rewritten.contains("document.addEventListener"));
    }

    #[test]
    fn test_rewrite_srcset_preserves_descriptors_and_order() {
        let rewriter = rewriter();
        let mut resolved = HashMap::new();
        resolved.insert("/small.jpg".to_string(), "images/small.jpg".to_string());

        let out = rewriter.rewrite_srcset("/small.jpg 480w, /large.jpg 1024w", &resolved);
        assert_eq!(out, "images/small.jpg 480w, /large.jpg 1024w");
    }

    #[test]
    fn test_rewrite_css_urls() {
        let rewriter = rewriter();
        let mut resolved = HashMap::new();
        resolved.insert("/images/bg.jpg".to_string(), "../images/bg.jpg".to_string());

        let css = ".hero { background: url('/images/bg.jpg'); color: red; }";
        let out = rewriter.rewrite_css_urls(css, &resolved);
        assert!(out.contains("url(../images/bg.jpg)"));
        assert!(out.contains("color: red"));
    }

    #[test]
    fn test_rewrite_js_urls_keeps_quote_style() {
        let rewriter = rewriter();
        let mut resolved = HashMap::new();
        resolved.insert(
            "https://example.com/api/data.json".to_string(),
            "api/data.json".to_string(),
        );

        let js = r#"fetch("https://example.com/api/data.json"); load('https://example.com/other');"#;
        let out = rewriter.rewrite_js_urls(js, &resolved);
        assert!(out.contains(r#"fetch("api/data.json")"#));
        assert!(out.contains("'https://example.com/other'"));
    }
}
