//! Document loading from files, directories and web pages

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use pmind_core::{Document, Error, Lookup, Result};

/// Format-specific loader, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderKind {
    PlainText,
    Markdown,
    Pdf,
}

impl LoaderKind {
    /// Recognized extensions, compared case-insensitively
    pub const EXTENSIONS: &'static [(&'static str, LoaderKind)] = &[
        ("txt", LoaderKind::PlainText),
        ("text", LoaderKind::PlainText),
        ("md", LoaderKind::Markdown),
        ("markdown", LoaderKind::Markdown),
        ("pdf", LoaderKind::Pdf),
    ];

    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::EXTENSIONS
            .iter()
            .find(|(ext, _)| *ext == extension)
            .map(|(_, kind)| *kind)
    }

    /// Value of the `kind` metadata entry on loaded documents
    pub fn name(&self) -> &'static str {
        match self {
            LoaderKind::PlainText => "text",
            LoaderKind::Markdown => "markdown",
            LoaderKind::Pdf => "pdf",
        }
    }

    /// Load one file as a single document
    pub async fn load(&self, path: &Path) -> Result<Document> {
        let content = match self {
            LoaderKind::PlainText | LoaderKind::Markdown => {
                let bytes = tokio::fs::read(path).await?;
                String::from_utf8(bytes).map_err(|_| {
                    Error::UnsupportedFormat(format!("{} is not valid UTF-8 text", path.display()))
                })?
            }
            LoaderKind::Pdf => extract_pdf_text(path).await?,
        };

        Ok(Document::new(content, path.display().to_string())?.with_metadata("kind", self.name()))
    }
}

/// PDF text for the whole file. The extractor can panic on malformed input,
/// so it runs on the blocking pool where a panic becomes a join error.
async fn extract_pdf_text(path: &Path) -> Result<String> {
    let owned = path.to_path_buf();
    let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
        .await
        .map_err(|e| {
            Error::UnsupportedFormat(format!("PDF extraction crashed for {}: {}", path.display(), e))
        })?;

    extracted.map_err(|e| {
        Error::UnsupportedFormat(format!("cannot extract text from {}: {}", path.display(), e))
    })
}

/// A source that produced no documents, and why
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSource {
    pub source: String,
    pub reason: String,
}

/// Outcome of loading a batch of sources
#[derive(Debug, Default, Serialize)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    /// Sources that produced at least one document
    pub loaded: Vec<String>,
    /// Sources with nothing to load (unknown shape, no supported files)
    pub empty: Vec<SkippedSource>,
    /// Sources that failed with an error
    pub failed: Vec<SkippedSource>,
    /// Files inside directory sources that could not be read
    pub files_skipped: Vec<SkippedSource>,
}

/// Reduces an HTML page to its visible text
struct HtmlExtractor {
    title: Selector,
    horizontal_space: Regex,
    blank_lines: Regex,
}

const SKIPPED_ELEMENTS: &[&str] = &["head", "script", "style", "noscript", "template", "svg"];

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

impl HtmlExtractor {
    fn new() -> Result<Self> {
        let invalid = |e: String| Error::InvalidConfiguration(format!("HTML extractor: {}", e));

        Ok(Self {
            title: Selector::parse("title").map_err(|e| invalid(e.to_string()))?,
            horizontal_space: Regex::new(r"[^\S\n]+").map_err(|e| invalid(e.to_string()))?,
            blank_lines: Regex::new(r"\n{3,}").map_err(|e| invalid(e.to_string()))?,
        })
    }

    /// Page title and body text, block elements separated by blank lines
    fn extract(&self, html: &str) -> (Option<String>, String) {
        let page = Html::parse_document(html);

        let title = page
            .select(&self.title)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty());

        let mut raw = String::new();
        collect_text(page.root_element(), &mut raw);

        let collapsed = self.horizontal_space.replace_all(&raw, " ");
        let lines: Vec<&str> = collapsed.lines().map(str::trim).collect();
        let joined = lines.join("\n");
        let text = self.blank_lines.replace_all(&joined, "\n\n");

        (title, text.trim().to_string())
    }
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_ELEMENTS.contains(&name) {
        return;
    }

    let block = BLOCK_ELEMENTS.contains(&name);
    if block {
        out.push_str("\n\n");
    }
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            collect_text(child_element, out);
        } else if let Node::Text(text) = child.value() {
            out.push_str(text);
        }
    }
    if block {
        out.push_str("\n\n");
    }
}

/// Turns sources (paths, directories, http(s) URLs) into documents
pub struct DocumentLoader {
    client: Client,
    html: HtmlExtractor,
}

impl DocumentLoader {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("pmind/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::InvalidConfiguration(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            html: HtmlExtractor::new()?,
        })
    }

    /// Load one source.
    ///
    /// Directories are walked recursively and unrecognized files skipped; a
    /// single file with an unknown extension is `UnsupportedFormat`. Network
    /// failures and non-text pages are `SourceUnreachable`. A source that is
    /// neither an existing path nor an http(s) URL is `Lookup::Empty`.
    pub async fn load(&self, source: &str) -> Result<Lookup<Vec<Document>>> {
        Ok(self.load_source(source).await?.0)
    }

    /// Like [`load`](Self::load), also returning the files of a directory
    /// source that failed to load
    async fn load_source(&self, source: &str) -> Result<(Lookup<Vec<Document>>, Vec<SkippedSource>)> {
        if let Some(url) = parse_web_url(source) {
            let document = self.load_url(source, url).await?;
            return Ok((Lookup::Found(vec![document]), Vec::new()));
        }

        let path = Path::new(source);
        if path.is_dir() {
            return self.load_directory(path).await;
        }
        if path.is_file() {
            return Ok((Lookup::Found(vec![load_file(path).await?]), Vec::new()));
        }

        warn!(source, "source is neither an existing path nor an http(s) URL");
        let empty = Lookup::empty(format!(
            "'{}' is neither an existing path nor an http(s) URL",
            source
        ));
        Ok((empty, Vec::new()))
    }

    /// Load every source, recording failures instead of stopping at them
    pub async fn load_many<S: AsRef<str>>(&self, sources: &[S]) -> LoadReport {
        let mut report = LoadReport::default();

        for source in sources.iter().map(AsRef::as_ref) {
            let outcome = self.load_source(source).await.map(|(lookup, skipped)| {
                report.files_skipped.extend(skipped);
                lookup
            });
            match outcome {
                Ok(Lookup::Found(documents)) => {
                    info!(source, documents = documents.len(), "loaded source");
                    report.loaded.push(source.to_string());
                    report.documents.extend(documents);
                }
                Ok(Lookup::Empty { reason }) => {
                    report.empty.push(SkippedSource {
                        source: source.to_string(),
                        reason,
                    });
                }
                Err(e) => {
                    warn!(source, error = %e, "failed to load source");
                    report.failed.push(SkippedSource {
                        source: source.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        report
    }

    async fn load_directory(&self, dir: &Path) -> Result<(Lookup<Vec<Document>>, Vec<SkippedSource>)> {
        let mut files = Vec::new();
        collect_files(dir, &mut files)?;

        let mut documents = Vec::new();
        let mut skipped = Vec::new();
        for path in files {
            let Some(kind) = LoaderKind::from_path(&path) else {
                debug!(path = %path.display(), "skipping unrecognized file");
                continue;
            };
            match kind.load(&path).await {
                Ok(document) => documents.push(document),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable file");
                    skipped.push(SkippedSource {
                        source: path.display().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if documents.is_empty() {
            let empty = Lookup::empty(format!("no loadable files under {}", dir.display()));
            return Ok((empty, skipped));
        }
        Ok((Lookup::Found(documents), skipped))
    }

    /// Fetch one page. Provenance is `source` exactly as given, not the
    /// normalized URL.
    async fn load_url(&self, source: &str, url: Url) -> Result<Document> {
        let location = source.to_string();
        let unreachable = |message: String| Error::source_unreachable(location.clone(), message);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unreachable(format!("HTTP status {}", status)));
        }

        let mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();

        let kind = match mime.as_str() {
            "text/html" | "application/xhtml+xml" => "html",
            "text/plain" => "text",
            "text/markdown" | "text/x-markdown" => "markdown",
            other => {
                return Err(unreachable(format!(
                    "unsupported content type '{}'",
                    if other.is_empty() { "none" } else { other }
                )));
            }
        };

        let body = response
            .text()
            .await
            .map_err(|e| unreachable(format!("cannot read body: {}", e)))?;

        let document = if kind == "html" {
            let (title, text) = self.html.extract(&body);
            let document = Document::new(text, location.as_str())?.with_metadata("kind", kind);
            match title {
                Some(title) => document.with_metadata("title", title),
                None => document,
            }
        } else {
            Document::new(body, location.as_str())?.with_metadata("kind", kind)
        };

        debug!(url = %location, kind, chars = document.content().len(), "fetched page");
        Ok(document)
    }
}

/// Load a single file by extension
pub async fn load_file(path: &Path) -> Result<Document> {
    let kind = LoaderKind::from_path(path).ok_or_else(|| {
        Error::UnsupportedFormat(format!(
            "{} has no recognized extension (supported: {})",
            path.display(),
            LoaderKind::EXTENSIONS
                .iter()
                .map(|(ext, _)| *ext)
                .collect::<Vec<_>>()
                .join(", ")
        ))
    })?;
    kind.load(path).await
}

fn parse_web_url(source: &str) -> Option<Url> {
    Url::parse(source)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

/// Files under `dir`, depth first, sorted by path at each level
fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            collect_files(&path, files)?;
        } else if file_type.is_file() || path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}
