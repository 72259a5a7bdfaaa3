//! Whole-document driver.
//!
//! [`BookWriter`] lays out every article of a [`Book`] with one
//! [`LayoutWalker`], adds the title page, chapter separators, attribution
//! appendix and license articles, and hands the finished story to a
//! [`RenderSink`]. When the sink rejects the story the book is laid out a
//! second time with each article probed individually; articles the sink
//! still cannot take are replaced by a plain-text warning box.

use crate::config::LayoutConfig;
use crate::context::Scope;
use crate::debug::DebugLogger;
use crate::error::Result;
use crate::flowable::{Flowable, PageBreak, Paragraph, TocEntry, TocLevel, escape_markup};
use crate::grouper::PaginationGrouper;
use crate::measure::{BoxMetrics, ImageCatalog};
use crate::metrics::{ArticleMetrics, LayoutMetrics};
use crate::node::DocumentNode;
use crate::registry::{ArticleAttribution, DocumentRegistry, article_id};
use crate::style::{HeadingMode, TextMode, heading_style, text_style};
use crate::types::Pt;
use crate::walker::LayoutWalker;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSource {
    pub title: String,
    #[serde(default)]
    pub display_title: Option<String>,
    /// Canonical URL of the article; internal links only target articles that have one.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub wiki_url: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub tree: DocumentNode,
}

impl ArticleSource {
    pub fn new(title: impl Into<String>, tree: DocumentNode) -> Self {
        Self {
            title: title.into(),
            display_title: None,
            url: None,
            wiki_url: String::new(),
            authors: Vec::new(),
            tree,
        }
    }

    pub fn with_url(mut self, wiki_url: impl Into<String>, url: impl Into<String>) -> Self {
        self.wiki_url = wiki_url.into();
        self.url = Some(url.into());
        self
    }

    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    pub fn heading(&self) -> &str {
        self.display_title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BookItem {
    Chapter(String),
    Article(ArticleSource),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Book {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub items: Vec<BookItem>,
    pub licenses: Vec<ArticleSource>,
}

impl Book {
    pub fn articles(&self) -> impl Iterator<Item = &ArticleSource> {
        self.items.iter().filter_map(|item| match item {
            BookItem::Article(article) => Some(article),
            BookItem::Chapter(_) => None,
        })
    }
}

/// Consumer of the finished story.
pub trait RenderSink {
    fn build(&mut self, story: Vec<Flowable>, registry: &DocumentRegistry) -> Result<()>;

    /// Checks that one article's flowables can be rendered on their own.
    fn probe(&mut self, flowables: &[Flowable]) -> Result<()> {
        let _ = flowables;
        Ok(())
    }
}

/// Keeps the last story it was given.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub story: Vec<Flowable>,
    pub registry: DocumentRegistry,
    pub builds: usize,
}

impl RenderSink for CollectingSink {
    fn build(&mut self, story: Vec<Flowable>, registry: &DocumentRegistry) -> Result<()> {
        self.story = story;
        self.registry = registry.clone();
        self.builds += 1;
        Ok(())
    }
}

pub struct BookWriter {
    config: LayoutConfig,
    metrics: Arc<dyn BoxMetrics>,
    images: Arc<dyn ImageCatalog>,
    debug: Option<Arc<DebugLogger>>,
}

impl BookWriter {
    pub fn new(
        config: LayoutConfig,
        metrics: Arc<dyn BoxMetrics>,
        images: Arc<dyn ImageCatalog>,
    ) -> Self {
        Self {
            config,
            metrics,
            images,
            debug: None,
        }
    }

    pub fn with_debug(mut self, debug: Arc<DebugLogger>) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn render(&self, book: &Book, sink: &mut dyn RenderSink) -> Result<LayoutMetrics> {
        match self.render_pass(book, sink, false) {
            Ok(metrics) => Ok(metrics),
            Err(err) if self.config.strict => Err(err),
            Err(err) => {
                log::warn!("rendering failed: {err}; retrying in fail-safe mode");
                let mut metrics = self.render_pass(book, sink, true)?;
                metrics.fail_safe = true;
                Ok(metrics)
            }
        }
    }

    fn render_pass(&self, book: &Book, sink: &mut dyn RenderSink, fail_safe: bool) -> Result<LayoutMetrics> {
        let started = Instant::now();
        let mut walker = LayoutWalker::new(
            self.config.clone(),
            Arc::clone(&self.metrics),
            Arc::clone(&self.images),
        );
        if let Some(debug) = &self.debug {
            walker = walker.with_debug(Arc::clone(debug));
        }
        for article in book.articles() {
            walker
                .registry_mut()
                .add_article_id(article_id(&article.wiki_url, &article.title));
        }
        let article_count = book.articles().count();
        let grouper = PaginationGrouper::new(self.metrics.as_ref(), &self.config);
        let mut metrics = LayoutMetrics::default();
        let mut story = Vec::new();

        if self.config.show_title_page {
            story.extend(self.title_page(book));
        }
        if article_count == 0 {
            story.push(Flowable::Paragraph(Paragraph::new(
                " ",
                text_style(&self.config, TextMode::Body, 0, false, None),
            )));
        }
        story.push(toc_group("Articles"));
        walker.registry_mut().add_toc("Articles", 0);

        let mut after_chapter = false;
        for (index, item) in book.items.iter().enumerate() {
            match item {
                BookItem::Chapter(title) => {
                    story.push(Flowable::NextTemplate(String::new()));
                    story.extend(walker.layout_chapter(title));
                    let next_article = match book.items.get(index + 1) {
                        Some(BookItem::Article(article)) => article.heading().to_string(),
                        _ => String::new(),
                    };
                    story.push(Flowable::NextTemplate(next_article));
                    after_chapter = true;
                }
                BookItem::Article(article) => {
                    let mut items = Vec::new();
                    items.push(Flowable::NextTemplate(article.heading().to_string()));
                    if !after_chapter {
                        items.push(Flowable::PageBreak(self.article_break()));
                    }
                    after_chapter = false;
                    let (body, record) = self.article(&mut walker, article, sink, fail_safe)?;
                    items.extend(body);
                    walker.registry_mut().add_attribution(ArticleAttribution {
                        title: article.heading().to_string(),
                        url: article.url.clone().unwrap_or_default(),
                        authors: article.authors.clone(),
                    });
                    let items = grouper.group(items);
                    metrics.flowable_count += items.len();
                    metrics.record_article(record);
                    story.extend(items);
                }
            }
        }

        if self.config.show_article_attribution {
            story.extend(self.attribution_appendix(walker.registry(), article_count));
        }
        story.extend(self.license_articles(&mut walker, book, article_count)?);

        metrics.warnings = walker.warnings();
        if let Some(debug) = self.debug.as_deref() {
            debug.log_event(
                "book.layout",
                json!({
                    "fail_safe": fail_safe,
                    "articles": article_count,
                    "flowables": story.len(),
                    "warnings": metrics.warnings,
                    "elapsed_ms": started.elapsed().as_secs_f64() * 1000.0,
                }),
            );
        }
        log::info!(
            "laid out {article_count} articles into {} flowables",
            story.len()
        );

        let registry = walker.into_registry();
        let result = sink.build(story, &registry);
        if let Some(debug) = self.debug.as_deref() {
            debug.emit_summary(if fail_safe { "book.fail_safe" } else { "book" });
            debug.flush();
        }
        result.map(|()| metrics)
    }

    fn article_break(&self) -> PageBreak {
        if self.config.page_break_after_article {
            PageBreak::NotAtTop
        } else {
            PageBreak::Conditional(Pt::from_f32(self.config.article_start_min_space))
        }
    }

    /// One article's flowables. In fail-safe mode the sink probes the
    /// article first and a failing article becomes a warning box.
    fn article(
        &self,
        walker: &mut LayoutWalker,
        article: &ArticleSource,
        sink: &mut dyn RenderSink,
        fail_safe: bool,
    ) -> Result<(Vec<Flowable>, ArticleMetrics)> {
        let started = Instant::now();
        let title = article.heading();
        let url = article.url.as_deref();
        let saved = if fail_safe {
            Some(walker.registry().clone())
        } else {
            None
        };

        let failure = match walker.layout_article(title, url, &article.wiki_url, &article.tree) {
            Ok(body) => match saved {
                Some(saved) => match sink.probe(&body) {
                    Ok(()) => Ok(body),
                    Err(err) => {
                        *walker.registry_mut() = saved;
                        Err(err)
                    }
                },
                None => Ok(body),
            },
            Err(err) if self.config.strict => return Err(err),
            Err(err) => Err(err),
        };

        let (body, failed) = match failure {
            Ok(body) => (body, false),
            Err(err) => {
                log::warn!("article {title:?} could not be laid out: {err}");
                if let Some(debug) = self.debug.as_deref() {
                    debug.log_event(
                        "article.failed",
                        json!({"title": title, "code": err.code(), "message": err.to_string()}),
                    );
                    debug.increment("articles.failed", 1);
                }
                let placeholder =
                    walker.layout_failed_article(title, url, &article.wiki_url, &article.tree);
                (placeholder, true)
            }
        };

        let record = ArticleMetrics {
            title: title.to_string(),
            layout_ms: started.elapsed().as_secs_f64() * 1000.0,
            flowable_count: body.len(),
            failed,
        };
        Ok((body, record))
    }

    fn title_page(&self, book: &Book) -> Vec<Flowable> {
        let Some(title) = book.title.as_deref().filter(|t| !t.trim().is_empty()) else {
            return Vec::new();
        };
        let mut out = vec![Flowable::Paragraph(Paragraph::new(
            escape_markup(title),
            text_style(&self.config, TextMode::BookTitle, 0, false, None),
        ))];
        if let Some(subtitle) = book.subtitle.as_deref().filter(|t| !t.trim().is_empty()) {
            out.push(Flowable::Paragraph(Paragraph::new(
                escape_markup(subtitle),
                text_style(&self.config, TextMode::BookSubtitle, 0, false, None),
            )));
        }
        // No header switch when the book opens with a chapter.
        if let Some(BookItem::Article(first)) = book.items.first() {
            out.push(Flowable::NextTemplate(first.heading().to_string()));
            out.push(Flowable::PageBreak(PageBreak::Always));
        }
        out
    }

    fn attribution_appendix(&self, registry: &DocumentRegistry, article_count: usize) -> Vec<Flowable> {
        let style = text_style(&self.config, TextMode::Attribution, 0, false, None);
        let mut out = vec![
            toc_group("References"),
            Flowable::NextTemplate("Article Sources and Contributors".to_string()),
            Flowable::PageBreak(PageBreak::NotAtTop),
        ];
        out.extend(self.appendix_heading("Article Sources and Contributors"));
        for article in &registry.articles {
            out.push(Flowable::Paragraph(Paragraph::new(
                format!(
                    "<b>{}</b> &nbsp;<i>Source</i>: {} &nbsp;<i>Contributors</i>: {} ",
                    escape_markup(&article.title),
                    escape_markup(&article.url),
                    contributors_text(&article.authors)
                ),
                style.clone(),
            )));
        }

        out.push(Flowable::NextTemplate(
            "Image Sources, Licenses and Contributors".to_string(),
        ));
        if article_count > 1 {
            out.push(Flowable::PageBreak(PageBreak::NotAtTop));
        }
        let images = registry.images_by_ordinal();
        if images.is_empty() {
            return out;
        }
        out.extend(self.appendix_heading("Image Sources, Licenses and Contributors"));
        for image in images {
            let license = if image.license.trim().is_empty() {
                "unknown"
            } else {
                image.license.as_str()
            };
            out.push(Flowable::Paragraph(Paragraph::new(
                format!(
                    "<b>{}</b> &nbsp;<i>Source</i>: {} &nbsp;<i>License</i>: {} &nbsp;<i>Contributors</i>: {} ",
                    escape_markup(&image.title),
                    escape_markup(&image.url),
                    escape_markup(license),
                    contributors_text(&image.contributors)
                ),
                style.clone(),
            )));
        }
        out
    }

    fn appendix_heading(&self, title: &str) -> [Flowable; 2] {
        [
            Flowable::Paragraph(Paragraph::new(
                format!("<b>{}</b>", escape_markup(title)),
                heading_style(&self.config, HeadingMode::Article),
            )),
            Flowable::TocEntry(TocEntry {
                text: title.to_string(),
                level: TocLevel::Article,
            }),
        ]
    }

    fn license_articles(
        &self,
        walker: &mut LayoutWalker,
        book: &Book,
        article_count: usize,
    ) -> Result<Vec<Flowable>> {
        let mut out = Vec::new();
        if book.licenses.is_empty() {
            return Ok(out);
        }
        out.push(toc_group("Article Licenses"));
        walker.registry_mut().add_toc("Article Licenses", 0);
        for license in &book.licenses {
            out.push(Flowable::NextTemplate(license.heading().to_string()));
            if article_count > 1 {
                out.push(Flowable::PageBreak(PageBreak::NotAtTop));
            }
            let body = walker.scoped(Scope::License, |w| {
                w.layout_article(license.heading(), None, &license.wiki_url, &license.tree)
            });
            match body {
                Ok(body) => out.extend(body),
                Err(err) if self.config.strict => return Err(err),
                Err(err) => {
                    log::warn!("license {:?} could not be laid out: {err}", license.title);
                    out.extend(walker.layout_failed_article(
                        license.heading(),
                        None,
                        &license.wiki_url,
                        &license.tree,
                    ));
                }
            }
        }
        Ok(out)
    }
}

fn toc_group(text: &str) -> Flowable {
    Flowable::TocEntry(TocEntry {
        text: text.to_string(),
        level: TocLevel::Group,
    })
}

/// Joins contributor names, spelling out anonymous edit counts.
pub fn contributors_text(authors: &[String]) -> String {
    let names: Vec<String> = authors
        .iter()
        .filter(|author| author.as_str() != "ANONIPEDITS:0")
        .map(|author| match author.strip_prefix("ANONIPEDITS:") {
            Some(count) if !count.is_empty() && count.chars().all(|c| c.is_ascii_digit()) => {
                format!("{count} anonymous edits")
            }
            _ => author.clone(),
        })
        .collect();
    if names.is_empty() {
        return "-".to_string();
    }
    escape_markup(&names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LayoutError;
    use crate::measure::EstimatedMetrics;
    use crate::node::NodeKind;
    use crate::types::Size;
    use crate::walker::flowable_text;

    struct NoImages;

    impl ImageCatalog for NoImages {
        fn size(&self, id: &str, _w: Pt, _h: Pt, _dpi: f32) -> Result<Size> {
            Err(LayoutError::MeasurementFailure(format!("no image {id}")))
        }
    }

    /// Rejects the first full build and any article containing `poison`.
    struct PickySink {
        poison: &'static str,
        builds: usize,
        probes: usize,
        story: Vec<Flowable>,
    }

    impl RenderSink for PickySink {
        fn build(&mut self, story: Vec<Flowable>, _registry: &DocumentRegistry) -> Result<()> {
            self.builds += 1;
            if self.builds == 1 {
                return Err(LayoutError::FatalBackend("frame overflow".into()));
            }
            self.story = story;
            Ok(())
        }

        fn probe(&mut self, flowables: &[Flowable]) -> Result<()> {
            self.probes += 1;
            if flowables.iter().any(|f| flowable_text(f).contains(self.poison)) {
                return Err(LayoutError::FatalBackend("unrenderable".into()));
            }
            Ok(())
        }
    }

    fn writer(config: LayoutConfig) -> BookWriter {
        BookWriter::new(config, Arc::new(EstimatedMetrics::new()), Arc::new(NoImages))
    }

    fn article(title: &str, body: &str) -> ArticleSource {
        let tree = DocumentNode::new(NodeKind::Article).with_child(
            DocumentNode::new(NodeKind::Paragraph).with_child(DocumentNode::text(body)),
        );
        ArticleSource::new(title, tree)
            .with_url("https://wiki.example/", format!("https://wiki.example/{title}"))
            .with_authors(vec!["Ada".into(), "ANONIPEDITS:3".into(), "ANONIPEDITS:0".into()])
    }

    fn texts(story: &[Flowable]) -> Vec<String> {
        let mut out = Vec::new();
        for flowable in story {
            match flowable {
                Flowable::KeepTogether(items) => out.extend(texts(items)),
                other => out.push(flowable_text(other)),
            }
        }
        out
    }

    #[test]
    fn anonymous_edits_are_spelled_out() {
        let authors = vec!["Ada".to_string(), "ANONIPEDITS:3".into(), "ANONIPEDITS:0".into()];
        assert_eq!(contributors_text(&authors), "Ada, 3 anonymous edits");
        assert_eq!(contributors_text(&["ANONIPEDITS:0".to_string()]), "-");
        assert_eq!(contributors_text(&[]), "-");
    }

    #[test]
    fn book_has_title_page_chapters_and_appendix() {
        let book = Book {
            title: Some("Collected".into()),
            subtitle: Some("Volume one".into()),
            items: vec![
                BookItem::Article(article("Alpha", "first body")),
                BookItem::Chapter("Part two".into()),
                BookItem::Article(article("Beta", "second body")),
            ],
            licenses: vec![ArticleSource::new(
                "GFDL",
                DocumentNode::new(NodeKind::Article).with_child(
                    DocumentNode::new(NodeKind::Paragraph)
                        .with_child(DocumentNode::text("license text")),
                ),
            )],
        };
        let mut sink = CollectingSink::default();
        let metrics = writer(LayoutConfig::default())
            .render(&book, &mut sink)
            .expect("render");

        assert_eq!(sink.builds, 1);
        assert!(!metrics.fail_safe);
        assert_eq!(metrics.articles.len(), 2);
        let all = texts(&sink.story);
        assert_eq!(all[0], "Collected");
        assert_eq!(all[1], "Volume one");
        assert!(matches!(sink.story[2], Flowable::NextTemplate(ref t) if t == "Alpha"));
        assert!(matches!(sink.story[3], Flowable::PageBreak(PageBreak::Always)));
        assert!(all.iter().any(|t| t == "Part two"));
        assert!(all.iter().any(|t| t.starts_with("Alpha") && t.contains("Source: https://wiki.example/Alpha")));
        assert!(all.iter().any(|t| t.contains("Contributors: Ada, 3 anonymous edits")));
        assert!(all.iter().any(|t| t == "license text"));

        let registry = &sink.registry;
        assert_eq!(registry.article_ids.len(), 2);
        assert_eq!(registry.articles.len(), 2);
        let levels: Vec<u8> = registry.toc.iter().map(|t| t.level).collect();
        assert_eq!(levels, vec![0, 2, 1, 2, 0, 2]);
    }

    #[test]
    fn article_after_chapter_has_no_page_break() {
        let book = Book {
            items: vec![
                BookItem::Chapter("Only".into()),
                BookItem::Article(article("Gamma", "text")),
            ],
            ..Book::default()
        };
        let mut sink = CollectingSink::default();
        writer(LayoutConfig::default())
            .render(&book, &mut sink)
            .expect("render");
        let conditional = sink
            .story
            .iter()
            .filter(|f| matches!(f, Flowable::PageBreak(PageBreak::Conditional(_))))
            .count();
        assert_eq!(conditional, 0);
    }

    #[test]
    fn empty_book_gets_placeholder_paragraph() {
        let mut config = LayoutConfig::default();
        config.show_article_attribution = false;
        let mut sink = CollectingSink::default();
        writer(config).render(&Book::default(), &mut sink).expect("render");
        assert_eq!(sink.story.len(), 2);
        assert!(matches!(
            &sink.story[1],
            Flowable::TocEntry(TocEntry { level: TocLevel::Group, .. })
        ));
    }

    #[test]
    fn fail_safe_replaces_rejected_article() {
        let book = Book {
            items: vec![
                BookItem::Article(article("Good", "fine text")),
                BookItem::Article(article("Bad", "poison pill")),
            ],
            ..Book::default()
        };
        let mut sink = PickySink {
            poison: "poison",
            builds: 0,
            probes: 0,
            story: Vec::new(),
        };
        let metrics = writer(LayoutConfig::default())
            .render(&book, &mut sink)
            .expect("fail-safe render");
        assert!(metrics.fail_safe);
        assert_eq!(sink.builds, 2);
        assert_eq!(sink.probes, 2);
        assert_eq!(metrics.failed_articles, 1);
        let all = texts(&sink.story);
        assert!(all.iter().any(|t| t == "fine text"));
        assert!(all.iter().any(|t| t.starts_with("WARNING: Article could not be rendered")));
        assert!(all.iter().any(|t| t == "poison pill"));
    }

    #[test]
    fn strict_mode_does_not_retry() {
        let config = LayoutConfig::builder().strict(true).build().expect("config");
        let book = Book {
            items: vec![BookItem::Article(article("Only", "text"))],
            ..Book::default()
        };
        let mut sink = PickySink {
            poison: "never",
            builds: 0,
            probes: 0,
            story: Vec::new(),
        };
        let err = match writer(config).render(&book, &mut sink) {
            Ok(_) => panic!("strict render should fail"),
            Err(err) => err,
        };
        assert_eq!(err.code(), "FATAL_BACKEND");
        assert_eq!(sink.builds, 1);
    }
}
