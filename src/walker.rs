//! Recursive conversion of a [`DocumentNode`] tree into flowables.
//!
//! Every node goes through [`LayoutWalker::write`], which looks its kind up
//! in a dispatch table built once per process. Handlers return
//! [`Fragment`]s: inline markup that the caller concatenates into the
//! current paragraph, or finished block flowables. Recoverable failures are
//! caught in `write` and replaced by a fallback unless the walker is strict.

use crate::config::LayoutConfig;
use crate::context::{LayoutContext, Scope};
use crate::debug::DebugLogger;
use crate::error::{LayoutError, Result};
use crate::flowable::{
    Flowable, HorizontalRule, ImageFlowable, ListLabel, PageBreak, Paragraph, Spacer, TableCell,
    TableFlowable, TableKind, TocEntry, TocLevel, escape_markup, strip_markup, visible_len,
};
use crate::measure::{BoxMetrics, ImageCatalog};
use crate::node::{Align, DocumentNode, ListNumbering, NodeKind};
use crate::packer::ImageFlowPacker;
use crate::registry::{BookmarkKind, DocumentRegistry, Footnote, article_id};
use crate::style::{HeadingMode, ParagraphStyle, TextMode, heading_style, text_style};
use crate::table::{TableWidthOptimizer, fit_spans};
use crate::types::{CM, Pt};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// URLs longer than this inside tables are moved to the reference list.
const TABLE_URL_MAX_CHARS: usize = 30;

#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Inline(String),
    Block(Flowable),
}

impl Fragment {
    pub fn is_inline(&self) -> bool {
        matches!(self, Fragment::Inline(_))
    }
}

/// True when every fragment is inline markup.
pub fn is_inline(fragments: &[Fragment]) -> bool {
    fragments.iter().all(Fragment::is_inline)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStyle {
    Itemize,
    Enumerate,
    Letters { upper: bool },
    References,
}

impl ListStyle {
    fn for_list(node: &DocumentNode) -> Self {
        match node.attrs.numbered {
            None => ListStyle::Itemize,
            Some(ListNumbering::Decimal) => ListStyle::Enumerate,
            Some(ListNumbering::LowerAlpha) => ListStyle::Letters { upper: false },
            Some(ListNumbering::UpperAlpha) => ListStyle::Letters { upper: true },
        }
    }

    pub fn label(self, ordinal: usize) -> String {
        match self {
            ListStyle::Itemize => "\u{2022}".to_string(),
            ListStyle::Enumerate => format!("{ordinal}."),
            ListStyle::Letters { upper } => format!("{}.", letter_label(ordinal, upper)),
            ListStyle::References => format!("[{ordinal}]"),
        }
    }
}

/// 1 -> a, 26 -> z, 27 -> aa.
fn letter_label(ordinal: usize, upper: bool) -> String {
    let base = if upper { b'A' } else { b'a' };
    let mut n = ordinal.max(1);
    let mut out = Vec::new();
    while n > 0 {
        n -= 1;
        out.push((base + (n % 26) as u8) as char);
        n /= 26;
    }
    out.iter().rev().collect()
}

/// Reference bookkeeping, reset at every article boundary.
#[derive(Debug, Clone, Default)]
struct ArticleState {
    title: String,
    references: Vec<Vec<DocumentNode>>,
    names: HashMap<String, usize>,
    urls: HashMap<String, usize>,
    list_rendered: bool,
}

type Handler = fn(&mut LayoutWalker, &DocumentNode) -> Result<Vec<Fragment>>;

fn handlers() -> &'static HashMap<NodeKind, Handler> {
    static HANDLERS: OnceLock<HashMap<NodeKind, Handler>> = OnceLock::new();
    HANDLERS.get_or_init(|| {
        let mut map: HashMap<NodeKind, Handler> = HashMap::new();
        map.insert(NodeKind::Article, LayoutWalker::write_mixed);
        map.insert(NodeKind::Chapter, LayoutWalker::write_chapter);
        map.insert(NodeKind::Heading, LayoutWalker::write_heading);
        map.insert(NodeKind::Paragraph, LayoutWalker::write_mixed);
        map.insert(NodeKind::Text, LayoutWalker::write_text);
        map.insert(NodeKind::Emphasized, LayoutWalker::write_emphasized);
        map.insert(NodeKind::Strong, LayoutWalker::write_strong);
        map.insert(NodeKind::Underline, LayoutWalker::write_underline);
        map.insert(NodeKind::Strike, LayoutWalker::write_strike);
        map.insert(NodeKind::Sub, LayoutWalker::write_sub);
        map.insert(NodeKind::Sup, LayoutWalker::write_sup);
        map.insert(NodeKind::Small, LayoutWalker::write_small);
        map.insert(NodeKind::Big, LayoutWalker::write_big);
        map.insert(NodeKind::Teletype, LayoutWalker::write_teletype);
        map.insert(NodeKind::Span, LayoutWalker::write_span);
        map.insert(NodeKind::Link, LayoutWalker::write_link);
        map.insert(NodeKind::Url, LayoutWalker::write_url);
        map.insert(NodeKind::NamedUrl, LayoutWalker::write_named_url);
        map.insert(NodeKind::CategoryLink, LayoutWalker::write_category_link);
        map.insert(NodeKind::BreakingReturn, LayoutWalker::write_break);
        map.insert(NodeKind::Center, LayoutWalker::write_center);
        map.insert(NodeKind::Div, LayoutWalker::write_div);
        map.insert(NodeKind::Blockquote, LayoutWalker::write_blockquote);
        map.insert(NodeKind::Indented, LayoutWalker::write_indented);
        map.insert(NodeKind::DefinitionList, LayoutWalker::write_children);
        map.insert(NodeKind::DefinitionTerm, LayoutWalker::write_definition_term);
        map.insert(NodeKind::DefinitionDescription, LayoutWalker::write_indented);
        map.insert(NodeKind::List, LayoutWalker::write_list);
        map.insert(NodeKind::ListItem, LayoutWalker::write_mixed);
        map.insert(NodeKind::Table, LayoutWalker::write_table);
        map.insert(NodeKind::Row, LayoutWalker::write_stray_row);
        map.insert(NodeKind::Cell, LayoutWalker::write_mixed);
        map.insert(NodeKind::Caption, LayoutWalker::write_caption);
        map.insert(NodeKind::Image, LayoutWalker::write_image);
        map.insert(NodeKind::Gallery, LayoutWalker::write_gallery);
        map.insert(NodeKind::Preformatted, LayoutWalker::write_preformatted);
        map.insert(NodeKind::Source, LayoutWalker::write_source);
        map.insert(NodeKind::Reference, LayoutWalker::write_reference);
        map.insert(NodeKind::ReferenceList, LayoutWalker::write_reference_list);
        map.insert(NodeKind::Math, LayoutWalker::write_math);
        map.insert(NodeKind::HorizontalRule, LayoutWalker::write_rule);
        map.insert(NodeKind::Control, LayoutWalker::write_control);
        map
    })
}

/// Collects the text of consecutive inline fragments into one paragraph.
struct TextRun {
    style: ParagraphStyle,
    bullet: Option<ListLabel>,
    bold: bool,
    buffer: String,
}

impl TextRun {
    fn new(style: ParagraphStyle, bullet: Option<ListLabel>, bold: bool) -> Self {
        Self {
            style,
            bullet,
            bold,
            buffer: String::new(),
        }
    }

    fn flush(&mut self, out: &mut Vec<Fragment>) {
        let text = self.buffer.trim();
        if text.is_empty() && self.bullet.is_none() {
            self.buffer.clear();
            return;
        }
        let text = if self.bold && !text.is_empty() {
            format!("<b>{text}</b>")
        } else {
            text.to_string()
        };
        let mut paragraph = Paragraph::new(text, self.style.clone());
        paragraph.bullet = self.bullet.take();
        out.push(Fragment::Block(Flowable::Paragraph(paragraph)));
        self.buffer.clear();
    }
}

fn into_blocks(fragments: Vec<Fragment>, style: &ParagraphStyle) -> Vec<Flowable> {
    let mut run = TextRun::new(style.clone(), None, false);
    let mut out = Vec::new();
    for fragment in fragments {
        match fragment {
            Fragment::Inline(text) => run.buffer.push_str(&text),
            Fragment::Block(block) => {
                run.flush(&mut out);
                out.push(Fragment::Block(block));
            }
        }
    }
    run.flush(&mut out);
    out.into_iter()
        .filter_map(|fragment| match fragment {
            Fragment::Block(block) => Some(block),
            Fragment::Inline(_) => None,
        })
        .collect()
}

pub struct LayoutWalker {
    config: LayoutConfig,
    metrics: Arc<dyn BoxMetrics>,
    images: Arc<dyn ImageCatalog>,
    optimizer: TableWidthOptimizer,
    ctx: LayoutContext,
    registry: DocumentRegistry,
    article: ArticleState,
    wiki_url: String,
    next_list_id: usize,
    list_counters: HashMap<usize, usize>,
    warnings: usize,
    debug: Option<Arc<DebugLogger>>,
}

impl LayoutWalker {
    pub fn new(
        config: LayoutConfig,
        metrics: Arc<dyn BoxMetrics>,
        images: Arc<dyn ImageCatalog>,
    ) -> Self {
        let optimizer = TableWidthOptimizer::new(&config);
        Self {
            config,
            metrics,
            images,
            optimizer,
            ctx: LayoutContext::new(),
            registry: DocumentRegistry::new(),
            article: ArticleState::default(),
            wiki_url: String::new(),
            next_list_id: 0,
            list_counters: HashMap::new(),
            warnings: 0,
            debug: None,
        }
    }

    pub fn with_debug(mut self, debug: Arc<DebugLogger>) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn metrics(&self) -> &dyn BoxMetrics {
        self.metrics.as_ref()
    }

    pub fn context(&self) -> &LayoutContext {
        &self.ctx
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DocumentRegistry {
        &mut self.registry
    }

    pub fn into_registry(self) -> DocumentRegistry {
        self.registry
    }

    pub fn warnings(&self) -> usize {
        self.warnings
    }

    /// Runs `f` inside `scope`; the scope is popped whatever `f` returns.
    pub fn scoped<T>(&mut self, scope: Scope, f: impl FnOnce(&mut Self) -> T) -> T {
        self.ctx.push(scope);
        let out = f(self);
        self.ctx.pop();
        out
    }

    /// Lays out one subtree as block flowables.
    pub fn layout(&mut self, node: &DocumentNode) -> Result<Vec<Flowable>> {
        let fragments = self.write(node)?;
        let style = self.paragraph_style(None);
        Ok(into_blocks(fragments, &style))
    }

    /// Node boundary: dispatch, then downgrade recoverable errors.
    pub fn write(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let result = match handlers().get(&node.kind) {
            Some(handler) => handler(self, node),
            None => Err(LayoutError::UnsupportedNodeKind(node.kind.name().to_string())),
        };
        match result {
            Ok(fragments) => Ok(fragments),
            Err(err) if self.config.strict || !err.is_recoverable() => Err(err),
            Err(err) => {
                self.note(&err, node.kind.name());
                Ok(self.fallback(node, &err))
            }
        }
    }

    fn fallback(&self, node: &DocumentNode, err: &LayoutError) -> Vec<Fragment> {
        if matches!(err, LayoutError::UnsupportedNodeKind(_)) {
            return Vec::new();
        }
        let text = escape_markup(node.display_text().trim());
        if text.is_empty() {
            Vec::new()
        } else if self.ctx.in_inline() {
            vec![Fragment::Inline(text)]
        } else {
            vec![Fragment::Block(Flowable::Paragraph(Paragraph::new(
                text,
                self.paragraph_style(None),
            )))]
        }
    }

    /// Cells are rendered twice for tables; only the final pass reports.
    fn note(&mut self, err: &LayoutError, node: &str) {
        if self.ctx.is_sizing() {
            return;
        }
        log::warn!("{node}: {err}");
        self.warnings += 1;
        if let Some(debug) = self.debug.as_deref() {
            debug.log_event(
                "layout.warning",
                json!({
                    "code": err.code(),
                    "node": node,
                    "article": self.article.title,
                    "message": err.to_string(),
                }),
            );
            debug.increment(&format!("layout.warning.{}", err.code()), 1);
        }
    }

    /// Logs a recoverable condition, or returns it as an error when strict.
    fn warn(&mut self, err: LayoutError, node: &str) -> Result<()> {
        if self.config.strict {
            return Err(err);
        }
        self.note(&err, node);
        Ok(())
    }

    fn skip(&mut self, message: String) {
        if self.ctx.is_sizing() {
            return;
        }
        log::warn!("{message}");
        self.warnings += 1;
    }

    fn paragraph_style(&self, align: Option<Align>) -> ParagraphStyle {
        if self.ctx.license_mode() {
            text_style(&self.config, TextMode::License, 0, false, align)
        } else {
            text_style(
                &self.config,
                TextMode::Body,
                self.ctx.para_indent(),
                self.ctx.in_table(),
                align,
            )
        }
    }

    fn render_mixed(
        &mut self,
        children: &[DocumentNode],
        style: ParagraphStyle,
        bullet: Option<ListLabel>,
        bold: bool,
    ) -> Result<Vec<Fragment>> {
        let mut style = style;
        if self.has_long_math(children) {
            style.flowable = false;
        }
        let mut run = TextRun::new(style, bullet, bold);
        let mut out = Vec::new();
        for child in children {
            let fragments = self.write(child)?;
            if is_inline(&fragments) {
                for fragment in fragments {
                    if let Fragment::Inline(text) = fragment {
                        run.buffer.push_str(&text);
                    }
                }
                continue;
            }
            run.flush(&mut out);
            for fragment in fragments {
                match fragment {
                    Fragment::Block(block) => {
                        run.flush(&mut out);
                        out.push(Fragment::Block(block));
                    }
                    Fragment::Inline(text) => run.buffer.push_str(&text),
                }
            }
        }
        run.flush(&mut out);
        Ok(out)
    }

    fn has_long_math(&self, children: &[DocumentNode]) -> bool {
        let limit = self.config.no_float_math_len;
        let mut math = Vec::new();
        for child in children {
            if child.kind == NodeKind::Math {
                math.push(child);
            }
            child.descendants_of_kind(&NodeKind::Math, &mut math);
        }
        math.iter().any(|node| math_source(node).chars().count() > limit)
    }

    /// Renders children as inline markup; block output is replaced by its text.
    fn render_inline(&mut self, children: &[DocumentNode]) -> Result<String> {
        self.scoped(Scope::Inline, |w| {
            let mut text = String::new();
            for child in children {
                let fragments = w.write(child)?;
                if is_inline(&fragments) {
                    for fragment in fragments {
                        if let Fragment::Inline(part) = fragment {
                            text.push_str(&part);
                        }
                    }
                } else {
                    w.skip(format!(
                        "block {} inside inline content, using its text",
                        child.kind.name()
                    ));
                    text.push_str(&escape_markup(&child.display_text()));
                }
            }
            Ok(text)
        })
    }

    fn render_children(&mut self, children: &[DocumentNode]) -> Result<Vec<Fragment>> {
        let mut out = Vec::new();
        for child in children {
            out.extend(self.write(child)?);
        }
        Ok(out)
    }

    fn inline_style(&mut self, node: &DocumentNode, open: &str, close: &str) -> Result<Vec<Fragment>> {
        let text = self.render_inline(&node.children)?;
        Ok(vec![Fragment::Inline(format!("{open}{text}{close}"))])
    }

    fn bookmark(&mut self, label: &str, kind: BookmarkKind) -> String {
        let anchor = format!("bookmark{}", self.registry.bookmarks.len());
        self.registry.add_bookmark(label, kind, anchor.clone());
        anchor
    }

    fn can_bookmark(&self) -> bool {
        !self.ctx.in_inline() && !self.ctx.in_table()
    }

    fn indent_amount(&self) -> Pt {
        Pt::from_f32(self.config.para_indent) * (self.ctx.para_indent() as i32)
            + Pt::from_f32(self.config.list_indent) * (self.ctx.list_depth() as i32)
    }

    /// Width a table at the current position may use.
    fn available_width(&self) -> Pt {
        match self.ctx.column_width() {
            Some(width) if self.ctx.table_depth() > 1 => width,
            _ => (self.config.print_width() - self.indent_amount()).max(Pt::ZERO),
        }
    }

    // ---- articles and chapters ----

    fn begin_article(&mut self, title: &str, wiki_url: &str) {
        self.article = ArticleState {
            title: title.to_string(),
            ..ArticleState::default()
        };
        self.wiki_url = wiki_url.to_string();
    }

    fn article_heading(&mut self, title: &str, url: Option<&str>, wiki_url: &str) -> Vec<Flowable> {
        let mut heading = Paragraph::new(
            format!("<b>{}</b>", escape_markup(title)),
            heading_style(&self.config, HeadingMode::Article),
        );
        if self.can_bookmark() {
            heading = heading.with_anchor(self.bookmark(title, BookmarkKind::Article));
        }
        if url.is_some_and(|u| !u.is_empty()) {
            heading = heading.with_anchor(article_id(wiki_url, title));
        }
        self.registry.add_toc(title, 2);
        vec![
            Flowable::Paragraph(heading),
            Flowable::TocEntry(TocEntry {
                text: title.to_string(),
                level: TocLevel::Article,
            }),
            Flowable::Rule(HorizontalRule::new(1.0, 1.0).with_spacing(0.0, 10.0)),
        ]
    }

    /// Heading, body, packed images and the trailing reference list of one article.
    pub fn layout_article(
        &mut self,
        title: &str,
        url: Option<&str>,
        wiki_url: &str,
        tree: &DocumentNode,
    ) -> Result<Vec<Flowable>> {
        self.begin_article(title, wiki_url);
        log::info!("laying out article {title:?}");
        let mut items = self.article_heading(title, url, wiki_url);

        let style = self.paragraph_style(None);
        let body = if tree.kind == NodeKind::Article {
            self.render_mixed(&tree.children, style.clone(), None, false)?
        } else {
            self.write(tree)?
        };
        items.extend(into_blocks(body, &style));

        let mut items = ImageFlowPacker::new(self.metrics.as_ref(), &self.config).pack(items);

        if !self.article.references.is_empty() {
            items.push(Flowable::Paragraph(Paragraph::new(
                "<b>References</b>",
                heading_style(&self.config, HeadingMode::Section(3)),
            )));
            let list = self.render_reference_list()?;
            items.extend(into_blocks(list, &style));
        }
        self.article.list_rendered = false;
        Ok(items)
    }

    /// Placeholder for an article that could not be laid out: a warning
    /// framed by rules plus the article's plain text.
    pub fn layout_failed_article(
        &mut self,
        title: &str,
        url: Option<&str>,
        wiki_url: &str,
        tree: &DocumentNode,
    ) -> Vec<Flowable> {
        self.begin_article(title, wiki_url);
        let mut items = self.article_heading(title, url, wiki_url);
        let style = text_style(&self.config, TextMode::Body, 0, false, None);
        let frame = || Flowable::Rule(HorizontalRule::new(1.0, 2.0));
        items.extend([
            Flowable::Spacer(Spacer::new(CM)),
            frame(),
            Flowable::Spacer(Spacer::new(0.5 * CM)),
            Flowable::Paragraph(Paragraph::new(
                "<b>WARNING: Article could not be rendered - outputting plain text.</b>",
                style.clone(),
            )),
            Flowable::Spacer(Spacer::new(0.5 * CM)),
            Flowable::Paragraph(Paragraph::new(escape_markup(&tree.display_text()), style)),
            Flowable::Spacer(Spacer::new(0.5 * CM)),
            frame(),
            Flowable::Spacer(Spacer::new(CM)),
        ]);
        items
    }

    pub fn layout_chapter(&mut self, title: &str) -> Vec<Flowable> {
        let title = title.trim();
        let mut heading = Paragraph::new(
            escape_markup(title),
            heading_style(&self.config, HeadingMode::Chapter),
        );
        if self.can_bookmark() {
            heading = heading.with_anchor(self.bookmark(title, BookmarkKind::Chapter));
        }
        self.registry.add_toc(title, 1);
        let rule = HorizontalRule::new(0.8, 0.5).with_spacing(6.0, 0.0);
        vec![
            Flowable::PageBreak(PageBreak::NotAtTop),
            Flowable::Rule(rule),
            Flowable::Paragraph(heading),
            Flowable::Rule(rule),
            Flowable::TocEntry(TocEntry {
                text: title.to_string(),
                level: TocLevel::Chapter,
            }),
        ]
    }

    // ---- handlers ----

    fn write_mixed(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let style = self.paragraph_style(node.attrs.align);
        self.render_mixed(&node.children, style, None, false)
    }

    fn write_children(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        self.render_children(&node.children)
    }

    fn write_chapter(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let title = node
            .text
            .clone()
            .or_else(|| node.attrs.caption.clone())
            .unwrap_or_default();
        let mut out: Vec<Fragment> = self
            .layout_chapter(&title)
            .into_iter()
            .map(Fragment::Block)
            .collect();
        out.extend(self.render_children(&node.children)?);
        Ok(out)
    }

    fn write_heading(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let Some((title_node, body)) = node.children.split_first() else {
            return Ok(Vec::new());
        };
        let level = node.attrs.level.unwrap_or(2).clamp(1, 5);
        let style = if self.ctx.license_mode() {
            heading_style(&self.config, HeadingMode::License)
        } else {
            heading_style(&self.config, HeadingMode::Section(level))
        };
        let title = self.render_inline(std::slice::from_ref(title_node))?;
        let mut heading = Paragraph::new(format!("<b>{}</b>", title.trim()), style);
        if (2..=4).contains(&level) && self.can_bookmark() {
            let label = title_node.display_text();
            heading = heading.with_anchor(self.bookmark(label.trim(), BookmarkKind::Section(level)));
        }
        let mut out = vec![Fragment::Block(Flowable::Paragraph(heading))];
        let body_style = self.paragraph_style(None);
        out.extend(self.render_mixed(body, body_style, None, false)?);
        Ok(out)
    }

    fn write_text(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let text = node.text.as_deref().unwrap_or_default();
        Ok(vec![Fragment::Inline(escape_markup(text))])
    }

    fn write_emphasized(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        self.inline_style(node, "<i>", "</i>")
    }

    fn write_strong(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        self.inline_style(node, "<b>", "</b>")
    }

    fn write_underline(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        self.inline_style(node, "<u>", "</u>")
    }

    fn write_strike(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        self.inline_style(node, "<strike>", "</strike>")
    }

    fn write_sub(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        self.inline_style(node, "<sub>", "</sub>")
    }

    fn write_sup(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        self.inline_style(node, "<super>", "</super>")
    }

    fn write_small(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let open = format!("<font size=\"{}\">", self.config.small_font_size);
        self.inline_style(node, &open, "</font>")
    }

    fn write_big(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let open = format!("<font size=\"{}\">", self.config.big_font_size);
        self.inline_style(node, &open, "</font>")
    }

    fn write_teletype(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        self.inline_style(node, "<font face=\"mono\">", "</font>")
    }

    fn write_span(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        self.inline_style(node, "", "")
    }

    fn write_break(&mut self, _node: &DocumentNode) -> Result<Vec<Fragment>> {
        Ok(vec![Fragment::Inline("<br/>".to_string())])
    }

    fn write_control(&mut self, _node: &DocumentNode) -> Result<Vec<Fragment>> {
        Ok(Vec::new())
    }

    fn write_link(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let target = node.attrs.target.clone().unwrap_or_default();
        let href = node.attrs.url.as_deref().map(cut_at_quote);
        let internal = if target.is_empty() || target.starts_with('#') {
            None
        } else {
            let id = article_id(&self.wiki_url, &target);
            self.registry.has_article(&id).then_some(id)
        };
        if href.is_none() && internal.is_none() && target.is_empty() {
            self.skip("link without target".to_string());
            if node.children.is_empty() {
                return Ok(Vec::new());
            }
        }
        let text = if node.children.is_empty() {
            escape_markup(target.trim())
        } else {
            self.render_inline(&node.children)?.trim().to_string()
        };
        let markup = match (internal, href) {
            (Some(id), _) => format!("<link href=\"#{id}\">\u{2192} {text}</link>"),
            (None, Some(href)) if !target.starts_with('#') && !href.is_empty() => {
                format!("<link href=\"{}\">{text}</link>", escape_markup(href))
            }
            _ => text,
        };
        Ok(vec![Fragment::Inline(markup)])
    }

    fn write_url(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let href = url_of(node);
        if href.is_empty() {
            return Ok(Vec::new());
        }
        if self.ctx.in_table()
            && href.chars().count() > TABLE_URL_MAX_CHARS
            && !self.ctx.reference_mode()
        {
            return self.write_named_url(node);
        }
        Ok(vec![Fragment::Inline(format!(
            "<link href=\"{}\">{}</link>",
            escape_markup(&href),
            breakable_url(&href)
        ))])
    }

    /// A URL shown as a numbered reference.
    fn write_named_url(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let href = url_of(node);
        if href.is_empty() {
            return self.inline_style(node, "", "");
        }
        let label = if node.kind == NodeKind::NamedUrl {
            self.render_inline(&node.children)?.trim().to_string()
        } else {
            String::new()
        };
        if self.ctx.reference_mode() || self.article.list_rendered {
            let link = format!(
                "<link href=\"{}\">({})</link>",
                escape_markup(&href),
                breakable_url(&href)
            );
            let text = if label.is_empty() { link } else { format!("{label} {link}") };
            return Ok(vec![Fragment::Inline(text)]);
        }
        let index = match self.article.urls.get(&href) {
            Some(index) => *index,
            None => {
                self.article
                    .references
                    .push(vec![DocumentNode::new(NodeKind::Url).with_text(href.clone())]);
                let index = self.article.references.len();
                self.article.urls.insert(href.clone(), index);
                index
            }
        };
        let link = format!("<link href=\"{}\">[{index}]</link>", escape_markup(&href));
        let text = if label.is_empty() {
            link
        } else {
            format!("{label} <super>{link}</super>")
        };
        Ok(vec![Fragment::Inline(text)])
    }

    fn write_category_link(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        if !node.attrs.colon {
            return Ok(Vec::new());
        }
        let mut text = if node.children.is_empty() {
            escape_markup(node.attrs.target.as_deref().unwrap_or_default())
        } else {
            self.render_inline(&node.children)?
        };
        if let Some(pipe) = text.find('|') {
            text.truncate(pipe);
        }
        Ok(vec![Fragment::Inline(text)])
    }

    fn write_center(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let style = text_style(&self.config, TextMode::Center, 0, self.ctx.in_table(), None);
        self.scoped(Scope::Center, |w| w.render_mixed(&node.children, style, None, false))
    }

    fn write_div(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        if node.children.is_empty() {
            let Some(height) = node.attrs.height else {
                return Ok(Vec::new());
            };
            let cap = self.config.print_height() - Pt::from_i32(20);
            let height = Pt::from_f32(height).min(cap);
            if !height.is_positive() {
                return Ok(Vec::new());
            }
            return Ok(vec![Fragment::Block(Flowable::Spacer(Spacer::new_pt(height)))]);
        }
        let boxed = node.attrs.border
            && !self.ctx.in_table()
            && !node.contains_kind(&NodeKind::Preformatted);
        let mode = if boxed { TextMode::Box } else { TextMode::Body };
        let style = text_style(
            &self.config,
            mode,
            self.ctx.para_indent(),
            self.ctx.in_table(),
            node.attrs.align,
        );
        self.render_mixed(&node.children, style, None, false)
    }

    fn write_blockquote(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let style = text_style(
            &self.config,
            TextMode::Blockquote,
            self.ctx.para_indent(),
            self.ctx.in_table(),
            None,
        );
        self.scoped(Scope::Indent(1), |w| w.render_mixed(&node.children, style, None, false))
    }

    fn write_indented(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let steps = node.attrs.indent.unwrap_or(1);
        self.scoped(Scope::Indent(steps), |w| {
            let style = w.paragraph_style(None);
            w.render_mixed(&node.children, style, None, false)
        })
    }

    fn write_definition_term(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let text = self.render_inline(&node.children)?;
        let style = text_style(&self.config, TextMode::Body, 0, self.ctx.in_table(), None);
        Ok(vec![Fragment::Block(Flowable::Paragraph(Paragraph::new(
            format!("<b>{}</b>", text.trim()),
            style,
        )))])
    }

    fn write_list(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        self.render_list_items(&node.children, ListStyle::for_list(node))
    }

    fn render_list_items(&mut self, items: &[DocumentNode], style: ListStyle) -> Result<Vec<Fragment>> {
        self.scoped(Scope::List, |w| {
            w.next_list_id += 1;
            let counter_id = w.next_list_id;
            let mut out = Vec::new();
            let mut first = true;
            for item in items {
                if item.kind != NodeKind::ListItem {
                    w.skip(format!("{} node in list, skipped", item.kind.name()));
                    continue;
                }
                if first {
                    w.list_counters.insert(counter_id, 0);
                }
                let counter = w.list_counters.entry(counter_id).or_insert(0);
                *counter += 1;
                let ordinal = *counter;

                let mode = if w.ctx.license_mode() {
                    TextMode::LicenseList
                } else if w.ctx.reference_mode() {
                    TextMode::References
                } else {
                    TextMode::List
                };
                let in_table = mode == TextMode::List && w.ctx.in_table();
                let mut para_style =
                    text_style(&w.config, mode, w.ctx.list_indent_level(), in_table, None);
                if first {
                    para_style.space_before =
                        text_style(&w.config, TextMode::Body, 0, false, None).space_before;
                }
                first = false;
                let label = ListLabel {
                    text: style.label(ordinal),
                    counter_id,
                    ordinal,
                };
                out.extend(w.render_mixed(&item.children, para_style, Some(label), false)?);
            }
            Ok(out)
        })
    }

    fn write_reference(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let name = node.attrs.name.clone().filter(|n| !n.is_empty());
        let known = name.as_ref().and_then(|n| self.article.names.get(n).copied());
        let index = match known {
            Some(index) => Some(index),
            None if node.children.is_empty() && name.is_some() => None,
            None => {
                self.article.references.push(node.children.clone());
                let index = self.article.references.len();
                if let Some(name) = &name {
                    self.article.names.insert(name.clone(), index);
                }
                Some(index)
            }
        };
        match index {
            Some(_) if node.attrs.no_display => Ok(Vec::new()),
            Some(index) => Ok(vec![Fragment::Inline(format!("<super>[{index}]</super>"))]),
            None => {
                self.skip(format!("reference {name:?} used before it was defined"));
                Ok(Vec::new())
            }
        }
    }

    fn write_reference_list(&mut self, _node: &DocumentNode) -> Result<Vec<Fragment>> {
        self.render_reference_list()
    }

    /// Renders and clears the references collected so far.
    fn render_reference_list(&mut self) -> Result<Vec<Fragment>> {
        if self.article.references.is_empty() {
            return Ok(Vec::new());
        }
        let references = std::mem::take(&mut self.article.references);
        self.article.names.clear();
        self.article.urls.clear();
        let footnotes = references
            .iter()
            .enumerate()
            .map(|(i, children)| Footnote {
                index: i + 1,
                content: children
                    .iter()
                    .map(DocumentNode::display_text)
                    .collect::<String>()
                    .trim()
                    .to_string(),
            })
            .collect();
        let title = self.article.title.clone();
        self.registry.add_footnotes(title, footnotes);

        let items: Vec<DocumentNode> = references
            .into_iter()
            .map(|children| DocumentNode::new(NodeKind::ListItem).with_children(children))
            .collect();
        let out = self.scoped(Scope::References, |w| {
            w.render_list_items(&items, ListStyle::References)
        });
        self.article.list_rendered = true;
        out
    }

    fn write_math(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let source = math_source(node);
        if source.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Fragment::Inline(format!(
            "<font face=\"mono\">{}</font>",
            escape_markup(&source)
        ))])
    }

    fn write_rule(&mut self, _node: &DocumentNode) -> Result<Vec<Fragment>> {
        Ok(vec![Fragment::Block(Flowable::Rule(
            HorizontalRule::new(1.0, 0.25).with_spacing(3.0, 6.0),
        ))])
    }

    fn write_preformatted(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        self.preformatted(node, TextMode::Preformatted)
    }

    fn write_source(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        if let Some(lang) = &node.attrs.lang {
            log::debug!("source block in {lang}");
        }
        self.preformatted(node, TextMode::Source)
    }

    fn preformatted(&mut self, node: &DocumentNode, mode: TextMode) -> Result<Vec<Fragment>> {
        let raw = if node.children.is_empty() {
            escape_markup(node.text.as_deref().unwrap_or_default())
        } else {
            self.render_inline(&node.children)?
        };
        let text = raw
            .replace("<br/>", "\n")
            .replace("<br />", "\n")
            .replace('\t', &" ".repeat(self.config.tab_size));
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let columns = self.ctx.column_count().max(1) as f32;
        let divisor = match mode {
            TextMode::Source => columns,
            _ => (0.75 * columns).max(1.0),
        };
        let limit = ((self.config.source_max_line_len as f32 / divisor) as usize).max(1);
        let text = if text.lines().any(|line| visible_len(line) > limit) {
            break_long_lines(&text, limit)
        } else {
            text
        };
        let style = text_style(&self.config, mode, 0, self.ctx.in_table(), None);
        Ok(vec![Fragment::Block(Flowable::Paragraph(Paragraph::preformatted(
            text, style,
        )))])
    }

    fn write_image(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        if node.attrs.colon {
            return self.render_children(&node.children);
        }
        let Some(target) = node.attrs.target.clone().filter(|t| !t.trim().is_empty()) else {
            self.skip("image without target".to_string());
            return Ok(Vec::new());
        };

        let print_width = self.config.print_width();
        let print_height = self.config.print_height();
        let max_width = match self.ctx.column_width() {
            Some(width) => width,
            None if self.ctx.in_table() => {
                print_width / (self.ctx.column_count().max(1) as i32) - Pt::from_i32(10)
            }
            None => Pt::from_f32(self.config.image_max_width).min(print_width),
        };
        let max_height = if self.ctx.gallery_mode() {
            print_height / 3
        } else if self.ctx.in_table() {
            print_height / 4
        } else {
            Pt::from_f32(self.config.image_max_height)
        };
        let inline = node.attrs.inline;
        let dpi = if inline {
            self.config.inline_image_dpi
        } else {
            self.config.image_min_dpi
        };
        let size = match self.images.size(&target, max_width, max_height, dpi) {
            Ok(size) => size,
            Err(err) => {
                self.warn(err, "Image")?;
                return Ok(Vec::new());
            }
        };

        let description = self.images.describe(&target);
        let url = Some(description.url.clone()).filter(|u| !u.is_empty());
        self.registry.register_image(&target, || description.clone());

        if inline {
            let img = format!(
                "<img src=\"{}\" width=\"{:.2}pt\" height=\"{:.2}pt\" valign=\"bottom\"/>",
                escape_markup(&target),
                size.width.to_f32(),
                size.height.to_f32()
            );
            let markup = match &url {
                Some(url) => format!("<link href=\"{}\">{img}</link>", escape_markup(url)),
                None => img,
            };
            return Ok(vec![Fragment::Inline(markup)]);
        }

        let align = if self.ctx.in_center() {
            Align::Center
        } else {
            match node.attrs.align {
                Some(Align::Left) => Align::Left,
                Some(Align::Center) => Align::Center,
                _ => Align::Right,
            }
        };
        let caption = if node.attrs.thumb || node.attrs.frame || self.ctx.gallery_mode() {
            self.render_inline(&node.children)?.trim().to_string()
        } else {
            String::new()
        };
        let caption_style = text_style(&self.config, TextMode::Figure, 0, self.ctx.in_table(), None);
        let figure = ImageFlowable::new(target, size.width, size.height, caption_style)
            .with_caption(caption)
            .with_align(align)
            .with_url(url);
        Ok(vec![Fragment::Block(Flowable::Image(figure))])
    }

    fn write_gallery(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let count = node
            .children
            .iter()
            .filter(|c| c.kind == NodeKind::Image)
            .count();
        if count == 0 {
            return Ok(Vec::new());
        }
        let per_row = match node.attrs.per_row {
            Some(per_row) => per_row.min(6).min(count),
            None => count.min(4),
        }
        .max(1);
        let col_width = self.config.print_width() / (per_row as i32) - Pt::from_i32(12);
        let column = Scope::Column {
            width: Some(col_width),
            count: per_row,
        };
        let cells = self.scoped(Scope::Gallery, |w| {
            w.scoped(column, |w| w.gallery_cells(node))
        })?;

        let mut rows: Vec<Vec<TableCell>> = cells.chunks(per_row).map(<[TableCell]>::to_vec).collect();
        if let Some(row) = rows.last_mut() {
            row.resize_with(per_row, TableCell::empty);
        }

        let mut out = Vec::new();
        if let Some(caption) = node.attrs.caption.as_deref().filter(|c| !c.trim().is_empty()) {
            out.push(Fragment::Block(Flowable::Paragraph(Paragraph::new(
                format!("<b>{}</b>", escape_markup(caption.trim())),
                heading_style(&self.config, HeadingMode::TableCaption),
            ))));
        }
        let widths = vec![col_width + Pt::from_i32(12); per_row];
        out.push(Fragment::Block(Flowable::Table(
            TableFlowable::new(rows, widths, TableKind::Gallery)
                .with_cell_padding(self.optimizer.cell_padding()),
        )));
        Ok(out)
    }

    fn gallery_cells(&mut self, node: &DocumentNode) -> Result<Vec<TableCell>> {
        let style = text_style(&self.config, TextMode::Body, 0, true, None);
        let mut cells = Vec::new();
        for child in &node.children {
            let fragments = if child.kind == NodeKind::Image {
                let mut image = child.clone();
                image.attrs.align = Some(Align::Center);
                self.write(&image)?
            } else {
                self.write(child)?
            };
            let content = into_blocks(fragments, &style);
            if !content.is_empty() {
                cells.push(TableCell::new(content, 1));
            }
        }
        Ok(cells)
    }

    fn write_caption(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let text = self.render_inline(&node.children)?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Fragment::Block(Flowable::Paragraph(Paragraph::new(
            format!("<b>{}</b>", text.trim()),
            heading_style(&self.config, HeadingMode::TableCaption),
        )))])
    }

    fn write_stray_row(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        self.skip("row outside of a table".to_string());
        self.render_children(&node.children)
    }

    fn write_table(&mut self, node: &DocumentNode) -> Result<Vec<Fragment>> {
        let nested_sizing = self.ctx.is_sizing();
        self.scoped(Scope::Table, |w| w.table_body(node, nested_sizing))
    }

    fn table_body(&mut self, node: &DocumentNode, nested_sizing: bool) -> Result<Vec<Fragment>> {
        let mut out = Vec::new();
        let mut rows: Vec<Vec<&DocumentNode>> = Vec::new();
        for child in &node.children {
            match child.kind {
                NodeKind::Caption if !nested_sizing => out.extend(self.write_caption(child)?),
                NodeKind::Caption => {}
                NodeKind::Row => {
                    let mut cells = Vec::with_capacity(child.children.len());
                    for cell in &child.children {
                        if cell.kind == NodeKind::Cell {
                            cells.push(cell);
                        } else {
                            self.skip(format!("{} node in table row, skipped", cell.kind.name()));
                        }
                    }
                    rows.push(cells);
                }
                _ => self.skip(format!("{} node in table, skipped", child.kind.name())),
            }
        }

        let columns = node.attrs.columns.filter(|c| *c > 0).unwrap_or_else(|| {
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.colspan()).sum::<usize>())
                .max()
                .unwrap_or(0)
        });
        if columns == 0 {
            return Ok(out);
        }

        let mut grid: Vec<Vec<(Option<&DocumentNode>, usize)>> = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let spans: Vec<usize> = row.iter().map(|cell| cell.colspan()).collect();
            let fit = fit_spans(&spans, columns);
            if !fit.is_exact(columns) {
                let err = LayoutError::MalformedTable {
                    row: index,
                    expected: columns,
                    found: fit.found,
                };
                self.warn(err, "Table")?;
            }
            let mut cells: Vec<(Option<&DocumentNode>, usize)> = row
                .iter()
                .zip(&fit.spans)
                .map(|(cell, span)| (Some(*cell), *span))
                .collect();
            cells.extend((0..fit.padding).map(|_| (None, 1)));
            grid.push(cells);
        }

        // The sizing pass must not leave references behind; cells are rendered again below.
        let saved = self.article.clone();
        let sized = self.scoped(Scope::TableSizing, |w| w.render_grid(&grid, columns, None));
        self.article = saved;
        let sized = sized?;

        let page_height = Pt::from_f32(self.config.page_height);
        let extents = self
            .optimizer
            .measure_cells(self.metrics.as_ref(), &sized, page_height)?;
        let widths = self.optimizer.column_extents(&extents, columns);
        if nested_sizing {
            out.push(Fragment::Block(Flowable::TableExtent(widths.to_extent())));
            return Ok(out);
        }

        let allocation = self.optimizer.compute_widths(&widths, self.available_width());
        if let Some(overflow) = allocation.overflow_warning() {
            self.warn(overflow, "Table")?;
        }
        let rows = self.render_grid(&grid, columns, Some(&allocation.widths))?;
        let spacing = Spacer::new(0.25 * CM);
        out.push(Fragment::Block(Flowable::Spacer(spacing)));
        out.push(Fragment::Block(Flowable::Table(
            TableFlowable::new(rows, allocation.widths, TableKind::Data)
                .with_cell_padding(self.optimizer.cell_padding()),
        )));
        out.push(Fragment::Block(Flowable::Spacer(spacing)));
        Ok(out)
    }

    fn render_grid(
        &mut self,
        grid: &[Vec<(Option<&DocumentNode>, usize)>],
        columns: usize,
        widths: Option<&[Pt]>,
    ) -> Result<Vec<Vec<TableCell>>> {
        let indent = self.indent_amount();
        let mut rows = Vec::with_capacity(grid.len());
        for row in grid {
            let mut col = 0usize;
            let mut cells = Vec::with_capacity(row.len());
            for (cell, span) in row {
                let width = widths.map(|widths| {
                    let spanned: Pt = widths.iter().skip(col).take(*span).sum();
                    (spanned - indent).max(Pt::ZERO)
                });
                let content = match cell {
                    Some(cell) => {
                        let scope = Scope::Column {
                            width,
                            count: columns,
                        };
                        self.scoped(scope, |w| w.render_cell(cell))?
                    }
                    None => Vec::new(),
                };
                let mut table_cell = TableCell::new(content, *span);
                table_cell.is_header = cell.is_some_and(|c| c.attrs.is_header);
                cells.push(table_cell);
                col += span;
            }
            rows.push(cells);
        }
        Ok(rows)
    }

    fn render_cell(&mut self, cell: &DocumentNode) -> Result<Vec<Flowable>> {
        let style = text_style(&self.config, TextMode::Body, 0, true, cell.attrs.align);
        let mut out = Vec::new();
        let raised = [NodeKind::NamedUrl, NodeKind::Reference, NodeKind::Sup]
            .iter()
            .any(|kind| cell.contains_kind(kind));
        if raised {
            out.push(Flowable::Spacer(Spacer::new(1.0)));
        }
        let fragments = self.render_mixed(&cell.children, style.clone(), None, cell.attrs.is_header)?;
        out.extend(into_blocks(fragments, &style));
        Ok(out)
    }
}

fn url_of(node: &DocumentNode) -> String {
    let raw = node
        .attrs
        .url
        .clone()
        .or_else(|| node.text.clone())
        .unwrap_or_default();
    cut_at_quote(&raw).trim().to_string()
}

fn cut_at_quote(raw: &str) -> &str {
    match raw.find('"') {
        Some(idx) => &raw[..idx],
        None => raw,
    }
}

/// Escapes a URL and adds zero-width break opportunities after separators.
fn breakable_url(url: &str) -> String {
    let zws = '\u{200B}';
    escape_markup(url)
        .replace('/', &format!("/{zws}"))
        .replace('.', &format!(".{zws}"))
        .replace('+', &format!("+{zws}"))
        .replace("&amp;", &format!("&amp;{zws}"))
}

fn math_source(node: &DocumentNode) -> String {
    let raw = node.text.clone().unwrap_or_else(|| node.display_text());
    let mut out = String::with_capacity(raw.len());
    let mut last_newline = false;
    for ch in raw.trim().chars() {
        if ch == '\n' {
            if last_newline {
                continue;
            }
            last_newline = true;
        } else {
            last_newline = false;
        }
        out.push(ch);
    }
    out
}

/// Splits a line into alternating word and whitespace runs. Whitespace
/// inside markup tags does not split.
fn split_fragments(line: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut in_tag = false;
    let mut in_space = false;
    for ch in line.chars() {
        if ch == '<' {
            in_tag = true;
        }
        let is_space = (ch == ' ' || ch == '\t') && !in_tag;
        if is_space != in_space && !current.is_empty() {
            fragments.push(std::mem::take(&mut current));
        }
        in_space = is_space;
        current.push(ch);
        if ch == '>' {
            in_tag = false;
        }
    }
    if !current.is_empty() {
        fragments.push(current);
    }
    fragments
}

/// Rewraps lines longer than `limit` visible characters at whitespace.
pub(crate) fn break_long_lines(text: &str, limit: usize) -> String {
    let mut lines = Vec::new();
    for line in text.split('\n') {
        if visible_len(line) < limit {
            lines.push(line.to_string());
            continue;
        }
        let mut fragments = split_fragments(line).into_iter().peekable();
        while let Some(first) = fragments.next() {
            let mut current = first;
            while let Some(next) = fragments.peek() {
                if visible_len(&current) + visible_len(next) >= limit {
                    break;
                }
                if let Some(next) = fragments.next() {
                    current.push_str(&next);
                }
            }
            lines.push(current);
        }
    }
    lines.join("\n")
}

/// Plain text of a paragraph-like flowable, for fallbacks and tests.
pub fn flowable_text(flowable: &Flowable) -> String {
    match flowable {
        Flowable::Paragraph(p) => strip_markup(&p.text),
        Flowable::KeepTogether(items) => items.iter().map(flowable_text).collect(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::EstimatedMetrics;
    use crate::node::NodeAttrs;
    use crate::types::Size;

    struct FixedImages(Size);

    impl ImageCatalog for FixedImages {
        fn size(&self, _id: &str, max_width: Pt, max_height: Pt, _dpi: f32) -> Result<Size> {
            Ok(crate::measure::fit_within(self.0, max_width, max_height))
        }
    }

    struct BrokenMetrics;

    impl BoxMetrics for BrokenMetrics {
        fn measure(&self, _flowable: &Flowable, _w: Pt, _h: Pt) -> Result<Size> {
            Err(LayoutError::MeasurementFailure("no fonts".into()))
        }
    }

    fn walker_with(config: LayoutConfig) -> LayoutWalker {
        LayoutWalker::new(
            config,
            Arc::new(EstimatedMetrics::new()),
            Arc::new(FixedImages(Size::from_f32(200.0, 100.0))),
        )
    }

    fn walker() -> LayoutWalker {
        walker_with(LayoutConfig::default())
    }

    fn text(value: &str) -> DocumentNode {
        DocumentNode::text(value)
    }

    fn node(kind: NodeKind, children: Vec<DocumentNode>) -> DocumentNode {
        DocumentNode::new(kind).with_children(children)
    }

    fn attrs(f: impl FnOnce(&mut NodeAttrs)) -> NodeAttrs {
        let mut attrs = NodeAttrs::default();
        f(&mut attrs);
        attrs
    }

    fn paragraphs(items: &[Flowable]) -> Vec<&Paragraph> {
        items.iter().filter_map(Flowable::as_paragraph).collect()
    }

    #[test]
    fn inline_children_merge_into_one_paragraph() {
        let mut w = walker();
        let para = node(
            NodeKind::Paragraph,
            vec![
                text("Hello "),
                node(NodeKind::Strong, vec![text("big")]),
                text(" world & more"),
            ],
        );
        let out = w.layout(&para).expect("layout");
        assert_eq!(out.len(), 1);
        let Flowable::Paragraph(p) = &out[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(p.text, "Hello <b>big</b> world &amp; more");
    }

    #[test]
    fn block_child_flushes_pending_text() {
        let mut w = walker();
        let para = node(
            NodeKind::Paragraph,
            vec![
                text("before"),
                DocumentNode::new(NodeKind::HorizontalRule),
                text("   "),
            ],
        );
        let out = w.layout(&para).expect("layout");
        let names: Vec<&str> = out.iter().map(Flowable::debug_name).collect();
        assert_eq!(names, vec!["Paragraph", "Rule"]);
    }

    #[test]
    fn block_inside_inline_degrades_to_text() {
        let mut w = walker();
        let strong = node(
            NodeKind::Strong,
            vec![node(NodeKind::Paragraph, vec![text("inner")])],
        );
        let fragments = w.write(&strong).expect("write");
        assert_eq!(fragments, vec![Fragment::Inline("<b>inner</b>".into())]);
        assert_eq!(w.warnings(), 1);
    }

    #[test]
    fn text_between_blocks_keeps_document_order() {
        let mut w = walker();
        let para = node(
            NodeKind::Paragraph,
            vec![node(
                NodeKind::DefinitionList,
                vec![
                    node(NodeKind::DefinitionTerm, vec![text("Term")]),
                    text("middle"),
                    node(NodeKind::DefinitionDescription, vec![text("Desc")]),
                ],
            )],
        );
        let out = w.layout(&para).expect("layout");
        let texts: Vec<String> = out
            .iter()
            .map(|f| flowable_text(f).trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        assert_eq!(texts, vec!["Term", "middle", "Desc"]);
    }

    #[test]
    fn table_cell_warnings_count_once() {
        let mut w = walker();
        let table = node(
            NodeKind::Table,
            vec![node(
                NodeKind::Row,
                vec![node(
                    NodeKind::Cell,
                    vec![node(NodeKind::List, vec![text("stray")])],
                )],
            )],
        );
        w.layout(&table).expect("layout");
        assert_eq!(w.warnings(), 1);
    }

    #[test]
    fn unrecognized_kind_is_empty_when_lenient() {
        let mut w = walker();
        let unknown = DocumentNode::new(NodeKind::Unrecognized("Timeline".into()))
            .with_child(text("ignored"));
        assert!(w.layout(&unknown).expect("lenient").is_empty());
        assert_eq!(w.warnings(), 1);
    }

    #[test]
    fn unrecognized_kind_fails_when_strict() {
        let config = LayoutConfig::builder().strict(true).build().expect("config");
        let mut w = walker_with(config);
        let unknown = DocumentNode::new(NodeKind::Unrecognized("Timeline".into()));
        let err = match w.layout(&unknown) {
            Ok(_) => panic!("strict walker should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, LayoutError::UnsupportedNodeKind(ref name) if name == "Timeline"));
        assert_eq!(w.context().depth(), 0);
    }

    #[test]
    fn enumerate_lists_restart_at_one() {
        let mut w = walker();
        let list = || {
            node(
                NodeKind::List,
                vec![
                    node(NodeKind::ListItem, vec![text("one")]),
                    node(NodeKind::ListItem, vec![text("two")]),
                ],
            )
            .with_attrs(attrs(|a| a.numbered = Some(ListNumbering::Decimal)))
        };
        let doc = node(NodeKind::Article, vec![list(), list()]);
        let out = w.layout(&doc).expect("layout");
        let labels: Vec<(usize, String)> = paragraphs(&out)
            .iter()
            .filter_map(|p| p.bullet.as_ref())
            .map(|b| (b.counter_id, b.text.clone()))
            .collect();
        assert_eq!(labels.len(), 4);
        assert_eq!(labels[0].1, "1.");
        assert_eq!(labels[1].1, "2.");
        assert_eq!(labels[2].1, "1.");
        assert_ne!(labels[0].0, labels[2].0);
    }

    #[test]
    fn lettered_and_nested_lists_indent() {
        let mut w = walker();
        let inner = node(NodeKind::List, vec![node(NodeKind::ListItem, vec![text("deep")])]);
        let outer = node(
            NodeKind::List,
            vec![node(NodeKind::ListItem, vec![text("top"), inner])],
        )
        .with_attrs(attrs(|a| a.numbered = Some(ListNumbering::UpperAlpha)));
        let out = w.layout(&outer).expect("layout");
        let paras = paragraphs(&out);
        assert_eq!(paras[0].bullet.as_ref().map(|b| b.text.as_str()), Some("A."));
        assert_eq!(paras[1].bullet.as_ref().map(|b| b.text.as_str()), Some("\u{2022}"));
        assert!(paras[1].style.left_indent > paras[0].style.left_indent);
        assert_eq!(letter_label(28, false), "ab");
    }

    #[test]
    fn non_items_in_lists_are_skipped() {
        let mut w = walker();
        let list = node(
            NodeKind::List,
            vec![text("stray"), node(NodeKind::ListItem, vec![text("item")])],
        );
        let out = w.layout(&list).expect("layout");
        assert_eq!(out.len(), 1);
        assert_eq!(w.warnings(), 1);
    }

    #[test]
    fn named_reference_reuses_first_index() {
        let mut w = walker();
        let named = |children: Vec<DocumentNode>| {
            node(NodeKind::Reference, children).with_attrs(attrs(|a| a.name = Some("src".into())))
        };
        let doc = node(
            NodeKind::Article,
            vec![node(
                NodeKind::Paragraph,
                vec![
                    text("a"),
                    named(vec![text("Source text")]),
                    text(" b"),
                    named(Vec::new()),
                    text(" c"),
                    named(vec![text("Duplicate body")]),
                ],
            )],
        );
        let out = w.layout_article("Sample", None, "", &doc).expect("article");
        let body = paragraphs(&out)
            .into_iter()
            .find(|p| p.text.starts_with('a'))
            .expect("body paragraph");
        assert_eq!(body.text.matches("[1]").count(), 3);
        assert!(!body.text.contains("[2]"));
        let list: Vec<&Paragraph> = paragraphs(&out)
            .into_iter()
            .filter(|p| p.bullet.is_some())
            .collect();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].bullet.as_ref().map(|b| b.text.as_str()), Some("[1]"));
        assert_eq!(w.registry().footnotes[0].entries.len(), 1);
        assert_eq!(w.registry().footnotes[0].entries[0].content, "Source text");
    }

    #[test]
    fn reference_list_node_renders_in_place_and_clears() {
        let mut w = walker();
        let doc = node(
            NodeKind::Article,
            vec![
                node(NodeKind::Paragraph, vec![node(NodeKind::Reference, vec![text("r1")])]),
                DocumentNode::new(NodeKind::ReferenceList),
            ],
        );
        let out = w.layout_article("Refs", None, "", &doc).expect("article");
        let headings = paragraphs(&out)
            .iter()
            .filter(|p| p.text.contains("References"))
            .count();
        assert_eq!(headings, 0);
        assert_eq!(
            paragraphs(&out).iter().filter(|p| p.bullet.is_some()).count(),
            1
        );
    }

    #[test]
    fn long_table_urls_become_references() {
        let mut w = walker();
        let url = "https://example.org/a/very/long/path/to/something";
        let cell = node(
            NodeKind::Cell,
            vec![DocumentNode::new(NodeKind::Url).with_text(url)],
        );
        let table = node(NodeKind::Table, vec![node(NodeKind::Row, vec![cell])]);
        let doc = node(NodeKind::Article, vec![table]);
        let out = w.layout_article("Links", None, "", &doc).expect("article");
        let Some(Flowable::Table(table)) = out.iter().find(|f| matches!(f, Flowable::Table(_))) else {
            panic!("expected table");
        };
        let cell_text = flowable_text(&table.rows[0][0].content[0]);
        assert_eq!(cell_text, "[1]");
        assert_eq!(w.registry().footnotes[0].entries[0].content, url);
    }

    #[test]
    fn table_columns_fill_available_width() {
        let mut w = walker();
        let row = node(
            NodeKind::Row,
            vec![
                node(NodeKind::Cell, vec![text("short")]),
                node(NodeKind::Cell, vec![text("a somewhat longer cell")]),
            ],
        );
        let table = node(NodeKind::Table, vec![row]);
        let out = w.layout(&table).expect("layout");
        let names: Vec<&str> = out.iter().map(Flowable::debug_name).collect();
        assert_eq!(names, vec!["Spacer", "Table", "Spacer"]);
        let Flowable::Table(table) = &out[1] else {
            panic!("expected table");
        };
        assert_eq!(table.col_widths.len(), 2);
        let slack = table.total_width().to_milli_i64() - w.config().print_width().to_milli_i64();
        assert!(slack.abs() <= 1);
        assert!(table.col_widths[1] > table.col_widths[0]);
        assert_eq!(w.context().depth(), 0);
    }

    #[test]
    fn nested_table_reports_extent_while_sizing() {
        let mut w = walker();
        let inner = node(
            NodeKind::Table,
            vec![node(
                NodeKind::Row,
                vec![
                    node(NodeKind::Cell, vec![text("x")]),
                    node(NodeKind::Cell, vec![text("y")]),
                ],
            )],
        );
        let mut sizing = walker();
        let extent = sizing.scoped(Scope::TableSizing, |s| s.write(&inner)).expect("sizing");
        assert!(matches!(
            extent.as_slice(),
            [Fragment::Block(Flowable::TableExtent(e))] if e.min_widths.len() == 2
        ));

        let outer = node(
            NodeKind::Table,
            vec![node(NodeKind::Row, vec![node(NodeKind::Cell, vec![inner])])],
        );
        let out = w.layout(&outer).expect("layout");
        let Flowable::Table(outer) = &out[1] else {
            panic!("expected outer table");
        };
        let nested = outer.rows[0][0]
            .content
            .iter()
            .find_map(|f| match f {
                Flowable::Table(t) => Some(t),
                _ => None,
            })
            .expect("inner table");
        assert!(nested.total_width().to_milli_i64() <= outer.col_widths[0].to_milli_i64() + 1);
    }

    #[test]
    fn malformed_rows_are_padded_or_rejected_when_strict() {
        let table = node(
            NodeKind::Table,
            vec![
                node(
                    NodeKind::Row,
                    vec![
                        node(NodeKind::Cell, vec![text("a")]),
                        node(NodeKind::Cell, vec![text("b")]),
                    ],
                ),
                node(NodeKind::Row, vec![node(NodeKind::Cell, vec![text("c")])]),
            ],
        );
        let mut lenient = walker();
        let out = lenient.layout(&table).expect("lenient");
        let Flowable::Table(grid) = &out[1] else {
            panic!("expected table");
        };
        assert_eq!(grid.rows[1].len(), 2);
        assert!(grid.rows[1][1].content.is_empty());
        assert_eq!(lenient.warnings(), 1);

        let config = LayoutConfig::builder().strict(true).build().expect("config");
        let mut strict = walker_with(config);
        let err = match strict.layout(&table) {
            Ok(_) => panic!("strict table should fail"),
            Err(err) => err,
        };
        assert!(matches!(
            err,
            LayoutError::MalformedTable { row: 1, expected: 2, found: 1 }
        ));
    }

    #[test]
    fn measurement_failure_falls_back_to_plain_text() {
        let mut w = LayoutWalker::new(
            LayoutConfig::default(),
            Arc::new(BrokenMetrics),
            Arc::new(FixedImages(Size::from_f32(10.0, 10.0))),
        );
        let table = node(
            NodeKind::Table,
            vec![node(NodeKind::Row, vec![node(NodeKind::Cell, vec![text("cell <text>")])])],
        );
        let out = w.layout(&table).expect("fallback");
        assert_eq!(out.len(), 1);
        let Flowable::Paragraph(p) = &out[0] else {
            panic!("expected plain text paragraph");
        };
        assert_eq!(p.text, "cell &lt;text&gt;");
        assert_eq!(w.context().depth(), 0);
    }

    #[test]
    fn images_are_sized_registered_and_centered() {
        let mut w = walker();
        let image = DocumentNode::new(NodeKind::Image)
            .with_attrs(attrs(|a| {
                a.target = Some("Cat.png".into());
                a.thumb = true;
                a.align = Some(Align::Left);
            }))
            .with_child(text("A cat"));
        let out = w.layout(&image).expect("layout");
        let figure = out[0].as_image().expect("image");
        assert_eq!(figure.align, Align::Left);
        assert_eq!(figure.caption, "A cat");
        assert_eq!(figure.width, Pt::from_i32(200));

        let centered = node(NodeKind::Center, vec![image.clone()]);
        let out = w.layout(&centered).expect("layout");
        assert_eq!(out[0].as_image().map(|i| i.align), Some(Align::Center));
        assert_eq!(w.registry().images.len(), 1);
        assert_eq!(w.registry().images["Cat.png"].ordinal, 1);
    }

    #[test]
    fn gallery_fills_rows_and_pads_last() {
        let mut w = walker();
        let image = |name: &str| {
            DocumentNode::new(NodeKind::Image).with_attrs(attrs(|a| a.target = Some(name.into())))
        };
        let gallery = node(
            NodeKind::Gallery,
            vec![image("a.png"), image("b.png"), image("c.png"), image("d.png"), image("e.png")],
        )
        .with_attrs(attrs(|a| a.per_row = Some(3)));
        let out = w.layout(&gallery).expect("layout");
        let Flowable::Table(grid) = &out[0] else {
            panic!("expected gallery table");
        };
        assert_eq!(grid.kind, TableKind::Gallery);
        assert_eq!(grid.rows.len(), 2);
        assert_eq!(grid.rows[1].len(), 3);
        assert!(grid.rows[1][2].content.is_empty());
        let first = grid.rows[0][0].content[0].as_image().expect("image");
        assert_eq!(first.align, Align::Center);
        assert!(first.height <= w.config().print_height() / 3);
    }

    #[test]
    fn long_math_disables_floating() {
        let mut config = LayoutConfig::default();
        config.no_float_math_len = 5;
        let mut w = walker_with(config);
        let para = node(
            NodeKind::Paragraph,
            vec![text("see "), DocumentNode::new(NodeKind::Math).with_text("x^2 + y^2 = z^2")],
        );
        let out = w.layout(&para).expect("layout");
        let Flowable::Paragraph(p) = &out[0] else {
            panic!("expected paragraph");
        };
        assert!(!p.style.flowable);
        assert!(p.text.contains("<font face=\"mono\">x^2 + y^2 = z^2</font>"));
    }

    #[test]
    fn headings_register_bookmarks_outside_tables() {
        let mut w = walker();
        let heading = node(NodeKind::Heading, vec![text("History"), text("Body text")])
            .with_attrs(attrs(|a| a.level = Some(2)));
        let out = w.layout(&heading).expect("layout");
        let Flowable::Paragraph(title) = &out[0] else {
            panic!("expected heading");
        };
        assert!(title.style.is_heading());
        assert_eq!(title.anchors, vec!["bookmark0".to_string()]);
        assert_eq!(w.registry().bookmarks[0].label, "History");
        assert_eq!(flowable_text(&out[1]), "Body text");
    }

    #[test]
    fn internal_links_point_at_known_articles() {
        let mut w = walker();
        let id = article_id("https://wiki", "Target");
        w.registry_mut().add_article_id(id.clone());
        let doc = node(
            NodeKind::Article,
            vec![node(
                NodeKind::Paragraph,
                vec![
                    DocumentNode::new(NodeKind::Link)
                        .with_attrs(attrs(|a| a.target = Some("target".into())))
                        .with_child(text("there")),
                    text(" and "),
                    DocumentNode::new(NodeKind::Link)
                        .with_attrs(attrs(|a| {
                            a.target = Some("Elsewhere".into());
                            a.url = Some("https://wiki/Elsewhere".into());
                        })),
                ],
            )],
        );
        let out = w.layout_article("Source", None, "https://wiki", &doc).expect("article");
        let body = paragraphs(&out)
            .into_iter()
            .find(|p| p.text.contains("link"))
            .expect("body");
        assert!(body.text.contains(&format!("<link href=\"#{id}\">\u{2192} there</link>")));
        assert!(body.text.contains("<link href=\"https://wiki/Elsewhere\">Elsewhere</link>"));
    }

    #[test]
    fn preformatted_breaks_long_lines_in_tables() {
        let line = "word ".repeat(30);
        let broken = break_long_lines(line.trim_end(), 20);
        assert!(broken.lines().all(|l| visible_len(l) < 20));
        assert_eq!(broken.replace('\n', ""), line.trim_end());

        let tagged = split_fragments("<font size=\"8\">a</font> b");
        assert_eq!(tagged, vec!["<font size=\"8\">a</font>", " ", "b"]);
    }

    #[test]
    fn div_with_height_becomes_spacer() {
        let mut w = walker();
        let div = DocumentNode::new(NodeKind::Div).with_attrs(attrs(|a| a.height = Some(5000.0)));
        let out = w.layout(&div).expect("layout");
        let Flowable::Spacer(spacer) = &out[0] else {
            panic!("expected spacer");
        };
        assert_eq!(spacer.height, w.config().print_height() - Pt::from_i32(20));
    }
}
