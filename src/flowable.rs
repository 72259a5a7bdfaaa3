use crate::node::Align;
use crate::style::{ParagraphStyle, StyleKind};
use crate::types::{CM, Margins, Pt};

/// Bullet or number drawn in front of a list item.
#[derive(Debug, Clone, PartialEq)]
pub struct ListLabel {
    pub text: String,
    pub counter_id: usize,
    pub ordinal: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    /// Text with light inline markup (`<b>`, `<i>`, `<super>`, `<link>`, ...).
    pub text: String,
    pub style: ParagraphStyle,
    pub bullet: Option<ListLabel>,
    /// Named destinations (bookmarks, article ids) attached to this paragraph.
    pub anchors: Vec<String>,
    /// Line breaks and spacing are significant.
    pub preformatted: bool,
}

impl Paragraph {
    pub fn new(text: impl Into<String>, style: ParagraphStyle) -> Self {
        Self {
            text: text.into(),
            style,
            bullet: None,
            anchors: Vec::new(),
            preformatted: false,
        }
    }

    pub fn preformatted(text: impl Into<String>, style: ParagraphStyle) -> Self {
        let mut paragraph = Self::new(text, style);
        paragraph.preformatted = true;
        paragraph
    }

    pub fn with_bullet(mut self, bullet: ListLabel) -> Self {
        self.bullet = Some(bullet);
        self
    }

    pub fn with_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.anchors.push(anchor.into());
        self
    }

    pub fn plain_text(&self) -> String {
        strip_markup(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageFlowable {
    pub image_id: String,
    pub width: Pt,
    pub height: Pt,
    pub caption: String,
    pub caption_style: ParagraphStyle,
    pub margin: Margins,
    pub padding: Margins,
    pub align: Align,
    pub url: Option<String>,
}

impl ImageFlowable {
    pub fn new(
        image_id: impl Into<String>,
        width: Pt,
        height: Pt,
        caption_style: ParagraphStyle,
    ) -> Self {
        let gap = 0.2 * CM;
        Self {
            image_id: image_id.into(),
            width,
            height,
            caption: String::new(),
            caption_style,
            margin: Margins::all(gap),
            padding: Margins::all(gap),
            align: Align::Right,
            url: None,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    pub fn with_align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url.filter(|v| !v.trim().is_empty());
        self
    }

    pub fn is_floating(&self) -> bool {
        self.align != Align::Center
    }

    /// Horizontal space taken by margin and padding together.
    pub fn horizontal_chrome(&self) -> Pt {
        self.margin.horizontal() + self.padding.horizontal()
    }

    pub fn vertical_chrome(&self) -> Pt {
        self.margin.vertical() + self.padding.vertical()
    }

    /// Rescales to `width`, keeping the aspect ratio.
    pub fn scaled_to_width(&self, width: Pt) -> Self {
        let mut scaled = self.clone();
        if self.width.is_positive() {
            scaled.height = self
                .height
                .mul_ratio(width.to_milli_i64(), self.width.to_milli_i64());
        }
        scaled.width = width;
        scaled
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableCell {
    pub content: Vec<Flowable>,
    pub colspan: usize,
    pub is_header: bool,
}

impl TableCell {
    pub fn new(content: Vec<Flowable>, colspan: usize) -> Self {
        Self {
            content,
            colspan: colspan.max(1),
            is_header: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Data,
    Gallery,
    /// Grid built from images that could not float next to text.
    ImageGrid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableFlowable {
    pub rows: Vec<Vec<TableCell>>,
    pub col_widths: Vec<Pt>,
    pub kind: TableKind,
    pub cell_padding: Pt,
}

impl TableFlowable {
    pub fn new(rows: Vec<Vec<TableCell>>, col_widths: Vec<Pt>, kind: TableKind) -> Self {
        Self {
            rows,
            col_widths,
            kind,
            cell_padding: Pt::from_i32(3),
        }
    }

    pub fn with_cell_padding(mut self, padding: Pt) -> Self {
        self.cell_padding = padding;
        self
    }

    pub fn column_count(&self) -> usize {
        self.col_widths.len()
    }

    pub fn total_width(&self) -> Pt {
        self.col_widths.iter().sum()
    }

    /// Width of `span` columns starting at `start`.
    pub fn span_width(&self, start: usize, span: usize) -> Pt {
        self.col_widths
            .iter()
            .skip(start)
            .take(span.max(1))
            .copied()
            .sum()
    }
}

/// Aggregate width requirements of a nested table, reported while the
/// enclosing table is still being sized.
#[derive(Debug, Clone, PartialEq)]
pub struct TableExtent {
    pub min_widths: Vec<Pt>,
    pub max_widths: Vec<Pt>,
}

impl TableExtent {
    pub fn min_total(&self) -> Pt {
        self.min_widths.iter().sum()
    }

    pub fn max_total(&self) -> Pt {
        self.max_widths.iter().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spacer {
    pub width: Pt,
    pub height: Pt,
}

impl Spacer {
    pub fn new(height: f32) -> Self {
        Self::new_pt(Pt::from_f32(height))
    }

    pub fn new_pt(height: Pt) -> Self {
        Self {
            width: Pt::ZERO,
            height: height.max(Pt::ZERO),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizontalRule {
    /// Fraction of the available width, 0..=1.
    pub width_fraction: f32,
    pub thickness: Pt,
    pub space_before: Pt,
    pub space_after: Pt,
}

impl HorizontalRule {
    pub fn new(width_fraction: f32, thickness: f32) -> Self {
        Self {
            width_fraction: width_fraction.clamp(0.0, 1.0),
            thickness: Pt::from_f32(thickness),
            space_before: Pt::ZERO,
            space_after: Pt::ZERO,
        }
    }

    pub fn with_spacing(mut self, before: f32, after: f32) -> Self {
        self.space_before = Pt::from_f32(before);
        self.space_after = Pt::from_f32(after);
        self
    }
}

/// Text flowing beside one or more floating images.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatGroup {
    pub figures: Vec<ImageFlowable>,
    pub paragraphs: Vec<Flowable>,
    pub figure_margin: Margins,
}

impl FloatGroup {
    pub fn align(&self) -> Align {
        self.figures
            .first()
            .map(|figure| figure.align)
            .unwrap_or(Align::Right)
    }

    pub fn figure_width(&self) -> Pt {
        self.figures
            .iter()
            .map(|figure| figure.width + figure.horizontal_chrome())
            .fold(Pt::ZERO, Pt::max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageBreak {
    Always,
    /// Break unless already at the top of a page; also a legal split point
    /// for keep-together grouping.
    NotAtTop,
    /// Break when less than this much vertical space remains.
    Conditional(Pt),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TocLevel {
    Group,
    Chapter,
    Article,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TocEntry {
    pub text: String,
    pub level: TocLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Flowable {
    Paragraph(Paragraph),
    Image(ImageFlowable),
    Table(TableFlowable),
    TableExtent(TableExtent),
    Spacer(Spacer),
    Rule(HorizontalRule),
    FloatGroup(FloatGroup),
    /// Must not be split across a page boundary.
    KeepTogether(Vec<Flowable>),
    PageBreak(PageBreak),
    NextTemplate(String),
    TocEntry(TocEntry),
}

impl Flowable {
    pub fn debug_name(&self) -> &'static str {
        match self {
            Flowable::Paragraph(_) => "Paragraph",
            Flowable::Image(_) => "Image",
            Flowable::Table(_) => "Table",
            Flowable::TableExtent(_) => "TableExtent",
            Flowable::Spacer(_) => "Spacer",
            Flowable::Rule(_) => "Rule",
            Flowable::FloatGroup(_) => "FloatGroup",
            Flowable::KeepTogether(_) => "KeepTogether",
            Flowable::PageBreak(_) => "PageBreak",
            Flowable::NextTemplate(_) => "NextTemplate",
            Flowable::TocEntry(_) => "TocEntry",
        }
    }

    /// Headings and rules anchor keep-together groups.
    pub fn is_heading_like(&self) -> bool {
        match self {
            Flowable::Rule(_) => true,
            Flowable::Paragraph(p) => p.style.is_heading(),
            _ => false,
        }
    }

    /// Text that may be placed beside a floating image.
    pub fn is_flowing_text(&self) -> bool {
        matches!(self, Flowable::Paragraph(p) if p.style.flowable)
    }

    pub fn is_flowing_heading(&self) -> bool {
        matches!(self, Flowable::Paragraph(p) if p.style.flowable && matches!(p.style.kind, StyleKind::Heading(_)))
    }

    /// Markers carry no content and occupy no space.
    pub fn is_marker(&self) -> bool {
        matches!(
            self,
            Flowable::PageBreak(_) | Flowable::NextTemplate(_) | Flowable::TocEntry(_)
        )
    }

    pub fn as_image(&self) -> Option<&ImageFlowable> {
        match self {
            Flowable::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn as_paragraph(&self) -> Option<&Paragraph> {
        match self {
            Flowable::Paragraph(p) => Some(p),
            _ => None,
        }
    }
}

pub fn escape_markup(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Drops tags and decodes the entities produced by [`escape_markup`].
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Character count ignoring markup tags.
pub fn visible_len(text: &str) -> usize {
    strip_markup(text).chars().count()
}
