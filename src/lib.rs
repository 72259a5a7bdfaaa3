mod book;
mod config;
mod context;
mod debug;
mod doc_template;
mod error;
mod flowable;
mod frame;
mod grouper;
mod measure;
mod metrics;
mod node;
mod packer;
mod registry;
mod style;
mod table;
mod types;
mod walker;

pub use book::{ArticleSource, Book, BookItem, BookWriter, CollectingSink, RenderSink, contributors_text};
pub use config::{LayoutConfig, LayoutConfigBuilder};
pub use context::{LayoutContext, Scope};
pub use debug::DebugLogger;
pub use doc_template::{DocTemplate, OutlineEntry, Page};
pub use error::{LayoutError, Result};
pub use flowable::{
    FloatGroup, Flowable, HorizontalRule, ImageFlowable, ListLabel, PageBreak, Paragraph, Spacer,
    TableCell, TableExtent, TableFlowable, TableKind, TocEntry, TocLevel, escape_markup,
    strip_markup, visible_len,
};
pub use frame::{AddResult, Frame, PlacedFlowable};
pub use grouper::PaginationGrouper;
pub use measure::{BoxMetrics, EstimatedMetrics, FileImageCatalog, ImageCatalog, ImageDescription, fit_within};
pub use metrics::{ArticleMetrics, LayoutMetrics};
pub use node::{Align, DocumentNode, ListNumbering, NodeAttrs, NodeKind};
pub use packer::ImageFlowPacker;
pub use registry::{
    ArticleAttribution, ArticleFootnotes, Bookmark, BookmarkKind, DocumentRegistry, Footnote,
    ImageRecord, TocRecord, article_id, capitalize_first,
};
pub use style::{FontRole, HeadingMode, ParagraphStyle, StyleKind, TextAlign, TextMode, heading_style, text_style};
pub use table::{CellExtent, ColumnWidthTable, SpanFit, TableWidthOptimizer, WidthAllocation, fit_spans};
pub use types::{CM, Color, Margins, Pt, Size};
pub use walker::{Fragment, LayoutWalker, ListStyle, flowable_text, is_inline};
