//! Reference pagination sink.
//!
//! [`DocTemplate`] stacks a story into pages of `page - margins` using the
//! same [`BoxMetrics`] as the layout pass. It understands keep-together
//! groups, the three page-break markers and running-header switches, and
//! maps paragraph anchors and bookmarks to page numbers. It does not draw.

use crate::book::RenderSink;
use crate::config::LayoutConfig;
use crate::debug::DebugLogger;
use crate::error::{LayoutError, Result};
use crate::flowable::{Flowable, PageBreak, TocEntry};
use crate::frame::{AddResult, Frame, PlacedFlowable};
use crate::measure::BoxMetrics;
use crate::registry::{BookmarkKind, DocumentRegistry};
use crate::types::{Pt, Size};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: usize,
    /// Running header, set by the last `NextTemplate` before the page began.
    pub header_title: String,
    pub items: Vec<PlacedFlowable>,
    pub toc: Vec<TocEntry>,
    pub used_height: Pt,
}

impl Page {
    fn new(number: usize, header_title: String) -> Self {
        Self {
            number,
            header_title,
            items: Vec::new(),
            toc: Vec::new(),
            used_height: Pt::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutlineEntry {
    pub label: String,
    pub kind: BookmarkKind,
    pub page: usize,
}

pub struct DocTemplate {
    frame_size: Size,
    metrics: Arc<dyn BoxMetrics>,
    strict_overflow: bool,
    debug: Option<Arc<DebugLogger>>,
    pages: Vec<Page>,
    anchors: HashMap<String, usize>,
    outline: Vec<OutlineEntry>,
}

impl DocTemplate {
    pub fn new(config: &LayoutConfig, metrics: Arc<dyn BoxMetrics>) -> Self {
        Self {
            frame_size: Size::new(config.print_width(), config.print_height()),
            metrics,
            strict_overflow: false,
            debug: None,
            pages: Vec::new(),
            anchors: HashMap::new(),
            outline: Vec::new(),
        }
    }

    /// Fail instead of placing a flowable taller than a whole frame.
    pub fn with_strict_overflow(mut self, strict: bool) -> Self {
        self.strict_overflow = strict;
        self
    }

    pub fn with_debug(mut self, debug: Arc<DebugLogger>) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn anchor_page(&self, anchor: &str) -> Option<usize> {
        self.anchors.get(anchor).copied()
    }

    pub fn outline(&self) -> &[OutlineEntry] {
        &self.outline
    }

    pub fn paginate(&self, story: Vec<Flowable>) -> Result<(Vec<Page>, HashMap<String, usize>)> {
        let started = Instant::now();
        let mut paginator = Paginator {
            frame_size: self.frame_size,
            metrics: self.metrics.as_ref(),
            strict_overflow: self.strict_overflow,
            debug: self.debug.as_deref(),
            pages: Vec::new(),
            frame: Frame::new(self.frame_size),
            current: Page::new(1, String::new()),
            next_title: String::new(),
            anchors: HashMap::new(),
        };
        for flowable in story {
            paginator.place(flowable)?;
        }
        let (pages, anchors) = paginator.finish();
        log::debug!(
            "paginated into {} pages in {:.2}ms",
            pages.len(),
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok((pages, anchors))
    }
}

impl RenderSink for DocTemplate {
    fn build(&mut self, story: Vec<Flowable>, registry: &DocumentRegistry) -> Result<()> {
        let (pages, anchors) = self.paginate(story)?;
        let mut outline = Vec::with_capacity(registry.bookmarks.len());
        for bookmark in &registry.bookmarks {
            match anchors.get(&bookmark.anchor) {
                Some(page) => outline.push(OutlineEntry {
                    label: bookmark.label.clone(),
                    kind: bookmark.kind,
                    page: *page,
                }),
                None => log::debug!("bookmark {:?} was not placed", bookmark.label),
            }
        }
        self.pages = pages;
        self.anchors = anchors;
        self.outline = outline;
        Ok(())
    }

    fn probe(&mut self, flowables: &[Flowable]) -> Result<()> {
        self.paginate(flowables.to_vec()).map(|_| ())
    }
}

struct Paginator<'a> {
    frame_size: Size,
    metrics: &'a dyn BoxMetrics,
    strict_overflow: bool,
    debug: Option<&'a DebugLogger>,
    pages: Vec<Page>,
    frame: Frame,
    current: Page,
    next_title: String,
    anchors: HashMap<String, usize>,
}

impl Paginator<'_> {
    fn place(&mut self, flowable: Flowable) -> Result<()> {
        match flowable {
            Flowable::PageBreak(page_break) => {
                let needed = match page_break {
                    PageBreak::Always => true,
                    PageBreak::NotAtTop => !self.frame.is_empty(),
                    PageBreak::Conditional(min_space) => {
                        !self.frame.is_empty() && self.frame.remaining_height() < min_space
                    }
                };
                if needed {
                    self.new_page("page_break", Some("PageBreak"));
                }
                Ok(())
            }
            Flowable::NextTemplate(title) => {
                self.next_title = title;
                Ok(())
            }
            Flowable::TocEntry(entry) => {
                self.current.toc.push(entry);
                Ok(())
            }
            Flowable::KeepTogether(items) => self.place_group(items),
            other => self.place_single(other),
        }
    }

    /// Moves the group to a fresh page when that lets it stay whole;
    /// otherwise its members flow one by one.
    fn place_group(&mut self, items: Vec<Flowable>) -> Result<()> {
        let group = Flowable::KeepTogether(items);
        let height = self
            .metrics
            .measure(&group, self.frame_size.width, self.frame_size.height)?
            .height;
        if height > self.frame.remaining_height()
            && height <= self.frame_size.height
            && !self.frame.is_empty()
        {
            self.new_page("keep_together", Some("KeepTogether"));
        }
        if let Flowable::KeepTogether(items) = group {
            for item in items {
                self.place(item)?;
            }
        }
        Ok(())
    }

    fn place_single(&mut self, flowable: Flowable) -> Result<()> {
        let mut flowable = flowable;
        loop {
            match self.frame.add(flowable, self.metrics)? {
                AddResult::Placed(placed) => {
                    self.record(placed);
                    return Ok(());
                }
                AddResult::Overflow(rest) => {
                    self.new_page("frame_overflow", Some(rest.debug_name()));
                    flowable = rest;
                }
                AddResult::Unplaceable(rest, size) => {
                    let details = format!(
                        "{} size={:.1}x{:.1}pt frame={:.1}x{:.1}pt",
                        rest.debug_name(),
                        size.width.to_f32(),
                        size.height.to_f32(),
                        self.frame_size.width.to_f32(),
                        self.frame_size.height.to_f32()
                    );
                    if self.strict_overflow {
                        return Err(LayoutError::FatalBackend(format!(
                            "unplaceable flowable: {details}"
                        )));
                    }
                    log::warn!("placing overfull flowable: {details}");
                    let placed = self.frame.place_overfull(rest, size);
                    self.record(placed);
                    return Ok(());
                }
            }
        }
    }

    fn record(&mut self, placed: PlacedFlowable) {
        if let Flowable::Paragraph(paragraph) = &placed.flowable {
            for anchor in &paragraph.anchors {
                self.anchors
                    .entry(anchor.clone())
                    .or_insert(self.current.number);
            }
        }
        self.current.items.push(placed);
        self.current.used_height = self.frame.used_height();
    }

    fn new_page(&mut self, reason: &str, flowable: Option<&str>) {
        let from = self.current.number;
        if let Some(debug) = self.debug {
            debug.log_event(
                "layout.page_break",
                json!({
                    "reason": reason,
                    "from_page": from,
                    "to_page": from + 1,
                    "flowable": flowable,
                }),
            );
            debug.increment("layout.page_break", 1);
        }
        let next = Page::new(from + 1, self.next_title.clone());
        let finished = std::mem::replace(&mut self.current, next);
        self.pages.push(finished);
        self.frame = Frame::new(self.frame_size);
    }

    fn finish(mut self) -> (Vec<Page>, HashMap<String, usize>) {
        if !self.current.items.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        (self.pages, self.anchors)
    }
}
