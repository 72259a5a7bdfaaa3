//! Measurement collaborators.
//!
//! [`BoxMetrics`] answers "how big is this flowable when wrapped into at most
//! this much space" and [`ImageCatalog`] sizes and describes images. Both are
//! traits so a real rendering backend can plug in its own font metrics; the
//! estimators here are good enough for tests and for pagination previews.

use crate::error::{LayoutError, Result};
use crate::flowable::{Flowable, ImageFlowable, Paragraph, TableFlowable, strip_markup};
use crate::style::FontRole;
use crate::types::{Pt, Size};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub trait BoxMetrics: Send + Sync {
    /// Size of `flowable` wrapped into `max_width`. Shrinking `max_width`
    /// never increases the returned width.
    fn measure(&self, flowable: &Flowable, max_width: Pt, max_height: Pt) -> Result<Size>;

    /// Width when wrapped as tightly as possible.
    fn min_width(&self, flowable: &Flowable, max_height: Pt) -> Result<Pt> {
        Ok(self.measure(flowable, Pt::ZERO, max_height)?.width)
    }

    /// Width when given unlimited room.
    fn max_width(&self, flowable: &Flowable, max_height: Pt) -> Result<Pt> {
        Ok(self.measure(flowable, Pt::unbounded(), max_height)?.width)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageDescription {
    pub title: String,
    pub url: String,
    pub license: String,
    pub contributors: Vec<String>,
}

pub trait ImageCatalog: Send + Sync {
    /// Printed size of `image_id`, scaled down to fit the constraints.
    fn size(&self, image_id: &str, max_width: Pt, max_height: Pt, dpi_hint: f32) -> Result<Size>;

    fn describe(&self, image_id: &str) -> ImageDescription {
        ImageDescription {
            title: image_id.to_string(),
            ..ImageDescription::default()
        }
    }
}

/// Scales a natural size down (never up) to fit `max_width` x `max_height`.
pub fn fit_within(natural: Size, max_width: Pt, max_height: Pt) -> Size {
    let mut size = natural;
    if max_width.is_positive() && size.width > max_width {
        size.height = size
            .height
            .mul_ratio(max_width.to_milli_i64(), size.width.to_milli_i64());
        size.width = max_width;
    }
    if max_height.is_positive() && size.height > max_height {
        size.width = size
            .width
            .mul_ratio(max_height.to_milli_i64(), size.height.to_milli_i64());
        size.height = max_height;
    }
    size
}

/// Text measurement from an average glyph width per font role.
#[derive(Debug, Clone)]
pub struct EstimatedMetrics {
    pub sans_ratio: f32,
    pub serif_ratio: f32,
    pub mono_ratio: f32,
}

impl Default for EstimatedMetrics {
    fn default() -> Self {
        Self {
            sans_ratio: 0.5,
            serif_ratio: 0.48,
            mono_ratio: 0.6,
        }
    }
}

impl EstimatedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn char_width(&self, paragraph: &Paragraph) -> Pt {
        let ratio = match paragraph.style.font {
            FontRole::Sans => self.sans_ratio,
            FontRole::Serif => self.serif_ratio,
            FontRole::Mono => self.mono_ratio,
        };
        paragraph.style.font_size * ratio
    }

    fn paragraph(&self, paragraph: &Paragraph, max_width: Pt) -> Size {
        let style = &paragraph.style;
        let indent = style.horizontal_indent();
        let char_width = self.char_width(paragraph);
        let spacing = style.space_before + style.space_after;
        let text = strip_markup(&paragraph.text.replace("<br/>", "\n"));

        if paragraph.preformatted {
            let lines: Vec<&str> = text.split('\n').collect();
            let widest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
            return Size::new(
                char_width * (widest as i32) + indent,
                style.leading * (lines.len().max(1) as i32) + spacing,
            );
        }

        let avail = (max_width - indent).max(Pt::ZERO);
        let mut longest_word = Pt::ZERO;
        let mut longest_line = Pt::ZERO;
        let mut lines = 0i32;
        for hard_line in text.split('\n') {
            let words: Vec<usize> = hard_line
                .split_whitespace()
                .map(|w| w.chars().count())
                .collect();
            let full = words.iter().sum::<usize>() + words.len().saturating_sub(1);
            longest_line = longest_line.max(char_width * (full as i32));
            lines += 1;
            let mut current = 0usize;
            for len in words {
                longest_word = longest_word.max(char_width * (len as i32));
                let candidate = if current == 0 { len } else { current + 1 + len };
                if current > 0 && char_width * (candidate as i32) > avail {
                    lines += 1;
                    current = len;
                } else {
                    current = candidate;
                }
            }
        }
        let width = longest_line.min(avail).max(longest_word) + indent;
        Size::new(width, style.leading * lines + spacing)
    }

    fn image(&self, image: &ImageFlowable) -> Size {
        let mut height = image.height + image.vertical_chrome();
        if !image.caption.trim().is_empty() {
            let caption = Paragraph::new(image.caption.clone(), image.caption_style.clone());
            height += self.paragraph(&caption, image.width).height;
        }
        Size::new(image.width + image.horizontal_chrome(), height)
    }

    fn table(&self, table: &TableFlowable, max_height: Pt) -> Result<Size> {
        let padding = table.cell_padding * 2;
        let mut height = Pt::ZERO;
        for row in &table.rows {
            let mut row_height = Pt::ZERO;
            let mut col = 0usize;
            for cell in row {
                let inner = (table.span_width(col, cell.colspan) - padding).max(Pt::ZERO);
                let mut cell_height = Pt::ZERO;
                for item in &cell.content {
                    cell_height += self.measure(item, inner, max_height)?.height;
                }
                row_height = row_height.max(cell_height + padding);
                col += cell.colspan;
            }
            height += row_height;
        }
        Ok(Size::new(table.total_width(), height))
    }
}

impl BoxMetrics for EstimatedMetrics {
    fn measure(&self, flowable: &Flowable, max_width: Pt, max_height: Pt) -> Result<Size> {
        let max_width = max_width.max(Pt::ZERO);
        let size = match flowable {
            Flowable::Paragraph(p) => self.paragraph(p, max_width),
            Flowable::Image(image) => self.image(image),
            Flowable::Table(table) => self.table(table, max_height)?,
            Flowable::TableExtent(extent) => Size::new(
                extent.max_total().min(max_width).max(extent.min_total()),
                Pt::ZERO,
            ),
            Flowable::Spacer(spacer) => Size::new(spacer.width, spacer.height),
            Flowable::Rule(rule) => Size::new(
                Pt::ZERO,
                rule.thickness + rule.space_before + rule.space_after,
            ),
            Flowable::FloatGroup(group) => {
                let figure_width = group.figure_width();
                let figures: Pt = group.figures.iter().map(|f| self.image(f).height).sum();
                let text_width = (max_width - figure_width).max(Pt::ZERO);
                let mut text_height = Pt::ZERO;
                let mut widest = Pt::ZERO;
                for item in &group.paragraphs {
                    let size = self.measure(item, text_width, max_height)?;
                    text_height += size.height;
                    widest = widest.max(size.width);
                }
                Size::new(figure_width + widest, figures.max(text_height))
            }
            Flowable::KeepTogether(items) => {
                let mut total = Size::default();
                for item in items {
                    let size = self.measure(item, max_width, max_height)?;
                    total.width = total.width.max(size.width);
                    total.height += size.height;
                }
                total
            }
            Flowable::PageBreak(_) | Flowable::NextTemplate(_) | Flowable::TocEntry(_) => {
                Size::default()
            }
        };
        Ok(size)
    }
}

/// Reads pixel dimensions from image files below `root`.
#[derive(Debug, Clone)]
pub struct FileImageCatalog {
    root: PathBuf,
    min_dpi: f32,
}

impl FileImageCatalog {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            min_dpi: 75.0,
        }
    }

    pub fn with_min_dpi(mut self, dpi: f32) -> Self {
        self.min_dpi = dpi;
        self
    }

    fn path_for(&self, image_id: &str) -> PathBuf {
        self.root.join(image_id.trim_start_matches('/'))
    }
}

impl ImageCatalog for FileImageCatalog {
    fn size(&self, image_id: &str, max_width: Pt, max_height: Pt, dpi_hint: f32) -> Result<Size> {
        let path = self.path_for(image_id);
        let (px_w, px_h) = image::image_dimensions(&path).map_err(|err| {
            LayoutError::MeasurementFailure(format!("image {}: {err}", path.display()))
        })?;
        if px_w == 0 || px_h == 0 {
            return Err(LayoutError::MeasurementFailure(format!(
                "image {image_id} has no pixels"
            )));
        }
        let dpi = dpi_hint.max(self.min_dpi).max(1.0);
        let natural = Size::from_f32(px_w as f32 * 72.0 / dpi, px_h as f32 * 72.0 / dpi);
        Ok(fit_within(natural, max_width, max_height))
    }
}
