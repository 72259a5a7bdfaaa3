use crate::error::{LayoutError, Result};
use crate::types::{CM, Margins, Pt, Size};
use serde::{Deserialize, Serialize};

/// Scalar layout settings. All lengths are in points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub page_width: f32,
    pub page_height: f32,
    /// top, right, bottom, left
    pub page_margins: (f32, f32, f32, f32),
    /// Percentage of the available width a table may overflow before a
    /// warning is raised.
    pub table_overflow_tolerance: f32,
    pub font_size: f32,
    pub leading: f32,
    pub small_font_size: f32,
    pub small_leading: f32,
    pub big_font_size: f32,
    pub big_leading: f32,
    pub image_max_width: f32,
    pub image_max_height: f32,
    pub image_min_dpi: f32,
    pub inline_image_dpi: f32,
    pub para_indent: f32,
    pub right_indent: f32,
    pub list_indent: f32,
    pub cell_padding: f32,
    pub grouping_fraction: f32,
    pub float_slack: f32,
    pub caption_chars_per_line: usize,
    pub source_max_line_len: usize,
    pub tab_size: usize,
    pub no_float_math_len: usize,
    pub article_start_min_space: f32,
    pub page_break_after_article: bool,
    pub show_title_page: bool,
    pub show_article_attribution: bool,
    pub strict: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let a4 = Size::a4();
        let margin = 2.0 * CM;
        Self {
            page_width: a4.width.to_f32(),
            page_height: a4.height.to_f32(),
            page_margins: (margin, margin, margin, margin),
            table_overflow_tolerance: 4.0,
            font_size: 10.0,
            leading: 15.0,
            small_font_size: 8.0,
            small_leading: 12.0,
            big_font_size: 12.0,
            big_leading: 17.0,
            image_max_width: 9.0 * CM,
            image_max_height: 12.0 * CM,
            image_min_dpi: 75.0,
            inline_image_dpi: 100.0,
            para_indent: 25.0,
            right_indent: 25.0,
            list_indent: 12.0,
            cell_padding: 3.0,
            grouping_fraction: 0.1,
            float_slack: 10.0,
            caption_chars_per_line: 40,
            source_max_line_len: 72,
            tab_size: 6,
            no_float_math_len: 150,
            article_start_min_space: 5.0 * CM,
            page_break_after_article: false,
            show_title_page: true,
            show_article_attribution: true,
            strict: false,
        }
    }
}

impl LayoutConfig {
    pub fn builder() -> LayoutConfigBuilder {
        LayoutConfigBuilder::new()
    }

    /// Parses a JSON document; missing keys keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: LayoutConfig = serde_json::from_str(raw)
            .map_err(|err| LayoutError::InvalidConfiguration(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn page_size(&self) -> Size {
        Size::from_f32(self.page_width, self.page_height)
    }

    pub fn margins(&self) -> Margins {
        let (top, right, bottom, left) = self.page_margins;
        Margins::new(top, right, bottom, left)
    }

    pub fn print_width(&self) -> Pt {
        self.page_size().width - self.margins().horizontal()
    }

    pub fn print_height(&self) -> Pt {
        self.page_size().height - self.margins().vertical()
    }

    /// Widest a table may get before the overflow warning fires.
    pub fn overflow_limit(&self, available: Pt) -> Pt {
        available + available * (self.table_overflow_tolerance / 100.0)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| Err(LayoutError::InvalidConfiguration(message.to_string()));
        if !(self.page_width > 0.0 && self.page_height > 0.0) {
            return invalid("page_width and page_height must be positive");
        }
        if !self.print_width().is_positive() || !self.print_height().is_positive() {
            return invalid("page_margins leave no printable area");
        }
        if !(self.table_overflow_tolerance >= 0.0) {
            return invalid("table_overflow_tolerance must be >= 0");
        }
        if !(self.grouping_fraction > 0.0 && self.grouping_fraction <= 1.0) {
            return invalid("grouping_fraction must be in (0, 1]");
        }
        if !(self.font_size > 0.0 && self.small_font_size > 0.0 && self.big_font_size > 0.0) {
            return invalid("font sizes must be positive");
        }
        if !(self.cell_padding >= 0.0 && self.para_indent >= 0.0 && self.list_indent >= 0.0) {
            return invalid("cell_padding and indentation units must be >= 0");
        }
        if !(self.image_max_width > 0.0 && self.image_max_height > 0.0) {
            return invalid("image_max_width and image_max_height must be positive");
        }
        if self.caption_chars_per_line == 0 || self.source_max_line_len == 0 {
            return invalid("caption_chars_per_line and source_max_line_len must be >= 1");
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct LayoutConfigBuilder {
    config: LayoutConfig,
}

impl LayoutConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_size(mut self, size: Size) -> Self {
        self.config.page_width = size.width.to_f32();
        self.config.page_height = size.height.to_f32();
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.config.page_margins = (
            margins.top.to_f32(),
            margins.right.to_f32(),
            margins.bottom.to_f32(),
            margins.left.to_f32(),
        );
        self
    }

    pub fn margin_all(self, value: f32) -> Self {
        self.margins(Margins::all(value))
    }

    pub fn table_overflow_tolerance(mut self, percent: f32) -> Self {
        self.config.table_overflow_tolerance = percent;
        self
    }

    pub fn font_sizes(mut self, normal: f32, small: f32, big: f32) -> Self {
        self.config.font_size = normal;
        self.config.small_font_size = small;
        self.config.big_font_size = big;
        self
    }

    pub fn image_max_size(mut self, width: f32, height: f32) -> Self {
        self.config.image_max_width = width;
        self.config.image_max_height = height;
        self
    }

    pub fn indentation(mut self, para_indent: f32, list_indent: f32) -> Self {
        self.config.para_indent = para_indent;
        self.config.list_indent = list_indent;
        self
    }

    pub fn cell_padding(mut self, padding: f32) -> Self {
        self.config.cell_padding = padding;
        self
    }

    // Share of the print height a keep-together group may reach before it is sealed.
    pub fn grouping_fraction(mut self, fraction: f32) -> Self {
        self.config.grouping_fraction = fraction;
        self
    }

    pub fn float_slack(mut self, slack: f32) -> Self {
        self.config.float_slack = slack;
        self
    }

    pub fn page_break_after_article(mut self, enabled: bool) -> Self {
        self.config.page_break_after_article = enabled;
        self
    }

    pub fn show_title_page(mut self, enabled: bool) -> Self {
        self.config.show_title_page = enabled;
        self
    }

    pub fn show_article_attribution(mut self, enabled: bool) -> Self {
        self.config.show_article_attribution = enabled;
        self
    }

    // Strict mode turns every node-level failure into a hard error.
    pub fn strict(mut self, strict: bool) -> Self {
        self.config.strict = strict;
        self
    }

    pub fn build(self) -> Result<LayoutConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
