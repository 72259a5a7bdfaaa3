use crate::config::LayoutConfig;
use crate::node::Align;
use crate::types::{Color, Pt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    Body,
    Blockquote,
    Center,
    Figure,
    Footer,
    Preformatted,
    Source,
    List,
    References,
    License,
    LicenseList,
    Box,
    BookTitle,
    BookSubtitle,
    Attribution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingMode {
    Chapter,
    Article,
    Section(u8),
    TableCaption,
    License,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleKind {
    Text(TextMode),
    Heading(HeadingMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontRole {
    Sans,
    Serif,
    Mono,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphStyle {
    pub kind: StyleKind,
    pub font: FontRole,
    pub font_size: Pt,
    pub leading: Pt,
    pub left_indent: Pt,
    pub right_indent: Pt,
    pub bullet_indent: Pt,
    pub space_before: Pt,
    pub space_after: Pt,
    pub alignment: TextAlign,
    pub background: Option<Color>,
    /// Text in this style may flow next to floating images.
    pub flowable: bool,
}

impl ParagraphStyle {
    pub fn is_heading(&self) -> bool {
        matches!(self.kind, StyleKind::Heading(_))
    }

    pub fn horizontal_indent(&self) -> Pt {
        self.left_indent + self.right_indent
    }

    fn base(config: &LayoutConfig, kind: StyleKind) -> Self {
        Self {
            kind,
            font: FontRole::Sans,
            font_size: Pt::from_f32(config.font_size),
            leading: Pt::from_f32(config.leading),
            left_indent: Pt::ZERO,
            right_indent: Pt::ZERO,
            bullet_indent: Pt::ZERO,
            space_before: Pt::from_i32(3),
            space_after: Pt::ZERO,
            alignment: TextAlign::Justify,
            background: None,
            flowable: true,
        }
    }
}

/// Builds body text styles. `indent_level` counts list or paragraph
/// indentation steps, `in_table` switches to the compact table variant.
pub fn text_style(
    config: &LayoutConfig,
    mode: TextMode,
    indent_level: usize,
    in_table: bool,
    align: Option<Align>,
) -> ParagraphStyle {
    let mut style = ParagraphStyle::base(config, StyleKind::Text(mode));
    let mut indent_level = indent_level;

    if in_table {
        style.alignment = TextAlign::Left;
    }
    match align {
        Some(Align::Right) => style.alignment = TextAlign::Right,
        Some(Align::Center) => style.alignment = TextAlign::Center,
        Some(Align::Justify) if !in_table => style.alignment = TextAlign::Justify,
        _ => {}
    }

    if in_table || matches!(mode, TextMode::Footer | TextMode::Figure) {
        style.font_size = Pt::from_f32(config.small_font_size);
        style.leading = Pt::from_f32(config.small_leading);
    }

    if mode == TextMode::Blockquote {
        style.right_indent = Pt::from_f32(config.right_indent);
        indent_level += 1;
    }

    if matches!(mode, TextMode::Footer | TextMode::Figure | TextMode::Center) {
        style.alignment = TextAlign::Center;
    }

    if matches!(mode, TextMode::Box | TextMode::Source | TextMode::Preformatted) {
        style.background = Some(Color::BOX_GREY);
        style.space_before = Pt::from_i32(6);
        style.space_after = Pt::from_i32(9);
    }

    if matches!(mode, TextMode::Source | TextMode::Preformatted) {
        style.font = FontRole::Mono;
    }

    let list_indent = Pt::from_f32(config.list_indent);
    if matches!(mode, TextMode::List | TextMode::LicenseList | TextMode::References) {
        style.space_before = Pt::ZERO;
        style.bullet_indent = list_indent * (indent_level.saturating_sub(1) as i32);
        style.left_indent = list_indent * (indent_level as i32);
    } else {
        style.left_indent = Pt::from_f32(config.para_indent) * (indent_level as i32);
    }

    match mode {
        TextMode::BookTitle => {
            style.font_size = Pt::from_i32(36);
            style.leading = Pt::from_i32(40);
            style.space_before = Pt::from_i32(16);
        }
        TextMode::BookSubtitle => {
            style.font_size = Pt::from_i32(24);
            style.leading = Pt::from_i32(30);
        }
        TextMode::License | TextMode::LicenseList => {
            style.font_size = Pt::from_i32(6);
            style.leading = Pt::from_i32(8);
            style.space_before = Pt::ZERO;
        }
        TextMode::Attribution => {
            style.font_size = Pt::from_f32(config.small_font_size);
            style.leading = Pt::from_f32(config.small_leading);
            style.alignment = TextAlign::Left;
        }
        _ => {}
    }
    style
}

pub fn heading_style(config: &LayoutConfig, mode: HeadingMode) -> ParagraphStyle {
    let mut style = ParagraphStyle::base(config, StyleKind::Heading(mode));
    style.font_size = Pt::from_f32(config.big_font_size);
    style.alignment = TextAlign::Left;
    style.space_before = Pt::from_i32(12);
    style.space_after = Pt::from_i32(6);
    style.flowable = false;

    match mode {
        HeadingMode::Chapter => {
            style.font_size = Pt::from_i32(26);
            style.leading = Pt::from_i32(30);
            style.alignment = TextAlign::Center;
        }
        HeadingMode::Article => {
            style.font_size = Pt::from_i32(22);
            style.leading = Pt::from_i32(26);
            style.space_before = Pt::from_i32(20);
            style.space_after = Pt::from_i32(2);
        }
        HeadingMode::Section(level) => {
            let level = level.clamp(1, 5) as i32;
            let font_size = 18 - (level - 1) * 2;
            let leading = font_size + (font_size / 5).clamp(2, 3);
            style.kind = StyleKind::Heading(HeadingMode::Section(level as u8));
            style.font = FontRole::Serif;
            style.font_size = Pt::from_i32(font_size);
            style.leading = Pt::from_i32(leading);
            style.space_before = Pt::from_i32(leading.min(20));
            // Sub-section headings may sit next to a floating image.
            style.flowable = level > 1;
        }
        HeadingMode::TableCaption => {
            style.leading = Pt::from_i32(16);
            style.alignment = TextAlign::Center;
            style.space_after = Pt::ZERO;
        }
        HeadingMode::License => {
            style.font_size = Pt::from_i32(8);
            style.leading = Pt::from_i32(10);
            style.space_after = Pt::ZERO;
            style.space_before = Pt::from_i32(5);
        }
    }
    style
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_text_is_small_and_left_aligned() {
        let config = LayoutConfig::default();
        let style = text_style(&config, TextMode::Body, 0, true, None);
        assert_eq!(style.font_size, Pt::from_i32(8));
        assert_eq!(style.alignment, TextAlign::Left);
        assert!(style.flowable);
    }

    #[test]
    fn list_indent_uses_list_unit() {
        let config = LayoutConfig::default();
        let style = text_style(&config, TextMode::List, 2, false, None);
        assert_eq!(style.left_indent, Pt::from_i32(24));
        assert_eq!(style.bullet_indent, Pt::from_i32(12));
        let body = text_style(&config, TextMode::Body, 2, false, None);
        assert_eq!(body.left_indent, Pt::from_i32(50));
    }

    #[test]
    fn blockquote_adds_an_indent_step() {
        let config = LayoutConfig::default();
        let style = text_style(&config, TextMode::Blockquote, 0, false, None);
        assert_eq!(style.left_indent, Pt::from_i32(25));
        assert_eq!(style.right_indent, Pt::from_i32(25));
    }

    #[test]
    fn section_levels_shrink_and_float_below_top_level() {
        let config = LayoutConfig::default();
        let top = heading_style(&config, HeadingMode::Section(1));
        let sub = heading_style(&config, HeadingMode::Section(3));
        assert_eq!(top.font_size, Pt::from_i32(18));
        assert_eq!(sub.font_size, Pt::from_i32(14));
        assert!(!top.flowable);
        assert!(sub.flowable);
        assert!(sub.is_heading());
        let deep = heading_style(&config, HeadingMode::Section(9));
        assert_eq!(deep.kind, StyleKind::Heading(HeadingMode::Section(5)));
    }
}
