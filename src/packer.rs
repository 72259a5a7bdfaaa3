use crate::config::LayoutConfig;
use crate::flowable::{FloatGroup, Flowable, ImageFlowable, TableCell, TableFlowable, TableKind};
use crate::measure::BoxMetrics;
use crate::node::Align;
use crate::types::{CM, Margins, Pt};

/// Pairs floating images with neighbouring text and collects leftover
/// image runs into two-column grids. Packing already packed output is a
/// no-op.
pub struct ImageFlowPacker<'a> {
    metrics: &'a dyn BoxMetrics,
    print_width: Pt,
    print_height: Pt,
    float_slack: Pt,
    caption_chars_per_line: usize,
    cell_padding: Pt,
}

#[derive(Default)]
struct OpenFloat {
    figures: Vec<ImageFlowable>,
    text: Vec<Flowable>,
}

impl<'a> ImageFlowPacker<'a> {
    pub fn new(metrics: &'a dyn BoxMetrics, config: &LayoutConfig) -> Self {
        Self {
            metrics,
            print_width: config.print_width(),
            print_height: config.print_height(),
            float_slack: Pt::from_f32(config.float_slack),
            caption_chars_per_line: config.caption_chars_per_line.max(1),
            cell_padding: Pt::from_f32(config.cell_padding),
        }
    }

    pub fn pack(&self, items: Vec<Flowable>) -> Vec<Flowable> {
        self.tabularize_images(self.float_images(items))
    }

    pub fn float_images(&self, items: Vec<Flowable>) -> Vec<Flowable> {
        let mut out = Vec::with_capacity(items.len());
        let mut open = OpenFloat::default();

        for item in items {
            match item {
                Flowable::Image(image) if image.is_floating() => {
                    if !open.text.is_empty() {
                        self.close(&mut open, &mut out);
                    }
                    open.figures.push(image);
                }
                Flowable::Image(image) => {
                    self.close(&mut open, &mut out);
                    out.push(Flowable::Image(image));
                }
                item if open.figures.is_empty() => out.push(item),
                item if item.is_flowing_text() && !self.text_is_sufficient(&open) => {
                    open.text.push(item);
                }
                item => {
                    self.close(&mut open, &mut out);
                    out.push(item);
                }
            }
        }

        if open.text.is_empty() {
            out.extend(open.figures.into_iter().map(Flowable::Image));
        } else {
            out.push(self.float_group(open.figures, open.text));
        }
        out
    }

    fn close(&self, open: &mut OpenFloat, out: &mut Vec<Flowable>) {
        let figures = std::mem::take(&mut open.figures);
        let mut text = std::mem::take(&mut open.text);
        // A heading must not look like it belongs to the image above.
        let trailing_heading = match text.last() {
            Some(last) if last.is_flowing_heading() => text.pop(),
            _ => None,
        };
        if text.is_empty() {
            out.extend(figures.into_iter().map(Flowable::Image));
        } else {
            out.push(self.float_group(figures, text));
        }
        out.extend(trailing_heading);
    }

    fn float_group(&self, figures: Vec<ImageFlowable>, paragraphs: Vec<Flowable>) -> Flowable {
        let figure_margin = match figures.first().map(|f| f.align) {
            Some(Align::Left) => Margins::new(0.0, 0.4 * CM, 0.7 * CM, 0.0),
            Some(Align::Right) | None => Margins::new(0.0, 0.0, 0.7 * CM, 0.4 * CM),
            Some(_) => Margins::all(0.2 * CM),
        };
        Flowable::FloatGroup(FloatGroup {
            figures,
            paragraphs,
            figure_margin,
        })
    }

    /// Estimated height of the floating figures, captions included.
    fn figures_height(&self, figures: &[ImageFlowable]) -> Pt {
        figures
            .iter()
            .map(|figure| {
                let caption_lines =
                    (figure.caption.chars().count() / self.caption_chars_per_line).max(1);
                figure.height
                    + figure.vertical_chrome()
                    + figure.caption_style.leading * (caption_lines as i32)
            })
            .sum()
    }

    /// True once the accumulated text is taller than the figures beside it.
    fn text_is_sufficient(&self, open: &OpenFloat) -> bool {
        let widest = open
            .figures
            .iter()
            .map(|f| f.width)
            .fold(Pt::ZERO, Pt::max);
        let text_width = (self.print_width - widest).max(Pt::ZERO);
        let mut text_height = Pt::ZERO;
        for item in &open.text {
            match self.metrics.measure(item, text_width, self.print_height) {
                Ok(size) => text_height += size.height,
                Err(err) => {
                    log::warn!("float text measurement failed, closing group: {err}");
                    return true;
                }
            }
        }
        text_height > self.figures_height(&open.figures) - self.float_slack
    }

    pub fn tabularize_images(&self, items: Vec<Flowable>) -> Vec<Flowable> {
        let mut out = Vec::with_capacity(items.len());
        let mut run: Vec<ImageFlowable> = Vec::new();
        for item in items {
            match item {
                Flowable::Image(image) => run.push(image),
                other => {
                    self.flush_run(&mut run, &mut out);
                    out.push(other);
                }
            }
        }
        self.flush_run(&mut run, &mut out);
        out
    }

    fn flush_run(&self, run: &mut Vec<ImageFlowable>, out: &mut Vec<Flowable>) {
        let images = std::mem::take(run);
        if images.len() < 2 {
            out.extend(images.into_iter().map(Flowable::Image));
            return;
        }
        let half = self.print_width / 2;
        let rows: Vec<Vec<TableCell>> = images
            .chunks(2)
            .map(|pair| {
                let mut cells: Vec<TableCell> = pair
                    .iter()
                    .map(|image| {
                        let target = half - image.horizontal_chrome();
                        let image = if image.width > target && target.is_positive() {
                            image.scaled_to_width(target)
                        } else {
                            image.clone()
                        };
                        TableCell::new(vec![Flowable::Image(image)], 1)
                    })
                    .collect();
                if cells.len() < 2 {
                    cells.push(TableCell::empty());
                }
                cells
            })
            .collect();
        out.push(Flowable::Table(
            TableFlowable::new(rows, vec![half, half], TableKind::ImageGrid)
                .with_cell_padding(self.cell_padding),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowable::{Paragraph, Spacer};
    use crate::measure::EstimatedMetrics;
    use crate::style::{HeadingMode, TextMode, heading_style, text_style};

    fn image(align: Align, width: i32, height: i32) -> Flowable {
        let config = LayoutConfig::default();
        Flowable::Image(
            ImageFlowable::new(
                "img.png",
                Pt::from_i32(width),
                Pt::from_i32(height),
                text_style(&config, TextMode::Figure, 0, false, None),
            )
            .with_align(align),
        )
    }

    fn para(words: usize) -> Flowable {
        let config = LayoutConfig::default();
        let text = vec!["word"; words].join(" ");
        Flowable::Paragraph(Paragraph::new(
            text,
            text_style(&config, TextMode::Body, 0, false, None),
        ))
    }

    fn sub_heading() -> Flowable {
        let config = LayoutConfig::default();
        Flowable::Paragraph(Paragraph::new(
            "Sub",
            heading_style(&config, HeadingMode::Section(2)),
        ))
    }

    fn table() -> Flowable {
        Flowable::Table(TableFlowable::new(Vec::new(), Vec::new(), TableKind::Data))
    }

    #[test]
    fn floating_image_pairs_with_following_text() {
        let metrics = EstimatedMetrics::new();
        let config = LayoutConfig::default();
        let packer = ImageFlowPacker::new(&metrics, &config);
        let out = packer.pack(vec![image(Align::Right, 100, 100), para(10), para(10)]);
        assert_eq!(out.len(), 1);
        let Flowable::FloatGroup(group) = &out[0] else {
            panic!("expected float group, got {:?}", out[0].debug_name());
        };
        assert_eq!(group.figures.len(), 1);
        assert_eq!(group.paragraphs.len(), 2);
    }

    #[test]
    fn text_stops_joining_once_taller_than_figures() {
        let metrics = EstimatedMetrics::new();
        let config = LayoutConfig::default();
        let packer = ImageFlowPacker::new(&metrics, &config);
        let mut items = vec![image(Align::Left, 50, 20)];
        items.extend((0..5).map(|_| para(3)));
        let out = packer.pack(items);
        let Flowable::FloatGroup(group) = &out[0] else {
            panic!("expected float group");
        };
        assert!(group.paragraphs.len() < 5);
        assert_eq!(out.len(), 1 + 5 - group.paragraphs.len());
    }

    #[test]
    fn heading_before_table_is_pulled_out_of_float() {
        let metrics = EstimatedMetrics::new();
        let config = LayoutConfig::default();
        let packer = ImageFlowPacker::new(&metrics, &config);
        let out = packer.pack(vec![
            image(Align::Right, 100, 300),
            para(5),
            sub_heading(),
            table(),
        ]);
        let names: Vec<&str> = out.iter().map(|f| f.debug_name()).collect();
        assert_eq!(names, vec!["FloatGroup", "Paragraph", "Table"]);
        assert!(out[1].is_heading_like());
    }

    #[test]
    fn lone_floating_image_stays_standalone() {
        let metrics = EstimatedMetrics::new();
        let config = LayoutConfig::default();
        let packer = ImageFlowPacker::new(&metrics, &config);
        let out = packer.pack(vec![image(Align::Right, 100, 100), table()]);
        let names: Vec<&str> = out.iter().map(|f| f.debug_name()).collect();
        assert_eq!(names, vec!["Image", "Table"]);
    }

    #[test]
    fn five_centered_images_make_three_grid_rows() {
        let metrics = EstimatedMetrics::new();
        let config = LayoutConfig::default();
        let packer = ImageFlowPacker::new(&metrics, &config);
        let items: Vec<Flowable> = (0..5).map(|_| image(Align::Center, 400, 200)).collect();
        let out = packer.pack(items);
        assert_eq!(out.len(), 1);
        let Flowable::Table(grid) = &out[0] else {
            panic!("expected grid");
        };
        assert_eq!(grid.kind, TableKind::ImageGrid);
        assert_eq!(grid.rows.len(), 3);
        assert!(grid.rows.iter().all(|row| row.len() == 2));
        assert!(grid.rows[2][1].content.is_empty());
        let first = grid.rows[0][0].content[0].as_image().expect("image");
        let half = config.print_width() / 2;
        assert_eq!(first.width + first.horizontal_chrome(), half);
        assert_eq!(first.height, first.width.mul_ratio(1, 2));
    }

    #[test]
    fn small_images_keep_their_size_in_grid() {
        let metrics = EstimatedMetrics::new();
        let config = LayoutConfig::default();
        let packer = ImageFlowPacker::new(&metrics, &config);
        let out = packer.pack(vec![image(Align::Center, 40, 30), image(Align::Center, 40, 30)]);
        let Flowable::Table(grid) = &out[0] else {
            panic!("expected grid");
        };
        let image = grid.rows[0][1].content[0].as_image().expect("image");
        assert_eq!(image.width, Pt::from_i32(40));
    }

    #[test]
    fn packing_is_idempotent() {
        let metrics = EstimatedMetrics::new();
        let config = LayoutConfig::default();
        let packer = ImageFlowPacker::new(&metrics, &config);
        let inputs = vec![
            vec![image(Align::Right, 100, 100), para(20), para(200), table()],
            vec![image(Align::Center, 300, 100), image(Align::Right, 80, 80), para(4)],
            vec![image(Align::Left, 60, 5), sub_heading(), para(3)],
            vec![image(Align::Right, 60, 200), sub_heading(), table(), image(Align::Left, 60, 60)],
            vec![
                para(2),
                image(Align::Center, 10, 10),
                Flowable::Spacer(Spacer::new(4.0)),
                image(Align::Right, 10, 10),
                image(Align::Left, 10, 10),
            ],
        ];
        for input in inputs {
            let once = packer.pack(input);
            let twice = packer.pack(once.clone());
            assert_eq!(once, twice);
        }
    }
}
