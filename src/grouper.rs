use crate::config::LayoutConfig;
use crate::flowable::{Flowable, PageBreak};
use crate::measure::BoxMetrics;
use crate::types::Pt;

/// Wraps each heading and the content right after it into a
/// [`Flowable::KeepTogether`] so headings are not orphaned at page bottoms.
pub struct PaginationGrouper<'a> {
    metrics: &'a dyn BoxMetrics,
    print_width: Pt,
    print_height: Pt,
    max_group_height: Pt,
}

impl<'a> PaginationGrouper<'a> {
    pub fn new(metrics: &'a dyn BoxMetrics, config: &LayoutConfig) -> Self {
        let print_height = config.print_height();
        Self {
            metrics,
            print_width: config.print_width(),
            print_height,
            max_group_height: print_height * config.grouping_fraction,
        }
    }

    pub fn group(&self, items: Vec<Flowable>) -> Vec<Flowable> {
        let mut out = Vec::with_capacity(items.len());
        let mut group: Vec<Flowable> = Vec::new();
        let mut group_height = Pt::ZERO;
        let mut items = items.into_iter().peekable();

        while let Some(next) = items.peek() {
            if group.is_empty() {
                let Some(item) = items.next() else { break };
                if item.is_heading_like() {
                    group.push(item);
                } else {
                    out.push(item);
                }
                continue;
            }

            let last_is_heading = group.last().is_some_and(Flowable::is_heading_like);
            if !last_is_heading {
                if let Some(last) = group.last() {
                    group_height += self.height_of(last);
                }
                let break_allowed = matches!(next, Flowable::PageBreak(PageBreak::NotAtTop));
                if group_height > self.max_group_height || break_allowed {
                    out.push(Flowable::KeepTogether(std::mem::take(&mut group)));
                    group_height = Pt::ZERO;
                    continue;
                }
            }
            if let Some(item) = items.next() {
                group.push(item);
            }
        }

        if !group.is_empty() {
            out.push(Flowable::KeepTogether(group));
        }
        out
    }

    fn height_of(&self, item: &Flowable) -> Pt {
        match self.metrics.measure(item, self.print_width, self.print_height) {
            Ok(size) => size.height,
            Err(err) => {
                log::debug!("grouping measurement failed for {}: {err}", item.debug_name());
                Pt::ZERO
            }
        }
    }
}
