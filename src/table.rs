use crate::config::LayoutConfig;
use crate::error::{LayoutError, Result};
use crate::flowable::{TableCell, TableExtent};
use crate::measure::BoxMetrics;
use crate::types::Pt;
use rayon::prelude::*;

const PARALLEL_ROW_THRESHOLD: usize = 64;

/// Natural widths of one cell, already including cell padding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellExtent {
    pub col: usize,
    pub colspan: usize,
    pub min: Pt,
    pub max: Pt,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnWidthTable {
    pub min_widths: Vec<Pt>,
    pub max_widths: Vec<Pt>,
}

impl ColumnWidthTable {
    pub fn new(columns: usize) -> Self {
        Self {
            min_widths: vec![Pt::ZERO; columns],
            max_widths: vec![Pt::ZERO; columns],
        }
    }

    pub fn column_count(&self) -> usize {
        self.min_widths.len()
    }

    pub fn min_total(&self) -> Pt {
        self.min_widths.iter().sum()
    }

    pub fn max_total(&self) -> Pt {
        self.max_widths.iter().sum()
    }

    pub fn to_extent(&self) -> TableExtent {
        TableExtent {
            min_widths: self.min_widths.clone(),
            max_widths: self.max_widths.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WidthAllocation {
    pub widths: Vec<Pt>,
    pub available: Pt,
    /// Set when the minimum widths exceed the available width beyond tolerance.
    pub overflowed: bool,
}

impl WidthAllocation {
    pub fn total(&self) -> Pt {
        self.widths.iter().sum()
    }

    pub fn overflow_warning(&self) -> Option<LayoutError> {
        self.overflowed.then(|| LayoutError::Overflow {
            width: self.total(),
            available: self.available,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TableWidthOptimizer {
    config: LayoutConfig,
    cell_padding: Pt,
}

impl TableWidthOptimizer {
    pub fn new(config: &LayoutConfig) -> Self {
        Self {
            config: config.clone(),
            cell_padding: Pt::from_f32(config.cell_padding),
        }
    }

    pub fn cell_padding(&self) -> Pt {
        self.cell_padding
    }

    /// Measures min/max widths of every cell. Rows are measured in parallel
    /// for large tables.
    pub fn measure_cells(
        &self,
        metrics: &dyn BoxMetrics,
        rows: &[Vec<TableCell>],
        max_height: Pt,
    ) -> Result<Vec<Vec<CellExtent>>> {
        let measure_row = |row: &Vec<TableCell>| -> Result<Vec<CellExtent>> {
            let mut col = 0usize;
            let mut out = Vec::with_capacity(row.len());
            for cell in row {
                let mut min = Pt::ZERO;
                let mut max = Pt::ZERO;
                for item in &cell.content {
                    min = min.max(metrics.min_width(item, max_height)?);
                    max = max.max(metrics.max_width(item, max_height)?);
                }
                let chrome = if cell.content.is_empty() {
                    Pt::ZERO
                } else {
                    self.cell_padding * 2
                };
                out.push(CellExtent {
                    col,
                    colspan: cell.colspan,
                    min: min + chrome,
                    max: max.max(min) + chrome,
                });
                col += cell.colspan;
            }
            Ok(out)
        };

        if rows.len() >= PARALLEL_ROW_THRESHOLD {
            rows.par_iter().map(measure_row).collect()
        } else {
            rows.iter().map(measure_row).collect()
        }
    }

    /// Folds cell extents into per-column min/max widths.
    pub fn column_extents(&self, cells: &[Vec<CellExtent>], columns: usize) -> ColumnWidthTable {
        let mut table = ColumnWidthTable::new(columns);
        for cell in cells.iter().flatten() {
            if cell.colspan == 1 && cell.col < columns {
                table.min_widths[cell.col] = table.min_widths[cell.col].max(cell.min);
                table.max_widths[cell.col] = table.max_widths[cell.col].max(cell.max);
            }
        }
        for cell in cells.iter().flatten() {
            if cell.colspan > 1 && cell.col < columns {
                let end = (cell.col + cell.colspan).min(columns);
                raise_span(&mut table.min_widths[cell.col..end], cell.min, cell.colspan);
                raise_span(&mut table.max_widths[cell.col..end], cell.max, cell.colspan);
            }
        }
        for (max, min) in table.max_widths.iter_mut().zip(&table.min_widths) {
            *max = (*max).max(*min);
        }
        table
    }

    /// Final column widths for `available` points of horizontal space.
    pub fn compute_widths(&self, table: &ColumnWidthTable, available: Pt) -> WidthAllocation {
        let columns = table.column_count();
        let avail = available.to_milli_i64().max(0);
        let mins: Vec<i64> = table.min_widths.iter().map(|w| w.to_milli_i64().max(0)).collect();
        let maxs: Vec<i64> = table
            .max_widths
            .iter()
            .zip(&mins)
            .map(|(w, min)| w.to_milli_i64().max(*min))
            .collect();
        let sum_min: i64 = mins.iter().sum();
        let sum_max: i64 = maxs.iter().sum();
        let mut overflowed = false;

        let widths: Vec<i64> = if columns == 0 {
            Vec::new()
        } else if sum_max <= avail {
            if sum_max == 0 {
                let mut out = vec![avail / columns as i64; columns];
                let eligible: Vec<usize> = (0..columns).collect();
                distribute_remainder(&mut out, avail, &eligible);
                out
            } else {
                let slack = avail - sum_max;
                let mut out: Vec<i64> = maxs
                    .iter()
                    .map(|max| max + mul_div(slack, *max, sum_max))
                    .collect();
                let eligible: Vec<usize> = (0..columns).filter(|&c| maxs[c] > 0).collect();
                distribute_remainder(&mut out, avail, &eligible);
                out
            }
        } else if sum_min >= avail {
            let limit = self.config.overflow_limit(available).to_milli_i64();
            if sum_min > limit {
                overflowed = true;
                log::warn!(
                    "table needs {:.1}pt but only {:.1}pt is available",
                    sum_min as f32 / 1000.0,
                    available.to_f32()
                );
            }
            mins.clone()
        } else {
            let extra = avail - sum_min;
            let range = sum_max - sum_min;
            let mut out: Vec<i64> = mins
                .iter()
                .zip(&maxs)
                .map(|(min, max)| min + mul_div(extra, max - min, range))
                .collect();
            let eligible: Vec<usize> = (0..columns).filter(|&c| maxs[c] > mins[c]).collect();
            distribute_remainder(&mut out, avail, &eligible);
            out
        };

        log::debug!(
            "column widths: columns={columns} available={available} min_total={} max_total={} -> {:?}",
            table.min_total(),
            table.max_total(),
            widths
        );

        WidthAllocation {
            widths: widths.into_iter().map(Pt::from_milli_i64).collect(),
            available,
            overflowed,
        }
    }
}

/// Raises each spanned column to its share of `required` when the span is
/// currently too narrow. Columns are never lowered.
fn raise_span(columns: &mut [Pt], required: Pt, colspan: usize) {
    let current: Pt = columns.iter().sum();
    if required <= current || columns.is_empty() {
        return;
    }
    let span = colspan.max(1) as i64;
    let share = Pt::from_milli_i64((required.to_milli_i64() + span - 1) / span);
    for column in columns.iter_mut() {
        *column = (*column).max(share);
    }
}

fn mul_div(value: i64, num: i64, den: i64) -> i64 {
    if den == 0 {
        return 0;
    }
    ((value as i128 * num as i128) / den as i128) as i64
}

/// Hands out the milli-points lost to flooring, one at a time, in column order.
fn distribute_remainder(widths: &mut [i64], target: i64, eligible: &[usize]) {
    let mut deficit = target - widths.iter().sum::<i64>();
    if eligible.is_empty() {
        return;
    }
    let mut idx = 0usize;
    while deficit > 0 {
        widths[eligible[idx]] += 1;
        deficit -= 1;
        idx = (idx + 1) % eligible.len();
    }
}

/// Result of mapping one row's colspans onto the table grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanFit {
    /// Spans of the cells that are kept, in order.
    pub spans: Vec<usize>,
    /// Empty cells to append.
    pub padding: usize,
    /// Grid width the row declared.
    pub found: usize,
}

impl SpanFit {
    pub fn is_exact(&self, columns: usize) -> bool {
        self.found == columns
    }
}

/// Maps a row onto exactly `columns` grid columns. Overlong rows lose
/// trailing cells and have their last span clamped; short rows are padded.
pub fn fit_spans(spans: &[usize], columns: usize) -> SpanFit {
    let found: usize = spans.iter().map(|s| (*s).max(1)).sum();
    let mut kept = Vec::with_capacity(spans.len());
    let mut used = 0usize;
    for span in spans {
        if used >= columns {
            break;
        }
        let span = (*span).max(1).min(columns - used);
        kept.push(span);
        used += span;
    }
    SpanFit {
        spans: kept,
        padding: columns - used,
        found,
    }
}
