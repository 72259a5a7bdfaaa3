use crate::error::Result;
use crate::flowable::Flowable;
use crate::measure::BoxMetrics;
use crate::types::{Pt, Size};

/// A flowable with its position inside the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedFlowable {
    pub y: Pt,
    pub size: Size,
    pub flowable: Flowable,
}

pub enum AddResult {
    Placed(PlacedFlowable),
    /// Does not fit the remaining space; try a fresh frame.
    Overflow(Flowable),
    /// Does not fit even an empty frame.
    Unplaceable(Flowable, Size),
}

pub struct Frame {
    size: Size,
    cursor_y: Pt,
}

impl Frame {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            cursor_y: Pt::ZERO,
        }
    }

    pub fn remaining_height(&self) -> Pt {
        (self.size.height - self.cursor_y).max(Pt::ZERO)
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn used_height(&self) -> Pt {
        self.cursor_y
    }

    pub fn is_empty(&self) -> bool {
        self.cursor_y <= Pt::ZERO
    }

    pub fn add(&mut self, flowable: Flowable, metrics: &dyn BoxMetrics) -> Result<AddResult> {
        let size = metrics.measure(&flowable, self.size.width, self.size.height)?;
        if size.height <= self.remaining_height() {
            return Ok(AddResult::Placed(self.place(flowable, size)));
        }
        if self.is_empty() {
            return Ok(AddResult::Unplaceable(flowable, size));
        }
        Ok(AddResult::Overflow(flowable))
    }

    /// Places an overfull flowable at the top of an empty frame and fills it.
    pub fn place_overfull(&mut self, flowable: Flowable, size: Size) -> PlacedFlowable {
        let placed = PlacedFlowable {
            y: self.cursor_y,
            size,
            flowable,
        };
        self.cursor_y = self.size.height;
        placed
    }

    fn place(&mut self, flowable: Flowable, size: Size) -> PlacedFlowable {
        let placed = PlacedFlowable {
            y: self.cursor_y,
            size,
            flowable,
        };
        self.cursor_y += size.height;
        placed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowable::Spacer;
    use crate::measure::EstimatedMetrics;

    #[test]
    fn stacks_until_full() {
        let metrics = EstimatedMetrics::new();
        let mut frame = Frame::new(Size::from_f32(100.0, 50.0));
        let spacer = || Flowable::Spacer(Spacer::new(20.0));

        let Ok(AddResult::Placed(first)) = frame.add(spacer(), &metrics) else {
            panic!("first spacer fits");
        };
        assert_eq!(first.y, Pt::ZERO);
        let Ok(AddResult::Placed(second)) = frame.add(spacer(), &metrics) else {
            panic!("second spacer fits");
        };
        assert_eq!(second.y, Pt::from_i32(20));
        assert!(matches!(frame.add(spacer(), &metrics), Ok(AddResult::Overflow(_))));
        assert_eq!(frame.remaining_height(), Pt::from_i32(10));
    }

    #[test]
    fn too_tall_for_empty_frame_is_unplaceable() {
        let metrics = EstimatedMetrics::new();
        let mut frame = Frame::new(Size::from_f32(100.0, 50.0));
        let tall = Flowable::Spacer(Spacer::new(80.0));
        let Ok(AddResult::Unplaceable(flowable, size)) = frame.add(tall, &metrics) else {
            panic!("expected unplaceable");
        };
        let placed = frame.place_overfull(flowable, size);
        assert_eq!(placed.size.height, Pt::from_i32(80));
        assert_eq!(frame.remaining_height(), Pt::ZERO);
    }
}
