//! Pointer-driven rectangle selection over a fitted image.
//!
//! The tracker only ever stores display-space positions while a drag is in progress.
//! On release the rectangle is mapped to source space, clipped to the image, and handed
//! to every subscribed [`SelectionObserver`].

use std::sync::mpsc::Sender;

use log::debug;

use crate::error::SelectionError;
use crate::geometry::{PointF, RectF, Size, SourceRect};
use crate::mapper::{self, DisplayTransform};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionState {
    Idle,
    Dragging { anchor: PointF, current: PointF },
    Committed(SourceRect),
}

/// Emitted once per completed drag with a non-empty source-space rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionCompleted {
    pub rect: SourceRect,
}

pub trait SelectionObserver {
    fn selection_completed(&mut self, event: SelectionCompleted);
}

impl SelectionObserver for Sender<SelectionCompleted> {
    fn selection_completed(&mut self, event: SelectionCompleted) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.send(event);
    }
}

pub struct SelectionTracker {
    source: Size,
    display: Size,
    transform: DisplayTransform,
    state: SelectionState,
    observers: Vec<Box<dyn SelectionObserver>>,
}

impl SelectionTracker {
    pub fn new(source: Size, display: Size) -> Self {
        Self {
            source,
            display,
            transform: mapper::compute_transform(source, display),
            state: SelectionState::Idle,
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn SelectionObserver>) {
        self.observers.push(observer);
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn transform(&self) -> &DisplayTransform {
        &self.transform
    }

    pub fn source_size(&self) -> Size {
        self.source
    }

    pub fn display_size(&self) -> Size {
        self.display
    }

    /// Rectangle under the pointer while dragging, in display space.
    pub fn live_rect(&self) -> Option<RectF> {
        match self.state {
            SelectionState::Dragging { anchor, current } => {
                Some(RectF::from_corners(anchor, current))
            }
            _ => None,
        }
    }

    pub fn committed(&self) -> Option<SourceRect> {
        match self.state {
            SelectionState::Committed(rect) => Some(rect),
            _ => None,
        }
    }

    /// A new image invalidates any anchor drawn over the previous one.
    pub fn reload(&mut self, source: Size) {
        self.source = source;
        self.transform = mapper::compute_transform(self.source, self.display);
        self.state = SelectionState::Idle;
    }

    /// Anchors are only meaningful under the transform they were drawn with.
    pub fn resize(&mut self, display: Size) {
        self.display = display;
        self.transform = mapper::compute_transform(self.source, self.display);
        self.state = SelectionState::Idle;
    }

    pub fn cancel(&mut self) {
        self.state = SelectionState::Idle;
    }

    pub fn pointer_down(&mut self, position: PointF) {
        if !self.display.bounds().contains(position) {
            debug!("ignoring pointer-down outside the display surface at {position:?}");
            return;
        }
        self.state = SelectionState::Dragging {
            anchor: position,
            current: position,
        };
    }

    pub fn pointer_move(&mut self, position: PointF) {
        if let SelectionState::Dragging { anchor, .. } = self.state {
            self.state = SelectionState::Dragging {
                anchor,
                current: position,
            };
        }
    }

    /// Finish the drag. Returns the committed source-space rectangle, or `None` when the
    /// drag was degenerate, missed the image, or was never started.
    pub fn pointer_up(&mut self, position: PointF) -> Option<SourceRect> {
        match self.commit(position) {
            Ok(rect) => {
                self.state = SelectionState::Committed(rect);
                let event = SelectionCompleted { rect };
                for observer in &mut self.observers {
                    observer.selection_completed(event);
                }
                Some(rect)
            }
            Err(SelectionError::NotDragging) => None,
            Err(err) => {
                debug!("selection discarded: {err}");
                self.state = SelectionState::Idle;
                None
            }
        }
    }

    fn commit(&self, position: PointF) -> Result<SourceRect, SelectionError> {
        let SelectionState::Dragging { anchor, .. } = self.state else {
            return Err(SelectionError::NotDragging);
        };
        let display_rect = RectF::from_corners(anchor, position);
        if display_rect.is_empty() {
            return Err(SelectionError::Degenerate);
        }
        let source_rect = mapper::display_rect_to_source(display_rect, &self.transform);
        SourceRect::clamp_from(source_rect, self.source).ok_or(SelectionError::OutsideImage)
    }
}

impl std::fmt::Debug for SelectionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionTracker")
            .field("source", &self.source)
            .field("display", &self.display)
            .field("transform", &self.transform)
            .field("state", &self.state)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn drag(tracker: &mut SelectionTracker, from: (f64, f64), to: (f64, f64)) -> Option<SourceRect> {
        tracker.pointer_down(PointF::new(from.0, from.1));
        tracker.pointer_move(PointF::new((from.0 + to.0) / 2.0, (from.1 + to.1) / 2.0));
        tracker.pointer_up(PointF::new(to.0, to.1))
    }

    #[test]
    fn drag_maps_display_rect_to_source_pixels() {
        // 400x300 into 800x800: scale 2, image starts 100px down.
        let mut tracker = SelectionTracker::new(Size::new(400, 300), Size::new(800, 800));
        let rect = drag(&mut tracker, (20.0, 120.0), (220.0, 220.0));
        assert_eq!(rect, Some(SourceRect::new(10, 10, 100, 50)));
        assert_eq!(tracker.committed(), Some(SourceRect::new(10, 10, 100, 50)));
    }

    #[test]
    fn reverse_drag_gives_same_rect() {
        let mut tracker = SelectionTracker::new(Size::new(400, 300), Size::new(800, 800));
        let forward = drag(&mut tracker, (20.0, 120.0), (220.0, 220.0));
        let backward = drag(&mut tracker, (220.0, 220.0), (20.0, 120.0));
        let mixed = drag(&mut tracker, (220.0, 120.0), (20.0, 220.0));
        assert_eq!(forward, backward);
        assert_eq!(forward, mixed);
    }

    #[test]
    fn same_point_drag_stays_idle() {
        let mut tracker = SelectionTracker::new(Size::new(400, 300), Size::new(800, 800));
        assert_eq!(drag(&mut tracker, (50.0, 150.0), (50.0, 150.0)), None);
        assert_eq!(tracker.state(), SelectionState::Idle);
        assert_eq!(tracker.committed(), None);
    }

    #[test]
    fn drag_in_letterbox_margin_is_discarded() {
        let mut tracker = SelectionTracker::new(Size::new(400, 300), Size::new(800, 800));
        // Entirely within the top 100px band above the image.
        assert_eq!(drag(&mut tracker, (10.0, 10.0), (300.0, 90.0)), None);
        assert_eq!(tracker.state(), SelectionState::Idle);
    }

    #[test]
    fn drag_past_image_edge_is_clipped() {
        let mut tracker = SelectionTracker::new(Size::new(400, 300), Size::new(800, 800));
        let rect = drag(&mut tracker, (700.0, 600.0), (799.0, 799.0));
        assert_eq!(rect, Some(SourceRect::new(350, 250, 50, 50)));
    }

    #[test]
    fn malformed_events_are_ignored() {
        let mut tracker = SelectionTracker::new(Size::new(400, 300), Size::new(800, 800));
        tracker.pointer_move(PointF::new(10.0, 10.0));
        assert_eq!(tracker.state(), SelectionState::Idle);
        assert_eq!(tracker.pointer_up(PointF::new(30.0, 30.0)), None);
        assert_eq!(tracker.state(), SelectionState::Idle);

        tracker.pointer_down(PointF::new(-5.0, 900.0));
        assert_eq!(tracker.state(), SelectionState::Idle);
    }

    #[test]
    fn resize_and_reload_drop_in_progress_drag() {
        let mut tracker = SelectionTracker::new(Size::new(400, 300), Size::new(800, 800));
        tracker.pointer_down(PointF::new(20.0, 120.0));
        tracker.resize(Size::new(400, 400));
        assert_eq!(tracker.state(), SelectionState::Idle);
        assert_eq!(tracker.pointer_up(PointF::new(200.0, 200.0)), None);

        tracker.pointer_down(PointF::new(20.0, 120.0));
        tracker.reload(Size::new(1000, 1000));
        assert_eq!(tracker.state(), SelectionState::Idle);

        tracker.pointer_down(PointF::new(20.0, 120.0));
        tracker.cancel();
        assert_eq!(tracker.live_rect(), None);
    }

    #[test]
    fn live_rect_follows_pointer() {
        let mut tracker = SelectionTracker::new(Size::new(400, 300), Size::new(800, 800));
        tracker.pointer_down(PointF::new(100.0, 200.0));
        tracker.pointer_move(PointF::new(50.0, 260.0));
        assert_eq!(
            tracker.live_rect(),
            Some(RectF::new(50.0, 200.0, 50.0, 60.0))
        );
    }

    #[test]
    fn observers_receive_completed_selections() {
        let (tx, rx) = mpsc::channel();
        let mut tracker = SelectionTracker::new(Size::new(400, 300), Size::new(800, 800));
        tracker.subscribe(Box::new(tx));

        drag(&mut tracker, (20.0, 120.0), (220.0, 220.0));
        drag(&mut tracker, (5.0, 5.0), (5.0, 5.0));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![SelectionCompleted {
                rect: SourceRect::new(10, 10, 100, 50)
            }]
        );
    }
}
