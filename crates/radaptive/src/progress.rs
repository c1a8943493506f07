//! Observer surface for live planning progress and debug drawing.

use crate::geometry::{Point2D, Vector2D};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;

/// Palette used by debug drawing primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DebugColor {
    #[default]
    Black,
    Red,
    Green,
    Blue,
    Magenta,
    Yellow,
}

impl DebugColor {
    /// Map a palette index; unknown indices fall back to black.
    pub fn from_index(index: i32) -> Self {
        match index {
            1 => DebugColor::Red,
            2 => DebugColor::Green,
            3 => DebugColor::Blue,
            4 => DebugColor::Magenta,
            5 => DebugColor::Yellow,
            _ => DebugColor::Black,
        }
    }

    pub fn index(self) -> i32 {
        match self {
            DebugColor::Black => 0,
            DebugColor::Red => 1,
            DebugColor::Green => 2,
            DebugColor::Blue => 3,
            DebugColor::Magenta => 4,
            DebugColor::Yellow => 5,
        }
    }

    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            DebugColor::Black => (0, 0, 0),
            DebugColor::Red => (255, 0, 0),
            DebugColor::Green => (0, 255, 0),
            DebugColor::Blue => (0, 0, 255),
            DebugColor::Magenta => (255, 0, 255),
            DebugColor::Yellow => (255, 255, 0),
        }
    }
}

/// Snapshot handed to the step observer after every accepted step.
#[derive(Debug, Clone, Copy)]
pub struct StepEvent<'a> {
    /// One-based step counter for the whole `execute` call.
    pub step: usize,
    /// Every tool position accepted so far, including this step.
    pub current_path: &'a [Point2D],
    pub engage_pos: Point2D,
    pub engage_dir: Vector2D,
    pub tool_pos: Point2D,
    pub tool_dir: Vector2D,
    pub engagement_angle: f64,
}

/// Receives planner events. Every method defaults to a no-op.
///
/// Calls are synchronous on the planner's thread; a slow observer slows the
/// planner down.
pub trait ProgressObserver {
    /// Return `ControlFlow::Break(())` to cancel planning.
    fn on_step(&mut self, _event: &StepEvent<'_>) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    fn draw_circle(&mut self, _center: Point2D, _radius: f64, _color: DebugColor) {}

    fn draw_path(&mut self, _path: &[Point2D], _color: DebugColor) {}

    fn clear_screen(&mut self) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}

pub type StepCallback = Box<dyn FnMut(&StepEvent<'_>) -> ControlFlow<()> + Send>;
pub type DrawCircleCallback = Box<dyn FnMut(Point2D, f64, DebugColor) + Send>;
pub type DrawPathCallback = Box<dyn FnMut(&[Point2D], DebugColor) + Send>;
pub type ClearScreenCallback = Box<dyn FnMut() + Send>;

/// One optional closure per event kind.
#[derive(Default)]
pub struct CallbackObserver {
    step: Option<StepCallback>,
    draw_circle: Option<DrawCircleCallback>,
    draw_path: Option<DrawPathCallback>,
    clear_screen: Option<ClearScreenCallback>,
}

impl CallbackObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_step<F>(&mut self, callback: F)
    where
        F: FnMut(&StepEvent<'_>) -> ControlFlow<()> + Send + 'static,
    {
        self.step = Some(Box::new(callback));
    }

    pub fn set_draw_circle<F>(&mut self, callback: F)
    where
        F: FnMut(Point2D, f64, DebugColor) + Send + 'static,
    {
        self.draw_circle = Some(Box::new(callback));
    }

    pub fn set_draw_path<F>(&mut self, callback: F)
    where
        F: FnMut(&[Point2D], DebugColor) + Send + 'static,
    {
        self.draw_path = Some(Box::new(callback));
    }

    pub fn set_clear_screen<F>(&mut self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.clear_screen = Some(Box::new(callback));
    }

    pub fn is_empty(&self) -> bool {
        self.step.is_none()
            && self.draw_circle.is_none()
            && self.draw_path.is_none()
            && self.clear_screen.is_none()
    }
}

impl std::fmt::Debug for CallbackObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackObserver")
            .field("step", &self.step.is_some())
            .field("draw_circle", &self.draw_circle.is_some())
            .field("draw_path", &self.draw_path.is_some())
            .field("clear_screen", &self.clear_screen.is_some())
            .finish()
    }
}

impl ProgressObserver for CallbackObserver {
    fn on_step(&mut self, event: &StepEvent<'_>) -> ControlFlow<()> {
        match self.step.as_mut() {
            Some(callback) => callback(event),
            None => ControlFlow::Continue(()),
        }
    }

    fn draw_circle(&mut self, center: Point2D, radius: f64, color: DebugColor) {
        if let Some(callback) = self.draw_circle.as_mut() {
            callback(center, radius, color);
        }
    }

    fn draw_path(&mut self, path: &[Point2D], color: DebugColor) {
        if let Some(callback) = self.draw_path.as_mut() {
            callback(path, color);
        }
    }

    fn clear_screen(&mut self) {
        if let Some(callback) = self.clear_screen.as_mut() {
            callback();
        }
    }
}

/// Forwards every event to a list of observers.
///
/// A step is cancelled when any observer breaks; the rest still see it.
pub(crate) struct Fanout<'a> {
    observers: Vec<&'a mut (dyn ProgressObserver + Send)>,
}

impl<'a> Fanout<'a> {
    pub(crate) fn new(observers: Vec<&'a mut (dyn ProgressObserver + Send)>) -> Self {
        Self { observers }
    }
}

impl ProgressObserver for Fanout<'_> {
    fn on_step(&mut self, event: &StepEvent<'_>) -> ControlFlow<()> {
        let mut flow = ControlFlow::Continue(());
        for observer in self.observers.iter_mut() {
            if observer.on_step(event).is_break() {
                flow = ControlFlow::Break(());
            }
        }
        flow
    }

    fn draw_circle(&mut self, center: Point2D, radius: f64, color: DebugColor) {
        for observer in self.observers.iter_mut() {
            observer.draw_circle(center, radius, color);
        }
    }

    fn draw_path(&mut self, path: &[Point2D], color: DebugColor) {
        for observer in self.observers.iter_mut() {
            observer.draw_path(path, color);
        }
    }

    fn clear_screen(&mut self) {
        for observer in self.observers.iter_mut() {
            observer.clear_screen();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn event(path: &[Point2D]) -> StepEvent<'_> {
        StepEvent {
            step: path.len(),
            current_path: path,
            engage_pos: Point2D::ORIGIN,
            engage_dir: Vector2D::new(1.0, 0.0),
            tool_pos: Point2D::ORIGIN,
            tool_dir: Vector2D::new(1.0, 0.0),
            engagement_angle: 0.5,
        }
    }

    #[test]
    fn test_color_palette() {
        assert_eq!(DebugColor::from_index(0), DebugColor::Black);
        assert_eq!(DebugColor::from_index(4), DebugColor::Magenta);
        assert_eq!(DebugColor::from_index(42), DebugColor::Black);
        assert_eq!(DebugColor::from_index(-1), DebugColor::Black);
        assert_eq!(DebugColor::Yellow.rgb(), (255, 255, 0));
        for index in 0..6 {
            assert_eq!(DebugColor::from_index(index).index(), index);
        }
    }

    #[test]
    fn test_default_observer_is_noop() {
        let mut observer = NoopObserver;
        let path = [Point2D::ORIGIN];
        assert!(observer.on_step(&event(&path)).is_continue());
        observer.draw_circle(Point2D::ORIGIN, 1.0, DebugColor::Red);
        observer.clear_screen();
    }

    #[test]
    fn test_callback_observer_forwards() {
        let steps = Arc::new(AtomicUsize::new(0));
        let circles = Arc::new(AtomicUsize::new(0));
        let mut observer = CallbackObserver::new();
        assert!(observer.is_empty());

        let counter = Arc::clone(&steps);
        observer.set_step(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });
        let counter = Arc::clone(&circles);
        observer.set_draw_circle(move |_, radius, color| {
            assert_eq!(radius, 2.5);
            assert_eq!(color, DebugColor::Green);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let path = [Point2D::ORIGIN, Point2D::new(1.0, 0.0)];
        assert!(observer.on_step(&event(&path)).is_continue());
        observer.draw_circle(Point2D::ORIGIN, 2.5, DebugColor::Green);
        // No path callback registered: dropped silently.
        observer.draw_path(&path, DebugColor::Blue);

        assert_eq!(steps.load(Ordering::SeqCst), 1);
        assert_eq!(circles.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fanout_breaks_if_any_observer_breaks() {
        struct Stopper;
        impl ProgressObserver for Stopper {
            fn on_step(&mut self, _event: &StepEvent<'_>) -> ControlFlow<()> {
                ControlFlow::Break(())
            }
        }

        let mut stopper = Stopper;
        let mut noop = NoopObserver;
        let mut observers: Vec<&mut (dyn ProgressObserver + Send)> = Vec::new();
        observers.push(&mut noop);
        observers.push(&mut stopper);
        let mut fanout = Fanout::new(observers);
        let path = [Point2D::ORIGIN];
        assert!(fanout.on_step(&event(&path)).is_break());
    }
}
