//! Swipe and keyboard input mapped onto reader commands.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    PageUp,
    PageDown,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    TouchStart { x: f32, y: f32 },
    TouchEnd { x: f32, y: f32 },
    TouchCancel,
    Key(Key),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Next,
    Prev,
    Close,
}

/// A swipe counts only when it is mostly horizontal and longer than the
/// threshold, so vertical scrolling passes through.
#[derive(Debug, Clone)]
pub struct GestureController {
    threshold: f32,
    touch_start: Option<(f32, f32)>,
}

impl GestureController {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            touch_start: None,
        }
    }

    pub fn handle(&mut self, event: InputEvent) -> Option<Command> {
        match event {
            InputEvent::TouchStart { x, y } => {
                self.touch_start = Some((x, y));
                None
            }
            InputEvent::TouchEnd { x, y } => {
                let (start_x, start_y) = self.touch_start.take()?;
                let dx = x - start_x;
                let dy = y - start_y;
                if dx.abs() <= self.threshold || dx.abs() <= dy.abs() {
                    return None;
                }
                // Finger moving left pulls the next page in.
                Some(if dx < 0.0 { Command::Next } else { Command::Prev })
            }
            InputEvent::TouchCancel => {
                self.touch_start = None;
                None
            }
            InputEvent::Key(key) => Some(match key {
                Key::ArrowLeft | Key::PageUp => Command::Prev,
                Key::ArrowRight | Key::PageDown => Command::Next,
                Key::Escape => Command::Close,
            }),
        }
    }
}

impl Default for GestureController {
    fn default() -> Self {
        Self::new(50.0)
    }
}
