use std::time::{Duration, Instant};

use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::Key;

const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(350);

/// One-shot actions decoded from the keyboard table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    ToggleGrid,
    TogglePaths,
    TopView,
    ToggleFollow,
    ResetCamera,
    SetTierLow,
    SetTierBalanced,
    SetTierHigh,
    ToggleSimplified,
}

/// Per-frame input accumulator: mouse deltas while dragging, wheel ticks,
/// decoded key actions and double-click detection. Cleared at frame end.
pub struct Input {
    pub actions: Vec<InputAction>,
    mouse_delta: (f32, f32),
    wheel: f32,
    cursor: Option<(f32, f32)>,
    left_held: bool,
    right_held: bool,
    shift_held: bool,
    last_left_press: Option<Instant>,
    double_clicked: bool,
}

impl Input {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            mouse_delta: (0.0, 0.0),
            wheel: 0.0,
            cursor: None,
            left_held: false,
            right_held: false,
            shift_held: false,
            last_left_press: None,
            double_clicked: false,
        }
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                let current = (position.x as f32, position.y as f32);
                if let Some(previous) = self.cursor {
                    if self.left_held || self.right_held {
                        self.mouse_delta.0 += current.0 - previous.0;
                        self.mouse_delta.1 += current.1 - previous.1;
                    }
                }
                self.cursor = Some(current);
            }
            WindowEvent::MouseInput { state, button, .. } => match button {
                MouseButton::Left => {
                    let pressed = *state == ElementState::Pressed;
                    if pressed {
                        let now = Instant::now();
                        if self
                            .last_left_press
                            .is_some_and(|last| now.duration_since(last) < DOUBLE_CLICK_WINDOW)
                        {
                            self.double_clicked = true;
                            self.last_left_press = None;
                        } else {
                            self.last_left_press = Some(now);
                        }
                    }
                    self.left_held = pressed;
                }
                MouseButton::Right => self.right_held = *state == ElementState::Pressed,
                _ => {}
            },
            WindowEvent::MouseWheel { delta, .. } => {
                self.wheel += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 60.0,
                };
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.shift_held = modifiers.state().shift_key();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed && !event.repeat {
                    if let Some(action) = decode_key(&event.logical_key) {
                        self.actions.push(action);
                    }
                }
            }
            _ => {}
        }
    }

    /// Left-drag orbit, unless shift turns it into a pan.
    pub fn rotate_delta(&self) -> (f32, f32) {
        if self.left_held && !self.shift_held {
            self.mouse_delta
        } else {
            (0.0, 0.0)
        }
    }

    /// Right-drag or shift-left-drag pans.
    pub fn pan_delta(&self) -> (f32, f32) {
        if self.right_held || (self.left_held && self.shift_held) {
            self.mouse_delta
        } else {
            (0.0, 0.0)
        }
    }

    /// Multiplier on the orbit radius derived from wheel travel.
    pub fn zoom_factor(&self) -> f32 {
        0.9f32.powf(self.wheel)
    }

    pub fn take_double_click(&mut self) -> bool {
        std::mem::take(&mut self.double_clicked)
    }

    pub fn clear_frame(&mut self) {
        self.mouse_delta = (0.0, 0.0);
        self.wheel = 0.0;
        self.actions.clear();
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_key(key: &Key) -> Option<InputAction> {
    let Key::Character(text) = key else {
        return None;
    };
    match text.as_str() {
        "g" | "G" => Some(InputAction::ToggleGrid),
        "p" | "P" => Some(InputAction::TogglePaths),
        "t" | "T" => Some(InputAction::TopView),
        "f" | "F" => Some(InputAction::ToggleFollow),
        "r" | "R" => Some(InputAction::ResetCamera),
        "1" => Some(InputAction::SetTierLow),
        "2" => Some(InputAction::SetTierBalanced),
        "3" => Some(InputAction::SetTierHigh),
        "v" | "V" => Some(InputAction::ToggleSimplified),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::keyboard::SmolStr;

    #[test]
    fn key_table_maps_documented_shortcuts() {
        let cases = [
            ("g", InputAction::ToggleGrid),
            ("p", InputAction::TogglePaths),
            ("t", InputAction::TopView),
            ("f", InputAction::ToggleFollow),
            ("r", InputAction::ResetCamera),
            ("1", InputAction::SetTierLow),
            ("2", InputAction::SetTierBalanced),
            ("3", InputAction::SetTierHigh),
            ("v", InputAction::ToggleSimplified),
        ];
        for (text, expected) in cases {
            let key = Key::Character(SmolStr::new(text));
            assert_eq!(decode_key(&key), Some(expected), "key {text}");
        }
        assert_eq!(decode_key(&Key::Character(SmolStr::new("x"))), None);
    }

    #[test]
    fn zoom_factor_shrinks_radius_on_scroll_up() {
        let mut input = Input::new();
        input.wheel = 2.0;
        assert!(input.zoom_factor() < 1.0);
        input.wheel = -2.0;
        assert!(input.zoom_factor() > 1.0);
        input.clear_frame();
        assert_eq!(input.zoom_factor(), 1.0);
    }
}
