use serde::{Deserialize, Serialize};

/// Latest known pointer location relative to the render surface origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PointerState {
    /// Pointer is over the surface at `(x, y)`.
    Over { x: f32, y: f32 },
    /// Pointer is off the surface. Guarantees zero interaction.
    #[default]
    Away,
}

impl PointerState {
    pub fn position(self) -> Option<(f32, f32)> {
        match self {
            PointerState::Over { x, y } => Some((x, y)),
            PointerState::Away => None,
        }
    }
}

/// Records pointer events between frames.
#[derive(Debug, Default, Clone)]
pub struct PointerTracker {
    state: PointerState,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, x: f32, y: f32) {
        // A non-finite coordinate can only come from a broken event source;
        // treat it like the pointer leaving.
        if x.is_finite() && y.is_finite() {
            self.state = PointerState::Over { x, y };
        } else {
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.state = PointerState::Away;
    }

    pub fn state(&self) -> PointerState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_off_surface() {
        assert_eq!(PointerTracker::new().state(), PointerState::Away);
    }

    #[test]
    fn update_then_reset() {
        let mut tracker = PointerTracker::new();
        tracker.update(12.0, 30.5);
        assert_eq!(tracker.state().position(), Some((12.0, 30.5)));

        tracker.reset();
        assert_eq!(tracker.state().position(), None);
    }

    #[test]
    fn ignores_non_finite_coordinates() {
        let mut tracker = PointerTracker::new();
        tracker.update(5.0, 5.0);
        tracker.update(f32::NAN, 1.0);
        assert_eq!(tracker.state(), PointerState::Away);
    }
}
