//! Button-Auswertung (Drücken/Loslassen)
//!
//! Bit 0 der Masken entspricht Button 1. Andere Buttons werden ignoriert.

/// Kürzere Betätigungen gelten als Prellen
pub const DEBOUNCE_MS: u64 = 30;

const BUTTON_1: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonEvent {
    Released { held_ms: u64 },
}

/// Merkt sich den Zeitpunkt des letzten Drückens
#[derive(Debug, Default, Clone, Copy)]
pub struct ButtonTracker {
    pressed_at: Option<u64>,
}

impl ButtonTracker {
    pub const fn new() -> Self {
        Self { pressed_at: None }
    }

    /// Wertet eine Zustandsänderung aus
    ///
    /// # Parameter
    /// - `state`: aktueller Zustand aller Buttons (Bit gesetzt = gedrückt)
    /// - `changed`: Buttons, deren Zustand sich geändert hat
    /// - `now_ms`: Uptime in Millisekunden
    pub fn on_change(&mut self, state: u32, changed: u32, now_ms: u64) -> Option<ButtonEvent> {
        if changed & BUTTON_1 == 0 {
            return None;
        }

        if state & BUTTON_1 != 0 {
            self.pressed_at = Some(now_ms);
            return None;
        }

        let pressed_at = self.pressed_at.take()?;
        let held_ms = now_ms.saturating_sub(pressed_at);
        if held_ms < DEBOUNCE_MS {
            return None;
        }
        Some(ButtonEvent::Released { held_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_and_release() {
        let mut button = ButtonTracker::new();
        assert_eq!(button.on_change(1, 1, 1000), None);
        assert_eq!(
            button.on_change(0, 1, 1200),
            Some(ButtonEvent::Released { held_ms: 200 })
        );
    }

    #[test]
    fn test_release_without_press_is_ignored() {
        let mut button = ButtonTracker::new();
        assert_eq!(button.on_change(0, 1, 500), None);
    }

    #[test]
    fn test_bounce_is_ignored() {
        let mut button = ButtonTracker::new();
        button.on_change(1, 1, 1000);
        assert_eq!(button.on_change(0, 1, 1010), None);
        // Nächster Release braucht wieder ein Drücken
        assert_eq!(button.on_change(0, 1, 1500), None);
    }

    #[test]
    fn test_other_buttons_are_ignored() {
        let mut button = ButtonTracker::new();
        button.on_change(1, 1, 1000);
        // Button 2 ändert sich, Button 1 bleibt gedrückt
        assert_eq!(button.on_change(0b11, 0b10, 1100), None);
        assert_eq!(
            button.on_change(0b10, 0b01, 1300),
            Some(ButtonEvent::Released { held_ms: 300 })
        );
    }

    #[test]
    fn test_release_fires_only_once() {
        let mut button = ButtonTracker::new();
        button.on_change(1, 1, 0);
        assert!(button.on_change(0, 1, 100).is_some());
        assert!(button.on_change(0, 1, 200).is_none());
    }
}
