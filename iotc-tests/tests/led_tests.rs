//! Integration Tests für die Status-LED
//!
//! Diese Tests laufen auf dem Host (x86_64) und nutzen MockStatusLed

use iotc_core::{ConnectionStatus, LED_MAX, LedError, StatusColor, StatusLed};
use rgb::RGB8;

// ============================================================================
// Mock Status LED
// ============================================================================

#[derive(Default)]
pub struct MockStatusLed {
    pub history: Vec<RGB8>,
    pub fail_next_write: bool,
}

impl MockStatusLed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_color(&self) -> Option<RGB8> {
        self.history.last().copied()
    }
}

impl StatusLed for MockStatusLed {
    fn write(&mut self, color: RGB8) -> Result<(), LedError> {
        if self.fail_next_write {
            self.fail_next_write = false;
            return Err(LedError::WriteFailed);
        }

        self.history.push(color);
        Ok(())
    }
}

/// Setzt eine Zustandsfarbe wie der LED-Task in der Firmware
fn show(led: &mut impl StatusLed, status: StatusColor) -> Result<(), LedError> {
    led.write(status.to_rgb())
}

// ============================================================================
// Tests: MockStatusLed
// ============================================================================

#[test]
fn test_mock_status_led_write() {
    let mut mock = MockStatusLed::new();
    assert_eq!(mock.last_color(), None);

    show(&mut mock, StatusColor::Connected).unwrap();

    assert_eq!(mock.history.len(), 1);
    assert_eq!(mock.last_color(), Some(RGB8 { r: 0, g: LED_MAX, b: 0 }));
}

#[test]
fn test_mock_status_led_recovers_after_fail() {
    let mut mock = MockStatusLed::new();
    mock.fail_next_write = true;

    assert_eq!(
        show(&mut mock, StatusColor::Starting),
        Err(LedError::WriteFailed)
    );
    assert!(show(&mut mock, StatusColor::Starting).is_ok());
    assert_eq!(mock.history.len(), 1);
}

// ============================================================================
// Tests: Farbfolge beim Verbindungsaufbau
// ============================================================================

#[test]
fn test_startup_color_sequence() {
    let mut mock = MockStatusLed::new();

    for status in [
        StatusColor::Starting,
        StatusColor::TimeSynced,
        StatusColor::SdkReady,
        ConnectionStatus::Connected.status_color(),
        StatusColor::Off,
    ] {
        show(&mut mock, status).unwrap();
    }

    assert_eq!(
        mock.history,
        vec![
            RGB8 { r: 20, g: 20, b: 0 },
            RGB8 { r: 20, g: 0, b: 20 },
            RGB8 { r: 0, g: 20, b: 20 },
            RGB8 { r: 0, g: 20, b: 0 },
            RGB8 { r: 0, g: 0, b: 0 },
        ]
    );
}

#[test]
fn test_ota_and_failure_colors() {
    assert_eq!(
        StatusColor::OtaInProgress.to_rgb(),
        StatusColor::Starting.to_rgb()
    );
    assert_eq!(
        StatusColor::SessionFailed.to_rgb(),
        RGB8 { r: LED_MAX, g: 0, b: 0 }
    );
}
