// Button Task - BOOT-Taster startet und beendet Sessions
use defmt::info;
use embassy_time::Instant;
use esp_hal::gpio::{Input, InputConfig, Pull};
use iotc_core::{ButtonEvent, ButtonTracker};

use crate::{SharedSession, with_session};

/// Button 1 = Bit 0
const BUTTON_MASK: u32 = 1;

/// Button Task
///
/// GPIO9 ist active low (interner Pull-Up). Jede Flanke wird an den
/// ButtonTracker gemeldet, ein gültiges Loslassen schaltet die Session um.
#[embassy_executor::task]
pub async fn button_task(gpio9: esp_hal::peripherals::GPIO9<'static>, session: &'static SharedSession) {
    let mut button = Input::new(gpio9, InputConfig::default().with_pull(Pull::Up));
    let mut tracker = ButtonTracker::new();

    loop {
        button.wait_for_any_edge().await;

        let state = if button.is_low() { BUTTON_MASK } else { 0 };
        let now_ms = Instant::now().as_millis();

        if let Some(ButtonEvent::Released { held_ms }) = tracker.on_change(state, BUTTON_MASK, now_ms)
        {
            let running = with_session(session, |s| {
                s.toggle();
                s.is_running()
            });
            if running {
                info!("Button: Released after {} ms, stopping session", held_ms);
            } else {
                info!("Button: Released after {} ms, starting session", held_ms);
            }
        }
    }
}
