// Status-LED Task - Zeigt den Zustand der Session über die RGB LED
use defmt::{error, info};
use esp_hal_smartled::smart_led_buffer;

use crate::config::RMT_CLOCK_MHZ;
use crate::hal::RmtLedWriter;
use crate::{StatusLed, StatusSignal};

/// Status-LED Logic - Testbare Logik ohne Hardware-Abhängigkeit
///
/// Wartet auf die jeweils letzte Zustandsfarbe und schreibt sie auf die LED.
/// Ein Schreibfehler wird geloggt, die nächste Farbe wird trotzdem
/// versucht.
///
/// # Trait-basierte Abstraktion
/// Der generische Parameter `L: StatusLed` ermöglicht:
/// - Real Hardware (RmtLedWriter) im Production-Code
/// - Mock Implementation (MockStatusLed) in den Host-Tests
pub async fn status_led_logic<L: StatusLed>(mut led: L, status: &StatusSignal) -> ! {
    loop {
        let color = status.wait().await;
        if led.write(color.to_rgb()).is_err() {
            error!("LED: Failed to show {}", color);
        }
    }
}

/// Status-LED Task - Embassy Task für parallele Ausführung
///
/// # Parameter
/// - `gpio8`: GPIO8 Peripheral für LED-Datenleitung
/// - `rmt_peripheral`: RMT Peripheral für präzises Timing
/// - `status`: Signal mit der gewünschten Farbe
#[embassy_executor::task]
pub async fn status_led_task(
    gpio8: esp_hal::peripherals::GPIO8<'static>,
    rmt_peripheral: esp_hal::peripherals::RMT<'static>,
    status: &'static StatusSignal,
) {
    // Buffer für SmartLED Daten erstellen (1 LED)
    let mut rmt_buffer = smart_led_buffer!(1);

    match RmtLedWriter::new(gpio8, rmt_peripheral, RMT_CLOCK_MHZ, &mut rmt_buffer) {
        Ok(led) => {
            info!("LED: Ready");
            status_led_logic(led, status).await
        }
        Err(e) => error!("LED: RMT init failed: {}", e),
    }
}
