//! Core Types für die Status-LED
//!
//! Datenstrukturen ohne Hardware-Dependencies

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use rgb::RGB8;

/// Maximale Helligkeit pro Farbkanal (gedimmt)
pub const LED_MAX: u8 = 20;

/// Zustandsfarben der RGB-LED
///
/// Jeder Schritt des Verbindungsaufbaus hat eine eigene Farbe,
/// damit man den Fortschritt ohne Log-Ausgabe sieht.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusColor {
    Off,
    /// Boot und Netzwerk-Verbindung (gelb)
    Starting,
    /// Uhrzeit synchronisiert (magenta)
    TimeSynced,
    /// Cloud-Client initialisiert (cyan)
    SdkReady,
    /// MQTT verbunden (grün)
    Connected,
    /// MQTT getrennt (rot)
    Disconnected,
    /// MQTT Fehler (rot)
    Failed,
    /// Firmware-Download läuft (gelb)
    OtaInProgress,
    /// Session fehlgeschlagen (rot, 3 Sekunden)
    SessionFailed,
}

impl StatusColor {
    pub fn to_rgb(self) -> RGB8 {
        let (r, g, b) = match self {
            StatusColor::Off => (0, 0, 0),
            StatusColor::Starting | StatusColor::OtaInProgress => (LED_MAX, LED_MAX, 0),
            StatusColor::TimeSynced => (LED_MAX, 0, LED_MAX),
            StatusColor::SdkReady => (0, LED_MAX, LED_MAX),
            StatusColor::Connected => (0, LED_MAX, 0),
            StatusColor::Disconnected | StatusColor::Failed | StatusColor::SessionFailed => {
                (LED_MAX, 0, 0)
            }
        };
        RGB8 { r, g, b }
    }
}

/// Gewünschte LED-Farbe für den LED Task
///
/// Nur der letzte Wert zählt: setzt die Session schneller Farben, als der
/// Task sie schreibt, werden Zwischenstände übersprungen.
pub type StatusSignal = Signal<NoopRawMutex, StatusColor>;

pub fn show_status(status: &StatusSignal, color: StatusColor) {
    status.signal(color);
}

/// Verbindungszustand des Cloud-Clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Failed,
}

impl ConnectionStatus {
    pub fn status_color(self) -> StatusColor {
        match self {
            ConnectionStatus::Connected => StatusColor::Connected,
            ConnectionStatus::Disconnected => StatusColor::Disconnected,
            ConnectionStatus::Failed => StatusColor::Failed,
        }
    }
}
