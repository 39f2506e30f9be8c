//! Hardware Abstraction Traits
//!
//! Diese Traits definieren Schnittstellen für Hardware-Zugriff
//! ohne konkrete Implementierung.

use rgb::RGB8;

/// Fehler-Typ für LED-Operationen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LedError {
    WriteFailed,
}

/// Trait für die Status-LED
///
/// Abstrahiert den Zugriff auf die RGB LED (WS2812/Neopixel).
///
/// # Implementierungen
/// - **Production:** RmtLedWriter (ESP32 RMT Peripheral)
/// - **Testing:** MockStatusLed (in-memory Mock)
pub trait StatusLed: Send {
    /// Schreibt eine RGB-Farbe auf die LED
    ///
    /// # Fehlerbehandlung
    /// Gibt `LedError::WriteFailed` zurück wenn Hardware-Zugriff fehlschlägt
    fn write(&mut self, color: RGB8) -> Result<(), LedError>;
}

/// Fehler beim Zugriff auf Bootloader-Zustand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootError {
    /// Partitionstabelle oder OTA-Daten nicht lesbar
    StorageUnavailable,
    /// Schreiben der OTA-Daten fehlgeschlagen
    WriteFailed,
}

/// Zustand des laufenden Images aus Sicht des Bootloaders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImageState {
    /// Neues Image, noch nicht bestätigt (Rollback möglich)
    PendingVerify,
    /// Image bestätigt
    Confirmed,
    /// Kein OTA-Zustand vorhanden (z.B. Factory-Image)
    Undefined,
}

/// Bestätigung des laufenden Images gegenüber dem Bootloader
///
/// Ein neues Image muss nach der ersten erfolgreichen Cloud-Verbindung
/// bestätigt werden, sonst rollt der Bootloader beim nächsten Reset zurück.
pub trait BootImage {
    fn image_state(&mut self) -> Result<ImageState, BootError>;

    fn confirm_image(&mut self) -> Result<(), BootError>;

    /// Bestätigt nur, wenn das Image noch unbestätigt ist
    ///
    /// Gibt true zurück, wenn tatsächlich bestätigt wurde.
    fn confirm_if_pending(&mut self) -> Result<bool, BootError> {
        match self.image_state()? {
            ImageState::PendingVerify => {
                self.confirm_image()?;
                Ok(true)
            }
            ImageState::Confirmed | ImageState::Undefined => Ok(false),
        }
    }
}
