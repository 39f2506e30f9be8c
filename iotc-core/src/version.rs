//! Versions-Vergleich für OTA-Anfragen
//!
//! Versionen sind Strings fester Breite ("01.01.00"). Jedes Feld hat zwei
//! Ziffern oder Buchstaben, damit ein byteweiser Vergleich (wie `strcmp`)
//! die Versionen korrekt ordnet.

use core::cmp::Ordering;

/// Version der laufenden Applikation
pub const APP_VERSION: &str = "01.01.00";

/// Vergleicht zwei Versionen byteweise
///
/// ```
/// # use core::cmp::Ordering;
/// # use iotc_core::version::compare;
/// assert_eq!(compare("01.01.00", "01.02.00"), Ordering::Less);
/// ```
pub fn compare(current: &str, offered: &str) -> Ordering {
    current.as_bytes().cmp(offered.as_bytes())
}

/// Ergebnis der Versionsprüfung einer OTA-Anfrage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OtaDecision {
    /// Angebotene Version läuft bereits
    AlreadyCurrent,
    /// Angebotene Version ist neuer → Download starten
    Upgrade,
    /// Gerät hat eine neuere Version (z.B. Entwicklungs-Build)
    DeviceNewer,
}

impl OtaDecision {
    pub fn evaluate(current: &str, offered: &str) -> Self {
        match compare(current, offered) {
            Ordering::Equal => Self::AlreadyCurrent,
            Ordering::Less => Self::Upgrade,
            Ordering::Greater => Self::DeviceNewer,
        }
    }
}
