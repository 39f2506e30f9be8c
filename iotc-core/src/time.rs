//! Uhrzeit-Hilfsfunktionen
//!
//! NTP-Zeitstempel → Unix-Zeit und ISO-8601 Formatierung für Telemetrie.
//! Datumsberechnung nach Howard Hinnant's `civil_from_days` (O(1)).

use core::fmt::Write;

use heapless::String;

/// Sekunden zwischen 1900-01-01 (NTP Epoche) und 1970-01-01
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Anzahl Versuche für die Zeitsynchronisation
pub const TIME_SYNC_ATTEMPTS: usize = 5;

/// Pause zwischen zwei Versuchen
pub const TIME_SYNC_RETRY_MS: u64 = 3000;

/// "YYYY-MM-DDTHH:MM:SS.000Z"
pub type IsoTimestamp = String<24>;

/// 9999-12-31T23:59:59Z, letzter Zeitpunkt mit vierstelligem Jahr
pub const MAX_TIMESTAMP_SECS: u64 = 253_402_300_799;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeError {
    /// Nach `MAX_TIMESTAMP_SECS` nicht mehr darstellbar
    OutOfRange(u64),
}

/// Wandelt NTP-Sekunden (Era 0) in Unix-Sekunden um
///
/// Zeitpunkte vor 1970 sind ungültig (Server ohne Zeit liefert 0).
pub fn ntp_to_unix(ntp_secs: u64) -> Option<u64> {
    ntp_secs.checked_sub(NTP_UNIX_OFFSET).filter(|secs| *secs > 0)
}

/// Formatiert Unix-Sekunden als ISO-8601 Zeitstempel (UTC)
pub fn format_iso8601(unix_secs: u64) -> Result<IsoTimestamp, TimeError> {
    const SECONDS_PER_DAY: u64 = 86400;

    if unix_secs > MAX_TIMESTAMP_SECS {
        return Err(TimeError::OutOfRange(unix_secs));
    }

    let days = (unix_secs / SECONDS_PER_DAY) as i64;
    let secs_today = unix_secs % SECONDS_PER_DAY;
    let (year, month, day) = civil_from_days(days);

    let mut out = IsoTimestamp::new();
    write!(
        out,
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.000Z",
        year,
        month,
        day,
        secs_today / 3600,
        (secs_today % 3600) / 60,
        secs_today % 60
    )
    .map_err(|_| TimeError::OutOfRange(unix_secs))?;
    Ok(out)
}

/// Simulierter CPU-Wert für die Demo-Telemetrie
pub fn simulated_cpu(unix_secs: u64) -> u8 {
    (unix_secs % 100) as u8
}

fn civil_from_days(days_since_epoch: i64) -> (i64, u32, u32) {
    let z = days_since_epoch + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = i64::from(yoe) + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if m <= 2 { y + 1 } else { y };
    (year, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_epoch() {
        assert_eq!(format_iso8601(0).unwrap().as_str(), "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_known_timestamps() {
        assert_eq!(
            format_iso8601(1_592_222_400).unwrap().as_str(),
            "2020-06-15T12:00:00.000Z"
        );
        assert_eq!(
            format_iso8601(1_709_164_799).unwrap().as_str(),
            "2024-02-28T23:59:59.000Z"
        );
        // Schalttag
        assert_eq!(
            format_iso8601(1_709_208_000).unwrap().as_str(),
            "2024-02-29T12:00:00.000Z"
        );
    }

    #[test]
    fn test_last_four_digit_year() {
        assert_eq!(
            format_iso8601(MAX_TIMESTAMP_SECS).unwrap().as_str(),
            "9999-12-31T23:59:59.000Z"
        );
        assert_eq!(
            format_iso8601(MAX_TIMESTAMP_SECS + 1),
            Err(TimeError::OutOfRange(MAX_TIMESTAMP_SECS + 1))
        );
    }

    #[test]
    fn test_ntp_to_unix() {
        assert_eq!(ntp_to_unix(NTP_UNIX_OFFSET + 42), Some(42));
        assert_eq!(ntp_to_unix(0), None);
        assert_eq!(ntp_to_unix(NTP_UNIX_OFFSET), None);
    }

    #[test]
    fn test_simulated_cpu() {
        assert_eq!(simulated_cpu(1_592_222_437), 37);
        assert!(simulated_cpu(u64::MAX) < 100);
    }
}
