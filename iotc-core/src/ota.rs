//! Auswertung von OTA- und Kommando-Nachrichten
//!
//! Pure Business Logic: entscheidet anhand der Versionen, ob ein Download
//! gestartet oder direkt geantwortet wird.

use crate::c2d::{Ack, CloudEvent};
use crate::session::SessionControl;
use crate::url::{DownloadTarget, split_download_url};
use crate::version::OtaDecision;

pub const MSG_VERSION_MATCHING: &str = "Version is matching";
pub const MSG_START_FAILED: &str = "Failed to start OTA";
pub const MSG_INSECURE_URL: &str = "Download URL must use https";
pub const MSG_DEVICE_NEWER: &str = "Device firmware version is newer";
pub const MSG_BACKEND_UNSUPPORTED: &str = "Back end version 1.0 not supported by the app";
pub const MSG_NOT_IMPLEMENTED: &str = "Not implemented";

/// Erstes Byte eines ESP-IDF App-Images
pub const IMAGE_MAGIC: u8 = 0xE9;

/// Erlaubte Schemata für den Firmware-Download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DownloadSecurity {
    /// Nur `https:` URLs
    HttpsOnly,
    /// Auch `http:`, z.B. für einen lokalen Testserver
    AllowPlainHttp,
}

/// Reaktion auf eine OTA-Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaPlan<'e> {
    /// Download starten, noch kein Ack senden
    ///
    /// Nach dem Reboot wiederholt der Server die Anfrage und bekommt
    /// dann "Version is matching".
    Start {
        url: &'e str,
        target: DownloadTarget<'e>,
        version: &'e str,
    },
    /// Direkt antworten
    Respond {
        success: bool,
        message: Option<&'static str>,
    },
}

impl OtaPlan<'_> {
    /// Ack für `Respond`, `None` bei `Start` oder ohne `ackId`
    pub fn ack<'a>(&self, event: &CloudEvent<'a>) -> Option<Ack<'a>> {
        match *self {
            OtaPlan::Start { .. } => None,
            OtaPlan::Respond { success, message } => event.ack(success, message),
        }
    }
}

fn respond(success: bool, message: &'static str) -> OtaPlan<'static> {
    OtaPlan::Respond {
        success,
        message: Some(message),
    }
}

/// Entscheidet über eine OTA-Anfrage
pub fn plan_ota<'e>(
    current_version: &str,
    event: &'e CloudEvent<'_>,
    security: DownloadSecurity,
) -> OtaPlan<'e> {
    if !event.has_download_urls() {
        // Back-End 1.0: URL steckt im Kommando, wird nicht unterstützt
        let message = event.command().map(|_| MSG_BACKEND_UNSUPPORTED);
        return OtaPlan::Respond {
            success: false,
            message,
        };
    }

    let version = event.sw_version().unwrap_or("");
    match OtaDecision::evaluate(current_version, version) {
        OtaDecision::AlreadyCurrent => respond(true, MSG_VERSION_MATCHING),
        OtaDecision::DeviceNewer => respond(false, MSG_DEVICE_NEWER),
        OtaDecision::Upgrade => {
            let Some(url) = event.download_url(0) else {
                return respond(false, MSG_START_FAILED);
            };
            match split_download_url(url) {
                Ok(target) if !target.is_secure() && security == DownloadSecurity::HttpsOnly => {
                    respond(false, MSG_INSECURE_URL)
                }
                Ok(target) => OtaPlan::Start {
                    url,
                    target,
                    version,
                },
                Err(_) => respond(false, MSG_START_FAILED),
            }
        }
    }
}

/// Ergebnis einer OTA-Anfrage während einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaRequestOutcome<'a> {
    /// Sofort zu sendendes Ack
    pub ack: Option<Ack<'a>>,
    /// Download wurde an den Downloader übergeben
    pub download_started: bool,
}

/// Verarbeitet eine OTA-Anfrage gegen den Session-Zustand
///
/// `start` übergibt die URL an den Downloader und meldet, ob das geklappt
/// hat. Läuft schon ein Download, bleibt die Anfrage ohne Ack; der Server
/// bekommt seine Antwort nach dem Reboot.
pub fn handle_ota_request<'a, F>(
    current_version: &str,
    event: &CloudEvent<'a>,
    security: DownloadSecurity,
    session: &mut SessionControl,
    start: F,
) -> OtaRequestOutcome<'a>
where
    F: FnOnce(&str) -> bool,
{
    let ignored = OtaRequestOutcome {
        ack: None,
        download_started: false,
    };
    match plan_ota(current_version, event, security) {
        OtaPlan::Start { .. } if session.fota_in_progress() => ignored,
        OtaPlan::Start { url, .. } => {
            if start(url) {
                session.begin_fota();
                OtaRequestOutcome {
                    ack: None,
                    download_started: true,
                }
            } else {
                OtaRequestOutcome {
                    ack: event.ack(false, Some(MSG_START_FAILED)),
                    download_started: false,
                }
            }
        }
        plan @ OtaPlan::Respond { .. } => OtaRequestOutcome {
            ack: plan.ack(event),
            download_started: false,
        },
    }
}

/// Fehler im Image-Inhalt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImageError {
    Empty,
    /// Erstes Byte ist nicht `IMAGE_MAGIC`
    BadMagic(u8),
}

/// Prüft den Anfang eines Images, bevor es in den Flash geschrieben wird
pub fn check_image_start(first_bytes: &[u8]) -> Result<(), ImageError> {
    match first_bytes.first() {
        None => Err(ImageError::Empty),
        Some(&IMAGE_MAGIC) => Ok(()),
        Some(&other) => Err(ImageError::BadMagic(other)),
    }
}

/// Device-Kommandos sind in der Demo nicht implementiert
pub fn command_ack<'a>(event: &CloudEvent<'a>) -> Option<Ack<'a>> {
    event.ack(false, Some(MSG_NOT_IMPLEMENTED))
}

/// Fortschritt eines Downloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    total: usize,
    received: usize,
    last_reported: u8,
}

impl DownloadProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            received: 0,
            last_reported: 0,
        }
    }

    pub fn received(&self) -> usize {
        self.received
    }

    /// Ein Image ohne Inhalt ist nie vollständig
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.received >= self.total
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.received.min(self.total) as u64 * 100) / self.total as u64) as u8
    }

    /// Zählt empfangene Bytes; liefert den Prozentwert bei jedem
    /// vollen `step`-Prozent-Schritt (für Progress-Events)
    pub fn advance(&mut self, bytes: usize, step: u8) -> Option<u8> {
        self.received = self.received.saturating_add(bytes);
        let percent = self.percent();
        let next_step = self.last_reported.saturating_add(step.max(1));
        if percent >= next_step || (percent == 100 && self.last_reported < 100) {
            self.last_reported = percent;
            Some(percent)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::c2d::parse_event;

    const HTTPS_ONLY: DownloadSecurity = DownloadSecurity::HttpsOnly;

    fn ota_event(version: &str, url: &str) -> std::string::String {
        std::format!(
            r#"{{"cmdType":"0x02","data":{{"ackId":"a1","command":"ota","ver":{{"sw":"{}"}},"urls":["{}"]}}}}"#,
            version, url
        )
    }

    #[test]
    fn test_same_version_acks_success() {
        let json = ota_event("01.01.00", "https://h/fw.bin");
        let event = parse_event(json.as_bytes()).unwrap();
        let plan = plan_ota("01.01.00", &event, HTTPS_ONLY);
        assert_eq!(plan, respond(true, MSG_VERSION_MATCHING));
        let ack = plan.ack(&event).unwrap();
        assert!(ack.success);
    }

    #[test]
    fn test_newer_version_starts_download() {
        let json = ota_event("01.02.00", "https://h/fw/app.bin");
        let event = parse_event(json.as_bytes()).unwrap();
        let plan = plan_ota("01.01.00", &event, HTTPS_ONLY);
        match plan {
            OtaPlan::Start {
                url,
                target,
                version,
            } => {
                assert_eq!(url, "https://h/fw/app.bin");
                assert_eq!(target.host, "h");
                assert_eq!(target.path, "fw/app.bin");
                assert_eq!(version, "01.02.00");
            }
            _ => panic!("Expected Start"),
        }
        assert_eq!(plan.ack(&event), None);
    }

    #[test]
    fn test_escaped_url_starts_secure_download() {
        let payload = br#"{"cmdType":"0x02","data":{"ackId":"a1","ver":{"sw":"01.02.00"},"urls":["https:\/\/fw.example.com\/fw\/app.bin?sv=1&sig=x"]}}"#;
        let event = parse_event(payload).unwrap();
        match plan_ota("01.01.00", &event, HTTPS_ONLY) {
            OtaPlan::Start { target, .. } => {
                assert!(target.is_secure());
                assert_eq!(target.host, "fw.example.com");
                assert_eq!(target.path, "fw/app.bin?sv=1&sig=x");
            }
            other => panic!("Expected Start, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_http_is_rejected() {
        let json = ota_event("01.02.00", "http://h/fw.bin");
        let event = parse_event(json.as_bytes()).unwrap();
        assert_eq!(
            plan_ota("01.01.00", &event, HTTPS_ONLY),
            respond(false, MSG_INSECURE_URL)
        );
        assert!(matches!(
            plan_ota("01.01.00", &event, DownloadSecurity::AllowPlainHttp),
            OtaPlan::Start { .. }
        ));
    }

    #[test]
    fn test_bad_url_fails_start() {
        let json = ota_event("01.02.00", "fw.bin");
        let event = parse_event(json.as_bytes()).unwrap();
        assert_eq!(
            plan_ota("01.01.00", &event, HTTPS_ONLY),
            respond(false, MSG_START_FAILED)
        );
    }

    #[test]
    fn test_overlong_url_fails_start() {
        let url = std::format!("https://h/{}", "x".repeat(crate::c2d::URL_MAX_LEN));
        let json = ota_event("01.02.00", &url);
        let event = parse_event(json.as_bytes()).unwrap();
        assert_eq!(
            plan_ota("01.01.00", &event, HTTPS_ONLY),
            respond(false, MSG_START_FAILED)
        );
    }

    #[test]
    fn test_older_version_is_rejected() {
        let json = ota_event("01.00.00", "https://h/fw.bin");
        let event = parse_event(json.as_bytes()).unwrap();
        assert_eq!(
            plan_ota("01.01.00", &event, HTTPS_ONLY),
            respond(false, MSG_DEVICE_NEWER)
        );
    }

    #[test]
    fn test_backend_v1_is_rejected() {
        let payload = br#"{"cmdType":"0x02","data":{"ackId":"a1","command":"ota https://h/fw.bin 01.02.00"}}"#;
        let event = parse_event(payload).unwrap();
        assert_eq!(
            plan_ota("01.01.00", &event, HTTPS_ONLY),
            respond(false, MSG_BACKEND_UNSUPPORTED)
        );
    }

    #[test]
    fn test_no_url_no_command() {
        let payload = br#"{"cmdType":"0x02","data":{"ackId":"a1"}}"#;
        let event = parse_event(payload).unwrap();
        assert_eq!(
            plan_ota("01.01.00", &event, HTTPS_ONLY),
            OtaPlan::Respond {
                success: false,
                message: None
            }
        );
    }

    #[test]
    fn test_request_starts_download_once() {
        let json = ota_event("01.02.00", "https://h/fw.bin");
        let event = parse_event(json.as_bytes()).unwrap();
        let mut session = SessionControl::new();
        let mut queued = None;

        let outcome = handle_ota_request("01.01.00", &event, HTTPS_ONLY, &mut session, |url| {
            queued = Some(std::string::String::from(url));
            true
        });
        assert!(outcome.download_started);
        assert_eq!(outcome.ack, None);
        assert_eq!(queued.as_deref(), Some("https://h/fw.bin"));
        assert!(session.fota_in_progress());

        // Wiederholung während des Downloads: kein zweiter Start, kein Ack
        let outcome = handle_ota_request("01.01.00", &event, HTTPS_ONLY, &mut session, |_| {
            panic!("download started twice")
        });
        assert_eq!(
            outcome,
            OtaRequestOutcome {
                ack: None,
                download_started: false
            }
        );
    }

    #[test]
    fn test_request_start_failure_is_acked() {
        let json = ota_event("01.02.00", "https://h/fw.bin");
        let event = parse_event(json.as_bytes()).unwrap();
        let mut session = SessionControl::new();

        let outcome = handle_ota_request("01.01.00", &event, HTTPS_ONLY, &mut session, |_| false);
        let ack = outcome.ack.unwrap();
        assert!(!ack.success);
        assert_eq!(ack.message, Some(MSG_START_FAILED));
        assert!(!outcome.download_started);
        assert!(!session.fota_in_progress());
    }

    #[test]
    fn test_command_ack() {
        let payload = br#"{"cmdType":"0x01","data":{"ackId":"c1","command":"blink"}}"#;
        let event = parse_event(payload).unwrap();
        let ack = command_ack(&event).unwrap();
        assert!(!ack.success);
        assert_eq!(ack.message, Some(MSG_NOT_IMPLEMENTED));
    }

    #[test]
    fn test_download_progress() {
        let mut progress = DownloadProgress::new(1000);
        assert_eq!(progress.advance(50, 10), None);
        assert_eq!(progress.advance(50, 10), Some(10));
        assert_eq!(progress.advance(5, 10), None);
        assert_eq!(progress.advance(895, 10), Some(100));
        assert!(progress.is_complete());
        assert_eq!(progress.advance(0, 10), None);
    }

    #[test]
    fn test_empty_download_is_never_complete() {
        let progress = DownloadProgress::new(0);
        assert_eq!(progress.percent(), 0);
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_image_start() {
        assert_eq!(check_image_start(&[IMAGE_MAGIC, 0x03, 0x02]), Ok(()));
        assert_eq!(check_image_start(&[]), Err(ImageError::Empty));
        assert_eq!(
            check_image_start(b"<html>"),
            Err(ImageError::BadMagic(b'<'))
        );
    }
}
