//! Integration Tests für Session-Ablauf, Button und OTA
//!
//! Treibt die Entscheidungen der Firmware-Hauptschleife (`SessionTicker`,
//! `handle_ota_request`, `SessionControl`) auf dem Host.

use iotc_core::c2d::encode_ack;
use iotc_core::ota::{
    MSG_DEVICE_NEWER, MSG_INSECURE_URL, MSG_NOT_IMPLEMENTED, MSG_START_FAILED,
    MSG_VERSION_MATCHING,
};
use iotc_core::telemetry::{TelemetryValues, encode_telemetry};
use iotc_core::time::{format_iso8601, simulated_cpu};
use iotc_core::{
    APP_VERSION, Ack, ButtonEvent, ButtonTracker, CloudConfig, CloudEvent, ConnectionStatus,
    DownloadSecurity, EventKind, FotaEvent, OtaPlan, SessionControl, SessionState, SessionTicker,
    StatusColor, command_ack, handle_ota_request, parse_event, plan_ota,
};

const CONFIG: CloudConfig<'static> = CloudConfig {
    cpid: "avtds",
    env: "avnetpoc",
    duid: "esp-a0b1c2d3e4f5",
    broker_host: "hub.azure-devices.net",
    dtg: "",
};

/// Zustand einer laufenden Session, wie ihn die Firmware-Schleife hält
struct Device {
    session: SessionControl,
    ticker: SessionTicker,
    /// URLs, die an den OTA Task übergeben wurden
    downloads: Vec<String>,
    /// Download-Queue voll, Start schlägt fehl
    queue_full: bool,
    published: Vec<i64>,
    status: Vec<StatusColor>,
}

impl Device {
    /// Verbundene Session ab `now` (10 s Takt, 1 Minute Dauer)
    fn connected(now: i64) -> Self {
        let mut session = SessionControl::new();
        assert!(session.take_run_request());
        session.set_running(true);
        Self {
            session,
            ticker: SessionTicker::start(now, 10, 1),
            downloads: Vec::new(),
            queue_full: false,
            published: Vec::new(),
            status: vec![ConnectionStatus::Connected.status_color()],
        }
    }

    /// Ein Durchlauf der Hauptschleife ohne eingehende Nachricht
    fn tick(&mut self, now: i64) -> bool {
        let tick = self.ticker.tick(now, self.session.fota_in_progress());
        if tick.restore_status {
            self.status.push(ConnectionStatus::Connected.status_color());
        }
        if tick.send_telemetry {
            self.published.push(now);
        }
        tick.finished
    }

    fn request_ota<'a>(&mut self, event: &CloudEvent<'a>) -> Option<Ack<'a>> {
        let downloads = &mut self.downloads;
        let queue_full = self.queue_full;
        let outcome = handle_ota_request(
            APP_VERSION,
            event,
            DownloadSecurity::HttpsOnly,
            &mut self.session,
            |url| {
                if queue_full {
                    return false;
                }
                downloads.push(url.to_string());
                true
            },
        );
        if outcome.download_started {
            self.status.push(StatusColor::OtaInProgress);
        }
        outcome.ack
    }
}

/// Button drücken und nach `held_ms` loslassen
fn press(button: &mut ButtonTracker, session: &mut SessionControl, at_ms: u64, held_ms: u64) {
    button.on_change(1, 1, at_ms);
    if let Some(ButtonEvent::Released { .. }) = button.on_change(0, 1, at_ms + held_ms) {
        session.toggle();
    }
}

// ============================================================================
// Tests: Button → Session
// ============================================================================

#[test]
fn test_button_stops_and_restarts_session() {
    let mut session = SessionControl::new();
    let mut button = ButtonTracker::new();

    assert!(session.take_run_request());
    session.set_running(true);

    press(&mut button, &mut session, 10_000, 150);
    assert!(session.take_shutdown_request());
    session.set_running(false);
    assert_eq!(session.state(), SessionState::Idle);

    press(&mut button, &mut session, 20_000, 150);
    assert!(session.take_run_request());
}

#[test]
fn test_button_bounce_does_not_toggle() {
    let mut session = SessionControl::new();
    let mut button = ButtonTracker::new();
    assert!(session.take_run_request());
    session.set_running(true);

    press(&mut button, &mut session, 10_000, 5);
    assert!(!session.take_shutdown_request());
}

// ============================================================================
// Tests: Telemetrie-Schleife
// ============================================================================

#[test]
fn test_session_loop_publishes_every_interval() {
    let start = 1_592_222_400_i64;
    let mut device = Device::connected(start);

    // Hauptschleife mit 500 ms Takt, in halben Sekunden simuliert
    let mut tick = 0_i64;
    while !device.tick(start + tick / 2) {
        tick += 1;
    }

    assert_eq!(
        device.published,
        vec![start, start + 10, start + 20, start + 30, start + 40, start + 50]
    );
    assert_eq!(start + tick / 2, start + 60);
}

#[test]
fn test_telemetry_message_for_publish() {
    let now = 1_592_222_437_u64;
    let timestamp = format_iso8601(now).unwrap();
    let values = TelemetryValues {
        version: APP_VERSION,
        api_version: "1.1.0",
        cpu: simulated_cpu(now),
    };
    let mut buf = [0u8; 512];
    let len = encode_telemetry(&CONFIG, &timestamp, &values, &mut buf).unwrap();
    let json = std::str::from_utf8(&buf[..len]).unwrap();

    assert!(json.contains("\"dt\":\"2020-06-15T12:00:37.000Z\""));
    assert!(json.contains("\"cpu\":37"));
    assert!(json.contains("\"version\":\"01.01.00\""));
}

// ============================================================================
// Tests: OTA-Ablauf
// ============================================================================

fn ota_payload(version: &str) -> String {
    format!(
        r#"{{"cmdType":"0x02","data":{{"ackId":"ota-1","ack":true,"command":"ota","ver":{{"sw":"{version}","hw":"1"}},"urls":["https://fw.example.com/iotc/app.bin"]}}}}"#
    )
}

#[test]
fn test_ota_upgrade_until_reboot() {
    let mut device = Device::connected(0);
    assert!(!device.tick(0));

    let payload = ota_payload("01.02.00");
    let event = parse_event(payload.as_bytes()).unwrap();
    assert_eq!(event.kind, EventKind::Ota);

    let OtaPlan::Start { target, .. } = plan_ota(APP_VERSION, &event, DownloadSecurity::HttpsOnly)
    else {
        panic!("Expected download start");
    };
    assert_eq!(target.host, "fw.example.com");
    assert_eq!(target.path, "iotc/app.bin");

    // Kein Ack beim Start, der Server fragt nach dem Reboot erneut
    assert!(device.request_ota(&event).is_none());
    assert_eq!(device.downloads, vec!["https://fw.example.com/iotc/app.bin"]);
    assert_eq!(device.status.last(), Some(&StatusColor::OtaInProgress));

    // Telemetrie pausiert, Session läuft über die eine Minute hinaus
    for now in (5..=300).step_by(5) {
        assert!(!device.tick(now));
    }
    assert_eq!(device.published, vec![0]);

    device.session.on_fota_event(FotaEvent::Progress(50));
    device.session.on_fota_event(FotaEvent::Finished);
    assert!(device.session.take_shutdown_request());
    device.session.set_running(false);
    assert!(device.session.take_reboot_request());
}

#[test]
fn test_repeated_ota_request_is_ignored() {
    let mut device = Device::connected(0);
    let payload = ota_payload("01.02.00");
    let event = parse_event(payload.as_bytes()).unwrap();

    assert!(device.request_ota(&event).is_none());
    assert!(device.request_ota(&event).is_none());
    assert_eq!(device.downloads.len(), 1);
}

#[test]
fn test_failed_download_restores_status_and_telemetry() {
    let mut device = Device::connected(0);
    assert!(!device.tick(0));

    let payload = ota_payload("01.02.00");
    let event = parse_event(payload.as_bytes()).unwrap();
    assert!(device.request_ota(&event).is_none());
    assert!(!device.tick(20));

    device.session.on_fota_event(FotaEvent::Error);
    // Session läuft noch, also keine neue Session
    assert!(!device.session.take_run_request());

    assert!(!device.tick(25));
    assert_eq!(
        device.status.last(),
        Some(&ConnectionStatus::Connected.status_color())
    );
    assert_eq!(device.published, vec![0, 25]);
}

#[test]
fn test_ota_start_failure_is_acked() {
    let mut device = Device::connected(0);
    device.queue_full = true;

    let payload = ota_payload("01.02.00");
    let event = parse_event(payload.as_bytes()).unwrap();
    let ack = device.request_ota(&event).unwrap();
    assert!(!ack.success);
    assert_eq!(ack.message, Some(MSG_START_FAILED));
    assert!(!device.session.fota_in_progress());
    assert_eq!(device.status.last(), Some(&StatusColor::Connected));
}

#[test]
fn test_plain_http_ota_is_refused() {
    let mut device = Device::connected(0);
    let payload = ota_payload("01.02.00").replace("https://", "http://");
    let event = parse_event(payload.as_bytes()).unwrap();

    let ack = device.request_ota(&event).unwrap();
    assert!(!ack.success);
    assert_eq!(ack.message, Some(MSG_INSECURE_URL));
    assert!(device.downloads.is_empty());
}

#[test]
fn test_ota_download_error_reconnects() {
    let mut session = SessionControl::new();
    assert!(session.take_run_request());
    session.set_running(true);
    session.begin_fota();

    // Session endet regulär, Download läuft weiter
    session.set_running(false);
    assert_eq!(session.state(), SessionState::AwaitingOta);

    session.on_fota_event(FotaEvent::Error);
    assert!(session.take_run_request());
    assert!(!session.take_reboot_request());
}

#[test]
fn test_ota_after_reboot_acks_matching_version() {
    let payload = ota_payload(APP_VERSION);
    let event = parse_event(payload.as_bytes()).unwrap();
    let plan = plan_ota(APP_VERSION, &event, DownloadSecurity::HttpsOnly);
    let ack = plan.ack(&event).unwrap();
    assert!(ack.success);
    assert_eq!(ack.message, Some(MSG_VERSION_MATCHING));

    let mut buf = [0u8; 256];
    let len = encode_ack(&CONFIG, "2020-06-15T12:00:00.000Z", &ack, &mut buf).unwrap();
    let json = std::str::from_utf8(&buf[..len]).unwrap();
    assert!(json.contains("\"mt\":11"));
    assert!(json.contains("\"ackId\":\"ota-1\",\"st\":7"));
}

#[test]
fn test_ota_downgrade_is_refused() {
    let payload = ota_payload("00.09.00");
    let event = parse_event(payload.as_bytes()).unwrap();
    let ack = plan_ota(APP_VERSION, &event, DownloadSecurity::HttpsOnly)
        .ack(&event)
        .unwrap();
    assert!(!ack.success);
    assert_eq!(ack.message, Some(MSG_DEVICE_NEWER));
}

#[test]
fn test_command_is_acked_as_not_implemented() {
    let payload = br#"{"cmdType":"0x01","data":{"ackId":"cmd-7","ack":true,"command":"set-led red"}}"#;
    let event = parse_event(payload).unwrap();
    let ack = command_ack(&event).unwrap();

    let mut buf = [0u8; 256];
    let len = encode_ack(&CONFIG, "2020-06-15T12:00:00.000Z", &ack, &mut buf).unwrap();
    let json = std::str::from_utf8(&buf[..len]).unwrap();
    assert!(json.contains("\"mt\":5"));
    assert!(json.contains(&format!(
        "\"ackId\":\"cmd-7\",\"st\":4,\"msg\":\"{MSG_NOT_IMPLEMENTED}\""
    )));
}
