// Session - Eine Verbindungsphase mit IoTConnect
//
// Wird vom Supervisor in main() aufgerufen, wenn eine Session angefordert
// ist (nach dem Boot, per Button oder nach einem fehlgeschlagenen OTA).
//
// Farbfolge der Status-LED:
// gelb (Start) → magenta (Zeit) → cyan (SDK bereit) → grün (verbunden)

use defmt::{error, info, warn};
use embassy_net::Stack;
use embassy_time::Duration;
use heapless::String;
use iotc_core::c2d::encode_ack;
use iotc_core::certs::{API_SEC_TAG, CertError, CertKind};
use iotc_core::device::ConfigError;
use iotc_core::telemetry::{EncodeError, TelemetryValues, encode_telemetry};
use iotc_core::time::{TimeError, simulated_cpu};
use iotc_core::{
    APP_VERSION, Ack, BootImage, CloudConfig, CloudEvent, ConnectionStatus, EventKind,
    SessionTicker, command_ack, handle_ota_request, parse_event,
};

use crate::config::*;
use crate::hal::RamCertStore;
use crate::net::mqtt::{IotcClient, SessionBuffers};
use crate::net::ntp::{WallClock, sync_time};
use crate::net::tls::TlsIdentity;
use crate::net::{NetError, wait_for_link};
use crate::{
    DownloadRequest, DownloadSender, LinkCommand, LinkSignal, SharedFlash, SharedSession,
    StatusColor, StatusSignal, show_status, with_session,
};

/// Session Fehler-Typen
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum SessionError {
    /// WiFi/DHCP nicht rechtzeitig verfügbar
    Link(NetError),
    TimeSync(NetError),
    Config(ConfigError),
    Cert(CertError),
    Net(NetError),
    Encode(EncodeError),
    Clock(TimeError),
}

impl From<NetError> for SessionError {
    fn from(e: NetError) -> Self {
        SessionError::Net(e)
    }
}

impl From<ConfigError> for SessionError {
    fn from(e: ConfigError) -> Self {
        SessionError::Config(e)
    }
}

impl From<CertError> for SessionError {
    fn from(e: CertError) -> Self {
        SessionError::Cert(e)
    }
}

impl From<EncodeError> for SessionError {
    fn from(e: EncodeError) -> Self {
        SessionError::Encode(e)
    }
}

impl From<TimeError> for SessionError {
    fn from(e: TimeError) -> Self {
        SessionError::Clock(e)
    }
}

/// Gemeinsame Ressourcen aller Sessions
pub struct SessionContext {
    pub stack: &'static Stack<'static>,
    pub link: &'static LinkSignal,
    pub status: &'static StatusSignal,
    pub session: &'static SharedSession,
    pub downloads: DownloadSender,
    pub flash: &'static SharedFlash,
    pub certs: &'static RamCertStore,
    pub cloud: CloudConfig<'static>,
}

/// Führt eine komplette Session aus
///
/// Am Ende geht das Gerät offline, außer ein OTA-Download läuft noch.
pub async fn run_session(
    ctx: &SessionContext,
    buffers: &mut SessionBuffers,
) -> Result<(), SessionError> {
    with_session(ctx.session, |s| s.set_running(true));
    show_status(ctx.status, StatusColor::Starting);

    let result = connected_session(ctx, buffers).await;

    let ota_running = with_session(ctx.session, |s| {
        s.set_running(false);
        s.fota_in_progress()
    });
    if ota_running {
        info!("-----AWAITING OTA----");
    } else {
        ctx.link.signal(LinkCommand::Offline);
        show_status(ctx.status, StatusColor::Off);
    }

    match result {
        Ok(()) => info!("Session: Finished"),
        Err(e) => error!("Session: Failed: {}", e),
    }
    result
}

async fn connected_session(
    ctx: &SessionContext,
    buffers: &mut SessionBuffers,
) -> Result<(), SessionError> {
    info!("Session: Connecting to network...");
    ctx.link.signal(LinkCommand::Connect);
    wait_for_link(ctx.stack, Duration::from_secs(LINK_TIMEOUT_SECS))
        .await
        .map_err(SessionError::Link)?;
    info!("Session: Network ready");

    let clock = sync_time(ctx.stack)
        .await
        .map_err(SessionError::TimeSync)?;
    show_status(ctx.status, StatusColor::TimeSynced);

    if let Err(e) = ctx.cloud.validate() {
        log_configuration_help(e);
        return Err(e.into());
    }

    let identity = TlsIdentity {
        ca_chain: ctx.certs.get(API_SEC_TAG, CertKind::CaChain)?,
        client: Some((
            ctx.certs.get(API_SEC_TAG, CertKind::ClientCert)?,
            ctx.certs.get(API_SEC_TAG, CertKind::PrivateKey)?,
        )),
    };
    let username = ctx.cloud.mqtt_username()?;
    show_status(ctx.status, StatusColor::SdkReady);

    let mut client =
        match IotcClient::connect(ctx.stack, &ctx.cloud, &username, identity, buffers).await {
            Ok(client) => client,
            Err(e) => {
                on_connection_status(ctx, ConnectionStatus::Failed);
                return Err(e.into());
            }
        };
    on_connection_status(ctx, ConnectionStatus::Connected);

    let result = session_loop(ctx, &clock, &mut client).await;
    if result.is_err() {
        on_connection_status(ctx, ConnectionStatus::Disconnected);
    }
    client.disconnect().await;
    result
}

/// Nach dem ersten Connect wird ein neues Image bestätigt
fn on_connection_status(ctx: &SessionContext, status: ConnectionStatus) {
    info!("Session: Connection status {}", status);
    show_status(ctx.status, status.status_color());

    if status == ConnectionStatus::Connected {
        match ctx
            .flash
            .lock(|flash| flash.borrow_mut().confirm_if_pending())
        {
            Ok(true) => info!("Boot: New firmware image confirmed"),
            Ok(false) => {}
            Err(e) => warn!("Boot: Could not confirm image: {}", e),
        }
    }
}

fn log_configuration_help(error: ConfigError) {
    error!("Session: Invalid IoTConnect configuration: {}", error);
    error!("You need to configure IOTC_CPID, IOTC_ENV and IOTC_BROKER in .env");
    error!("CPID and ENV are shown in the IoTConnect portal under Settings -> Key Vault");
    error!("Rebuild and flash the firmware afterwards");
}

async fn session_loop(
    ctx: &SessionContext,
    clock: &WallClock,
    client: &mut IotcClient<'_>,
) -> Result<(), SessionError> {
    let mut inbound = [0u8; INBOUND_MESSAGE_SIZE];
    let mut outbound = [0u8; OUTBOUND_MESSAGE_SIZE];
    let mut ticker = SessionTicker::start(
        clock.now_unix() as i64,
        TELEMETRY_SEND_INTERVAL_SECS,
        TELEMETRY_DURATION_MINUTES,
    );

    loop {
        let poll_interval = Duration::from_millis(MAIN_LOOP_INTERVAL_MS);
        if let Some(len) = client.poll(poll_interval, &mut inbound).await? {
            handle_message(ctx, clock, client, &inbound[..len], &mut outbound).await?;
        }

        if with_session(ctx.session, |s| s.take_shutdown_request()) {
            info!("Session: Stop requested");
            break;
        }

        let fota = with_session(ctx.session, |s| s.fota_in_progress());
        let tick = ticker.tick(clock.now_unix() as i64, fota);
        if tick.restore_status {
            info!("Session: Download ended, continuing");
            show_status(ctx.status, ConnectionStatus::Connected.status_color());
        }
        if tick.send_telemetry {
            publish_telemetry(ctx, clock, client, &mut outbound).await?;
        } else {
            client.keep_alive().await?;
        }

        if tick.finished {
            info!("Session: Telemetry duration elapsed");
            break;
        }
    }
    Ok(())
}

async fn publish_telemetry(
    ctx: &SessionContext,
    clock: &WallClock,
    client: &mut IotcClient<'_>,
    out: &mut [u8],
) -> Result<(), SessionError> {
    let values = TelemetryValues {
        version: APP_VERSION,
        api_version: SDK_VERSION,
        cpu: simulated_cpu(clock.now_unix()),
    };
    let timestamp = clock.timestamp()?;
    let len = encode_telemetry(&ctx.cloud, &timestamp, &values, out)?;
    client.publish(&out[..len]).await?;
    info!(
        "Telemetry: {}",
        core::str::from_utf8(&out[..len]).unwrap_or("<invalid utf-8>")
    );
    Ok(())
}

/// Verarbeitet eine Cloud-to-Device Nachricht und sendet ggf. das Ack
async fn handle_message(
    ctx: &SessionContext,
    clock: &WallClock,
    client: &mut IotcClient<'_>,
    payload: &[u8],
    out: &mut [u8],
) -> Result<(), SessionError> {
    let event = match parse_event(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!("C2D: Ignoring message: {}", e);
            return Ok(());
        }
    };

    let ack = match event.kind {
        EventKind::Command => {
            info!("C2D: Command '{}'", event.command().unwrap_or(""));
            command_ack(&event)
        }
        EventKind::Ota => handle_ota(ctx, &event),
        EventKind::Other(message_type) => {
            info!("C2D: Unhandled message type {}", message_type);
            None
        }
    };

    if let Some(ack) = ack {
        let timestamp = clock.timestamp()?;
        let len = encode_ack(&ctx.cloud, &timestamp, &ack, out)?;
        client.publish(&out[..len]).await?;
        info!(
            "C2D: Ack {} sent (success={}, {})",
            ack.ack_id,
            ack.success,
            ack.message.unwrap_or("-")
        );
    }
    Ok(())
}

fn handle_ota<'a>(ctx: &SessionContext, event: &CloudEvent<'a>) -> Option<Ack<'a>> {
    info!(
        "OTA: Request {} -> {}",
        APP_VERSION,
        event.sw_version().unwrap_or("?")
    );
    let outcome = with_session(ctx.session, |s| {
        handle_ota_request(APP_VERSION, event, OTA_DOWNLOAD_SECURITY, s, |url| {
            start_download(ctx, url)
        })
    });

    if outcome.download_started {
        show_status(ctx.status, StatusColor::OtaInProgress);
    } else if outcome.ack.is_none() {
        // Laufender Download oder Nachricht ohne ackId
        info!("OTA: No reply sent");
    }
    outcome.ack
}

/// Übergibt die URL an den OTA Task
///
/// false, wenn der Download nicht gestartet werden konnte.
fn start_download(ctx: &SessionContext, url: &str) -> bool {
    let Ok(owned) = String::try_from(url) else {
        warn!("OTA: Download URL too long ({} bytes)", url.len());
        return false;
    };

    match ctx.downloads.try_send(DownloadRequest { url: owned }) {
        Ok(()) => {
            info!("OTA: Download queued");
            true
        }
        Err(_) => {
            warn!("OTA: Download queue full");
            false
        }
    }
}
