// Zeitsynchronisation per NTP (UDP Port 123)
//
// Die Session braucht Uhrzeit für die Zeitstempel der Telemetrie. Nach der
// Synchronisation läuft die Uhr auf Basis der embassy Instant weiter.
// Die TLS-Prüfung der Zertifikatslaufzeiten liest dieselbe Uhr.

use core::sync::atomic::{AtomicU32, Ordering};

use defmt::{Debug2Format, info, warn};
use embassy_futures::select::{Either, select};
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpEndpoint, Stack};
use embassy_time::{Duration, Instant, Timer};
use embedded_tls::TlsClock;
use iotc_core::time::{
    IsoTimestamp, TIME_SYNC_ATTEMPTS, TIME_SYNC_RETRY_MS, TimeError, format_iso8601, ntp_to_unix,
};

use super::{NetError, resolve_hostname};
use crate::config::{NTP_SERVER, NTP_TIMEOUT_MS};

const NTP_PORT: u16 = 123;
const NTP_PACKET_LEN: usize = 48;
/// Offset des Transmit-Timestamps (Sekunden) in der Antwort
const TRANSMIT_SECS_OFFSET: usize = 40;

/// Unix-Zeit beim Booten (Instant 0), 0 = noch nicht synchronisiert
static BOOT_UNIX: AtomicU32 = AtomicU32::new(0);

/// Uhr für embedded-tls, liefert `None` vor der ersten Synchronisation
pub struct DeviceClock;

impl TlsClock for DeviceClock {
    fn now() -> Option<u64> {
        match BOOT_UNIX.load(Ordering::Relaxed) {
            0 => None,
            boot => Some(u64::from(boot) + Instant::now().as_secs()),
        }
    }
}

/// Wanduhr: synchronisierte Unix-Zeit + vergangene Uptime
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    base_unix: u64,
    base_instant: Instant,
}

impl WallClock {
    pub fn now_unix(&self) -> u64 {
        self.base_unix + self.base_instant.elapsed().as_secs()
    }

    pub fn timestamp(&self) -> Result<IsoTimestamp, TimeError> {
        format_iso8601(self.now_unix())
    }

    fn publish(&self) {
        let boot = self.base_unix.saturating_sub(self.base_instant.as_secs());
        BOOT_UNIX.store(u32::try_from(boot).unwrap_or(0), Ordering::Relaxed);
    }
}

/// Synchronisiert die Uhr, mehrere Versuche mit Pause
pub async fn sync_time(stack: &'static Stack<'static>) -> Result<WallClock, NetError> {
    let mut last_error = NetError::Timeout;
    for attempt in 1..=TIME_SYNC_ATTEMPTS {
        match ntp_request(stack).await {
            Ok(clock) => {
                clock.publish();
                match clock.timestamp() {
                    Ok(now) => info!("Time: Synchronized, {}", now.as_str()),
                    Err(e) => warn!("Time: Synchronized, {}", e),
                }
                return Ok(clock);
            }
            Err(e) => {
                warn!(
                    "Time: Sync attempt {}/{} failed: {}",
                    attempt, TIME_SYNC_ATTEMPTS, e
                );
                last_error = e;
            }
        }
        if attempt < TIME_SYNC_ATTEMPTS {
            Timer::after(Duration::from_millis(TIME_SYNC_RETRY_MS)).await;
        }
    }
    Err(last_error)
}

async fn ntp_request(stack: &'static Stack<'static>) -> Result<WallClock, NetError> {
    let server_ip = resolve_hostname(stack, NTP_SERVER).await?;
    let server = IpEndpoint::new(server_ip.into(), NTP_PORT);

    let mut rx_meta = [PacketMetadata::EMPTY; 2];
    let mut rx_buffer = [0u8; 64];
    let mut tx_meta = [PacketMetadata::EMPTY; 2];
    let mut tx_buffer = [0u8; 64];
    let mut socket = UdpSocket::new(
        *stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    socket.bind(0).map_err(|_| NetError::SocketError)?;

    // LI=0, VN=3, Mode=3 (Client)
    let mut request = [0u8; NTP_PACKET_LEN];
    request[0] = 0x1B;
    socket
        .send_to(&request, server)
        .await
        .map_err(|_| NetError::SocketError)?;

    let mut response = [0u8; NTP_PACKET_LEN];
    let (len, from) = match select(
        Timer::after(Duration::from_millis(NTP_TIMEOUT_MS)),
        socket.recv_from(&mut response),
    )
    .await
    {
        Either::First(_) => return Err(NetError::Timeout),
        Either::Second(result) => result.map_err(|_| NetError::SocketError)?,
    };
    let received_at = Instant::now();

    if len < NTP_PACKET_LEN || from.endpoint.addr != server.addr {
        warn!("Time: Unexpected NTP reply from {}", Debug2Format(&from));
        return Err(NetError::InvalidResponse);
    }

    let mut secs = [0u8; 4];
    secs.copy_from_slice(&response[TRANSMIT_SECS_OFFSET..TRANSMIT_SECS_OFFSET + 4]);
    let unix = ntp_to_unix(u64::from(u32::from_be_bytes(secs))).ok_or(NetError::InvalidResponse)?;

    Ok(WallClock {
        base_unix: unix,
        base_instant: received_at,
    })
}
