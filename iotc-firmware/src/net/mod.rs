// Netzwerk-Hilfen: DNS, TCP, TLS, NTP und der IoTConnect MQTT-Client
//
// Alle Funktionen arbeiten auf dem embassy-net Stack. Sockets und Buffer
// gehören dem Aufrufer.

pub mod mqtt;
pub mod ntp;
pub mod tls;

use embassy_net::{IpAddress, Ipv4Address, Stack, dns::DnsQueryType, tcp::TcpSocket};
use embassy_time::{Duration, Timer, with_timeout};
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};

use crate::config::DNS_TIMEOUT_SECS;

/// Netzwerk Fehler-Typen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    LinkTimeout,
    DnsResolutionFailed,
    DnsTimeout,
    ConnectionFailed,
    SocketError,
    Timeout,
    InvalidResponse,
    TlsHandshakeFailed,
    ProtocolError,
    SubscribeFailed,
    PublishFailed,
    ConnectionClosed,
}

impl defmt::Format for NetError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            NetError::LinkTimeout => defmt::write!(fmt, "Link timeout"),
            NetError::DnsResolutionFailed => defmt::write!(fmt, "DNS failed"),
            NetError::DnsTimeout => defmt::write!(fmt, "DNS timeout"),
            NetError::ConnectionFailed => defmt::write!(fmt, "Connection failed"),
            NetError::SocketError => defmt::write!(fmt, "Socket error"),
            NetError::Timeout => defmt::write!(fmt, "Timeout"),
            NetError::InvalidResponse => defmt::write!(fmt, "Invalid response"),
            NetError::TlsHandshakeFailed => defmt::write!(fmt, "TLS handshake failed"),
            NetError::ProtocolError => defmt::write!(fmt, "Protocol error"),
            NetError::SubscribeFailed => defmt::write!(fmt, "Subscribe failed"),
            NetError::PublishFailed => defmt::write!(fmt, "Publish failed"),
            NetError::ConnectionClosed => defmt::write!(fmt, "Connection closed"),
        }
    }
}

impl embedded_io_async::Error for NetError {
    fn kind(&self) -> ErrorKind {
        match self {
            NetError::Timeout | NetError::LinkTimeout | NetError::DnsTimeout => ErrorKind::TimedOut,
            NetError::ConnectionClosed => ErrorKind::ConnectionReset,
            NetError::ConnectionFailed => ErrorKind::ConnectionRefused,
            _ => ErrorKind::Other,
        }
    }
}

/// Verbundener TCP Socket mit den embedded-io-async Traits
///
/// embedded-tls erwartet embedded-io-async 0.7, embassy-net liefert die
/// Lese- und Schreibfunktionen direkt am Socket.
pub struct TcpStream<'a> {
    socket: TcpSocket<'a>,
}

impl ErrorType for TcpStream<'_> {
    type Error = NetError;
}

impl Read for TcpStream<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        self.socket
            .read(buf)
            .await
            .map_err(|_| NetError::SocketError)
    }
}

impl Write for TcpStream<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, NetError> {
        self.socket
            .write(buf)
            .await
            .map_err(|_| NetError::SocketError)
    }

    async fn flush(&mut self) -> Result<(), NetError> {
        self.socket
            .flush()
            .await
            .map_err(|_| NetError::SocketError)
    }
}

/// Wartet bis Link und DHCP-Konfiguration verfügbar sind
pub async fn wait_for_link(stack: &'static Stack<'static>, timeout: Duration) -> Result<(), NetError> {
    let wait = async {
        loop {
            if stack.is_link_up() && stack.config_v4().is_some() {
                break;
            }
            Timer::after(Duration::from_millis(500)).await;
        }
    };
    with_timeout(timeout, wait)
        .await
        .map_err(|_| NetError::LinkTimeout)
}

/// Löst Hostname zu IPv4-Adresse auf
///
/// Nutzt embassy-net DNS-Stack mit konfigurierbarem Timeout.
pub async fn resolve_hostname(
    stack: &'static Stack<'static>,
    hostname: &str,
) -> Result<Ipv4Address, NetError> {
    let result = with_timeout(
        Duration::from_secs(DNS_TIMEOUT_SECS),
        stack.dns_query(hostname, DnsQueryType::A),
    )
    .await;

    match result {
        Ok(Ok(addrs)) => {
            for addr in addrs {
                if let IpAddress::Ipv4(ipv4) = addr {
                    return Ok(ipv4);
                }
            }
            Err(NetError::DnsResolutionFailed)
        }
        Ok(Err(_)) => Err(NetError::DnsResolutionFailed),
        Err(_) => Err(NetError::DnsTimeout),
    }
}

/// Baut eine TCP-Verbindung zu `host:port` auf
pub async fn connect_tcp<'a>(
    stack: &'static Stack<'static>,
    host: &str,
    port: u16,
    rx_buffer: &'a mut [u8],
    tx_buffer: &'a mut [u8],
    timeout: Duration,
) -> Result<TcpStream<'a>, NetError> {
    let address = resolve_hostname(stack, host).await?;

    let mut socket = TcpSocket::new(*stack, rx_buffer, tx_buffer);
    socket.set_timeout(Some(timeout));
    socket
        .connect((address, port))
        .await
        .map_err(|_| NetError::ConnectionFailed)?;
    Ok(TcpStream { socket })
}
