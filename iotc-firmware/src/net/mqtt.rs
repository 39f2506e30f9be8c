// IoTConnect MQTT Client
//
// MQTT 3.1.1 über TLS (Port 8883) mit dem Geräte-Zertifikat. Telemetrie und
// Acks gehen auf das Events-Topic, Kommandos und OTA kommen über das
// Devicebound-Topic. Die Pakete baut `iotc_core::mqtt`, hier wird nur
// gelesen und geschrieben.

use defmt::{info, warn};
use embassy_net::Stack;
use embassy_time::{Duration, Instant, with_timeout};
use embedded_io_async::{Read, Write};
use iotc_core::CloudConfig;
use iotc_core::device::Topic;
use iotc_core::mqtt::{
    Inbound, MqttError, decode, encode_connect, encode_disconnect, encode_ping, encode_publish,
    encode_subscribe, frame_len,
};

use super::NetError;
use super::tls::{TlsBuffers, TlsIdentity, TlsStream, open_tls};
use crate::config::*;

/// Typ-Byte + maximal 4 Bytes Remaining Length
const FIXED_HEADER_MAX: usize = 5;

/// Buffer einer Cloud-Verbindung
///
/// Liegt in einer StaticCell und wird von Session zu Session weitergereicht.
pub struct SessionBuffers {
    tcp_rx: [u8; TCP_BUFFER_SIZE],
    tcp_tx: [u8; TCP_BUFFER_SIZE],
    tls_read: [u8; TLS_READ_BUFFER_SIZE],
    tls_write: [u8; TLS_WRITE_BUFFER_SIZE],
    mqtt_tx: [u8; MQTT_BUFFER_SIZE],
    mqtt_rx: [u8; MQTT_BUFFER_SIZE],
}

impl SessionBuffers {
    pub const fn new() -> Self {
        Self {
            tcp_rx: [0; TCP_BUFFER_SIZE],
            tcp_tx: [0; TCP_BUFFER_SIZE],
            tls_read: [0; TLS_READ_BUFFER_SIZE],
            tls_write: [0; TLS_WRITE_BUFFER_SIZE],
            mqtt_tx: [0; MQTT_BUFFER_SIZE],
            mqtt_rx: [0; MQTT_BUFFER_SIZE],
        }
    }
}

impl Default for SessionBuffers {
    fn default() -> Self {
        Self::new()
    }
}

fn protocol_error(e: MqttError) -> NetError {
    warn!("MQTT: {}", e);
    NetError::ProtocolError
}

/// Verbundener IoTConnect Client
pub struct IotcClient<'a> {
    tls: TlsStream<'a>,
    tx: &'a mut [u8],
    rx: &'a mut [u8],
    telemetry_topic: Topic,
    last_activity: Instant,
}

impl<'a> IotcClient<'a> {
    /// Verbindet mit dem IoT Hub und abonniert das Devicebound-Topic
    ///
    /// Ablauf:
    /// 1. DNS-Auflösung + TCP + TLS Handshake
    /// 2. MQTT CONNECT (Client-ID = DUID), warten auf CONNACK
    /// 3. SUBSCRIBE auf Cloud-to-Device Nachrichten, warten auf SUBACK
    pub async fn connect(
        stack: &'static Stack<'static>,
        cloud: &CloudConfig<'a>,
        username: &'a str,
        identity: TlsIdentity<'a>,
        buffers: &'a mut SessionBuffers,
    ) -> Result<Self, NetError> {
        let telemetry_topic = cloud
            .telemetry_topic()
            .map_err(|_| NetError::ProtocolError)?;
        let c2d_topic = cloud.c2d_topic().map_err(|_| NetError::ProtocolError)?;

        let SessionBuffers {
            tcp_rx,
            tcp_tx,
            tls_read,
            tls_write,
            mqtt_tx,
            mqtt_rx,
        } = buffers;

        info!("MQTT: Connecting to '{}'...", cloud.broker_host);
        let reply_timeout = Duration::from_secs(u64::from(MQTT_KEEP_ALIVE_SECS));
        let tls = open_tls(
            stack,
            cloud.broker_host,
            MQTT_TLS_PORT,
            identity,
            TlsBuffers {
                tcp_rx,
                tcp_tx,
                tls_read,
                tls_write,
            },
            reply_timeout,
        )
        .await?;

        let mut client = Self {
            tls,
            tx: mqtt_tx,
            rx: mqtt_rx,
            telemetry_topic,
            last_activity: Instant::now(),
        };

        let len = encode_connect(cloud.duid, username, MQTT_KEEP_ALIVE_SECS, client.tx)
            .map_err(protocol_error)?;
        client.send(len).await?;
        match client.expect_reply(reply_timeout).await? {
            Inbound::ConnAck => info!("MQTT: Connected as '{}'", cloud.duid),
            _ => return Err(NetError::ProtocolError),
        }

        let len = encode_subscribe(c2d_topic.as_str(), client.tx).map_err(protocol_error)?;
        client.send(len).await?;
        match client.expect_reply(reply_timeout).await {
            Ok(Inbound::SubAck { granted: true }) => {
                info!("MQTT: Subscribed to '{}'", c2d_topic.as_str());
            }
            Ok(_) | Err(_) => {
                warn!("MQTT: SUBSCRIBE to '{}' failed", c2d_topic.as_str());
                return Err(NetError::SubscribeFailed);
            }
        }

        Ok(client)
    }

    /// Sendet eine Nachricht auf das Events-Topic (QoS 0)
    pub async fn publish(&mut self, payload: &[u8]) -> Result<(), NetError> {
        let len = encode_publish(self.telemetry_topic.as_str(), payload, self.tx)
            .map_err(|_| NetError::PublishFailed)?;
        self.send(len).await.map_err(|_| NetError::PublishFailed)
    }

    /// Wartet bis zu `timeout` auf eine eingehende Nachricht
    ///
    /// Der Payload wird nach `out` kopiert, damit der Client gleich wieder
    /// senden kann. Zu große Nachrichten und andere Pakete (PINGRESP)
    /// ergeben `None`.
    pub async fn poll(&mut self, timeout: Duration, out: &mut [u8]) -> Result<Option<usize>, NetError> {
        let Some(len) = self.read_frame(timeout).await? else {
            return Ok(None);
        };
        match decode(&self.rx[..len]).map_err(protocol_error)? {
            Inbound::Publish { topic, payload } => {
                if payload.len() > out.len() {
                    warn!(
                        "MQTT: Dropping {} byte message on '{}'",
                        payload.len(),
                        topic
                    );
                    return Ok(None);
                }
                out[..payload.len()].copy_from_slice(payload);
                Ok(Some(payload.len()))
            }
            _ => Ok(None),
        }
    }

    /// Hält die Verbindung am Leben, wenn länger nichts gesendet wurde
    pub async fn keep_alive(&mut self) -> Result<(), NetError> {
        let idle = Duration::from_secs(u64::from(MQTT_KEEP_ALIVE_SECS) / 2);
        if self.last_activity.elapsed() < idle {
            return Ok(());
        }
        let len = encode_ping(self.tx).map_err(protocol_error)?;
        self.send(len).await
    }

    pub async fn disconnect(mut self) {
        let result = match encode_disconnect(self.tx) {
            Ok(len) => self.send(len).await,
            Err(e) => Err(protocol_error(e)),
        };
        match result {
            Ok(()) => info!("MQTT: Disconnected"),
            Err(e) => warn!("MQTT: Disconnect failed: {}", e),
        }
    }

    /// Schreibt die ersten `len` Bytes des Sendebuffers
    async fn send(&mut self, len: usize) -> Result<(), NetError> {
        self.tls
            .write_all(&self.tx[..len])
            .await
            .map_err(|_| NetError::ConnectionClosed)?;
        self.tls
            .flush()
            .await
            .map_err(|_| NetError::ConnectionClosed)?;
        self.last_activity = Instant::now();
        Ok(())
    }

    /// Wartet auf die Antwort des Brokers (CONNACK, SUBACK)
    async fn expect_reply(&mut self, timeout: Duration) -> Result<Inbound<'_>, NetError> {
        let len = self
            .read_frame(timeout)
            .await?
            .ok_or(NetError::Timeout)?;
        decode(&self.rx[..len]).map_err(protocol_error)
    }

    /// Liest ein vollständiges Paket nach `rx`
    ///
    /// Nur auf das erste Byte wird höchstens `timeout` gewartet. Pakete
    /// größer als `rx` werden gelesen und verworfen.
    async fn read_frame(&mut self, timeout: Duration) -> Result<Option<usize>, NetError> {
        let mut header = [0u8; FIXED_HEADER_MAX];
        match with_timeout(timeout, self.tls.read(&mut header[..1])).await {
            Err(_) => return Ok(None),
            Ok(Ok(0)) | Ok(Err(_)) => return Err(NetError::ConnectionClosed),
            Ok(Ok(_)) => {}
        }

        let mut header_len = 1;
        let total = loop {
            if let Some(total) = frame_len(&header[..header_len]).map_err(protocol_error)? {
                break total;
            }
            self.tls
                .read_exact(&mut header[header_len..header_len + 1])
                .await
                .map_err(|_| NetError::ConnectionClosed)?;
            header_len += 1;
        };
        self.last_activity = Instant::now();

        if total > self.rx.len() {
            warn!("MQTT: Skipping {} byte packet", total);
            let mut remaining = total - header_len;
            while remaining > 0 {
                let chunk = remaining.min(self.rx.len());
                self.tls
                    .read_exact(&mut self.rx[..chunk])
                    .await
                    .map_err(|_| NetError::ConnectionClosed)?;
                remaining -= chunk;
            }
            return Ok(None);
        }

        self.rx[..header_len].copy_from_slice(&header[..header_len]);
        self.tls
            .read_exact(&mut self.rx[header_len..total])
            .await
            .map_err(|_| NetError::ConnectionClosed)?;
        Ok(Some(total))
    }
}
