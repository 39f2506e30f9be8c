//! MQTT 3.1.1 Pakete für die IoT Hub Verbindung
//!
//! Kodierung und Dekodierung übernimmt `mqttrs`, den Transport (TLS-Stream)
//! die Firmware. Alle Nachrichten laufen mit QoS 0, daher gibt es keine
//! Quittungen außer CONNACK, SUBACK und PINGRESP.

use mqttrs::{
    Connect, Packet, Pid, Protocol, Publish, QoS, QosPid, Subscribe, SubscribeReturnCodes,
    SubscribeTopic, decode_slice, encode_slice,
};

/// CONNACK Return Code "Connection Accepted"
const CONNACK_ACCEPTED: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError {
    /// Paket passt nicht in den Sendebuffer
    Encode,
    /// Empfangenes Paket nicht dekodierbar
    Malformed,
    /// Remaining Length länger als 4 Bytes
    InvalidLength,
    /// CONNACK mit Return Code != 0 (4 = falscher Username, 5 = nicht autorisiert)
    ConnectRefused(u8),
}

/// Empfangenes Paket, soweit die Session es auswertet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    ConnAck,
    SubAck { granted: bool },
    Publish { topic: &'a str, payload: &'a [u8] },
    PingResp,
    Other,
}

fn encode(packet: &Packet<'_>, buf: &mut [u8]) -> Result<usize, MqttError> {
    encode_slice(packet, buf).map_err(|_| MqttError::Encode)
}

/// CONNECT mit Clean Session, Username und ohne Passwort
///
/// IoT Hub authentifiziert das Gerät über das TLS Client-Zertifikat.
pub fn encode_connect(
    client_id: &str,
    username: &str,
    keep_alive_secs: u16,
    buf: &mut [u8],
) -> Result<usize, MqttError> {
    let packet = Packet::Connect(Connect {
        protocol: Protocol::MQTT311,
        keep_alive: keep_alive_secs,
        client_id,
        clean_session: true,
        last_will: None,
        username: Some(username),
        password: None,
    });
    encode(&packet, buf)
}

/// SUBSCRIBE auf einen Topic-Filter (QoS 0, Packet-ID 1)
pub fn encode_subscribe(topic_filter: &str, buf: &mut [u8]) -> Result<usize, MqttError> {
    let topic = SubscribeTopic {
        topic_path: topic_filter.into(),
        qos: QoS::AtMostOnce,
    };
    let packet = Packet::Subscribe(Subscribe {
        pid: Pid::new(),
        topics: core::iter::once(topic).collect(),
    });
    encode(&packet, buf)
}

/// PUBLISH mit QoS 0, ohne Retain
pub fn encode_publish(topic: &str, payload: &[u8], buf: &mut [u8]) -> Result<usize, MqttError> {
    let packet = Packet::Publish(Publish {
        dup: false,
        qospid: QosPid::AtMostOnce,
        retain: false,
        topic_name: topic,
        payload,
    });
    encode(&packet, buf)
}

pub fn encode_ping(buf: &mut [u8]) -> Result<usize, MqttError> {
    encode(&Packet::Pingreq, buf)
}

pub fn encode_disconnect(buf: &mut [u8]) -> Result<usize, MqttError> {
    encode(&Packet::Disconnect, buf)
}

/// Gesamtlänge eines Pakets anhand des festen Headers
///
/// `header` beginnt mit dem Typ-Byte. `Ok(None)`, solange die Remaining
/// Length noch nicht vollständig gelesen ist.
pub fn frame_len(header: &[u8]) -> Result<Option<usize>, MqttError> {
    let mut remaining = 0usize;
    for (index, byte) in header.iter().skip(1).take(4).enumerate() {
        remaining |= usize::from(byte & 0x7f) << (7 * index);
        if byte & 0x80 == 0 {
            return Ok(Some(2 + index + remaining));
        }
    }
    if header.len() >= 5 {
        Err(MqttError::InvalidLength)
    } else {
        Ok(None)
    }
}

/// Dekodiert ein vollständiges Paket (siehe `frame_len`)
pub fn decode(frame: &[u8]) -> Result<Inbound<'_>, MqttError> {
    let packet = decode_slice(frame)
        .map_err(|_| MqttError::Malformed)?
        .ok_or(MqttError::Malformed)?;

    match packet {
        Packet::Connack(_) => match frame.get(3).copied() {
            Some(CONNACK_ACCEPTED) => Ok(Inbound::ConnAck),
            Some(code) => Err(MqttError::ConnectRefused(code)),
            None => Err(MqttError::Malformed),
        },
        Packet::Suback(suback) => Ok(Inbound::SubAck {
            granted: suback
                .return_codes
                .iter()
                .all(|code| matches!(code, SubscribeReturnCodes::Success(_))),
        }),
        Packet::Publish(publish) => Ok(Inbound::Publish {
            topic: publish.topic_name,
            payload: publish.payload,
        }),
        Packet::Pingresp => Ok(Inbound::PingResp),
        _ => Ok(Inbound::Other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_is_mqtt_311_with_username() {
        let mut buf = [0u8; 128];
        let username = "hub.azure-devices.net/esp-1/?api-version=2018-06-30";
        let len = encode_connect("esp-1", username, 60, &mut buf).unwrap();
        let packet = &buf[..len];

        assert_eq!(packet[0], 0x10);
        assert_eq!(usize::from(packet[1]), len - 2);
        // Protokollname "MQTT", Level 4 = 3.1.1
        assert_eq!(&packet[2..9], b"\x00\x04MQTT\x04");
        // Username-Flag + Clean Session, kein Passwort
        assert_eq!(packet[9], 0x82);
        assert_eq!(&packet[10..12], &[0, 60]);
        assert_eq!(&packet[12..19], b"\x00\x05esp-1");
        assert!(packet.ends_with(username.as_bytes()));
    }

    #[test]
    fn test_connect_buffer_too_small() {
        let mut buf = [0u8; 8];
        assert_eq!(
            encode_connect("esp-1", "user", 60, &mut buf),
            Err(MqttError::Encode)
        );
    }

    #[test]
    fn test_connack() {
        assert_eq!(decode(&[0x20, 0x02, 0x00, 0x00]), Ok(Inbound::ConnAck));
        assert_eq!(
            decode(&[0x20, 0x02, 0x00, 0x05]),
            Err(MqttError::ConnectRefused(5))
        );
    }

    #[test]
    fn test_suback() {
        assert_eq!(
            decode(&[0x90, 0x03, 0x00, 0x01, 0x00]),
            Ok(Inbound::SubAck { granted: true })
        );
        assert_eq!(
            decode(&[0x90, 0x03, 0x00, 0x01, 0x80]),
            Ok(Inbound::SubAck { granted: false })
        );
    }

    #[test]
    fn test_inbound_publish() {
        let frame = b"\x30\x0c\x00\x03c2d{\"a\":1}";
        assert_eq!(
            decode(frame),
            Ok(Inbound::Publish {
                topic: "c2d",
                payload: b"{\"a\":1}",
            })
        );
    }

    #[test]
    fn test_subscribe_packet() {
        let mut buf = [0u8; 64];
        let len = encode_subscribe("devices/esp-1/messages/devicebound/#", &mut buf).unwrap();
        // SUBSCRIBE mit reservierten Flags 0b0010, Packet-ID 1, QoS 0 am Ende
        assert_eq!(buf[0], 0x82);
        assert_eq!(&buf[2..4], &[0, 1]);
        assert_eq!(buf[len - 1], 0);
        assert_eq!(frame_len(&buf[..len]), Ok(Some(len)));
    }

    #[test]
    fn test_ping_and_disconnect() {
        let mut buf = [0u8; 4];
        assert_eq!(encode_ping(&mut buf), Ok(2));
        assert_eq!(&buf[..2], &[0xc0, 0x00]);
        assert_eq!(decode(&[0xd0, 0x00]), Ok(Inbound::PingResp));
        assert_eq!(encode_disconnect(&mut buf), Ok(2));
        assert_eq!(&buf[..2], &[0xe0, 0x00]);
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(frame_len(&[0x30]), Ok(None));
        assert_eq!(frame_len(&[0x30, 0x05]), Ok(Some(7)));
        // 0x41 + 2 * 128 = 321 Bytes Rest
        assert_eq!(frame_len(&[0x30, 0xc1, 0x02]), Ok(Some(324)));
        assert_eq!(frame_len(&[0x30, 0xff, 0xff]), Ok(None));
        assert_eq!(
            frame_len(&[0x30, 0xff, 0xff, 0xff, 0xff]),
            Err(MqttError::InvalidLength)
        );
    }
}
