//! Cloud-to-Device Nachrichten (Kommandos, OTA) und Acknowledgements
//!
//! Eingehende Nachricht:
//! `{"cmdType":"0x02","data":{"ackId":"..","ack":true,"command":"..","ver":{"sw":".."},"urls":[".."]}}`
//!
//! `ackId` und `ver.sw` werden aus dem Empfangsbuffer geliehen und dürfen
//! keine JSON-Escapes enthalten. Kommando und URLs werden aufgelöst
//! kopiert (`https:\/\/host\/..` ist gültiges JSON).

use core::fmt;

use heapless::{String, Vec};
use serde::de::{self, Deserializer, IgnoredAny, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::device::CloudConfig;
use crate::telemetry::{EncodeError, SdkInfo};

/// Anzahl gespeicherter Download-URLs pro OTA-Nachricht (weitere werden übersprungen)
pub const MAX_URLS: usize = 2;

/// Maximale Länge einer Download-URL (SAS-Token inklusive)
pub const URL_MAX_LEN: usize = 512;

/// Längere Kommandos werden nur noch als vorhanden gemeldet
pub const COMMAND_MAX_LEN: usize = 128;

const MT_COMMAND_ACK: u8 = 5;
const MT_OTA_ACK: u8 = 11;

const ST_FAILED: u8 = 4;
const ST_COMMAND_EXECUTED: u8 = 6;
const ST_OTA_SUCCESS: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Kein gültiges JSON oder unerwartete Struktur
    InvalidJson,
    /// `cmdType` ist keine Hex-Zahl
    InvalidType,
}

/// Art der Cloud-Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    /// `0x01` Device-Kommando
    Command,
    /// `0x02` Firmware-Update
    Ota,
    /// Alle anderen Typen (Regeln, Sync-Anforderungen, ...)
    Other(u16),
}

impl EventKind {
    fn from_code(code: &str) -> Result<Self, ParseError> {
        let digits = code
            .strip_prefix("0x")
            .or_else(|| code.strip_prefix("0X"))
            .unwrap_or(code);
        match u16::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidType)? {
            0x01 => Ok(Self::Command),
            0x02 => Ok(Self::Ota),
            other => Ok(Self::Other(other)),
        }
    }
}

/// String mit fester Kapazität; zu lange Werte werden markiert statt
/// die ganze Nachricht abzulehnen
#[derive(Debug, Clone, PartialEq, Eq)]
enum BoundedText<const N: usize> {
    Text(String<N>),
    TooLong,
}

impl<const N: usize> BoundedText<N> {
    fn text(&self) -> Option<&str> {
        match self {
            BoundedText::Text(text) => Some(text.as_str()),
            BoundedText::TooLong => None,
        }
    }
}

struct BoundedTextVisitor<const N: usize>;

impl<'de, const N: usize> Visitor<'de> for BoundedTextVisitor<N> {
    type Value = BoundedText<N>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a string")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(String::try_from(value).map_or(BoundedText::TooLong, BoundedText::Text))
    }
}

impl<'de, const N: usize> Deserialize<'de> for BoundedText<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(BoundedTextVisitor)
    }
}

/// URL-Liste: die ersten `MAX_URLS` Einträge, der Rest wird übersprungen
struct UrlList(Vec<BoundedText<URL_MAX_LEN>, MAX_URLS>);

struct UrlListVisitor;

impl<'de> Visitor<'de> for UrlListVisitor {
    type Value = UrlList;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an array of URLs")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut urls = Vec::new();
        while !urls.is_full() {
            match seq.next_element::<BoundedText<URL_MAX_LEN>>()? {
                Some(url) => {
                    // Kapazität oben geprüft
                    let _ = urls.push(url);
                }
                None => return Ok(UrlList(urls)),
            }
        }
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(UrlList(urls))
    }
}

impl<'de> Deserialize<'de> for UrlList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(UrlListVisitor)
    }
}

#[derive(Deserialize)]
struct RawVersion<'a> {
    #[serde(default, borrow)]
    sw: Option<&'a str>,
}

#[derive(Deserialize)]
struct RawData<'a> {
    #[serde(rename = "ackId", default, borrow)]
    ack_id: Option<&'a str>,
    #[serde(default)]
    command: Option<BoundedText<COMMAND_MAX_LEN>>,
    #[serde(default, borrow)]
    ver: Option<RawVersion<'a>>,
    #[serde(default)]
    urls: Option<UrlList>,
}

#[derive(Deserialize)]
struct RawEvent<'a> {
    #[serde(rename = "cmdType", borrow)]
    cmd_type: &'a str,
    #[serde(borrow)]
    data: RawData<'a>,
}

/// Geparste Cloud-Nachricht
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEvent<'a> {
    pub kind: EventKind,
    pub ack_id: Option<&'a str>,
    command: Option<BoundedText<COMMAND_MAX_LEN>>,
    sw_version: Option<&'a str>,
    urls: Vec<BoundedText<URL_MAX_LEN>, MAX_URLS>,
}

impl<'a> CloudEvent<'a> {
    /// Kommando-Text; `Some("")`, wenn das Kommando zu lang für den Buffer war
    pub fn command(&self) -> Option<&str> {
        self.command.as_ref().map(|command| command.text().unwrap_or(""))
    }

    /// Angebotene Firmware-Version (nur OTA)
    pub fn sw_version(&self) -> Option<&'a str> {
        self.sw_version
    }

    /// true, sobald die Nachricht eine URL-Liste mitbringt (Back-End 2.0)
    pub fn has_download_urls(&self) -> bool {
        !self.urls.is_empty()
    }

    /// Download-URL mit Index; `None` auch für URLs über `URL_MAX_LEN`
    pub fn download_url(&self, index: usize) -> Option<&str> {
        self.urls.get(index).and_then(BoundedText::text)
    }

    /// Erzeugt das Acknowledgement für diese Nachricht
    ///
    /// `None`, wenn die Cloud kein Ack erwartet (keine `ackId`).
    pub fn ack(&self, success: bool, message: Option<&'a str>) -> Option<Ack<'a>> {
        let kind = match self.kind {
            EventKind::Ota => AckKind::Ota,
            EventKind::Command | EventKind::Other(_) => AckKind::Command,
        };
        self.ack_id.map(|ack_id| Ack {
            kind,
            ack_id,
            success,
            message,
        })
    }
}

/// Parst eine Cloud-to-Device Nachricht
pub fn parse_event(payload: &[u8]) -> Result<CloudEvent<'_>, ParseError> {
    let mut unescape = [0u8; URL_MAX_LEN];
    let (raw, _) = serde_json_core::from_slice_escaped::<RawEvent<'_>>(payload, &mut unescape)
        .map_err(|_| ParseError::InvalidJson)?;

    Ok(CloudEvent {
        kind: EventKind::from_code(raw.cmd_type)?,
        ack_id: raw.data.ack_id.filter(|id| !id.is_empty()),
        command: raw.data.command,
        sw_version: raw.data.ver.and_then(|ver| ver.sw),
        urls: raw.data.urls.map(|list| list.0).unwrap_or_default(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AckKind {
    Command,
    Ota,
}

/// Acknowledgement für eine Cloud-Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack<'a> {
    pub kind: AckKind,
    pub ack_id: &'a str,
    pub success: bool,
    pub message: Option<&'a str>,
}

impl Ack<'_> {
    fn message_type(&self) -> u8 {
        match self.kind {
            AckKind::Command => MT_COMMAND_ACK,
            AckKind::Ota => MT_OTA_ACK,
        }
    }

    fn status(&self) -> u8 {
        match (self.kind, self.success) {
            (_, false) => ST_FAILED,
            (AckKind::Command, true) => ST_COMMAND_EXECUTED,
            (AckKind::Ota, true) => ST_OTA_SUCCESS,
        }
    }
}

#[derive(Serialize)]
struct AckData<'a> {
    #[serde(rename = "ackId")]
    ack_id: &'a str,
    st: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<&'a str>,
}

#[derive(Serialize)]
struct AckMessage<'a> {
    #[serde(rename = "uniqueId")]
    unique_id: &'a str,
    #[serde(rename = "cpId")]
    cp_id: &'a str,
    t: &'a str,
    mt: u8,
    sdk: SdkInfo<'a>,
    d: AckData<'a>,
}

/// Serialisiert ein Acknowledgement
pub fn encode_ack(
    config: &CloudConfig<'_>,
    timestamp: &str,
    ack: &Ack<'_>,
    buf: &mut [u8],
) -> Result<usize, EncodeError> {
    let message = AckMessage {
        unique_id: config.duid,
        cp_id: config.cpid,
        t: timestamp,
        mt: ack.message_type(),
        sdk: SdkInfo::new(config.env),
        d: AckData {
            ack_id: ack.ack_id,
            st: ack.status(),
            msg: ack.message,
        },
    };
    serde_json_core::to_slice(&message, buf).map_err(|_| EncodeError::BufferTooSmall)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OTA_EVENT: &[u8] = br#"{"cmdType":"0x02","data":{"cpid":"avtds","guid":"a1","uniqueId":"esp-1","command":"ota","ack":true,"ackId":"f9d2","cmdType":"0x02","ver":{"sw":"01.02.00","hw":"1.0"},"urls":["https://fw.example.com/fw/app.bin"]}}"#;

    #[test]
    fn test_parse_ota_event() {
        let event = parse_event(OTA_EVENT).unwrap();
        assert_eq!(event.kind, EventKind::Ota);
        assert_eq!(event.ack_id, Some("f9d2"));
        assert_eq!(event.sw_version(), Some("01.02.00"));
        assert_eq!(
            event.download_url(0),
            Some("https://fw.example.com/fw/app.bin")
        );
        assert_eq!(event.download_url(1), None);
    }

    #[test]
    fn test_parse_command_event() {
        let payload = br#"{"cmdType":"0x01","data":{"ackId":"c0ff","ack":true,"command":"led-on 1"}}"#;
        let event = parse_event(payload).unwrap();
        assert_eq!(event.kind, EventKind::Command);
        assert_eq!(event.command(), Some("led-on 1"));
        assert_eq!(event.sw_version(), None);
        assert_eq!(event.download_url(0), None);
    }

    #[test]
    fn test_escaped_url_is_unescaped() {
        let payload = br#"{"cmdType":"0x02","data":{"ackId":"e1","ver":{"sw":"01.02.00"},"urls":["https:\/\/fw.example.com\/fw\/app.bin?sv=1&sig=x"]}}"#;
        let event = parse_event(payload).unwrap();
        assert_eq!(
            event.download_url(0),
            Some("https://fw.example.com/fw/app.bin?sv=1&sig=x")
        );
    }

    #[test]
    fn test_escaped_command_is_unescaped() {
        let payload = br#"{"cmdType":"0x01","data":{"ackId":"c1","command":"say \"hi\""}}"#;
        let event = parse_event(payload).unwrap();
        assert_eq!(event.command(), Some("say \"hi\""));
    }

    #[test]
    fn test_extra_urls_are_skipped() {
        let payload = br#"{"cmdType":"0x02","data":{"ackId":"u5","ver":{"sw":"01.02.00"},"urls":["https://a/1","https://b/2","https://c/3","https://d/4","https://e/5"]}}"#;
        let event = parse_event(payload).unwrap();
        assert_eq!(event.ack_id, Some("u5"));
        assert_eq!(event.download_url(0), Some("https://a/1"));
        assert_eq!(event.download_url(1), Some("https://b/2"));
        assert_eq!(event.download_url(MAX_URLS), None);
    }

    #[test]
    fn test_overlong_url_is_kept_as_marker() {
        let long = "x".repeat(URL_MAX_LEN + 1);
        let payload = std::format!(
            r#"{{"cmdType":"0x02","data":{{"ackId":"l1","urls":["https://h/{}"]}}}}"#,
            long
        );
        let event = parse_event(payload.as_bytes()).unwrap();
        assert!(event.has_download_urls());
        assert_eq!(event.download_url(0), None);
    }

    #[test]
    fn test_parse_other_type() {
        let payload = br#"{"cmdType":"0x10","data":{}}"#;
        assert_eq!(parse_event(payload).unwrap().kind, EventKind::Other(0x10));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_event(b"not json"), Err(ParseError::InvalidJson));
        assert_eq!(
            parse_event(br#"{"cmdType":"zz","data":{}}"#),
            Err(ParseError::InvalidType)
        );
    }

    #[test]
    fn test_no_ack_without_ack_id() {
        let payload = br#"{"cmdType":"0x01","data":{"command":"reboot"}}"#;
        let event = parse_event(payload).unwrap();
        assert_eq!(event.ack(false, Some("Not implemented")), None);
    }

    #[test]
    fn test_encode_ota_ack() {
        let config = CloudConfig {
            cpid: "avtds",
            env: "avnetpoc",
            duid: "esp-1",
            broker_host: "hub",
            dtg: "",
        };
        let event = parse_event(OTA_EVENT).unwrap();
        let ack = event.ack(true, Some("Version is matching")).unwrap();

        let mut buf = [0u8; 256];
        let len = encode_ack(&config, "2020-06-15T12:00:00.000Z", &ack, &mut buf).unwrap();
        assert_eq!(
            core::str::from_utf8(&buf[..len]).unwrap(),
            "{\"uniqueId\":\"esp-1\",\"cpId\":\"avtds\",\"t\":\"2020-06-15T12:00:00.000Z\",\"mt\":11,\
             \"sdk\":{\"l\":\"M_R\",\"v\":\"2.0\",\"e\":\"avnetpoc\"},\
             \"d\":{\"ackId\":\"f9d2\",\"st\":7,\"msg\":\"Version is matching\"}}"
        );
    }

    #[test]
    fn test_ack_status_codes() {
        let ack = Ack {
            kind: AckKind::Command,
            ack_id: "x",
            success: true,
            message: None,
        };
        assert_eq!((ack.message_type(), ack.status()), (5, 6));

        let failed = Ack {
            success: false,
            ..ack
        };
        assert_eq!(failed.status(), 4);

        let ota = Ack {
            kind: AckKind::Ota,
            ..ack
        };
        assert_eq!((ota.message_type(), ota.status()), (11, 7));
    }
}
