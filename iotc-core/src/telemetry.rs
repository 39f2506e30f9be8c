//! Telemetrie-Nachrichten im IoTConnect-Format
//!
//! Serialisierung mit serde-json-core direkt in einen Byte-Buffer (kein Heap).

use serde::Serialize;

use crate::device::CloudConfig;

/// Sprach-Kennung der SDK im Nachrichtenkopf
pub const SDK_LANGUAGE: &str = "M_R";

/// Nachrichtenformat-Version
pub const SDK_PROTOCOL_VERSION: &str = "2.0";

/// Message Type für Telemetrie
const MT_TELEMETRY: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    BufferTooSmall,
}

/// SDK-Block im Nachrichtenkopf
#[derive(Serialize)]
pub(crate) struct SdkInfo<'a> {
    l: &'a str,
    v: &'a str,
    e: &'a str,
}

impl<'a> SdkInfo<'a> {
    pub(crate) fn new(env: &'a str) -> Self {
        Self {
            l: SDK_LANGUAGE,
            v: SDK_PROTOCOL_VERSION,
            e: env,
        }
    }
}

/// Werte eines Telemetrie-Datenpunkts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TelemetryValues<'a> {
    pub version: &'a str,
    pub api_version: &'a str,
    /// Simulierter Wert (Sekunden modulo 100)
    pub cpu: u8,
}

#[derive(Serialize)]
struct DataPoint<'a> {
    id: &'a str,
    tg: &'a str,
    dt: &'a str,
    d: &'a TelemetryValues<'a>,
}

#[derive(Serialize)]
struct TelemetryMessage<'a> {
    #[serde(rename = "cpId")]
    cp_id: &'a str,
    dtg: &'a str,
    mt: u8,
    sdk: SdkInfo<'a>,
    t: &'a str,
    d: &'a [DataPoint<'a>],
}

/// Serialisiert einen Telemetrie-Datenpunkt
///
/// Gibt die Anzahl geschriebener Bytes zurück.
pub fn encode_telemetry(
    config: &CloudConfig<'_>,
    timestamp: &str,
    values: &TelemetryValues<'_>,
    buf: &mut [u8],
) -> Result<usize, EncodeError> {
    let points = [DataPoint {
        id: config.duid,
        tg: "",
        dt: timestamp,
        d: values,
    }];
    let message = TelemetryMessage {
        cp_id: config.cpid,
        dtg: config.dtg,
        mt: MT_TELEMETRY,
        sdk: SdkInfo::new(config.env),
        t: timestamp,
        d: &points,
    };
    serde_json_core::to_slice(&message, buf).map_err(|_| EncodeError::BufferTooSmall)
}
