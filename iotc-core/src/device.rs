//! Geräte-Identität und Cloud-Konfiguration
//!
//! Die DUID (device unique identifier) wird aus einer Hardware-ID gebildet:
//! `<prefix>-<id>`, z.B. `esp-a0b1c2d3e4f5`.

use core::fmt::Write;

use heapless::String;

/// Maximale DUID-Länge in Zeichen
pub const DUID_MAX_LEN: usize = 29;

/// Maximale Länge von Topics und MQTT-Username
pub const TOPIC_MAX_LEN: usize = 128;

pub type Topic = String<TOPIC_MAX_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceIdError {
    /// Hardware lieferte keine ID
    EmptyId,
    /// Prefix + ID länger als `DUID_MAX_LEN`
    TooLong,
}

/// Eindeutige Geräte-ID für IoTConnect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId(String<DUID_MAX_LEN>);

impl DeviceId {
    pub fn from_hardware_id(prefix: &str, id: &str) -> Result<Self, DeviceIdError> {
        if id.is_empty() {
            return Err(DeviceIdError::EmptyId);
        }
        let mut duid = String::new();
        write!(duid, "{}-{}", prefix, id).map_err(|_| DeviceIdError::TooLong)?;
        Ok(Self(duid))
    }

    /// DUID aus der MAC-Adresse (Kleinbuchstaben, ohne Trennzeichen)
    pub fn from_mac(prefix: &str, mac: [u8; 6]) -> Result<Self, DeviceIdError> {
        let mut hex: String<12> = String::new();
        for byte in mac {
            write!(hex, "{:02x}", byte).map_err(|_| DeviceIdError::TooLong)?;
        }
        Self::from_hardware_id(prefix, &hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    MissingCpid,
    MissingEnv,
    MissingBroker,
    TooLong,
}

/// Verbindungsparameter für IoTConnect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloudConfig<'a> {
    /// Company ID (Mandant)
    pub cpid: &'a str,
    /// Umgebung (z.B. "prod", "avnetpoc")
    pub env: &'a str,
    pub duid: &'a str,
    /// IoT Hub Hostname (aus Discovery/Sync, hier konfiguriert)
    pub broker_host: &'a str,
    /// Device Template GUID aus dem Sync (darf leer sein)
    pub dtg: &'a str,
}

impl CloudConfig<'_> {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cpid.is_empty() {
            return Err(ConfigError::MissingCpid);
        }
        if self.env.is_empty() {
            return Err(ConfigError::MissingEnv);
        }
        if self.broker_host.is_empty() {
            return Err(ConfigError::MissingBroker);
        }
        Ok(())
    }

    /// Topic für Telemetrie und Acks (Device → Cloud)
    pub fn telemetry_topic(&self) -> Result<Topic, ConfigError> {
        let mut topic = Topic::new();
        write!(topic, "devices/{}/messages/events/", self.duid)
            .map_err(|_| ConfigError::TooLong)?;
        Ok(topic)
    }

    /// Topic-Filter für Kommandos und OTA (Cloud → Device)
    pub fn c2d_topic(&self) -> Result<Topic, ConfigError> {
        let mut topic = Topic::new();
        write!(topic, "devices/{}/messages/devicebound/#", self.duid)
            .map_err(|_| ConfigError::TooLong)?;
        Ok(topic)
    }

    pub fn mqtt_username(&self) -> Result<Topic, ConfigError> {
        let mut username = Topic::new();
        write!(
            username,
            "{}/{}/?api-version=2018-06-30",
            self.broker_host, self.duid
        )
        .map_err(|_| ConfigError::TooLong)?;
        Ok(username)
    }
}
