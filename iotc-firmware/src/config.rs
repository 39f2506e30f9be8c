// Projekt-Konfiguration: Konstanten und Hardware-Zuordnungen

use iotc_core::DownloadSecurity;

// ============================================================================
// IoTConnect Konfiguration
// ============================================================================

/// Company ID (CPID) aus dem IoTConnect-Portal
/// Wird zur Build-Zeit aus der Environment Variable IOTC_CPID geladen
/// Leer → Firmware meldet beim Session-Start, was zu tun ist
pub const IOTC_CPID: &str = env!("IOTC_CPID");

/// Umgebung (ENV) aus dem IoTConnect-Portal
pub const IOTC_ENV: &str = env!("IOTC_ENV");

/// IoT Hub Hostname (Ergebnis der IoTConnect Discovery)
pub const IOTC_BROKER: &str = env!("IOTC_BROKER");

/// Device Template GUID aus dem Sync (optional)
pub const IOTC_DTG: &str = env!("IOTC_DTG");

/// Prefix der DUID, gefolgt von der MAC-Adresse
pub const DUID_PREFIX: &str = "esp";

/// Version dieser Firmware-Integration, wird als `api_version` gemeldet
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Zertifikate (DER, zur Build-Zeit aus IOTC_CERT_DIR eingebettet)
// ============================================================================

/// CA-Kette des IoT Hubs
pub static API_CA_CERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/ca.der"));

/// Geräte-Zertifikat
pub static DEVICE_CERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/device.der"));

/// Privater Schlüssel des Geräts (PKCS#8)
pub static DEVICE_KEY: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/device-key.der"));

/// CA-Kette des Download-Servers für Firmware-Images
pub static OTA_CA_CERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/ota-ca.der"));

// ============================================================================
// Session / Telemetrie
// ============================================================================

/// Telemetrie-Intervall in Sekunden
pub const TELEMETRY_SEND_INTERVAL_SECS: u32 = 10;

/// Dauer einer Session in Minuten (negativ = bis Button/OTA)
pub const TELEMETRY_DURATION_MINUTES: i32 = 5;

/// Takt der Session-Schleife (wartet so lange auf eingehende Nachrichten)
pub const MAIN_LOOP_INTERVAL_MS: u64 = 500;

/// Takt der Supervisor-Schleife in main()
pub const SUPERVISOR_INTERVAL_MS: u64 = 100;

/// Wie lange die LED nach einer fehlgeschlagenen Session rot bleibt
pub const SESSION_FAILED_BLINK_SECS: u64 = 3;

/// Wartezeit vor dem Neustart nach erfolgreichem OTA
pub const REBOOT_DELAY_SECS: u64 = 2;

// ============================================================================
// LED / Button Konfiguration
// ============================================================================

/// RMT Taktfrequenz in MHz
/// 80 MHz ist optimal für WS2812 LED-Timing
pub const RMT_CLOCK_MHZ: u32 = 80;

// LED: GPIO8 (WS2812 auf dem DevKitC-1), Button: GPIO9 (BOOT, active low)

// ============================================================================
// WiFi Konfiguration
// ============================================================================

/// WiFi SSID (Netzwerk-Name)
/// Wird zur Build-Zeit aus der Environment Variable WIFI_SSID geladen
pub const WIFI_SSID: &str = env!("WIFI_SSID");

/// WiFi Passwort
pub const WIFI_PASSWORD: &str = env!("WIFI_PASSWORD");

/// Heap-Größe für WiFi (Bytes)
/// WiFi benötigt dynamischen Speicher für Pakete
pub const WIFI_HEAP_SIZE: usize = 65536; // 64 KB

/// Zusätzliche Heap-Größe (Bytes)
pub const EXTRA_HEAP_SIZE: usize = 36864; // 36 KB

/// Maximale Wartezeit auf Link + DHCP beim Session-Start
pub const LINK_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// Netzwerk: DNS, NTP
// ============================================================================

/// DNS Query Timeout in Sekunden
pub const DNS_TIMEOUT_SECS: u64 = 10;

/// NTP-Server für die Zeitsynchronisation
pub const NTP_SERVER: &str = "pool.ntp.org";

/// Antwort-Timeout für eine NTP-Anfrage
pub const NTP_TIMEOUT_MS: u64 = 2000;

// ============================================================================
// MQTT / TLS Konfiguration
// ============================================================================

/// MQTT über TLS
pub const MQTT_TLS_PORT: u16 = 8883;

/// MQTT Keep-Alive in Sekunden
pub const MQTT_KEEP_ALIVE_SECS: u16 = 60;

/// MQTT Buffer-Größe in Bytes
/// Muss groß genug für OTA-Nachrichten mit SAS-URLs sein
pub const MQTT_BUFFER_SIZE: usize = 2048;

/// Maximale Größe einer eingehenden Cloud-Nachricht
pub const INBOUND_MESSAGE_SIZE: usize = 1536;

/// Buffer für serialisierte Telemetrie und Acks
pub const OUTBOUND_MESSAGE_SIZE: usize = 512;

/// TCP RX/TX Buffer-Größe in Bytes
pub const TCP_BUFFER_SIZE: usize = 4096;

/// TLS Record-Buffer (16 KB Record + Overhead)
pub const TLS_READ_BUFFER_SIZE: usize = 16640;
pub const TLS_WRITE_BUFFER_SIZE: usize = 4096;

// ============================================================================
// OTA Konfiguration
// ============================================================================

/// Download-URLs aus OTA-Nachrichten müssen https sein
///
/// `AllowPlainHttp` nur für Tests gegen einen lokalen Server.
pub const OTA_DOWNLOAD_SECURITY: DownloadSecurity = DownloadSecurity::HttpsOnly;

/// Chunk-Größe beim Schreiben in die OTA-Partition
pub const OTA_CHUNK_SIZE: usize = 4096;

/// Download-Versuche (mit Fortsetzung ab dem letzten Byte)
pub const OTA_DOWNLOAD_ATTEMPTS: usize = 3;

/// Fortschritts-Events alle n Prozent
pub const OTA_PROGRESS_STEP: u8 = 10;

/// Timeout für einzelne Socket-Operationen beim Download
pub const OTA_SOCKET_TIMEOUT_SECS: u64 = 30;
