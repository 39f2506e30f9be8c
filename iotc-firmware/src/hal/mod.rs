// Hardware Abstraction Layer (HAL) Module
//
// Implementierungen der iotc-core Traits für den ESP32-C6.

pub mod boot;
pub mod cert_store;
pub mod led_writer;
pub mod rng;

pub use boot::OtaFlash;
pub use cert_store::RamCertStore;
pub use led_writer::{LED_BUFFER_SIZE, RmtLedWriter};
pub use rng::TlsRng;
