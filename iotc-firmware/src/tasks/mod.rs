// Task-Modul: Enthält alle Embassy Tasks und die Session
//
// Tasks kommunizieren über Embassy Channels und Signale
// (Session → LED, Session → OTA, Session → WiFi) sowie über die
// geteilten Session-Flags (Button, OTA → Supervisor).

pub mod button;
pub mod led;
pub mod ota;
pub mod session;
pub mod wifi;

// Re-export Tasks für einfachen Import
pub use button::button_task;
pub use led::status_led_task;
pub use ota::{DownloadBuffers, OtaContext, ota_task};
pub use session::{SessionContext, SessionError, run_session};
pub use wifi::{connection_task, net_task};
