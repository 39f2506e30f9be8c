//! IoTConnect Core - Platform-agnostic Logic and Traits
//!
//! Diese Crate enthält KEINE Hardware-Dependencies.
//! Sie definiert Traits, Nachrichtenformate und Pure Functions.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod button;
pub mod c2d;
pub mod certs;
pub mod device;
pub mod http;
pub mod motion;
pub mod mqtt;
pub mod ota;
pub mod schedule;
pub mod session;
pub mod telemetry;
pub mod time;
pub mod traits;
pub mod types;
pub mod url;
pub mod version;

// Re-exports für einfachen Zugriff
pub use button::{ButtonEvent, ButtonTracker};
pub use c2d::{Ack, CloudEvent, EventKind, parse_event};
pub use device::{CloudConfig, DeviceId};
pub use ota::{
    DownloadSecurity, OtaPlan, OtaRequestOutcome, command_ack, handle_ota_request, plan_ota,
};
pub use schedule::{SessionTick, SessionTicker, TelemetrySchedule};
pub use session::{FotaEvent, SessionControl, SessionState};
pub use traits::{BootError, BootImage, ImageState, LedError, StatusLed};
pub use types::{ConnectionStatus, LED_MAX, StatusColor, StatusSignal, show_status};
pub use version::{APP_VERSION, OtaDecision};
