// Library-Root: Wiederverwendbare Logik und Module
// Keine Standard-Bibliothek (Embedded System)
#![no_std]

// Module
pub mod config;
pub mod hal;
pub mod net;
pub mod tasks;

// Re-exports von iotc-core
pub use iotc_core::{StatusColor, StatusLed, StatusSignal, show_status};

use core::cell::RefCell;

// Embassy Sync-Typen
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_sync::signal::Signal;
use heapless::String;
use iotc_core::SessionControl;
use iotc_core::c2d::URL_MAX_LEN;

use crate::hal::OtaFlash;

// ============================================================================
// Geteilter Session-Zustand
// ============================================================================

/// Session-Flags, geteilt zwischen Supervisor, Session, Button und OTA Task
///
/// NoopRawMutex reicht: alle Tasks laufen auf demselben Executor.
pub type SharedSession = BlockingMutex<NoopRawMutex, RefCell<SessionControl>>;

/// Führt `f` mit exklusivem Zugriff auf die Session-Flags aus
pub fn with_session<R>(session: &SharedSession, f: impl FnOnce(&mut SessionControl) -> R) -> R {
    session.lock(|cell| f(&mut cell.borrow_mut()))
}

/// Flash mit den OTA-Partitionen (Session bestätigt, OTA Task schreibt)
pub type SharedFlash = BlockingMutex<NoopRawMutex, RefCell<OtaFlash>>;

// ============================================================================
// Type-Aliase für Channel-Typen
// ============================================================================

/// Auftrag für den OTA Task
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String<URL_MAX_LEN>,
}

/// Channel für Download-Aufträge (Session → OTA Task)
/// - 1: es läuft immer nur ein Download
pub type DownloadChannel = Channel<NoopRawMutex, DownloadRequest, 1>;
pub type DownloadSender = Sender<'static, NoopRawMutex, DownloadRequest, 1>;
pub type DownloadReceiver = Receiver<'static, NoopRawMutex, DownloadRequest, 1>;

/// Kommandos an den WiFi Task (entspricht LTE connect / offline)
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum LinkCommand {
    Connect,
    Offline,
}

pub type LinkSignal = Signal<NoopRawMutex, LinkCommand>;
