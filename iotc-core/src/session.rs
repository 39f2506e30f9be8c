//! Run/Shutdown Zustandsmaschine der Cloud-Session
//!
//! Die Flags werden von mehreren Stellen gesetzt (Button, OTA-Download,
//! Session selbst) und von der Supervisor-Schleife konsumiert.

/// Ereignisse des Firmware-Downloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FotaEvent {
    /// Fortschritt in Prozent
    Progress(u8),
    /// Image vollständig geschrieben und aktiviert
    Finished,
    /// Download oder Flash-Schreiben fehlgeschlagen
    Error,
}

/// Zusammengefasster Zustand (nur für Logging)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    Idle,
    Running,
    AwaitingOta,
    RebootPending,
}

/// Steuer-Flags der Hauptschleife
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionControl {
    running: bool,
    run_requested: bool,
    shutdown_requested: bool,
    reboot_requested: bool,
    fota_in_progress: bool,
}

impl Default for SessionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionControl {
    /// Nach dem Boot startet die erste Session automatisch
    pub const fn new() -> Self {
        Self {
            running: false,
            run_requested: true,
            shutdown_requested: false,
            reboot_requested: false,
            fota_in_progress: false,
        }
    }

    /// Button losgelassen: laufende Session beenden oder neue anfordern
    pub fn toggle(&mut self) {
        if self.running {
            self.shutdown_requested = true;
        } else {
            self.run_requested = true;
        }
    }

    /// Liefert einmalig true, wenn eine Session gestartet werden soll
    pub fn take_run_request(&mut self) -> bool {
        if self.run_requested && !self.running {
            self.run_requested = false;
            true
        } else {
            false
        }
    }

    pub fn take_shutdown_request(&mut self) -> bool {
        core::mem::take(&mut self.shutdown_requested)
    }

    pub fn take_reboot_request(&mut self) -> bool {
        core::mem::take(&mut self.reboot_requested)
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn begin_fota(&mut self) {
        self.fota_in_progress = true;
    }

    pub fn fota_in_progress(&self) -> bool {
        self.fota_in_progress
    }

    /// Verarbeitet ein Download-Ereignis
    ///
    /// Nach erfolgreichem Download wird die Session beendet und ein Reboot
    /// angefordert. Nach einem Fehler wird eine neue Session angefordert,
    /// damit der Server die OTA-Anfrage wiederholen kann.
    pub fn on_fota_event(&mut self, event: FotaEvent) {
        match event {
            FotaEvent::Finished => {
                self.fota_in_progress = false;
                if self.running {
                    self.shutdown_requested = true;
                }
                self.reboot_requested = true;
            }
            FotaEvent::Error => {
                self.fota_in_progress = false;
                if !self.running {
                    self.run_requested = true;
                }
            }
            FotaEvent::Progress(_) => {}
        }
    }

    pub fn state(&self) -> SessionState {
        if self.reboot_requested {
            SessionState::RebootPending
        } else if self.running {
            SessionState::Running
        } else if self.fota_in_progress {
            SessionState::AwaitingOta
        } else {
            SessionState::Idle
        }
    }
}
