//! Telemetrie-Takt innerhalb einer Session
//!
//! Zeitangaben in Unix-Sekunden.

/// Sendeplan für Telemetrie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetrySchedule {
    interval_secs: i64,
    duration_minutes: i32,
    last_send: i64,
    stop_at: i64,
}

impl TelemetrySchedule {
    /// Startet den Plan; die erste Telemetrie ist sofort fällig
    ///
    /// Eine negative Dauer bedeutet: Session läuft bis Button oder OTA.
    pub fn start(now: i64, interval_secs: u32, duration_minutes: i32) -> Self {
        let interval_secs = i64::from(interval_secs);
        Self {
            interval_secs,
            duration_minutes,
            last_send: now - interval_secs,
            stop_at: now + 60 * i64::from(duration_minutes),
        }
    }

    /// true, wenn jetzt gesendet werden soll
    pub fn poll(&mut self, now: i64, connected: bool) -> bool {
        if connected && now - self.last_send >= self.interval_secs {
            self.last_send = now;
            true
        } else {
            false
        }
    }

    /// Verlängert die Session um eine volle Dauer (während OTA)
    pub fn extend(&mut self, now: i64) {
        self.stop_at = now + 60 * i64::from(self.duration_minutes.max(0));
    }

    pub fn should_continue(&self, now: i64) -> bool {
        self.duration_minutes < 0 || now < self.stop_at
    }
}

/// Entscheidung eines Durchlaufs der Session-Schleife
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTick {
    /// Telemetrie jetzt senden, sonst nur Keep-Alive
    pub send_telemetry: bool,
    /// Download ist gescheitert: Status wieder auf "verbunden"
    pub restore_status: bool,
    /// Session-Dauer abgelaufen
    pub finished: bool,
}

/// Takt einer verbundenen Session
///
/// Während ein OTA-Download läuft, pausiert die Telemetrie und die
/// Session wird immer wieder verlängert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTicker {
    schedule: TelemetrySchedule,
    fota_seen: bool,
}

impl SessionTicker {
    pub fn start(now: i64, interval_secs: u32, duration_minutes: i32) -> Self {
        Self {
            schedule: TelemetrySchedule::start(now, interval_secs, duration_minutes),
            fota_seen: false,
        }
    }

    pub fn tick(&mut self, now: i64, fota_in_progress: bool) -> SessionTick {
        let restore_status = self.fota_seen && !fota_in_progress;
        self.fota_seen = fota_in_progress;

        if fota_in_progress {
            self.schedule.extend(now);
        }
        let finished = !self.schedule.should_continue(now);

        SessionTick {
            send_telemetry: !fota_in_progress && !finished && self.schedule.poll(now, true),
            restore_status,
            finished,
        }
    }
}
