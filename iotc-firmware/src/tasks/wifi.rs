// WiFi Task - Verbindet mit WLAN und geht auf Anforderung offline
use defmt::{Debug2Format, error, info, warn};
use embassy_futures::select::{Either, select};
use embassy_net::Runner;
use embassy_time::{Duration, Timer};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent};

use crate::config::{WIFI_PASSWORD, WIFI_SSID};
use crate::{LinkCommand, LinkSignal};

/// WiFi Connection Task
///
/// Managed die WiFi-Verbindung auf Anforderung der Session:
/// - `Connect`: Station starten, mit Access Point verbinden, bei
///   Verbindungsverlust erneut verbinden
/// - `Offline`: Verbindung trennen und Station stoppen
#[embassy_executor::task]
pub async fn connection_task(mut controller: WifiController<'static>, link: &'static LinkSignal) {
    info!("WiFi: Starting connection task");
    let mut wanted = false;

    loop {
        if !wanted {
            wanted = link.wait().await == LinkCommand::Connect;
            continue;
        }

        if !matches!(controller.is_connected(), Ok(true)) {
            if let Err(e) = connect(&mut controller).await {
                error!("WiFi: {}", e);
                // Retry nach 5s, außer die Session geht vorher offline
                if let Either::First(command) =
                    select(link.wait(), Timer::after(Duration::from_secs(5))).await
                {
                    wanted = command == LinkCommand::Connect;
                    if !wanted {
                        go_offline(&mut controller).await;
                    }
                }
                continue;
            }
        }

        match select(
            link.wait(),
            controller.wait_for_event(WifiEvent::StaDisconnected),
        )
        .await
        {
            Either::First(LinkCommand::Offline) => {
                go_offline(&mut controller).await;
                wanted = false;
            }
            Either::First(LinkCommand::Connect) => {}
            Either::Second(()) => {
                warn!("WiFi: Disconnected from AP, will retry...");
                Timer::after(Duration::from_secs(2)).await;
            }
        }
    }
}

async fn connect(controller: &mut WifiController<'static>) -> Result<(), &'static str> {
    if matches!(controller.is_started(), Ok(false)) {
        info!("WiFi: Configuring and starting...");

        let client_config = ModeConfig::Client(
            ClientConfig::default()
                .with_ssid(WIFI_SSID.into())
                .with_password(WIFI_PASSWORD.into()),
        );

        controller.set_config(&client_config).map_err(|e| {
            warn!("WiFi: {}", Debug2Format(&e));
            "Failed to set configuration"
        })?;
        controller.start_async().await.map_err(|e| {
            warn!("WiFi: {}", Debug2Format(&e));
            "Failed to start"
        })?;
        info!("WiFi: Started successfully");
    }

    info!("WiFi: Connecting to '{}'...", WIFI_SSID);
    controller.connect_async().await.map_err(|e| {
        warn!("WiFi: {}", Debug2Format(&e));
        "Connection failed"
    })?;
    info!("WiFi: Connected successfully!");
    Ok(())
}

async fn go_offline(controller: &mut WifiController<'static>) {
    if matches!(controller.is_connected(), Ok(true)) {
        if let Err(e) = controller.disconnect_async().await {
            warn!("WiFi: Disconnect failed: {}", Debug2Format(&e));
        }
    }
    if let Err(e) = controller.stop_async().await {
        warn!("WiFi: Stop failed: {}", Debug2Format(&e));
    }
    info!("WiFi: Offline");
}

/// Network Task
///
/// Überwacht den Netzwerk-Stack:
/// - Prozessiert Netzwerk-Pakete
/// - Managed TCP/IP Stack
#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}
