// Keine Standard-Bibliothek verwenden (Embedded System)
#![no_std]
// Kein normaler main() Einstiegspunkt (wird von esp_rtos bereitgestellt)
#![no_main]
// Verbiete mem::forget - gefährlich bei ESP HAL Types mit DMA-Buffern
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
// Verbiete große Stack-Frames (Stack ist auf Embedded Systemen begrenzt)
#![deny(clippy::large_stack_frames)]

// Heap Allocator (WiFi benötigt dynamischen Speicher)
extern crate alloc;

use core::cell::RefCell;

// Embassy Async Runtime
use defmt::{error, info, warn};
use embassy_executor::Spawner;
use embassy_net::{Config as NetConfig, Stack, StackResources};
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_time::{Duration, Timer};
use static_cell::{ConstStaticCell, StaticCell};

// ESP32-C6 HAL
use esp_hal::clock::CpuClock;
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use esp_storage::FlashStorage;

// Backtrace bei Panic und println!() Support
use {esp_backtrace as _, esp_println as _};

// Projekt-Module und Konfiguration
use iotc_core::certs::{ApiCredentials, provision_api_certs, provision_ota_certs};
use iotc_core::{APP_VERSION, BootImage, CloudConfig, DeviceId, SessionControl};
use iotc_demo::config::*;
use iotc_demo::hal::{OtaFlash, RamCertStore};
use iotc_demo::net::mqtt::SessionBuffers;
use iotc_demo::tasks::{
    DownloadBuffers, OtaContext, SessionContext, button_task, connection_task, net_task,
    ota_task, run_session, status_led_task,
};
use iotc_demo::{
    DownloadChannel, LinkSignal, SharedFlash, SharedSession, StatusColor, StatusSignal,
    show_status, with_session,
};

// ESP-IDF App Descriptor - erforderlich für den Bootloader!
// Ohne diesen schlägt das Flashen mit "ESP-IDF App Descriptor missing" fehl
esp_bootloader_esp_idf::esp_app_desc!();

/// Main Entry Point
///
/// Initialisiert Hardware, WiFi und Zertifikate, spawnt die Tasks und
/// übernimmt dann die Rolle des Supervisors: startet Sessions auf
/// Anforderung und rebootet nach einem erfolgreichen OTA-Update.
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    // ESP32-C6 Konfiguration: CPU auf maximale Taktfrequenz (160 MHz)
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // Heap Allocator initialisieren (WiFi braucht dynamischen Speicher!)
    // Zwei Bereiche: reclaimed RAM (64 KB) + extra (36 KB) = 100 KB total
    esp_alloc::heap_allocator!(
        #[esp_hal::ram(reclaimed)]
        size: WIFI_HEAP_SIZE
    );
    esp_alloc::heap_allocator!(size: EXTRA_HEAP_SIZE);

    // Embassy Runtime initialisieren (Timer + Software Interrupt)
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_interrupt =
        esp_hal::interrupt::software::SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_interrupt.software_interrupt0);

    info!("Starting IoTConnect SDK Demo {}", APP_VERSION);

    // Status-LED zuerst, damit der Start sichtbar ist
    static STATUS: StaticCell<StatusSignal> = StaticCell::new();
    let status = &*STATUS.init(StatusSignal::new());
    spawner
        .spawn(status_led_task(peripherals.GPIO8, peripherals.RMT, status))
        .unwrap();
    show_status(status, StatusColor::Starting);

    // WiFi Hardware initialisieren
    static RADIO_INIT: StaticCell<esp_radio::Controller> = StaticCell::new();
    let radio_init =
        RADIO_INIT.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));

    let (wifi_controller, wifi_interface) =
        esp_radio::wifi::new(radio_init, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi");

    // DUID aus der MAC-Adresse der Station
    static DEVICE_ID: StaticCell<DeviceId> = StaticCell::new();
    let mac = wifi_interface.sta.mac_address();
    let device_id = match DeviceId::from_mac(DUID_PREFIX, mac) {
        Ok(id) => &*DEVICE_ID.init(id),
        Err(e) => {
            error!("Device: Invalid DUID: {}", e);
            park().await
        }
    };
    info!("Device: DUID {}", device_id.as_str());

    // Netzwerk-Stack erstellen
    // Random seed für TCP/IP Stack (von Hardware RNG)
    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;

    // Sockets: MQTT/TLS (1) + OTA Download (1) + NTP (1) + DNS (1)
    static RESOURCES: StaticCell<StackResources<6>> = StaticCell::new();
    let resources = RESOURCES.init(StackResources::new());

    let (stack, runner) = embassy_net::new(
        wifi_interface.sta,
        NetConfig::dhcpv4(Default::default()),
        resources,
        seed,
    );

    // Stack muss 'static sein für Tasks
    static STACK: StaticCell<Stack<'static>> = StaticCell::new();
    let stack = &*STACK.init(stack);

    // Zertifikate: erst API, dann OTA
    static CERTS: StaticCell<RamCertStore> = StaticCell::new();
    let certs = CERTS.init(RamCertStore::new());
    let credentials = ApiCredentials {
        ca_chain: API_CA_CERT,
        client_cert: DEVICE_CERT,
        private_key: DEVICE_KEY,
    };
    let provisioned = provision_api_certs(certs, &credentials)
        .and_then(|api| provision_ota_certs(certs, OTA_CA_CERT).map(|ota| api + ota));
    match provisioned {
        Ok(count) => info!("Certs: {} certificates provisioned", count),
        Err(e) => {
            error!("Certs: Provisioning failed: {}", e);
            error!("Set IOTC_CERT_DIR to a directory with ca.der, device.der, device-key.der and ota-ca.der");
            park().await
        }
    }
    let certs: &'static RamCertStore = certs;

    // Flash/OTA-Speicher prüfen
    static FLASH: StaticCell<SharedFlash> = StaticCell::new();
    let mut ota_flash = OtaFlash::new(FlashStorage::new(peripherals.FLASH));
    match ota_flash.image_state() {
        Ok(state) => info!("Boot: Running image state {}", state),
        Err(e) => warn!("Boot: OTA storage unavailable: {}", e),
    }
    let flash = &*FLASH.init(BlockingMutex::new(RefCell::new(ota_flash)));

    // Geteilte Zustände und Channels
    // NoopRawMutex: alles läuft auf einem Executor, daher StaticCell statt static
    static SESSION: StaticCell<SharedSession> = StaticCell::new();
    let session = &*SESSION.init(BlockingMutex::new(RefCell::new(SessionControl::new())));
    static LINK: StaticCell<LinkSignal> = StaticCell::new();
    let link = &*LINK.init(LinkSignal::new());
    static DOWNLOADS: StaticCell<DownloadChannel> = StaticCell::new();
    let downloads = &*DOWNLOADS.init(DownloadChannel::new());

    // Spawn WiFi Tasks
    spawner.spawn(connection_task(wifi_controller, link)).unwrap();
    spawner.spawn(net_task(runner)).unwrap();

    // Spawn Button Task
    spawner.spawn(button_task(peripherals.GPIO9, session)).unwrap();

    // Spawn OTA Task
    static DOWNLOAD_BUFFERS: ConstStaticCell<DownloadBuffers> =
        ConstStaticCell::new(DownloadBuffers::new());
    spawner
        .spawn(ota_task(OtaContext {
            stack,
            requests: downloads.receiver(),
            session,
            flash,
            certs,
            buffers: DOWNLOAD_BUFFERS.take(),
        }))
        .unwrap();

    let ctx = SessionContext {
        stack,
        link,
        status,
        session,
        downloads: downloads.sender(),
        flash,
        certs,
        cloud: CloudConfig {
            cpid: IOTC_CPID,
            env: IOTC_ENV,
            duid: device_id.as_str(),
            broker_host: IOTC_BROKER,
            dtg: IOTC_DTG,
        },
    };
    static SESSION_BUFFERS: ConstStaticCell<SessionBuffers> =
        ConstStaticCell::new(SessionBuffers::new());
    let session_buffers = SESSION_BUFFERS.take();

    // Supervisor-Loop
    loop {
        if with_session(session, |s| s.take_run_request()) {
            info!("Supervisor: Starting session");
            if run_session(&ctx, session_buffers).await.is_err() {
                show_status(status, StatusColor::SessionFailed);
                Timer::after(Duration::from_secs(SESSION_FAILED_BLINK_SECS)).await;
                show_status(status, StatusColor::Off);
            }
        }

        if with_session(session, |s| s.take_reboot_request()) {
            info!("The board will reboot in {} seconds", REBOOT_DELAY_SECS);
            Timer::after(Duration::from_secs(REBOOT_DELAY_SECS)).await;
            esp_hal::system::software_reset();
        }

        Timer::after(Duration::from_millis(SUPERVISOR_INTERVAL_MS)).await;
    }
}

/// Nicht behebbarer Fehler beim Start: nur noch schlafen
async fn park() -> ! {
    loop {
        Timer::after(Duration::from_secs(3600)).await;
    }
}
