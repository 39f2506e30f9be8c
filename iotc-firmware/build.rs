// Build-Script: Wird vor dem Kompilieren ausgeführt
// Konfiguriert IoTConnect-Parameter, Zertifikate und den Linker für ESP32-C6

use std::path::{Path, PathBuf};

/// Environment-Variablen, die als `env!` in config.rs landen
const PASSTHROUGH_VARS: &[&str] = &[
    "WIFI_SSID",
    "WIFI_PASSWORD",
    "IOTC_CPID",
    "IOTC_ENV",
    "IOTC_BROKER",
    "IOTC_DTG",
];

/// Zertifikatsdateien (DER) in IOTC_CERT_DIR
const CERT_FILES: &[&str] = &["ca.der", "device.der", "device-key.der", "ota-ca.der"];

fn main() {
    // Lade .env file für Credentials und IoTConnect-Konfiguration
    // Fehler ignorieren wenn .env nicht existiert (dann müssen ENV vars gesetzt sein)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("⚠️  .env file nicht gefunden: {}", e);
        eprintln!("   Setze WIFI_SSID, WIFI_PASSWORD, IOTC_CPID, IOTC_ENV und IOTC_BROKER");
    }

    // Gebe Konfiguration an Rust-Compiler weiter
    // Die Werte werden zur Compile-Zeit in den Code eingebacken.
    // CPID/ENV dürfen leer sein, die Firmware meldet das beim Start.
    for name in PASSTHROUGH_VARS {
        let value = std::env::var(name).unwrap_or_default();
        println!("cargo:rustc-env={}={}", name, value);
        println!("cargo:rerun-if-env-changed={}", name);
    }

    embed_certificates();

    // Registriere hilfsbereiten Error-Handler für Linker-Fehler
    linker_be_nice();

    // 1. defmt.x - defmt Logging-Support
    println!("cargo:rustc-link-arg=-Tdefmt.x");

    // 2. linkall.x - ESP32 Memory-Layout
    //    WICHTIG: Muss als LETZTES kommen
    println!("cargo:rustc-link-arg=-Tlinkall.x");
}

// Kopiert die Zertifikate nach OUT_DIR, damit config.rs sie per include_bytes!
// einbinden kann. Fehlende Dateien werden als leere Datei angelegt, die
// Provisionierung meldet sie dann zur Laufzeit als fehlend.
fn embed_certificates() {
    println!("cargo:rerun-if-env-changed=IOTC_CERT_DIR");

    let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR not set by cargo"));
    let cert_dir = std::env::var("IOTC_CERT_DIR").ok().map(PathBuf::from);

    for file in CERT_FILES {
        let target = out_dir.join(file);
        match cert_dir.as_deref().map(|dir| dir.join(file)) {
            Some(source) if source.is_file() => {
                println!("cargo:rerun-if-changed={}", source.display());
                std::fs::copy(&source, &target).expect("failed to copy certificate");
            }
            source => {
                if let Some(source) = source {
                    eprintln!("⚠️  Zertifikat fehlt: {}", source.display());
                }
                write_empty(&target);
            }
        }
    }
}

fn write_empty(path: &Path) {
    std::fs::write(path, b"").expect("failed to write placeholder certificate");
}

// Error-Handler: Zeigt hilfreiche Tipps bei Linker-Fehlern
// Wird vom Linker als "--error-handling-script" aufgerufen
fn linker_be_nice() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 2 {
        let kind = &args[1];
        let what = &args[2];

        match kind.as_str() {
            "undefined-symbol" => match what.as_str() {
                what if what.starts_with("_defmt_") => {
                    eprintln!();
                    eprintln!("💡 `defmt` not found - make sure `defmt.x` is added as a linker script");
                    eprintln!();
                }
                "_stack_start" => {
                    eprintln!();
                    eprintln!("💡 Is the linker script `linkall.x` missing?");
                    eprintln!();
                }
                what if what.starts_with("esp_rtos_") => {
                    eprintln!();
                    eprintln!("💡 `esp-radio` has no scheduler enabled. Initialize `esp-rtos` first.");
                    eprintln!();
                }
                "free" | "malloc" | "calloc" => {
                    eprintln!();
                    eprintln!("💡 Did you forget the `esp-alloc` dependency?");
                    eprintln!();
                }
                _ => (),
            },
            _ => {
                std::process::exit(1);
            }
        }

        std::process::exit(0);
    }

    println!(
        "cargo:rustc-link-arg=--error-handling-script={}",
        std::env::current_exe().unwrap().display()
    );
}
