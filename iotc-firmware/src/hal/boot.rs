// OTA-Partitionen und Boot-Zustand
//
// Kapselt den OtaUpdater aus esp-bootloader-esp-idf: Image-Zustand lesen
// und bestätigen (BootImage Trait) sowie das neue Image in die nächste
// OTA-Partition schreiben.

use embedded_storage::{ReadStorage, Storage};
use esp_bootloader_esp_idf::ota::OtaImageState;
use esp_bootloader_esp_idf::ota_updater::OtaUpdater;
use esp_bootloader_esp_idf::partitions::PARTITION_TABLE_MAX_LEN;
use esp_storage::FlashStorage;
use iotc_core::{BootError, BootImage, ImageState};

/// Flash mit Puffer für die Partitionstabelle
pub struct OtaFlash {
    flash: FlashStorage<'static>,
    table: [u8; PARTITION_TABLE_MAX_LEN],
}

impl OtaFlash {
    pub fn new(flash: FlashStorage<'static>) -> Self {
        Self {
            flash,
            table: [0; PARTITION_TABLE_MAX_LEN],
        }
    }

    fn updater(&mut self) -> Result<OtaUpdater<'_, FlashStorage<'static>>, BootError> {
        OtaUpdater::new(&mut self.flash, &mut self.table).map_err(|_| BootError::StorageUnavailable)
    }

    /// Größe der Partition, in die das nächste Image geschrieben wird
    pub fn image_capacity(&mut self) -> Result<usize, BootError> {
        let mut updater = self.updater()?;
        let (region, _) = updater
            .next_partition()
            .map_err(|_| BootError::StorageUnavailable)?;
        Ok(region.capacity())
    }

    /// Schreibt einen Teil des neuen Images ab `offset`
    pub fn write_image(&mut self, offset: usize, data: &[u8]) -> Result<(), BootError> {
        let mut updater = self.updater()?;
        let (mut region, _) = updater
            .next_partition()
            .map_err(|_| BootError::StorageUnavailable)?;
        if offset + data.len() > region.capacity() {
            return Err(BootError::WriteFailed);
        }
        region
            .write(offset as u32, data)
            .map_err(|_| BootError::WriteFailed)
    }

    /// Bootet beim nächsten Reset das neue Image (unbestätigt)
    pub fn activate_image(&mut self) -> Result<(), BootError> {
        let mut updater = self.updater()?;
        updater
            .activate_next_partition()
            .map_err(|_| BootError::WriteFailed)?;
        updater
            .set_current_ota_state(OtaImageState::New)
            .map_err(|_| BootError::WriteFailed)
    }
}

impl BootImage for OtaFlash {
    fn image_state(&mut self) -> Result<ImageState, BootError> {
        let state = match self.updater()?.current_ota_state() {
            Ok(OtaImageState::New | OtaImageState::PendingVerify) => ImageState::PendingVerify,
            Ok(OtaImageState::Valid) => ImageState::Confirmed,
            // Factory-Image ohne otadata
            Ok(_) | Err(_) => ImageState::Undefined,
        };
        Ok(state)
    }

    fn confirm_image(&mut self) -> Result<(), BootError> {
        self.updater()?
            .set_current_ota_state(OtaImageState::Valid)
            .map_err(|_| BootError::WriteFailed)
    }
}
