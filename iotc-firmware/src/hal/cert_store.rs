// Zertifikatsspeicher im RAM
//
// Die Zertifikate sind ins Image eingebettet, der Speicher merkt sich nur,
// welcher Blob unter welchem Security-Tag liegt.

use heapless::LinearMap;
use iotc_core::certs::{CertError, CertKind, CertStore, SecTag};

/// API-Tag: CA + Zertifikat + Key, OTA-Tag: CA
const SLOTS: usize = 4;

#[derive(Default)]
pub struct RamCertStore {
    slots: LinearMap<(SecTag, CertKind), &'static [u8], SLOTS>,
}

impl RamCertStore {
    pub const fn new() -> Self {
        Self {
            slots: LinearMap::new(),
        }
    }

    /// Liefert den Blob für den TLS-Client
    pub fn get(&self, tag: SecTag, kind: CertKind) -> Result<&'static [u8], CertError> {
        self.slots
            .get(&(tag, kind))
            .copied()
            .ok_or(CertError::Missing(kind))
    }
}

impl CertStore for RamCertStore {
    fn exists(&self, tag: SecTag, kind: CertKind) -> bool {
        self.slots.contains_key(&(tag, kind))
    }

    fn write(&mut self, tag: SecTag, kind: CertKind, data: &'static [u8]) -> Result<(), CertError> {
        self.slots
            .insert((tag, kind), data)
            .map(|_| ())
            .map_err(|_| CertError::StoreFailed)
    }
}
