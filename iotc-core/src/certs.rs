//! Zertifikats-Provisionierung
//!
//! Zertifikate werden unter einem Security-Tag abgelegt, über den der
//! TLS-Client sie später findet. Bereits vorhandene Einträge bleiben
//! erhalten, die Provisionierung darf bei jedem Boot laufen.

/// Security-Tag (Credential-Slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SecTag(pub u32);

/// Slot für die MQTT-Verbindung zu IoTConnect
pub const API_SEC_TAG: SecTag = SecTag(10702);

/// Slot für den Firmware-Download
pub const OTA_SEC_TAG: SecTag = SecTag(10703);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CertKind {
    CaChain,
    ClientCert,
    PrivateKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CertError {
    Missing(CertKind),
    Malformed(CertKind),
    /// Speicher voll oder Schreibfehler
    StoreFailed,
}

/// Ablage für Zertifikate
pub trait CertStore {
    fn exists(&self, tag: SecTag, kind: CertKind) -> bool;

    fn write(&mut self, tag: SecTag, kind: CertKind, data: &'static [u8]) -> Result<(), CertError>;
}

/// Zertifikate für die Cloud-Verbindung (DER-kodiert)
#[derive(Debug, Clone, Copy)]
pub struct ApiCredentials {
    pub ca_chain: &'static [u8],
    pub client_cert: &'static [u8],
    pub private_key: &'static [u8],
}

/// Prüft, ob `bytes` eine vollständige ASN.1 SEQUENCE ist
pub fn validate_der(bytes: &[u8]) -> bool {
    let [0x30, first_len, rest @ ..] = bytes else {
        return false;
    };

    let (body_len, header_len) = if *first_len < 0x80 {
        (*first_len as usize, 2)
    } else {
        let count = (*first_len & 0x7f) as usize;
        if count == 0 || count > 4 || rest.len() < count {
            return false;
        }
        let len = rest[..count]
            .iter()
            .fold(0usize, |acc, byte| (acc << 8) | *byte as usize);
        (len, 2 + count)
    };

    header_len.checked_add(body_len) == Some(bytes.len())
}

fn provision_one<S: CertStore>(
    store: &mut S,
    tag: SecTag,
    kind: CertKind,
    data: &'static [u8],
) -> Result<bool, CertError> {
    if store.exists(tag, kind) {
        return Ok(false);
    }
    if data.is_empty() {
        return Err(CertError::Missing(kind));
    }
    if !validate_der(data) {
        return Err(CertError::Malformed(kind));
    }
    store.write(tag, kind, data)?;
    Ok(true)
}

/// Legt CA, Geräte-Zertifikat und Schlüssel unter `API_SEC_TAG` ab
///
/// Gibt die Anzahl neu geschriebener Einträge zurück.
pub fn provision_api_certs<S: CertStore>(
    store: &mut S,
    credentials: &ApiCredentials,
) -> Result<usize, CertError> {
    let entries = [
        (CertKind::CaChain, credentials.ca_chain),
        (CertKind::ClientCert, credentials.client_cert),
        (CertKind::PrivateKey, credentials.private_key),
    ];
    let mut written = 0;
    for (kind, data) in entries {
        if provision_one(store, API_SEC_TAG, kind, data)? {
            written += 1;
        }
    }
    Ok(written)
}

/// Legt die CA des Download-Servers unter `OTA_SEC_TAG` ab
pub fn provision_ota_certs<S: CertStore>(
    store: &mut S,
    ca_chain: &'static [u8],
) -> Result<usize, CertError> {
    Ok(provision_one(store, OTA_SEC_TAG, CertKind::CaChain, ca_chain)? as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_short_form() {
        assert!(validate_der(&[0x30, 0x03, 0x02, 0x01, 0x05]));
        assert!(!validate_der(&[0x30, 0x04, 0x02, 0x01, 0x05]));
    }

    #[test]
    fn test_validate_long_form() {
        let mut der = [0u8; 4 + 300];
        der[0] = 0x30;
        der[1] = 0x82;
        der[2] = 0x01;
        der[3] = 0x2c;
        assert!(validate_der(&der));
        assert!(!validate_der(&der[..303]));
    }

    #[test]
    fn test_validate_huge_length_does_not_overflow() {
        assert!(!validate_der(&[0x30, 0x84, 0xff, 0xff, 0xff, 0xff]));
        assert!(!validate_der(&[0x30, 0x84, 0xff, 0xff, 0xff, 0xfc, 0x00]));
    }

    #[test]
    fn test_validate_rejects_garbage() {
        assert!(!validate_der(&[]));
        assert!(!validate_der(b"-----BEGIN CERTIFICATE-----"));
        assert!(!validate_der(&[0x30, 0x80]));
        assert!(!validate_der(&[0x30, 0x85, 1, 2, 3, 4, 5]));
    }
}
