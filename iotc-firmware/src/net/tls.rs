// TLS 1.3 Client (embedded-tls) für MQTT und HTTPS-Download
//
// Die Server-Kette wird gegen die eingebettete CA geprüft (inklusive
// Hostname und Laufzeit). Für die Cloud-Verbindung authentifiziert sich
// das Gerät mit Zertifikat und P-256 Key.

use defmt::{Debug2Format, error, info};
use embassy_net::Stack;
use embassy_time::Duration;
use embedded_tls::pki::CertVerifier;
use embedded_tls::{
    Aes128GcmSha256, Certificate, CryptoProvider, SignatureScheme, TlsConfig, TlsConnection,
    TlsContext, TlsError, TlsVerifier,
};
use p256::ecdsa::signature::SignerMut;
use p256::ecdsa::{DerSignature, SigningKey};
use p256::pkcs8::DecodePrivateKey;

use super::ntp::DeviceClock;
use super::{NetError, TcpStream, connect_tcp};
use crate::hal::TlsRng;

/// Maximale Größe eines Server-Zertifikats, das der Verifier zwischenspeichert
const SERVER_CERT_MAX_LEN: usize = 4096;

/// TLS-Verbindung über einen embassy-net TCP Socket
pub type TlsStream<'a> = TlsConnection<'a, TcpStream<'a>, Aes128GcmSha256>;

/// Zertifikate einer Verbindung (DER)
#[derive(Clone, Copy)]
pub struct TlsIdentity<'a> {
    pub ca_chain: &'a [u8],
    /// Client-Zertifikat und Key, nur für die Cloud-Verbindung
    pub client: Option<(&'a [u8], &'a [u8])>,
}

/// Buffer für eine TLS-Verbindung
pub struct TlsBuffers<'a> {
    pub tcp_rx: &'a mut [u8],
    pub tcp_tx: &'a mut [u8],
    pub tls_read: &'a mut [u8],
    pub tls_write: &'a mut [u8],
}

/// Crypto Provider mit Hardware-RNG, CA-Prüfung und Geräte-Key
struct DeviceCrypto<'a> {
    rng: TlsRng,
    verifier: CertVerifier<'a, Aes128GcmSha256, DeviceClock, SERVER_CERT_MAX_LEN>,
    client: Option<(&'a [u8], &'a [u8])>,
}

/// Liest den Geräte-Key (PKCS#8, alternativ SEC1 wie von OpenSSL `ec`)
fn signing_key(key_der: &[u8]) -> Result<SigningKey, TlsError> {
    if let Ok(key) = SigningKey::from_pkcs8_der(key_der) {
        return Ok(key);
    }
    p256::SecretKey::from_sec1_der(key_der)
        .map(|secret| SigningKey::from(&secret))
        .map_err(|_| TlsError::InvalidPrivateKey)
}

impl CryptoProvider for DeviceCrypto<'_> {
    type CipherSuite = Aes128GcmSha256;
    type Signature = DerSignature;

    fn rng(&mut self) -> impl rand_core::CryptoRngCore {
        &mut self.rng
    }

    fn verifier(&mut self) -> Result<&mut impl TlsVerifier<Self::CipherSuite>, TlsError> {
        Ok(&mut self.verifier)
    }

    fn signer(&mut self) -> Result<(impl SignerMut<Self::Signature>, SignatureScheme), TlsError> {
        let (_, key_der) = self.client.ok_or(TlsError::InvalidPrivateKey)?;
        Ok((signing_key(key_der)?, SignatureScheme::EcdsaSecp256r1Sha256))
    }

    fn client_cert(&mut self) -> Option<Certificate<impl AsRef<[u8]>>> {
        self.client.map(|(cert, _)| Certificate::X509(cert))
    }
}

/// DNS, TCP Connect und TLS Handshake
///
/// `host` wird als SNI Server-Name gesendet und gegen das
/// Server-Zertifikat geprüft.
pub async fn open_tls<'a>(
    stack: &'static Stack<'static>,
    host: &'a str,
    port: u16,
    identity: TlsIdentity<'a>,
    buffers: TlsBuffers<'a>,
    timeout: Duration,
) -> Result<TlsStream<'a>, NetError> {
    let socket = connect_tcp(stack, host, port, buffers.tcp_rx, buffers.tcp_tx, timeout).await?;
    info!("TLS: TCP connected to {}:{}", host, port);

    let config = TlsConfig::new().with_server_name(host);
    let provider = DeviceCrypto {
        rng: TlsRng::new(),
        verifier: CertVerifier::new(Certificate::X509(identity.ca_chain)),
        client: identity.client,
    };

    let mut tls = TlsConnection::new(socket, buffers.tls_read, buffers.tls_write);
    tls.open(TlsContext::new(&config, provider))
        .await
        .map_err(|e| {
            error!("TLS: Handshake failed: {}", Debug2Format(&e));
            NetError::TlsHandshakeFailed
        })?;

    info!("TLS: Handshake with {} complete", host);
    Ok(tls)
}
