// Hardware-Zufallszahlen für TLS
//
// Der RNG liefert echte Zufallszahlen, solange das Funkmodul läuft.

use esp_hal::rng::Rng;
use rand_core::{CryptoRng, RngCore};

#[derive(Clone, Copy)]
pub struct TlsRng {
    rng: Rng,
}

impl TlsRng {
    pub fn new() -> Self {
        Self { rng: Rng::new() }
    }
}

impl Default for TlsRng {
    fn default() -> Self {
        Self::new()
    }
}

impl RngCore for TlsRng {
    fn next_u32(&mut self) -> u32 {
        self.rng.random()
    }

    fn next_u64(&mut self) -> u64 {
        (u64::from(self.rng.random()) << 32) | u64::from(self.rng.random())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.rng.random().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for TlsRng {}
