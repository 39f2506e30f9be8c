//! Zerlegung der OTA Download-URL in Host und Pfad
//!
//! Der Host beginnt nach dem zweiten `/` und endet vor dem dritten,
//! der Pfad ist alles nach dem dritten `/` (ohne führenden Slash).
//! Beide Teile sind Slices der übergebenen URL.

/// Fehler beim Zerlegen einer URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UrlError {
    /// Weniger als drei `/` in der URL
    Malformed,
    /// Zwischen zweitem und drittem `/` steht nichts
    EmptyHost,
    /// Port-Angabe ist keine gültige Zahl
    InvalidPort,
}

/// Download-Ziel für den Firmware-Download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DownloadTarget<'a> {
    pub scheme: &'a str,
    pub host: &'a str,
    pub path: &'a str,
}

impl<'a> DownloadTarget<'a> {
    /// true für `https:` URLs
    pub fn is_secure(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("https")
    }

    /// Trennt einen optionalen `:port` Suffix vom Host
    ///
    /// Ohne Port gilt 443 (https) bzw. 80.
    pub fn host_and_port(&self) -> Result<(&'a str, u16), UrlError> {
        let default_port = if self.is_secure() { 443 } else { 80 };
        match self.host.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => port
                .parse::<u16>()
                .map(|port| (host, port))
                .map_err(|_| UrlError::InvalidPort),
            Some(_) => Err(UrlError::EmptyHost),
            None => Ok((self.host, default_port)),
        }
    }
}

/// Zerlegt `scheme://host/path` in seine Teile
///
/// ```
/// # use iotc_core::url::split_download_url;
/// let target = split_download_url("https://fw.example.com/images/app.bin").unwrap();
/// assert_eq!(target.host, "fw.example.com");
/// assert_eq!(target.path, "images/app.bin");
/// ```
pub fn split_download_url(url: &str) -> Result<DownloadTarget<'_>, UrlError> {
    let mut slashes = url.match_indices('/').map(|(index, _)| index);

    let first = slashes.next().ok_or(UrlError::Malformed)?;
    let second = slashes.next().ok_or(UrlError::Malformed)?;
    let third = slashes.next().ok_or(UrlError::Malformed)?;

    let host = &url[second + 1..third];
    if host.is_empty() {
        return Err(UrlError::EmptyHost);
    }

    let scheme = url[..first].trim_end_matches(':');

    Ok(DownloadTarget {
        scheme,
        host,
        path: &url[third + 1..],
    })
}
