//! Minimales HTTP/1.1 für den Firmware-Download
//!
//! Nur GET mit `Content-Length`; optional ab einem Byte-Offset (Range),
//! damit ein abgebrochener Download fortgesetzt werden kann.

use core::fmt::Write;

use crate::url::DownloadTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HttpError {
    BufferTooSmall,
    /// Statuszeile oder Header nicht lesbar
    Malformed,
    /// Unerwarteter Statuscode
    Status(u16),
    MissingLength,
    /// `Content-Length: 0`, es gibt nichts zu flashen
    EmptyBody,
}

/// Kopf einer HTTP-Antwort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResponseHead {
    pub status: u16,
    /// Länge des Bodys (bei 206 nur der Rest ab Offset)
    pub content_length: usize,
    /// Länge von Statuszeile + Header inkl. Leerzeile
    pub header_len: usize,
}

struct SliceWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let end = self.len + s.len();
        if end > self.buf.len() {
            return Err(core::fmt::Error);
        }
        self.buf[self.len..end].copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

/// Schreibt einen GET-Request in `buf` und gibt die Länge zurück
pub fn write_get_request(
    target: &DownloadTarget<'_>,
    offset: usize,
    buf: &mut [u8],
) -> Result<usize, HttpError> {
    let mut writer = SliceWriter { buf, len: 0 };
    write!(
        writer,
        "GET /{} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n",
        target.path, target.host
    )
    .map_err(|_| HttpError::BufferTooSmall)?;
    if offset > 0 {
        write!(writer, "Range: bytes={}-\r\n", offset).map_err(|_| HttpError::BufferTooSmall)?;
    }
    writer
        .write_str("\r\n")
        .map_err(|_| HttpError::BufferTooSmall)?;
    Ok(writer.len)
}

/// Parst den Antwort-Kopf
///
/// `Ok(None)`, solange die Leerzeile nach den Headern noch fehlt.
pub fn parse_response_head(bytes: &[u8]) -> Result<Option<ResponseHead>, HttpError> {
    let Some(end) = bytes.windows(4).position(|w| w == b"\r\n\r\n") else {
        return Ok(None);
    };
    let head = core::str::from_utf8(&bytes[..end]).map_err(|_| HttpError::Malformed)?;
    let mut lines = head.split("\r\n");

    let status_line = lines.next().ok_or(HttpError::Malformed)?;
    let mut parts = status_line.split(' ');
    let version = parts.next().ok_or(HttpError::Malformed)?;
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::Malformed);
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or(HttpError::Malformed)?;
    if status != 200 && status != 206 {
        return Err(HttpError::Status(status));
    }

    let mut content_length = None;
    for line in lines {
        let (name, value) = line.split_once(':').ok_or(HttpError::Malformed)?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            content_length = Some(
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| HttpError::Malformed)?,
            );
        }
    }

    let content_length = content_length.ok_or(HttpError::MissingLength)?;
    if content_length == 0 {
        return Err(HttpError::EmptyBody);
    }

    Ok(Some(ResponseHead {
        status,
        content_length,
        header_len: end + 4,
    }))
}
