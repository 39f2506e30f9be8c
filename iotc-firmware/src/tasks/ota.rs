// OTA Task - Lädt neue Firmware herunter und aktiviert sie
use defmt::{error, info, warn};
use embassy_net::Stack;
use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};
use iotc_core::certs::{CertError, CertKind, OTA_SEC_TAG};
use iotc_core::http::{HttpError, parse_response_head, write_get_request};
use iotc_core::DownloadSecurity;
use iotc_core::ota::{DownloadProgress, ImageError, check_image_start};
use iotc_core::url::{DownloadTarget, UrlError, split_download_url};
use iotc_core::{BootError, FotaEvent};

use crate::config::*;
use crate::hal::RamCertStore;
use crate::net::tls::{TlsBuffers, TlsIdentity, open_tls};
use crate::net::{NetError, connect_tcp};
use crate::{DownloadReceiver, SharedFlash, SharedSession, with_session};

/// Buffer für einen Download (TCP, TLS und ein Flash-Chunk)
pub struct DownloadBuffers {
    tcp_rx: [u8; TCP_BUFFER_SIZE],
    tcp_tx: [u8; TCP_BUFFER_SIZE],
    tls_read: [u8; TLS_READ_BUFFER_SIZE],
    tls_write: [u8; TLS_WRITE_BUFFER_SIZE],
    chunk: [u8; OTA_CHUNK_SIZE],
}

impl DownloadBuffers {
    pub const fn new() -> Self {
        Self {
            tcp_rx: [0; TCP_BUFFER_SIZE],
            tcp_tx: [0; TCP_BUFFER_SIZE],
            tls_read: [0; TLS_READ_BUFFER_SIZE],
            tls_write: [0; TLS_WRITE_BUFFER_SIZE],
            chunk: [0; OTA_CHUNK_SIZE],
        }
    }
}

impl Default for DownloadBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// OTA Fehler-Typen
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum OtaError {
    Url(UrlError),
    Http(HttpError),
    Net(NetError),
    Cert(CertError),
    Boot(BootError),
    /// Body ist kein ESP32 App-Image
    Image(ImageError),
    /// http: URL, obwohl nur https erlaubt ist
    Insecure,
    ImageTooLarge { size: usize, capacity: usize },
}

impl OtaError {
    /// Netzwerk- und Protokollfehler lohnen einen weiteren Versuch
    fn is_retryable(&self) -> bool {
        match self {
            OtaError::Net(_) => true,
            OtaError::Http(e) => *e != HttpError::EmptyBody,
            _ => false,
        }
    }
}

impl From<UrlError> for OtaError {
    fn from(e: UrlError) -> Self {
        OtaError::Url(e)
    }
}

impl From<HttpError> for OtaError {
    fn from(e: HttpError) -> Self {
        OtaError::Http(e)
    }
}

impl From<NetError> for OtaError {
    fn from(e: NetError) -> Self {
        OtaError::Net(e)
    }
}

impl From<CertError> for OtaError {
    fn from(e: CertError) -> Self {
        OtaError::Cert(e)
    }
}

impl From<BootError> for OtaError {
    fn from(e: BootError) -> Self {
        OtaError::Boot(e)
    }
}

impl From<ImageError> for OtaError {
    fn from(e: ImageError) -> Self {
        OtaError::Image(e)
    }
}

/// Alles, was der OTA Task braucht
pub struct OtaContext {
    pub stack: &'static Stack<'static>,
    pub requests: DownloadReceiver,
    pub session: &'static SharedSession,
    pub flash: &'static SharedFlash,
    pub certs: &'static RamCertStore,
    pub buffers: &'static mut DownloadBuffers,
}

/// OTA Task
///
/// Wartet auf Download-Aufträge der Session. Ein erfolgreicher Download
/// wird aktiviert und als `FotaEvent::Finished` gemeldet (Session endet,
/// Reboot folgt), jeder Fehler als `FotaEvent::Error`.
#[embassy_executor::task]
pub async fn ota_task(mut ctx: OtaContext) {
    loop {
        let request = ctx.requests.receive().await;
        info!("OTA: Downloading {}", request.url.as_str());

        let result = match download_image(&mut ctx, request.url.as_str()).await {
            Ok(size) => ctx
                .flash
                .lock(|flash| flash.borrow_mut().activate_image())
                .map(|()| size)
                .map_err(OtaError::from),
            Err(e) => Err(e),
        };

        let event = match result {
            Ok(size) => {
                info!("OTA: {} bytes written, new image activated", size);
                FotaEvent::Finished
            }
            Err(e) => {
                error!("OTA: Download failed: {}", e);
                FotaEvent::Error
            }
        };
        with_session(ctx.session, |s| s.on_fota_event(event));
    }
}

/// Lädt das Image in die nächste OTA-Partition
///
/// Abgebrochene Downloads werden per Range-Request ab dem letzten
/// geschriebenen Byte fortgesetzt.
async fn download_image(ctx: &mut OtaContext, url: &str) -> Result<usize, OtaError> {
    let target = split_download_url(url)?;
    let (host, port) = target.host_and_port()?;
    let mut progress: Option<DownloadProgress> = None;

    for attempt in 1..=OTA_DOWNLOAD_ATTEMPTS {
        match fetch(ctx, &target, host, port, &mut progress).await {
            Ok(()) => return Ok(progress.map_or(0, |p| p.received())),
            Err(e) if e.is_retryable() && attempt < OTA_DOWNLOAD_ATTEMPTS => {
                let offset = progress.map_or(0, |p| p.received());
                warn!(
                    "OTA: Attempt {} failed ({}), resuming at byte {}",
                    attempt, e, offset
                );
                Timer::after(Duration::from_secs(1)).await;
            }
            Err(e) => return Err(e),
        }
    }
    Err(OtaError::Net(NetError::ConnectionClosed))
}

/// Ein Download-Versuch über HTTP oder HTTPS
async fn fetch(
    ctx: &mut OtaContext,
    target: &DownloadTarget<'_>,
    host: &str,
    port: u16,
    progress: &mut Option<DownloadProgress>,
) -> Result<(), OtaError> {
    let timeout = Duration::from_secs(OTA_SOCKET_TIMEOUT_SECS);
    let DownloadBuffers {
        tcp_rx,
        tcp_tx,
        tls_read,
        tls_write,
        chunk,
    } = &mut *ctx.buffers;

    let sink = ImageSink {
        flash: ctx.flash,
        session: ctx.session,
    };

    if target.is_secure() {
        let ca_chain = ctx.certs.get(OTA_SEC_TAG, CertKind::CaChain)?;
        let identity = TlsIdentity {
            ca_chain,
            client: None,
        };
        let buffers = TlsBuffers {
            tcp_rx,
            tcp_tx,
            tls_read,
            tls_write,
        };
        let mut tls = open_tls(ctx.stack, host, port, identity, buffers, timeout).await?;
        transfer(&mut tls, target, progress, chunk, &sink).await
    } else if OTA_DOWNLOAD_SECURITY == DownloadSecurity::AllowPlainHttp {
        warn!("OTA: Downloading over plain http");
        let mut socket = connect_tcp(ctx.stack, host, port, tcp_rx, tcp_tx, timeout).await?;
        transfer(&mut socket, target, progress, chunk, &sink).await
    } else {
        Err(OtaError::Insecure)
    }
}

/// Ziel der Image-Daten: OTA-Partition + Fortschritt an die Session
struct ImageSink {
    flash: &'static SharedFlash,
    session: &'static SharedSession,
}

impl ImageSink {
    fn capacity(&self) -> Result<usize, BootError> {
        self.flash.lock(|flash| flash.borrow_mut().image_capacity())
    }

    /// Schreibt den nächsten Teil des Images
    ///
    /// Der Anfang des Images muss mit dem ESP32 Magic Byte beginnen, sonst
    /// wird nichts geschrieben (z.B. HTML-Fehlerseite mit Status 200).
    fn store(&self, progress: &mut DownloadProgress, data: &[u8]) -> Result<(), OtaError> {
        if data.is_empty() {
            return Ok(());
        }
        let offset = progress.received();
        if offset == 0 {
            check_image_start(data)?;
        }
        self.flash
            .lock(|flash| flash.borrow_mut().write_image(offset, data))?;

        if let Some(percent) = progress.advance(data.len(), OTA_PROGRESS_STEP) {
            info!("OTA: {}%", percent);
            with_session(self.session, |s| s.on_fota_event(FotaEvent::Progress(percent)));
        }
        Ok(())
    }
}

/// GET senden, Header auswerten und den Body in den Flash schreiben
async fn transfer<S: Read + Write>(
    stream: &mut S,
    target: &DownloadTarget<'_>,
    progress: &mut Option<DownloadProgress>,
    buf: &mut [u8],
    sink: &ImageSink,
) -> Result<(), OtaError> {
    let offset = progress.map_or(0, |p| p.received());
    let len = write_get_request(target, offset, buf)?;
    stream
        .write_all(&buf[..len])
        .await
        .map_err(|_| NetError::SocketError)?;
    stream.flush().await.map_err(|_| NetError::SocketError)?;

    let mut filled = 0;
    let head = loop {
        if filled == buf.len() {
            return Err(HttpError::BufferTooSmall.into());
        }
        let n = stream
            .read(&mut buf[filled..])
            .await
            .map_err(|_| NetError::SocketError)?;
        if n == 0 {
            return Err(NetError::ConnectionClosed.into());
        }
        filled += n;
        if let Some(head) = parse_response_head(&buf[..filled])? {
            break head;
        }
    };

    // 206 setzt fort, 200 liefert das ganze Image (auch wenn der Server
    // den Range-Header ignoriert)
    let resume = head.status == 206 && progress.is_some();
    if !resume {
        let capacity = sink.capacity()?;
        if head.content_length > capacity {
            return Err(OtaError::ImageTooLarge {
                size: head.content_length,
                capacity,
            });
        }
        if offset > 0 {
            warn!("OTA: Server ignored range request, starting over");
        }
        info!("OTA: Image size {} bytes", head.content_length);
        *progress = Some(DownloadProgress::new(head.content_length));
    }
    let Some(progress) = progress.as_mut() else {
        return Err(HttpError::Malformed.into());
    };

    sink.store(progress, &buf[head.header_len..filled])?;
    while !progress.is_complete() {
        let n = stream.read(buf).await.map_err(|_| NetError::SocketError)?;
        if n == 0 {
            return Err(NetError::ConnectionClosed.into());
        }
        sink.store(progress, &buf[..n])?;
    }
    Ok(())
}
