use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use log::{debug, info, trace, warn};
use serialport::SerialPortInfo;
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::framing::{decode_line, Frame, LineFramer, MAX_LINE_LEN};

pub const BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115_200];
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Lines the reader may queue ahead of the presenter before it blocks.
pub const CHANNEL_CAPACITY: usize = 256;

const IDLE_SLEEP: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct PortInfo {
    pub port_name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match &info.port_type {
            serialport::SerialPortType::UsbPort(usb) => (Some(usb.vid), Some(usb.pid), usb.product.clone()),
            _ => (None, None, None),
        };
        Self {
            port_name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

impl PortInfo {
    /// Text shown in the port picker. The port name is always the first word.
    pub fn label(&self) -> String {
        let mut label = self.port_name.clone();
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            label.push_str(&format!(" ({vid:04X}:{pid:04X})"));
        }
        if let Some(product) = self.product.as_deref().filter(|p| !p.is_empty()) {
            label.push(' ');
            label.push_str(product);
        }
        label
    }
}

/// Connection parameters, fixed for the lifetime of one reader session.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialConfig {
    pub port_name: String,
    pub baud_rate: u32,
    /// Read timeout, which doubles as the poll interval for stop requests.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SerialConfig {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    Opened(String),
    Line(String),
    Error(String),
    Closed,
}

/// Anything the reader thread can pull bytes from. A read that times out or
/// returns `Ok(0)` means "no input yet".
pub type ByteSource = Box<dyn Read + Send>;

/// Owns one serial session on a dedicated thread and hands decoded,
/// non-empty lines to the consumer in arrival order.
pub struct SerialReader {
    cfg: SerialConfig,
    stop: Arc<AtomicBool>,
    rx_evt: Receiver<ReaderEvent>,
    handle: Option<JoinHandle<()>>,
}

impl SerialReader {
    pub fn list_ports() -> Vec<PortInfo> {
        match serialport::available_ports() {
            Ok(ports) => ports.into_iter().map(PortInfo::from).collect(),
            Err(e) => {
                warn!("could not enumerate serial ports: {e}");
                Vec::new()
            }
        }
    }

    pub fn start(cfg: SerialConfig) -> Self {
        Self::start_with(cfg, open_serial)
    }

    /// Starts a session whose bytes come from `opener` instead of a real port.
    /// The opener runs on the reader thread.
    pub fn start_with<F>(cfg: SerialConfig, opener: F) -> Self
    where
        F: FnOnce(&SerialConfig) -> Result<ByteSource> + Send + 'static,
    {
        let (tx_evt, rx_evt) = bounded::<ReaderEvent>(CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_cfg = cfg.clone();
        let thread_stop = stop.clone();

        let handle = std::thread::Builder::new()
            .name(format!("serial-reader:{}", cfg.port_name))
            .spawn(move || run(thread_cfg, opener, &thread_stop, &tx_evt));

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                // The sender went down with the closure; report on a fresh channel.
                let (tx, rx) = bounded(2);
                let _ = tx.send(ReaderEvent::Error(format!("could not spawn reader: {e}")));
                let _ = tx.send(ReaderEvent::Closed);
                return Self { cfg, stop, rx_evt: rx, handle: None };
            }
        };

        Self { cfg, stop, rx_evt, handle }
    }

    /// Requests the loop to exit, waits for it, and drops anything still
    /// queued. The port is closed once this returns.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("reader thread for {} panicked", self.cfg.port_name);
            }
            info!("closed {}", self.cfg.port_name);
        }
        while self.rx_evt.try_recv().is_ok() {}
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn events(&self) -> &Receiver<ReaderEvent> {
        &self.rx_evt
    }

    pub fn config(&self) -> &SerialConfig {
        &self.cfg
    }
}

impl Drop for SerialReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_serial(cfg: &SerialConfig) -> Result<ByteSource> {
    let port = serialport::new(&cfg.port_name, cfg.baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(cfg.timeout)
        .open()?;
    Ok(Box::new(port))
}

fn run<F>(cfg: SerialConfig, opener: F, stop: &AtomicBool, tx: &Sender<ReaderEvent>)
where
    F: FnOnce(&SerialConfig) -> Result<ByteSource>,
{
    let mut source = match opener(&cfg) {
        Ok(source) => source,
        Err(e) => {
            warn!("open {} failed: {e}", cfg.port_name);
            emit(tx, stop, ReaderEvent::Error(format!("open failed: {e}")), cfg.timeout);
            let _ = tx.try_send(ReaderEvent::Closed);
            return;
        }
    };

    info!("opened {} at {} baud", cfg.port_name, cfg.baud_rate);
    if !emit(tx, stop, ReaderEvent::Opened(cfg.port_name.clone()), cfg.timeout) {
        return;
    }

    let mut framer = LineFramer::new();
    let mut buf = [0u8; 1024];
    while !stop.load(Ordering::Acquire) {
        match source.read(&mut buf) {
            Ok(0) => std::thread::sleep(IDLE_SLEEP),
            Ok(n) => {
                trace!("rx {}", hex::encode(&buf[..n]));
                for frame in framer.push(&buf[..n]) {
                    let event = match frame {
                        Frame::Line(bytes) => {
                            let text = decode_line(&bytes);
                            let line = text.trim();
                            if line.is_empty() {
                                continue;
                            }
                            ReaderEvent::Line(line.to_string())
                        }
                        Frame::Oversize(len) => {
                            warn!("{}: dropped a {len}-byte line", cfg.port_name);
                            ReaderEvent::Error(format!(
                                "line of {len} bytes exceeds the {MAX_LINE_LEN}-byte limit, discarded"
                            ))
                        }
                    };
                    if !emit(tx, stop, event, cfg.timeout) {
                        return;
                    }
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
            Err(e) => {
                let err = Error::Read(e);
                warn!("{}: {err}", cfg.port_name);
                emit(tx, stop, ReaderEvent::Error(err.to_string()), cfg.timeout);
                break;
            }
        }
    }

    drop(source);
    debug!("reader loop for {} exiting", cfg.port_name);
    let _ = tx.try_send(ReaderEvent::Closed);
}

/// Sends one event, blocking on a full channel only in `slice`-long waits so
/// a stop request is still noticed. Returns false once the session is over.
fn emit(tx: &Sender<ReaderEvent>, stop: &AtomicBool, mut event: ReaderEvent, slice: Duration) -> bool {
    loop {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        match tx.send_timeout(event, slice) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(ev)) => event = ev,
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    const WAIT: Duration = Duration::from_secs(2);

    struct ScriptedSource {
        chunks: VecDeque<io::Result<Vec<u8>>>,
        dropped: Arc<AtomicBool>,
    }

    impl Read for ScriptedSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    impl Drop for ScriptedSource {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    fn scripted(chunks: Vec<io::Result<Vec<u8>>>) -> (SerialReader, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        let source = ScriptedSource { chunks: chunks.into(), dropped: dropped.clone() };
        let reader = SerialReader::start_with(SerialConfig::new("mock0", 115_200), move |_| {
            Ok(Box::new(source) as ByteSource)
        });
        (reader, dropped)
    }

    fn next(reader: &SerialReader) -> ReaderEvent {
        reader.events().recv_timeout(WAIT).expect("reader event")
    }

    #[test]
    fn emits_trimmed_nonempty_lines_in_order() {
        let (mut reader, _) = scripted(vec![
            Ok(b"{\"RSSI\": -41}\r\n\r\n  \n{\"RS".to_vec()),
            Err(io::Error::new(ErrorKind::TimedOut, "poll")),
            Ok(b"SI\": -42}\n".to_vec()),
        ]);

        assert_eq!(next(&reader), ReaderEvent::Opened("mock0".into()));
        assert_eq!(next(&reader), ReaderEvent::Line("{\"RSSI\": -41}".into()));
        assert_eq!(next(&reader), ReaderEvent::Line("{\"RSSI\": -42}".into()));
        reader.stop();
    }

    #[test]
    fn long_record_arrives_as_one_line() {
        let line = format!("{{\"RSSI\": -40, \"pad\": \"{}\"}}", "x".repeat(6000));
        let chunks = format!("{line}\n").into_bytes().chunks(1000).map(|c| Ok(c.to_vec())).collect();
        let (mut reader, _) = scripted(chunks);

        assert_eq!(next(&reader), ReaderEvent::Opened("mock0".into()));
        assert_eq!(next(&reader), ReaderEvent::Line(line));
        reader.stop();
    }

    #[test]
    fn oversize_line_is_one_error_and_reading_continues() {
        let mut chunks: Vec<io::Result<Vec<u8>>> =
            (0..=MAX_LINE_LEN / 1000).map(|_| Ok(vec![b'x'; 1000])).collect();
        chunks.push(Ok(b"\n{\"RSSI\": -50}\n".to_vec()));
        let (mut reader, _) = scripted(chunks);

        assert_eq!(next(&reader), ReaderEvent::Opened("mock0".into()));
        match next(&reader) {
            ReaderEvent::Error(msg) => assert!(msg.contains("discarded"), "{msg}"),
            other => panic!("expected one oversize error, got {other:?}"),
        }
        assert_eq!(next(&reader), ReaderEvent::Line("{\"RSSI\": -50}".into()));
        reader.stop();
    }

    #[test]
    fn open_failure_is_reported_not_fatal() {
        let reader = SerialReader::start_with(SerialConfig::new("ttyGONE", 9600), |_| {
            Err(Error::Connection(serialport::Error::new(
                serialport::ErrorKind::NoDevice,
                "device absent",
            )))
        });

        match next(&reader) {
            ReaderEvent::Error(msg) => assert!(msg.contains("device absent"), "{msg}"),
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(next(&reader), ReaderEvent::Closed);
    }

    #[test]
    fn read_error_ends_session_and_closes_source() {
        let (reader, dropped) = scripted(vec![
            Ok(b"{}\n".to_vec()),
            Err(io::Error::new(ErrorKind::BrokenPipe, "unplugged")),
        ]);

        assert_eq!(next(&reader), ReaderEvent::Opened("mock0".into()));
        assert_eq!(next(&reader), ReaderEvent::Line("{}".into()));
        assert!(matches!(next(&reader), ReaderEvent::Error(msg) if msg.contains("unplugged")));
        assert_eq!(next(&reader), ReaderEvent::Closed);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn stop_closes_source_and_silences_events() {
        let chunks = (0..100).map(|i| Ok(format!("{{\"RSSI\": -{i}}}\n").into_bytes())).collect();
        let (mut reader, dropped) = scripted(chunks);

        assert_eq!(next(&reader), ReaderEvent::Opened("mock0".into()));
        assert!(matches!(next(&reader), ReaderEvent::Line(_)));

        reader.stop();

        assert!(!reader.is_running());
        assert!(dropped.load(Ordering::SeqCst));
        assert!(reader.events().try_recv().is_err());
    }

    #[test]
    fn stop_returns_while_consumer_is_not_draining() {
        let chunks = (0..CHANNEL_CAPACITY * 2).map(|_| Ok(b"{}\n".to_vec())).collect();
        let dropped = Arc::new(AtomicBool::new(false));
        let source = ScriptedSource { chunks, dropped: dropped.clone() };
        let mut cfg = SerialConfig::new("mock1", 9600);
        cfg.timeout = Duration::from_millis(20);
        let mut reader = SerialReader::start_with(cfg, move |_| Ok(Box::new(source) as ByteSource));

        while reader.events().len() < CHANNEL_CAPACITY {
            std::thread::sleep(Duration::from_millis(1));
        }
        reader.stop();
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn port_label_leads_with_port_name() {
        let mut info = PortInfo {
            port_name: "/dev/ttyUSB0".into(),
            vid: Some(0x10c4),
            pid: Some(0xea60),
            product: None,
        };
        assert_eq!(info.label(), "/dev/ttyUSB0 (10C4:EA60)");

        info.product = Some("CP2102 USB to UART".into());
        assert_eq!(info.label(), "/dev/ttyUSB0 (10C4:EA60) CP2102 USB to UART");
        assert_eq!(info.label().split_whitespace().next(), Some("/dev/ttyUSB0"));

        let plain = PortInfo { port_name: "COM8".into(), vid: None, pid: None, product: None };
        assert_eq!(plain.label(), "COM8");
    }
}
