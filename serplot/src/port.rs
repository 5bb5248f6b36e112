//! Byte stream ports
//!
//! A `Connector` knows how to (re)open a device, and produces a
//! `ByteStream` that the ingestion loop reads with a bounded wait.
//! Device URLs follow the same conventions everywhere:
//! - `/dev/ttyUSB0`, `COM3`: a serial port at the default rate
//! - `serial://path[:rate]`, `/dev/ttyACM0:9600`: a serial port at `rate`
//! - `tcp://host:port`: a raw TCP stream (e.g. a serial-to-network bridge)

mod serial;
mod tcp;

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Possible errors when receiving from a `ByteStream`
#[derive(Debug, thiserror::Error)]
pub enum RecvError {
    /// No data arrived before the timeout.
    #[error("no data available")]
    NotReady,
    /// The other end went away.
    #[error("stream disconnected")]
    Disconnected,
    /// Low level IO error. The stream should be torn down.
    #[error("I/O error: {0}")]
    IO(#[from] io::Error),
}

/// Raw byte link to a device.
pub trait ByteStream: Send {
    /// Waits up to `timeout` for data and reads as much as fits in `buf`.
    /// Returns the number of bytes read, which is never zero.
    /// For errors other than `NotReady`, the stream should be dropped.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, RecvError>;

    /// Writes all of `data`, waiting at most `timeout` for the device to
    /// accept it. A `TimedOut` error leaves the stream usable; any other
    /// error means it should be dropped.
    fn send(&mut self, data: &[u8], timeout: Duration) -> io::Result<()>;
}

/// Opens byte streams to one device, repeatedly if needed.
pub trait Connector: Send {
    fn open(&mut self) -> io::Result<Box<dyn ByteStream>>;

    /// Human readable name of the device, for the status bar.
    fn describe(&self) -> String;
}

/// Default data rate on serial ports.
pub static DEFAULT_RATE: u32 = 115200;

/// Connection timeout for TCP endpoints.
static TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Serial { path: String, rate: u32 },
    Tcp { address: String },
}

impl Endpoint {
    /// Parses a device URL, see the module documentation.
    pub fn parse(url: &str) -> io::Result<Endpoint> {
        let invalid = || io::Error::new(io::ErrorKind::InvalidInput, format!("invalid url {:?}", url));
        let split_url: Vec<&str> = url.splitn(2, "://").collect();
        let serial_spec = match split_url[..] {
            ["serial", spec] => spec,
            ["tcp", addr] if !addr.is_empty() => {
                return Ok(Endpoint::Tcp {
                    address: addr.to_string(),
                })
            }
            [spec] if !spec.is_empty() => spec,
            _ => return Err(invalid()),
        };
        let tokens: Vec<&str> = serial_spec.split(':').collect();
        match tokens[..] {
            [path] if !path.is_empty() => Ok(Endpoint::Serial {
                path: path.to_string(),
                rate: DEFAULT_RATE,
            }),
            [path, rate] if !path.is_empty() => match rate.parse::<u32>() {
                Ok(rate) if rate > 0 => Ok(Endpoint::Serial {
                    path: path.to_string(),
                    rate,
                }),
                _ => Err(invalid()),
            },
            _ => Err(invalid()),
        }
    }
}

/// Resolve an address, preferring the first result.
fn find_addr(addr: &str) -> io::Result<SocketAddr> {
    match addr.to_socket_addrs()?.next() {
        Some(sa) => Ok(sa),
        None => Err(io::Error::new(
            io::ErrorKind::Other,
            "address resolution failed",
        )),
    }
}

/// `Connector` for a device URL.
pub struct UrlConnector {
    url: String,
    endpoint: Endpoint,
}

impl UrlConnector {
    pub fn new(url: &str) -> io::Result<UrlConnector> {
        Ok(UrlConnector {
            url: url.to_string(),
            endpoint: Endpoint::parse(url)?,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Connector for UrlConnector {
    fn open(&mut self) -> io::Result<Box<dyn ByteStream>> {
        match &self.endpoint {
            Endpoint::Serial { path, rate } => Ok(Box::new(serial::open(path, *rate)?)),
            Endpoint::Tcp { address } => {
                let addr = find_addr(address)?;
                Ok(Box::new(tcp::connect(&addr, TCP_CONNECT_TIMEOUT)?))
            }
        }
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Non blocking stream paired with its own `mio::Poll`, so that reads and
/// writes can wait with a timeout.
pub struct Polled<S: mio::event::Source + io::Read + io::Write> {
    source: S,
    poll: mio::Poll,
    events: mio::Events,
}

impl<S: mio::event::Source + io::Read + io::Write> Polled<S> {
    pub fn new(mut source: S) -> io::Result<Polled<S>> {
        let poll = mio::Poll::new()?;
        poll.registry().register(
            &mut source,
            mio::Token(0),
            mio::Interest::READABLE | mio::Interest::WRITABLE,
        )?;
        Ok(Polled {
            source,
            poll,
            events: mio::Events::with_capacity(1),
        })
    }
}

impl<S: mio::event::Source + io::Read + io::Write + Send> ByteStream for Polled<S> {
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, RecvError> {
        let mut waited = false;
        loop {
            match self.source.read(buf) {
                Ok(0) => return Err(RecvError::Disconnected),
                Ok(size) => return Ok(size),
                Err(e) => match e.kind() {
                    io::ErrorKind::Interrupted => continue,
                    io::ErrorKind::WouldBlock => {}
                    io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof => return Err(RecvError::Disconnected),
                    _ => return Err(RecvError::IO(e)),
                },
            }
            // Sources are edge triggered: only wait once the read drained them.
            if waited {
                return Err(RecvError::NotReady);
            }
            match self.poll.poll(&mut self.events, Some(timeout)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(RecvError::IO(e)),
            }
            if self.events.is_empty() {
                return Err(RecvError::NotReady);
            }
            waited = true;
        }
    }

    fn send(&mut self, data: &[u8], timeout: Duration) -> io::Result<()> {
        let deadline = Instant::now() + timeout;
        let mut rest = data;
        while !rest.is_empty() {
            match self.source.write(rest) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(size) => rest = &rest[size..],
                Err(e) => match e.kind() {
                    io::ErrorKind::Interrupted => {}
                    io::ErrorKind::WouldBlock => {
                        let left = deadline.saturating_duration_since(Instant::now());
                        if left.is_zero() {
                            return Err(io::Error::from(io::ErrorKind::TimedOut));
                        }
                        // Readable events consumed here are harmless: `recv`
                        // always tries a read before polling.
                        match self.poll.poll(&mut self.events, Some(left)) {
                            Ok(()) => {}
                            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                            Err(e) => return Err(e),
                        }
                    }
                    _ => return Err(e),
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn parses_device_urls() {
        assert_eq!(
            Endpoint::parse("/dev/ttyUSB0").unwrap(),
            Endpoint::Serial {
                path: "/dev/ttyUSB0".into(),
                rate: DEFAULT_RATE
            }
        );
        assert_eq!(
            Endpoint::parse("serial://COM3:9600").unwrap(),
            Endpoint::Serial {
                path: "COM3".into(),
                rate: 9600
            }
        );
        assert_eq!(
            Endpoint::parse("tcp://localhost:2000").unwrap(),
            Endpoint::Tcp {
                address: "localhost:2000".into()
            }
        );
        assert!(Endpoint::parse("").is_err());
        assert!(Endpoint::parse("/dev/ttyUSB0:fast").is_err());
        assert!(Endpoint::parse("/dev/ttyUSB0:0").is_err());
        assert!(Endpoint::parse("udp://host:1").is_err());
        assert!(Endpoint::parse("tcp://").is_err());
    }

    #[test]
    fn tcp_stream_reads_and_reports_disconnect() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut connector = UrlConnector::new(&format!("tcp://{}", addr)).unwrap();
        let mut stream = connector.open().unwrap();
        let (mut peer, _) = listener.accept().unwrap();

        let mut buf = [0u8; 64];
        assert!(matches!(
            stream.recv(&mut buf, Duration::from_millis(10)),
            Err(RecvError::NotReady)
        ));

        peer.write_all(b"temp:1\n").unwrap();
        let mut got = vec![];
        while got.len() < 7 {
            match stream.recv(&mut buf, Duration::from_millis(500)) {
                Ok(n) => got.extend_from_slice(&buf[..n]),
                Err(RecvError::NotReady) => {}
                Err(e) => panic!("unexpected error {}", e),
            }
        }
        assert_eq!(got, b"temp:1\n");

        drop(peer);
        let mut result = stream.recv(&mut buf, Duration::from_millis(500));
        for _ in 0..10 {
            if !matches!(result, Err(RecvError::NotReady)) {
                break;
            }
            result = stream.recv(&mut buf, Duration::from_millis(500));
        }
        assert!(matches!(result, Err(RecvError::Disconnected)));
    }

    #[test]
    fn tcp_stream_sends_lines() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut connector = UrlConnector::new(&format!("tcp://{}", addr)).unwrap();
        let mut stream = connector.open().unwrap();
        let (mut peer, _) = listener.accept().unwrap();

        stream.send(b"reset\n", Duration::from_secs(1)).unwrap();
        stream.send(b"rate 10\n", Duration::from_secs(1)).unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut got = vec![0u8; 14];
        peer.read_exact(&mut got).unwrap();
        assert_eq!(got, b"reset\nrate 10\n");

        // The writable readiness from the send must not hide incoming data.
        peer.write_all(b"ok\n").unwrap();
        let mut buf = [0u8; 16];
        let mut received = vec![];
        for _ in 0..20 {
            match stream.recv(&mut buf, Duration::from_millis(100)) {
                Ok(n) => received.extend_from_slice(&buf[..n]),
                Err(RecvError::NotReady) => {}
                Err(e) => panic!("unexpected error {}", e),
            }
            if received.len() >= 3 {
                break;
            }
        }
        assert_eq!(received, b"ok\n");
    }
}
