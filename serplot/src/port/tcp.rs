//! TCP stream
//!
//! Raw bytes from a TCP peer, typically a serial-to-network bridge.
//! The connection is established synchronously so that an unreachable
//! address is reported by `open()`, then handed to `mio`.

use super::Polled;
use mio::net::TcpStream;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

pub fn connect(address: &SocketAddr, timeout: Duration) -> io::Result<Polled<TcpStream>> {
    let stream = std::net::TcpStream::connect_timeout(address, timeout)?;
    stream.set_nonblocking(true)?;
    stream.set_nodelay(true)?;
    Polled::new(TcpStream::from_std(stream))
}
