//! Serial Port
//!
//! Opens a serial port through `mio-serial` and adapts its I/O errors so
//! that unplugging the device reads as a disconnect on every platform.

use super::Polled;
use mio_serial::{SerialPortBuilderExt, SerialStream};
use std::io;

/// Wrapper over the native serial stream, translating platform specific
/// disconnect errors.
pub struct Port {
    port: SerialStream,
}

pub fn open(path: &str, rate: u32) -> io::Result<Polled<Port>> {
    let mio_port = mio_serial::new(path, rate).open_native_async()?;
    #[cfg(windows)]
    {
        // Windows requires some custom settings to replicate the unix behavior.
        use std::os::windows::io::AsRawHandle;
        use winapi::um::commapi::SetCommTimeouts;
        use winapi::um::winbase::COMMTIMEOUTS;
        let handle = mio_port.as_raw_handle();
        let mut timeouts = COMMTIMEOUTS {
            ReadIntervalTimeout: 0xFFFFFFFF,
            ReadTotalTimeoutMultiplier: 0xFFFFFFFF,
            ReadTotalTimeoutConstant: 0xFFFFFFFE,
            WriteTotalTimeoutMultiplier: 0,
            WriteTotalTimeoutConstant: 0,
        };
        if unsafe { SetCommTimeouts(handle, &mut timeouts) } == 0 {
            return Err(io::Error::last_os_error());
        }
    }
    tracing::debug!("opened serial port {} at {} bps", path, rate);
    Polled::new(Port { port: mio_port })
}

impl io::Read for Port {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match io::Read::read(&mut self.port, buf) {
            #[cfg(target_os = "macos")]
            // On macos, disconnecting a serial port while connected will
            // generate this error, so translate it.
            Err(e) if e.raw_os_error() == Some(6) => Err(io::Error::from(io::ErrorKind::BrokenPipe)),
            other => other,
        }
    }
}

impl io::Write for Port {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match io::Write::write(&mut self.port, buf) {
            #[cfg(target_os = "macos")]
            Err(e) if e.raw_os_error() == Some(6) => Err(io::Error::from(io::ErrorKind::BrokenPipe)),
            other => other,
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.port)
    }
}

impl mio::event::Source for Port {
    fn register(
        &mut self,
        registry: &mio::Registry,
        token: mio::Token,
        interests: mio::Interest,
    ) -> io::Result<()> {
        self.port.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &mio::Registry,
        token: mio::Token,
        interests: mio::Interest,
    ) -> io::Result<()> {
        self.port.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &mio::Registry) -> io::Result<()> {
        self.port.deregister(registry)
    }
}
