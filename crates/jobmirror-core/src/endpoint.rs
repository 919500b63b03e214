//! Printer identity shared by both connections.

use std::fmt;

/// Username both printer services expect alongside the access code.
pub const DEVICE_USER: &str = "bblp";

/// Address, credential and serial of one printer. Immutable once built;
/// the fetcher and the tracker each hold a clone and open their own sessions.
#[derive(Clone, PartialEq, Eq)]
pub struct PrinterEndpoint {
    host: String,
    access_code: String,
    serial: String,
}

impl PrinterEndpoint {
    pub fn new(
        host: impl Into<String>,
        access_code: impl Into<String>,
        serial: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            access_code: access_code.into(),
            serial: serial.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn access_code(&self) -> &str {
        &self.access_code
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Topic the device publishes status reports on.
    pub fn report_topic(&self) -> String {
        format!("device/{}/report", self.serial)
    }

    /// Topic the device accepts commands on.
    pub fn request_topic(&self) -> String {
        format!("device/{}/request", self.serial)
    }
}

impl fmt::Debug for PrinterEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrinterEndpoint")
            .field("host", &self.host)
            .field("access_code", &"***")
            .field("serial", &self.serial)
            .finish()
    }
}

/// Whether a transport accepts server certificates not signed by a known CA.
///
/// The printers present self-signed certificates on both services, so LAN
/// deployments normally enable this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsPolicy {
    pub accept_self_signed: bool,
}
