#![no_std]

extern crate alloc;

use fixedstr::str64;

#[cfg(feature = "log")]
use log::{debug, error, trace, warn};
#[cfg(feature = "defmt")]
use defmt::{debug, error, trace, warn};

#[cfg(all(feature = "log", feature = "defmt"))]
compile_error!("log and defmt can't have both!");
#[cfg(not(any(feature = "log", feature = "defmt")))]
compile_error!("choose one of log or defmt");

#[cfg(all(feature = "sync", feature = "async"))]
compile_error!("sync and async are conflict!, choose one");
#[cfg(not(any(feature = "sync", feature = "async")))]
compile_error!("choose one of sync or async");

use thiserror_no_std::Error;

pub mod binding;
pub mod command;
pub mod correlator;
pub mod counter;
pub mod filter;
pub mod hci;
pub mod host;
pub mod types;

pub use filter::{AdvFilter, ClearReport, CommandOutcome, InstallReport};
pub use hci::HciLink;
pub use correlator::{ConfigCallback, RequestId, StatusCallback};
pub use host::{AddressResolver, CapabilityProvider, SecurityStore, Transport};
pub use types::{
    Action, AddrType, BdAddr, ConditionType, FilterCommand, FilterParams, Irk, SubCode,
    VendorCapabilities,
};

#[cfg(feature = "sync")]
pub use embedded_io::{Read, Write};
#[cfg(feature = "async")]
pub use embedded_io_async::{Read, Write};

pub type MsgStr = str64;
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MsgType(pub MsgStr);

impl core::fmt::Display for MsgType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MsgType {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}", self.0.as_str());
    }
}

#[derive(Error, Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ApcfError {
    #[error("Filtering Unsupported")]
    Unsupported,
    #[error("Invalid Value: {}", .0)]
    InvalidValue(MsgType),
    #[error("Unknown Address")]
    UnknownAddress,
    #[error("Processing Error, status {:#04x}", .0)]
    ProcessingError(u8),
    #[error("Protocol Mismatch: expected {:?}, received {:#04x}", .expected, .received)]
    ProtocolMismatch { expected: SubCode, received: u8 },
    #[error("Bad Reply Length: {}", .0)]
    BadLength(usize),
    #[error("Unknown Request")]
    UnknownRequest,
    #[error("Device Still Connected")]
    DeviceConnected,
    #[error("Device Record Exists")]
    DeviceRecordExists,
    #[error("Command Queue Full")]
    QueueFull,
    #[error("Packet Format Error")]
    PacketFormatError,
    #[error("IOError")]
    IOError,
}

/// `action` value reported with local failures of `enable`, `configure` and `clear`.
pub const OP_ENABLE: u8 = 0x01;
/// `action` value reported with local failures of a single condition update.
pub const OP_CONFIG: u8 = 0x02;
