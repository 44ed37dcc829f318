//! HCI UART framing for the vendor filter command.
//!
//! [`HciLink`] turns [`Transport::send`] into H4 command packets and hands the Command Complete
//! return parameters back in the order the commands went out.

use binrw::{binwrite, io::Cursor, BinRead, BinResult, BinWrite};
use heapless::{Deque, Vec};
use maybe_async::maybe_async;

use crate::command::ParamBuffer;
use crate::correlator::RequestId;
use crate::filter::AdvFilter;
use crate::host::{AddressResolver, SecurityStore, Transport};
use crate::{debug, error, trace, ApcfError};

pub mod hcicode {
    pub const ACL_DATA: u8 = 0x02;
    pub const EVENT: u8 = 0x04;
}

pub mod eventcode {
    pub const COMMAND_COMPLETE: u8 = 0x0e;
}

pub mod opcodes {
    /// OGF 0x3f (vendor), OCF 0x157.
    pub const LE_ADV_FILTER: u16 = 0xfd57;
}

pub const CMD_PKT_HEADER_SIZE: usize = 3;
pub const CMD_PKT_MAX_SIZE: usize = 1 + CMD_PKT_HEADER_SIZE + 255;
pub type CommandPacketBuffer = Vec<u8, CMD_PKT_MAX_SIZE>;

pub const EVT_PKT_HEADER_SIZE: usize = 2;
pub const EVT_PKT_PAYLOAD_MAX_SIZE: usize = 255;
pub const EVT_PKT_MAX_SIZE: usize = EVT_PKT_HEADER_SIZE + EVT_PKT_PAYLOAD_MAX_SIZE;

pub const EVT_PKT_HEADER_SIZE_COMMAND_COMPLETE: usize = 3;
pub const RETURN_PARAMS_MAX_SIZE: usize = EVT_PKT_PAYLOAD_MAX_SIZE - EVT_PKT_HEADER_SIZE_COMMAND_COMPLETE;
pub type ReturnParameters = Vec<u8, RETURN_PARAMS_MAX_SIZE>;

pub const ACL_PKT_HEADER_SIZE: usize = 4;

pub const HCI_QUEUE_DEPTH: usize = 8;

#[binwrite]
#[derive(PartialEq, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(little, magic = 0x01u8)]
pub struct CommandPacket {
    pub opcode: u16,
    #[bw(calc(params.len() as u8))]
    len: u8,
    #[bw(map = |x| x.as_slice())]
    pub params: ParamBuffer,
}

impl CommandPacket {
    pub fn new(opcode: u16, params: &[u8]) -> Result<Self, ApcfError> {
        Ok(Self {
            opcode,
            params: ParamBuffer::from_slice(params).map_err(|_| ApcfError::PacketFormatError)?,
        })
    }

    pub fn encode(&self) -> Result<CommandPacketBuffer, ApcfError> {
        let mut buf = [0u8; CMD_PKT_MAX_SIZE];
        let mut writer = Cursor::new(&mut buf[..]);
        self.write(&mut writer)
            .map_err(|_| ApcfError::PacketFormatError)?;
        let len = writer.position() as usize;
        CommandPacketBuffer::from_slice(&buf[..len]).map_err(|_| ApcfError::PacketFormatError)
    }
}

#[binrw::parser(reader)]
fn parse_return_parameters(count: u8) -> BinResult<ReturnParameters> {
    let mut buf = [0u8; RETURN_PARAMS_MAX_SIZE];
    let count = core::cmp::min(count as usize, RETURN_PARAMS_MAX_SIZE);
    reader.read_exact(&mut buf[..count])?;
    Ok(ReturnParameters::from_slice(&buf[..count]).unwrap_or_default())
}

/// Command Complete event, without the H4 packet type.
#[derive(BinRead, PartialEq, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[br(little, magic = 0x0eu8)]
pub struct CommandComplete {
    #[br(assert(len >= 3, "size error, {}", len))]
    len: u8,
    pub num_hci_command_packets: u8,
    pub command_opcode: u16,
    #[br(parse_with = parse_return_parameters, args(len - 3))]
    pub return_parameters: ReturnParameters,
}

impl CommandComplete {
    pub fn decode(bytes: &[u8]) -> Result<Self, ApcfError> {
        Self::read(&mut Cursor::new(bytes)).map_err(|_| ApcfError::PacketFormatError)
    }
}

/// H4 transport for the filter command over a byte stream.
///
/// Commands queue up on [`Transport::send`] and go out on [`flush`](Self::flush). The
/// controller answers commands of one opcode in order, so replies are matched to the oldest
/// request in flight.
pub struct HciLink<T, const N: usize = HCI_QUEUE_DEPTH> {
    io: T,
    outbound: Deque<CommandPacketBuffer, N>,
    in_flight: Deque<RequestId, N>,
}

impl<T, const N: usize> HciLink<T, N> {
    pub fn new(io: T) -> Self {
        Self {
            io,
            outbound: Deque::new(),
            in_flight: Deque::new(),
        }
    }

    pub fn io(&self) -> &T {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut T {
        &mut self.io
    }

    pub fn into_inner(self) -> T {
        self.io
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn queued(&self) -> usize {
        self.outbound.len()
    }
}

impl<T, const N: usize> Transport for HciLink<T, N> {
    fn send(&mut self, request: RequestId, opcode: u16, params: &[u8]) -> Result<(), ApcfError> {
        if self.outbound.is_full() || self.in_flight.is_full() {
            error!("hci queue full, dropping {:?}", request);
            return Err(ApcfError::QueueFull);
        }
        let packet = CommandPacket::new(opcode, params)?.encode()?;
        self.outbound
            .push_back(packet)
            .map_err(|_| ApcfError::QueueFull)?;
        self.in_flight
            .push_back(request)
            .map_err(|_| ApcfError::QueueFull)?;
        Ok(())
    }
}

impl<T: crate::Read + crate::Write, const N: usize> HciLink<T, N> {
    /// Writes out every queued command.
    #[maybe_async]
    pub async fn flush(&mut self) -> Result<(), ApcfError> {
        while let Some(packet) = self.outbound.pop_front() {
            trace!("hci command {:?}", packet.as_slice());
            self.io
                .write_all(&packet)
                .await
                .map_err(|_| ApcfError::IOError)?;
        }
        self.io.flush().await.map_err(|_| ApcfError::IOError)
    }

    /// Flushes, then reads one inbound packet.
    ///
    /// Returns the request a Command Complete of the filter opcode answers, with its
    /// return parameters. Anything else is consumed and yields `None`.
    #[maybe_async]
    pub async fn poll(&mut self) -> Result<Option<(RequestId, ReturnParameters)>, ApcfError> {
        self.flush().await?;

        let mut typ = [0u8; 1];
        let l = self.io.read(&mut typ).await.map_err(|_| ApcfError::IOError)?;
        if l == 0 {
            return Ok(None);
        }

        match typ[0] {
            hcicode::EVENT => {
                let mut buffer = [0u8; EVT_PKT_MAX_SIZE];
                self.io
                    .read_exact(&mut buffer[..EVT_PKT_HEADER_SIZE])
                    .await
                    .map_err(|_| ApcfError::IOError)?;
                let tot_len = buffer[1] as usize + EVT_PKT_HEADER_SIZE;
                self.io
                    .read_exact(&mut buffer[EVT_PKT_HEADER_SIZE..tot_len])
                    .await
                    .map_err(|_| ApcfError::IOError)?;

                if buffer[0] != eventcode::COMMAND_COMPLETE {
                    debug!("skipping event {:#x}", buffer[0]);
                    return Ok(None);
                }
                let event = CommandComplete::decode(&buffer[..tot_len])?;
                if event.command_opcode != opcodes::LE_ADV_FILTER {
                    debug!("skipping command complete of {:#06x}", event.command_opcode);
                    return Ok(None);
                }
                let Some(request) = self.in_flight.pop_front() else {
                    error!("command complete without a request in flight");
                    return Err(ApcfError::UnknownRequest);
                };
                Ok(Some((request, event.return_parameters)))
            }
            hcicode::ACL_DATA => {
                let mut header = [0u8; ACL_PKT_HEADER_SIZE];
                self.io
                    .read_exact(&mut header)
                    .await
                    .map_err(|_| ApcfError::IOError)?;
                let mut remaining = u16::from_le_bytes([header[2], header[3]]) as usize;
                let mut scratch = [0u8; 64];
                while remaining > 0 {
                    let n = core::cmp::min(remaining, scratch.len());
                    self.io
                        .read_exact(&mut scratch[..n])
                        .await
                        .map_err(|_| ApcfError::IOError)?;
                    remaining -= n;
                }
                trace!("skipped acl packet");
                Ok(None)
            }
            typ => {
                error!("HCI type invalid {}", typ);
                Err(ApcfError::PacketFormatError)
            }
        }
    }
}

impl<IO, S, R, const N: usize> AdvFilter<HciLink<IO, N>, S, R>
where
    IO: crate::Read + crate::Write,
    S: SecurityStore,
    R: AddressResolver,
{
    /// Services the link once: sends what is queued and applies at most one reply.
    /// Returns whether a reply was applied.
    #[maybe_async]
    pub async fn process(&mut self) -> Result<bool, ApcfError> {
        match self.transport.poll().await? {
            Some((request, params)) => {
                self.on_command_complete(request, &params)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
