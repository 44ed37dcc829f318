#[cfg(feature = "sync")]
mod common;

#[cfg(feature = "sync")]
mod test {

use std::cell::RefCell;

use apcf::hci::{opcodes, CommandComplete, CommandPacket, HciLink};
use apcf::{AdvFilter, ApcfError, Read, RequestId, SubCode, Transport, Write};
use embedded_io::{Error, ErrorType};

use crate::common::{capabilities, init_logger, recorder, status_recorder, MemoryStore, TableResolver};

struct TestConnector {
    to_read: RefCell<[u8; 256]>,
    to_write: RefCell<[u8; 256]>,
    read_idx: RefCell<usize>,
    read_max: RefCell<usize>,
    write_idx: RefCell<usize>,
}

impl TestConnector {
    fn provide_data_to_read(&self, data: &[u8]) {
        let len = data.len();
        let from = *(self.read_max.borrow());
        let to = from + len;
        (self.to_read.borrow_mut())[from..to].copy_from_slice(data);
        *(self.read_max.borrow_mut()) += len;
    }

    fn get_written_data(&self) -> Vec<u8> {
        self.to_write.borrow_mut()[..*(self.write_idx.borrow())].into()
    }

    fn clear_written_data(&self) {
        *(self.write_idx.borrow_mut()) = 0;
    }
}

#[derive(Debug)]
pub enum TestConnectorError {
    Unknown,
}

impl Error for TestConnectorError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

impl ErrorType for TestConnector {
    type Error = TestConnectorError;
}

impl Read for TestConnector {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let l = buf.len();
        let start = *self.read_idx.borrow();
        let read_max = *self.read_max.borrow();
        let end = core::cmp::min(start + l, read_max);
        let l = end - start;

        buf[..l].copy_from_slice(&self.to_read.borrow()[start..end]);
        *(self.read_idx.borrow_mut()) += l;
        Ok(l)
    }
}

impl Write for TestConnector {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let idx = *self.write_idx.borrow();
        let l = buf.len();
        if idx + l > self.to_write.borrow().len() {
            return Err(TestConnectorError::Unknown);
        }

        self.to_write.borrow_mut()[idx..idx + l].copy_from_slice(buf);
        *(self.write_idx.borrow_mut()) += l;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Default for TestConnector {
    fn default() -> Self {
        Self {
            to_read: RefCell::new([0u8; 256]),
            to_write: RefCell::new([0u8; 256]),
            read_idx: RefCell::new(0),
            read_max: RefCell::new(0),
            write_idx: RefCell::new(0),
        }
    }
}

type HciFilter = AdvFilter<HciLink<TestConnector>, MemoryStore, TableResolver>;

fn hci_filter() -> HciFilter {
    init_logger();
    AdvFilter::new(
        &mut capabilities(4, 98),
        HciLink::new(TestConnector::default()),
        MemoryStore::default(),
        TableResolver::default(),
    )
}

fn request(generation: u16) -> RequestId {
    RequestId {
        sub_code: SubCode::LocalName,
        generation,
    }
}

#[test]
fn encode_command_packet() {
    let packet = CommandPacket::new(opcodes::LE_ADV_FILTER, &[0x00, 0x01]).unwrap();
    assert_eq!(
        packet.encode().unwrap().as_slice(),
        &[0x01, 0x57, 0xfd, 0x02, 0x00, 0x01]
    );
}

#[test]
fn parse_command_complete() {
    let event = CommandComplete::decode(&[0x0e, 0x07, 0x01, 0x57, 0xfd, 0x00, 0x06, 0x00, 0x0f]).unwrap();
    assert_eq!(event.num_hci_command_packets, 1);
    assert_eq!(event.command_opcode, opcodes::LE_ADV_FILTER);
    assert_eq!(event.return_parameters.as_slice(), &[0x00, 0x06, 0x00, 0x0f]);

    assert_eq!(
        CommandComplete::decode(&[0x0e, 0x02, 0x01, 0x57]),
        Err(ApcfError::PacketFormatError)
    );
}

#[test]
fn enable_over_hci() {
    let mut filter = hci_filter();
    let (status, notify) = status_recorder();
    filter.enable(true, notify).unwrap();
    assert_eq!(filter.transport.queued(), 1);
    assert_eq!(filter.transport.in_flight(), 1);

    filter
        .transport
        .io()
        .provide_data_to_read(&[0x04, 0x0e, 0x06, 0x01, 0x57, 0xfd, 0x00, 0x00, 0x01]);
    assert_eq!(filter.process(), Ok(true));

    assert_eq!(
        filter.transport.io().get_written_data(),
        vec![0x01, 0x57, 0xfd, 0x02, 0x00, 0x01]
    );
    assert_eq!(*status.borrow(), vec![(1, Ok(()))]);
    assert_eq!(filter.transport.in_flight(), 0);
    assert_eq!(filter.outstanding(), 0);
}

#[test]
fn replies_are_matched_in_order() {
    let mut filter = hci_filter();
    let (first, notify) = recorder();
    filter
        .update_condition(
            apcf::Action::Add,
            1,
            None,
            &apcf::FilterCommand::LocalName { name: b"a".to_vec() },
            notify,
        )
        .unwrap();
    let (second, notify) = recorder();
    filter
        .update_condition(
            apcf::Action::Add,
            2,
            None,
            &apcf::FilterCommand::LocalName { name: b"b".to_vec() },
            notify,
        )
        .unwrap();

    let io = filter.transport.io();
    io.provide_data_to_read(&[0x04, 0x0e, 0x07, 0x01, 0x57, 0xfd, 0x00, 0x05, 0x00, 0x09]);
    io.provide_data_to_read(&[0x04, 0x0e, 0x07, 0x01, 0x57, 0xfd, 0x00, 0x05, 0x00, 0x08]);

    assert_eq!(filter.process(), Ok(true));
    assert_eq!(filter.process(), Ok(true));
    assert_eq!(*first.borrow(), vec![(9, 0, Ok(()))]);
    assert_eq!(*second.borrow(), vec![(8, 0, Ok(()))]);
    assert_eq!(
        filter.counters().counter(None, apcf::ConditionType::LocalName),
        Some(2)
    );
}

#[test]
fn other_packets_are_skipped() {
    let mut filter = hci_filter();
    // nothing to read
    assert_eq!(filter.process(), Ok(false));

    let io = filter.transport.io();
    // command complete of HCI_Reset
    io.provide_data_to_read(&[0x04, 0x0e, 0x04, 0x01, 0x03, 0x0c, 0x00]);
    // number of completed packets
    io.provide_data_to_read(&[0x04, 0x13, 0x05, 0x01, 0x40, 0x00, 0x01, 0x00]);
    // acl data
    io.provide_data_to_read(&[0x02, 0x40, 0x20, 0x03, 0x00, 0x01, 0x02, 0x03]);

    assert_eq!(filter.process(), Ok(false));
    assert_eq!(filter.process(), Ok(false));
    assert_eq!(filter.process(), Ok(false));
    assert_eq!(filter.process(), Ok(false));
}

#[test]
fn unexpected_packet_type() {
    let mut filter = hci_filter();
    filter.transport.io().provide_data_to_read(&[0x07, 0x00]);
    assert_eq!(filter.process(), Err(ApcfError::PacketFormatError));
}

#[test]
fn unsolicited_command_complete() {
    let mut filter = hci_filter();
    filter
        .transport
        .io()
        .provide_data_to_read(&[0x04, 0x0e, 0x07, 0x01, 0x57, 0xfd, 0x00, 0x05, 0x00, 0x09]);
    assert_eq!(filter.process(), Err(ApcfError::UnknownRequest));
}

#[test]
fn queue_is_bounded() {
    let mut link: HciLink<TestConnector, 2> = HciLink::new(TestConnector::default());
    let params = [0x05, 0x00, 0x01];
    assert_eq!(link.send(request(0), opcodes::LE_ADV_FILTER, &params), Ok(()));
    assert_eq!(link.send(request(1), opcodes::LE_ADV_FILTER, &params), Ok(()));
    assert_eq!(
        link.send(request(2), opcodes::LE_ADV_FILTER, &params),
        Err(ApcfError::QueueFull)
    );

    link.flush().unwrap();
    assert_eq!(link.queued(), 0);
    // still waiting for both replies
    assert_eq!(link.in_flight(), 2);
    assert_eq!(
        link.send(request(3), opcodes::LE_ADV_FILTER, &params),
        Err(ApcfError::QueueFull)
    );

    link.io().clear_written_data();
    assert!(link.io().get_written_data().is_empty());
}

}
