#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use apcf::types::IdentityKey;
use apcf::{
    AddrType, AddressResolver, AdvFilter, ApcfError, BdAddr, RequestId, SecurityStore, SubCode,
    Transport, VendorCapabilities,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Vec<(RequestId, u16, Vec<u8>)>,
    pub fail: bool,
    /// Sub-commands turned away as if the controller queue were full.
    pub refuse: Vec<SubCode>,
}

impl RecordingTransport {
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.sent.iter().map(|(_, _, p)| p.clone()).collect()
    }

    pub fn last(&self) -> (RequestId, Vec<u8>) {
        let (request, _, params) = self.sent.last().unwrap();
        (*request, params.clone())
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, request: RequestId, opcode: u16, params: &[u8]) -> Result<(), ApcfError> {
        if self.fail {
            return Err(ApcfError::IOError);
        }
        if self.refuse.contains(&request.sub_code) {
            return Err(ApcfError::QueueFull);
        }
        self.sent.push((request, opcode, params.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub records: Vec<BdAddr>,
    pub bonded: Vec<BdAddr>,
    pub connected: Vec<BdAddr>,
    pub deleted: Vec<BdAddr>,
    pub keys: Vec<(BdAddr, IdentityKey)>,
}

impl SecurityStore for MemoryStore {
    fn find_device(&self, address: &BdAddr) -> bool {
        self.records.contains(address)
    }

    fn alloc_temp_device(&mut self, address: &BdAddr) {
        self.records.push(*address);
    }

    fn delete_device(&mut self, address: &BdAddr) -> bool {
        if self.connected.contains(address) {
            return false;
        }
        self.records.retain(|a| a != address);
        self.deleted.push(*address);
        true
    }

    fn is_bonded(&self, address: &BdAddr) -> bool {
        self.bonded.contains(address)
    }

    fn add_resolving_key(&mut self, address: &BdAddr, key: &IdentityKey) {
        self.keys.push((*address, *key));
    }
}

#[derive(Default)]
pub struct TableResolver {
    pub identities: Vec<(BdAddr, BdAddr)>,
}

impl AddressResolver for TableResolver {
    fn resolve_identity(&self, address: BdAddr, addr_type: AddrType) -> (BdAddr, AddrType) {
        match self.identities.iter().find(|(rpa, _)| *rpa == address) {
            Some((_, identity)) => (*identity, AddrType::PublicIdentity),
            None => (address, addr_type),
        }
    }
}

pub type Calls = Rc<RefCell<Vec<(u8, u8, Result<(), ApcfError>)>>>;

pub fn recorder() -> (Calls, impl FnOnce(u8, u8, Result<(), ApcfError>) + 'static) {
    let calls: Calls = Default::default();
    let sink = calls.clone();
    (calls, move |available, action, result| {
        sink.borrow_mut().push((available, action, result))
    })
}

pub type StatusCalls = Rc<RefCell<Vec<(u8, Result<(), ApcfError>)>>>;

pub fn status_recorder() -> (StatusCalls, impl FnOnce(u8, Result<(), ApcfError>) + 'static) {
    let calls: StatusCalls = Default::default();
    let sink = calls.clone();
    (calls, move |action, result| sink.borrow_mut().push((action, result)))
}

pub fn capabilities(max_filter: u8, version: u16) -> VendorCapabilities {
    VendorCapabilities {
        filtering_supported: true,
        max_filter,
        version,
    }
}

pub type TestFilter = AdvFilter<RecordingTransport, MemoryStore, TableResolver>;

pub fn filter_with(mut caps: VendorCapabilities) -> TestFilter {
    init_logger();
    AdvFilter::new(
        &mut caps,
        RecordingTransport::default(),
        MemoryStore::default(),
        TableResolver::default(),
    )
}

pub fn filter() -> TestFilter {
    filter_with(capabilities(4, 98))
}

pub fn addr(last: u8) -> BdAddr {
    BdAddr([last, 0x22, 0x33, 0x44, 0x55, 0x00])
}
