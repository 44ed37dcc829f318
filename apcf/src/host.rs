//! Collaborators the filter logic drives but does not own.

use crate::correlator::RequestId;
use crate::types::{AddrType, BdAddr, IdentityKey, VendorCapabilities};
use crate::ApcfError;

/// Sends vendor commands to the controller.
///
/// Every accepted command must eventually be answered through
/// [`AdvFilter::on_command_complete`](crate::AdvFilter::on_command_complete) with the same
/// `request` and the Command Complete return parameters, at most once.
pub trait Transport {
    fn send(&mut self, request: RequestId, opcode: u16, params: &[u8]) -> Result<(), ApcfError>;
}

/// Device records and keys of the security manager.
pub trait SecurityStore {
    fn find_device(&self, address: &BdAddr) -> bool;
    fn alloc_temp_device(&mut self, address: &BdAddr);
    /// Returns `false` when the device is still connected and its record was kept.
    fn delete_device(&mut self, address: &BdAddr) -> bool;
    fn is_bonded(&self, address: &BdAddr) -> bool;
    fn add_resolving_key(&mut self, address: &BdAddr, key: &IdentityKey);
}

/// Maps a resolvable private address to the identity it belongs to. Other addresses come
/// back unchanged.
pub trait AddressResolver {
    fn resolve_identity(&self, address: BdAddr, addr_type: AddrType) -> (BdAddr, AddrType);
}

pub trait CapabilityProvider {
    fn vendor_capabilities(&mut self) -> VendorCapabilities;
}

impl CapabilityProvider for VendorCapabilities {
    fn vendor_capabilities(&mut self) -> VendorCapabilities {
        *self
    }
}
