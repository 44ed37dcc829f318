//! Temporary device records created so that an address filter can carry an IRK.
//!
//! A record created here belongs to its filter index until the index is cleared, deleted or
//! re-bound. Records of bonded devices are never removed from here.

use alloc::collections::BTreeMap;

use crate::host::SecurityStore;
use crate::types::{AddrType, BdAddr, IdentityKey, Irk};
use crate::{debug, warn, ApcfError};

#[derive(Debug, Default, Clone)]
pub struct FilterBindings {
    bound: BTreeMap<u8, BdAddr>,
}

impl FilterBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, filter_index: u8) -> Option<&BdAddr> {
        self.bound.get(&filter_index)
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    /// Registers `irk` for `address` under a temporary record owned by `filter_index`.
    ///
    /// A previous binding of the index is dropped first. Fails with
    /// [`ApcfError::DeviceConnected`] if the previous device could not be removed, and with
    /// [`ApcfError::DeviceRecordExists`] if something else already manages `address`.
    pub fn bind<S: SecurityStore + ?Sized>(
        &mut self,
        store: &mut S,
        filter_index: u8,
        address: BdAddr,
        addr_type: AddrType,
        irk: Irk,
    ) -> Result<(), ApcfError> {
        if let Some(previous) = self.bound.get(&filter_index).copied() {
            warn!("replacing existing filter index entry with new address");
            if !store.is_bonded(&previous) && !store.delete_device(&previous) {
                warn!("unable to remove device, still connected");
                return Err(ApcfError::DeviceConnected);
            }
            self.bound.remove(&filter_index);
        }

        if store.find_device(&address) {
            warn!("address record already exists for {:?}", address);
            return Err(ApcfError::DeviceRecordExists);
        }

        store.alloc_temp_device(&address);
        self.bound.insert(filter_index, address);
        let key = IdentityKey {
            irk,
            identity_addr_type: addr_type,
            identity_addr: address,
        };
        store.add_resolving_key(&address, &key);
        debug!("filter index {} bound to {:?}", filter_index, address);
        Ok(())
    }

    /// Drops the binding of `filter_index`, deleting its record unless the device bonded
    /// in the meantime. The binding goes away even if the record could not be deleted.
    pub fn release<S: SecurityStore + ?Sized>(
        &mut self,
        store: &mut S,
        filter_index: u8,
    ) -> Option<BdAddr> {
        let address = self.bound.remove(&filter_index)?;
        if !store.is_bonded(&address) && !store.delete_device(&address) {
            warn!("unable to remove device {:?}, still connected", address);
        }
        Some(address)
    }
}
