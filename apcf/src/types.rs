use alloc::vec::Vec;
use binrw::{BinRead, BinWrite};
use fixedstr::str_format;
use modular_bitfield::{bitfield, prelude::*};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{ApcfError, MsgStr, MsgType};

/// Longest name, pattern or mask the controller accepts in a single condition.
pub const PF_STR_LEN_MAX: usize = 29;

/// Controller capability version of the L release; newer firmware takes a tracking-entry count.
pub const CAPABILITY_L_VERSION: u16 = 55;

pub const LOGIC_OR: u8 = 0x00;

/// Number of per-condition counters kept for each resource slot.
pub const COUNTER_TYPES: usize = 7;

/// Device address in HCI (little-endian) byte order.
#[derive(BinRead, BinWrite, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default, Debug, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[brw(little)]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    /// Resolvable private addresses carry `0b01` in the two most significant bits.
    pub fn is_resolvable_private(&self) -> bool {
        self.0[5] & 0xc0 == 0x40
    }
}

impl core::fmt::Display for BdAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let a = &self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a[5], a[4], a[3], a[2], a[1], a[0])
    }
}

#[derive(TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AddrType {
    Public = 0x00,
    Random = 0x01,
    PublicIdentity = 0x02,
    RandomIdentity = 0x03,
}

/// Device-type byte of the address condition: public or random, resolved identities included.
pub const DEVICE_TYPE_ANY: u8 = 0x02;

#[derive(BinRead, BinWrite, TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[brw(repr(u8))]
#[repr(u8)]
pub enum Action {
    Add = 0x00,
    Delete = 0x01,
    Clear = 0x02,
}

/// Sub-command code carried as the first parameter byte of the vendor filter command and
/// echoed back in its Command Complete.
#[derive(BinRead, BinWrite, TryFromPrimitive, IntoPrimitive, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[brw(repr(u8))]
#[repr(u8)]
pub enum SubCode {
    Enable = 0x00,
    FeatureSelect = 0x01,
    Address = 0x02,
    ServiceUuid = 0x03,
    SolicitedUuid = 0x04,
    LocalName = 0x05,
    ManufacturerData = 0x06,
    ServiceData = 0x07,
    All = 0x08,
}

impl SubCode {
    /// Condition type whose counter a reply to this sub-command updates.
    pub fn condition_type(self) -> Option<ConditionType> {
        match self {
            SubCode::Enable | SubCode::FeatureSelect => None,
            SubCode::Address => Some(ConditionType::Address),
            SubCode::ServiceUuid => Some(ConditionType::ServiceUuid),
            SubCode::SolicitedUuid => Some(ConditionType::SolicitedUuid),
            SubCode::LocalName => Some(ConditionType::LocalName),
            SubCode::ManufacturerData => Some(ConditionType::ManufacturerData),
            SubCode::ServiceData => Some(ConditionType::ServiceDataPattern),
            SubCode::All => Some(ConditionType::All),
        }
    }
}

#[derive(TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ConditionType {
    Address = 0x00,
    ServiceData = 0x01,
    ServiceUuid = 0x02,
    SolicitedUuid = 0x03,
    LocalName = 0x04,
    ManufacturerData = 0x05,
    ServiceDataPattern = 0x06,
    All = 0x07,
}

impl ConditionType {
    pub fn counter_index(self) -> Option<usize> {
        match self {
            ConditionType::All => None,
            other => Some(u8::from(other) as usize),
        }
    }

    /// The controller keeps no per-device accounting for these.
    pub fn is_always_generic(self) -> bool {
        matches!(
            self,
            ConditionType::Address
                | ConditionType::ManufacturerData
                | ConditionType::LocalName
                | ConditionType::ServiceDataPattern
        )
    }

    pub fn sub_code(self) -> Option<SubCode> {
        match self {
            ConditionType::Address => Some(SubCode::Address),
            ConditionType::ServiceData => None,
            ConditionType::ServiceUuid => Some(SubCode::ServiceUuid),
            ConditionType::SolicitedUuid => Some(SubCode::SolicitedUuid),
            ConditionType::LocalName => Some(SubCode::LocalName),
            ConditionType::ManufacturerData => Some(SubCode::ManufacturerData),
            ConditionType::ServiceDataPattern => Some(SubCode::ServiceData),
            ConditionType::All => Some(SubCode::All),
        }
    }
}

/// Bluetooth base UUID, `00000000-0000-1000-8000-00805f9b34fb`.
pub const BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;
const BASE_UUID_LOW_MASK: u128 = (1u128 << 96) - 1;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum UuidWidth {
    Bits16 = 2,
    Bits32 = 4,
    Bits128 = 16,
}

impl UuidWidth {
    pub fn len(self) -> usize {
        self as usize
    }
}

pub type UuidBytes = heapless::Vec<u8, 16>;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Uuid(u128);

impl Uuid {
    pub const fn from_u16(value: u16) -> Self {
        Self(BASE_UUID | ((value as u128) << 96))
    }

    pub const fn from_u32(value: u32) -> Self {
        Self(BASE_UUID | ((value as u128) << 96))
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    /// Parses a UUID as it appears in advertising data: 2, 4 or 16 bytes, little-endian.
    pub fn from_le_slice(bytes: &[u8]) -> Result<Self, ApcfError> {
        match bytes.len() {
            2 => Ok(Self::from_u16(u16::from_le_bytes([bytes[0], bytes[1]]))),
            4 => Ok(Self::from_u32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))),
            16 => {
                let mut raw = [0u8; 16];
                raw.copy_from_slice(bytes);
                Ok(Self(u128::from_le_bytes(raw)))
            }
            n => Err(ApcfError::InvalidValue(MsgType(str_format!(
                MsgStr,
                "illegal UUID length: {}",
                n
            )))),
        }
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }

    pub fn as_u16(&self) -> u16 {
        (self.0 >> 96) as u16
    }

    pub fn as_u32(&self) -> u32 {
        (self.0 >> 96) as u32
    }

    pub fn shortest_width(&self) -> UuidWidth {
        if self.0 & BASE_UUID_LOW_MASK != BASE_UUID {
            UuidWidth::Bits128
        } else if self.0 >> 96 <= 0xffff {
            UuidWidth::Bits16
        } else {
            UuidWidth::Bits32
        }
    }

    pub fn to_le_bytes(&self, width: UuidWidth) -> UuidBytes {
        let mut out = UuidBytes::new();
        let res = match width {
            UuidWidth::Bits16 => out.extend_from_slice(&self.as_u16().to_le_bytes()),
            UuidWidth::Bits32 => out.extend_from_slice(&self.as_u32().to_le_bytes()),
            UuidWidth::Bits128 => out.extend_from_slice(&self.0.to_le_bytes()),
        };
        debug_assert!(res.is_ok());
        out
    }
}

/// Identity resolving key.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Irk(pub [u8; 16]);

impl Irk {
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 16]
    }
}

/// Identity information registered with the security store for a filter carrying an IRK.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IdentityKey {
    pub irk: Irk,
    pub identity_addr_type: AddrType,
    pub identity_addr: BdAddr,
}

/// One filter condition requested for a filter index.
///
/// Patterns and masks are raw bytes; anything past the controller's limit is dropped when
/// the condition is encoded. An empty mask means "match everything".
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum FilterCommand {
    Address {
        address: BdAddr,
        addr_type: AddrType,
        irk: Option<Irk>,
    },
    /// `uuid` and `mask` are little-endian, 2, 4 or 16 bytes long.
    ServiceUuid { uuid: Vec<u8>, mask: Vec<u8> },
    SolicitedUuid { uuid: Vec<u8>, mask: Vec<u8> },
    LocalName { name: Vec<u8> },
    ManufacturerData {
        company: u16,
        company_mask: u16,
        data: Vec<u8>,
        mask: Vec<u8>,
    },
    ServiceData,
    ServiceDataPattern { data: Vec<u8>, mask: Vec<u8> },
}

impl FilterCommand {
    pub fn condition_type(&self) -> ConditionType {
        match self {
            FilterCommand::Address { .. } => ConditionType::Address,
            FilterCommand::ServiceUuid { .. } => ConditionType::ServiceUuid,
            FilterCommand::SolicitedUuid { .. } => ConditionType::SolicitedUuid,
            FilterCommand::LocalName { .. } => ConditionType::LocalName,
            FilterCommand::ManufacturerData { .. } => ConditionType::ManufacturerData,
            FilterCommand::ServiceData => ConditionType::ServiceData,
            FilterCommand::ServiceDataPattern { .. } => ConditionType::ServiceDataPattern,
        }
    }

    /// Data pattern and mask lengths, for the conditions that carry them.
    pub fn pattern_lengths(&self) -> Option<(usize, usize)> {
        match self {
            FilterCommand::ManufacturerData { data, mask, .. }
            | FilterCommand::ServiceDataPattern { data, mask } => Some((data.len(), mask.len())),
            _ => None,
        }
    }

    /// A pattern and a mask supplied together must have the same length.
    pub fn check_mask(&self) -> Result<(), ApcfError> {
        match self.pattern_lengths() {
            Some((data, mask)) if data != 0 && mask != 0 && data != mask => {
                Err(ApcfError::InvalidValue(MsgType(str_format!(
                    MsgStr,
                    "data({}) and mask({}) are of different size",
                    data,
                    mask
                ))))
            }
            _ => Ok(()),
        }
    }
}

/// Feature-selection bits, one per condition type.
#[bitfield]
#[derive(BinWrite, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(map = |&x| Self::into_bytes(x))]
pub struct FeatureMask {
    pub address: bool,
    pub service_data: bool,
    pub service_uuid: bool,
    pub solicited_uuid: bool,
    pub local_name: bool,
    pub manufacturer_data: bool,
    pub service_data_pattern: bool,
    #[skip]
    __: B9,
}

impl FeatureMask {
    pub fn from_conditions(conditions: &[ConditionType]) -> Self {
        conditions.iter().fold(Self::new(), |mask, cond| match cond {
            ConditionType::Address => mask.with_address(true),
            ConditionType::ServiceData => mask.with_service_data(true),
            ConditionType::ServiceUuid => mask.with_service_uuid(true),
            ConditionType::SolicitedUuid => mask.with_solicited_uuid(true),
            ConditionType::LocalName => mask.with_local_name(true),
            ConditionType::ManufacturerData => mask.with_manufacturer_data(true),
            ConditionType::ServiceDataPattern => mask.with_service_data_pattern(true),
            ConditionType::All => Self::from_bytes([0x7f, 0x00]),
        })
    }
}

impl Default for FeatureMask {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(BinWrite, PartialEq, Eq, Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(repr(u8))]
pub enum DeliveryMode {
    #[default]
    Immediate = 0x00,
    OnFound = 0x01,
    Batched = 0x02,
}

/// Per filter-index tracking parameters applied by `configure`.
#[derive(PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FilterParams {
    pub feature_mask: FeatureMask,
    pub list_logic: u16,
    pub filter_logic: u8,
    pub rssi_high: i8,
    pub delivery_mode: DeliveryMode,
    pub found_timeout: u16,
    pub found_timeout_count: u8,
    pub rssi_low: i8,
    pub lost_timeout: u16,
    pub tracking_entries: u16,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            feature_mask: FeatureMask::new(),
            list_logic: 0,
            filter_logic: LOGIC_OR,
            rssi_high: -128,
            delivery_mode: DeliveryMode::Immediate,
            found_timeout: 0,
            found_timeout_count: 0,
            rssi_low: -128,
            lost_timeout: 0,
            tracking_entries: 0,
        }
    }
}

/// Snapshot of the controller's vendor capabilities, read once at start-up.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VendorCapabilities {
    pub filtering_supported: bool,
    pub max_filter: u8,
    pub version: u16,
}

impl VendorCapabilities {
    pub fn is_filtering_supported(&self) -> bool {
        self.filtering_supported && self.max_filter > 0
    }
}
