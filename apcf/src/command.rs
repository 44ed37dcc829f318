//! Parameter encoding for the vendor advertising packet content filter command, and decoding
//! of the parameters it returns in Command Complete.
//!
//! Every filter sub-command starts with a three byte header (sub-code, action, filter index)
//! followed by a body specific to the condition. A `Clear` sends the header alone.

use binrw::{binwrite, io::Cursor, BinRead, BinWrite};
use heapless::Vec;

use crate::host::AddressResolver;
use crate::types::{
    Action, AddrType, BdAddr, DeliveryMode, FeatureMask, FilterCommand, FilterParams, SubCode,
    Uuid, UuidBytes, CAPABILITY_L_VERSION, DEVICE_TYPE_ANY, LOGIC_OR, PF_STR_LEN_MAX,
};
use crate::{debug, trace, ApcfError};

pub const META_HDR_LENGTH: usize = 3;
/// Feature-selection body up to and including the lost timeout.
pub const FEAT_SELN_LEN: usize = 13;
pub const TRACK_NUM_LEN: usize = 2;
/// Feature-selection body of the select-none reset sent by a filter index clear.
pub const FEAT_SEL_RESET_LEN: usize = 18;

pub const CMD_PARAM_MAX_SIZE: usize = 255;
pub type ParamBuffer = Vec<u8, CMD_PARAM_MAX_SIZE>;

pub type PatternBuffer = Vec<u8, PF_STR_LEN_MAX>;

#[binwrite]
#[derive(PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(little)]
pub struct AddressCondition {
    pub address: BdAddr,
    #[bw(calc(DEVICE_TYPE_ANY))]
    device_type: u8,
}

#[derive(BinWrite, PartialEq, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(little)]
pub struct UuidCondition {
    #[bw(map = |x| x.as_slice())]
    pub uuid: UuidBytes,
    #[bw(map = |x| x.as_slice())]
    pub mask: UuidBytes,
}

#[derive(BinWrite, PartialEq, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(little)]
pub struct ManufacturerCondition {
    pub company: u16,
    #[bw(map = |x| x.as_slice())]
    pub data: PatternBuffer,
    pub company_mask: u16,
    #[bw(map = |x| x.as_slice())]
    pub mask: PatternBuffer,
}

#[derive(BinWrite, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(little)]
pub struct OnFoundParams {
    pub found_timeout: u16,
    pub found_timeout_count: u8,
    pub rssi_low: i8,
    pub lost_timeout: u16,
    pub tracking_entries: Option<u16>,
}

#[derive(BinWrite, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(little)]
pub struct FeatureSelection {
    pub feature_mask: FeatureMask,
    pub list_logic: u16,
    pub filter_logic: u8,
    pub rssi_high: i8,
    pub delivery_mode: DeliveryMode,
    pub on_found: Option<OnFoundParams>,
}

#[binwrite]
#[derive(PartialEq, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bw(little)]
pub enum ApcfCommand {
    #[bw(magic = 0x00u8)]
    Enable {
        #[bw(map = |x: &bool| if *x {0x01u8} else {0x00u8})]
        enable: bool,
    },

    #[bw(magic = 0x01u8)]
    FeatureSelect {
        action: Action,
        filter_index: Option<u8>,
        selection: Option<FeatureSelection>,
    },

    /// Select no feature for a filter index, logic OR.
    #[bw(magic = 0x01u8)]
    FeatureReset {
        #[bw(calc(Action::Clear))]
        action: Action,
        filter_index: u8,
        #[bw(calc(0u32))]
        selection: u32,
        #[bw(calc(LOGIC_OR))]
        logic: u8,
    },

    #[bw(magic = 0x02u8)]
    Address {
        action: Action,
        filter_index: u8,
        condition: Option<AddressCondition>,
    },

    #[bw(magic = 0x03u8)]
    ServiceUuid {
        action: Action,
        filter_index: u8,
        condition: Option<UuidCondition>,
    },

    #[bw(magic = 0x04u8)]
    SolicitedUuid {
        action: Action,
        filter_index: u8,
        condition: Option<UuidCondition>,
    },

    #[bw(magic = 0x05u8)]
    LocalName {
        action: Action,
        filter_index: u8,
        #[bw(map = |x| x.as_slice())]
        name: PatternBuffer,
    },

    #[bw(magic = 0x06u8)]
    ManufacturerData {
        action: Action,
        filter_index: u8,
        condition: Option<ManufacturerCondition>,
    },

    #[bw(magic = 0x07u8)]
    ServiceDataPattern {
        action: Action,
        filter_index: u8,
        #[bw(map = |x| x.as_slice())]
        data: PatternBuffer,
        #[bw(map = |x| x.as_slice())]
        mask: PatternBuffer,
    },
}

impl ApcfCommand {
    pub fn sub_code(&self) -> SubCode {
        use ApcfCommand::*;
        match self {
            Enable { .. } => SubCode::Enable,
            FeatureSelect { .. } | FeatureReset { .. } => SubCode::FeatureSelect,
            Address { .. } => SubCode::Address,
            ServiceUuid { .. } => SubCode::ServiceUuid,
            SolicitedUuid { .. } => SubCode::SolicitedUuid,
            LocalName { .. } => SubCode::LocalName,
            ManufacturerData { .. } => SubCode::ManufacturerData,
            ServiceDataPattern { .. } => SubCode::ServiceData,
        }
    }

    /// Encodes into a zero-filled scratch buffer; the result is at least `min_len` long.
    pub fn encode(&self, min_len: usize) -> Result<EncodedCommand, ApcfError> {
        let mut buf = [0u8; CMD_PARAM_MAX_SIZE];
        let mut writer = Cursor::new(&mut buf[..]);
        self.write(&mut writer)
            .map_err(|_| ApcfError::PacketFormatError)?;
        let len = core::cmp::max(writer.position() as usize, min_len);
        let params = ParamBuffer::from_slice(&buf[..len]).map_err(|_| ApcfError::PacketFormatError)?;
        trace!("encoded {:?} ({} bytes)", self.sub_code(), len);
        Ok(EncodedCommand {
            sub_code: self.sub_code(),
            params,
        })
    }
}

/// Parameters of one vendor filter command, and the sub-code its reply must echo.
#[derive(PartialEq, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncodedCommand {
    pub sub_code: SubCode,
    pub params: ParamBuffer,
}

fn truncated(bytes: &[u8], max: usize) -> PatternBuffer {
    let len = core::cmp::min(bytes.len(), max);
    // `max` never exceeds the buffer capacity
    PatternBuffer::from_slice(&bytes[..len]).unwrap_or_default()
}

/// Encodes a filter condition. Service data has no wire form and yields `None`.
pub fn encode_condition<R: AddressResolver + ?Sized>(
    action: Action,
    filter_index: u8,
    command: &FilterCommand,
    resolver: &R,
) -> Result<Option<EncodedCommand>, ApcfError> {
    let encoded = match command {
        FilterCommand::Address { address, addr_type, .. } => {
            encode_address(action, filter_index, *address, *addr_type, resolver)?
        }
        FilterCommand::ServiceUuid { uuid, mask } => {
            encode_uuid(SubCode::ServiceUuid, action, filter_index, uuid, mask)?
        }
        FilterCommand::SolicitedUuid { uuid, mask } => {
            encode_uuid(SubCode::SolicitedUuid, action, filter_index, uuid, mask)?
        }
        FilterCommand::LocalName { name } => encode_local_name(action, filter_index, name)?,
        FilterCommand::ManufacturerData {
            company,
            company_mask,
            data,
            mask,
        } => encode_manufacturer_data(action, filter_index, *company, *company_mask, data, mask)?,
        FilterCommand::ServiceData => return Ok(None),
        FilterCommand::ServiceDataPattern { data, mask } => {
            encode_service_data_pattern(action, filter_index, data, mask)?
        }
    };
    Ok(Some(encoded))
}

/// The address is resolved to its identity first, and the device type is always sent as
/// "any": a public or random type would miss advertisers reported under a resolved identity.
pub fn encode_address<R: AddressResolver + ?Sized>(
    action: Action,
    filter_index: u8,
    address: BdAddr,
    addr_type: AddrType,
    resolver: &R,
) -> Result<EncodedCommand, ApcfError> {
    let condition = if action != Action::Clear {
        let (identity, identity_type) = resolver.resolve_identity(address, addr_type);
        debug!("adding scan filter with peer address {:?} ({:?})", identity, identity_type);
        Some(AddressCondition { address: identity })
    } else {
        None
    };

    ApcfCommand::Address {
        action,
        filter_index,
        condition,
    }
    .encode(0)
}

/// The UUID goes out at its shortest width followed by a mask of the same width; no mask
/// means an exact match.
pub fn encode_uuid(
    sub_code: SubCode,
    action: Action,
    filter_index: u8,
    uuid: &[u8],
    mask: &[u8],
) -> Result<EncodedCommand, ApcfError> {
    let condition = if action != Action::Clear {
        let uuid = Uuid::from_le_slice(uuid)?;
        let width = uuid.shortest_width();
        let mask = if mask.is_empty() {
            UuidBytes::from_slice(&[0xffu8; 16][..width.len()]).unwrap_or_default()
        } else {
            Uuid::from_le_slice(mask)?.to_le_bytes(width)
        };
        Some(UuidCondition {
            uuid: uuid.to_le_bytes(width),
            mask,
        })
    } else {
        None
    };

    let cmd = if sub_code == SubCode::SolicitedUuid {
        ApcfCommand::SolicitedUuid {
            action,
            filter_index,
            condition,
        }
    } else {
        ApcfCommand::ServiceUuid {
            action,
            filter_index,
            condition,
        }
    };
    cmd.encode(0)
}

pub fn encode_local_name(
    action: Action,
    filter_index: u8,
    name: &[u8],
) -> Result<EncodedCommand, ApcfError> {
    let name = if action != Action::Clear {
        truncated(name, PF_STR_LEN_MAX)
    } else {
        PatternBuffer::new()
    };
    ApcfCommand::LocalName {
        action,
        filter_index,
        name,
    }
    .encode(0)
}

/// Pattern and data mask are only sent when both are present.
pub fn encode_manufacturer_data(
    action: Action,
    filter_index: u8,
    company: u16,
    company_mask: u16,
    data: &[u8],
    mask: &[u8],
) -> Result<EncodedCommand, ApcfError> {
    let condition = if action != Action::Clear {
        let (data, mask) = if !data.is_empty() && !mask.is_empty() {
            let size = core::cmp::min(data.len(), PF_STR_LEN_MAX - 2);
            (truncated(data, size), truncated(mask, size))
        } else {
            (PatternBuffer::new(), PatternBuffer::new())
        };
        Some(ManufacturerCondition {
            company,
            data,
            company_mask: if company_mask != 0 { company_mask } else { 0xffff },
            mask,
        })
    } else {
        None
    };

    let encoded = ApcfCommand::ManufacturerData {
        action,
        filter_index,
        condition,
    }
    .encode(0)?;
    debug!("manufacturer data length: {}", encoded.params.len());
    Ok(encoded)
}

/// A missing mask matches the whole pattern.
pub fn encode_service_data_pattern(
    action: Action,
    filter_index: u8,
    data: &[u8],
    mask: &[u8],
) -> Result<EncodedCommand, ApcfError> {
    let (data, mask) = if action != Action::Clear && !data.is_empty() {
        let data = truncated(data, PF_STR_LEN_MAX - 2);
        let mask = if mask.is_empty() {
            truncated(&[0xffu8; PF_STR_LEN_MAX][..data.len()], data.len())
        } else {
            truncated(mask, data.len())
        };
        (data, mask)
    } else {
        (PatternBuffer::new(), PatternBuffer::new())
    };

    ApcfCommand::ServiceDataPattern {
        action,
        filter_index,
        data,
        mask,
    }
    .encode(0)
}

/// Feature selection for `configure(Add)`. The frame keeps its fixed length for the
/// controller version; fields that don't apply stay zero.
pub fn encode_feature_select(
    filter_index: u8,
    params: &FilterParams,
    version: u16,
) -> Result<EncodedCommand, ApcfError> {
    let on_found = (params.delivery_mode == DeliveryMode::OnFound).then(|| OnFoundParams {
        found_timeout: params.found_timeout,
        found_timeout_count: params.found_timeout_count,
        rssi_low: params.rssi_low,
        lost_timeout: params.lost_timeout,
        tracking_entries: (version > CAPABILITY_L_VERSION).then_some(params.tracking_entries),
    });

    let frame_len = if version == CAPABILITY_L_VERSION {
        META_HDR_LENGTH + FEAT_SELN_LEN
    } else {
        META_HDR_LENGTH + FEAT_SELN_LEN + TRACK_NUM_LEN
    };

    debug!("feature mask: {:?}", params.feature_mask);
    ApcfCommand::FeatureSelect {
        action: Action::Add,
        filter_index: Some(filter_index),
        selection: Some(FeatureSelection {
            feature_mask: params.feature_mask,
            list_logic: params.list_logic,
            filter_logic: params.filter_logic,
            rssi_high: params.rssi_high,
            delivery_mode: params.delivery_mode,
            on_found,
        }),
    }
    .encode(frame_len)
}

pub fn encode_feature_delete(filter_index: u8) -> Result<EncodedCommand, ApcfError> {
    ApcfCommand::FeatureSelect {
        action: Action::Delete,
        filter_index: Some(filter_index),
        selection: None,
    }
    .encode(0)
}

/// Clears the feature selection of every filter index; carries no index.
pub fn encode_feature_clear_all() -> Result<EncodedCommand, ApcfError> {
    ApcfCommand::FeatureSelect {
        action: Action::Clear,
        filter_index: None,
        selection: None,
    }
    .encode(0)
}

pub fn encode_feature_reset(filter_index: u8) -> Result<EncodedCommand, ApcfError> {
    ApcfCommand::FeatureReset { filter_index }.encode(META_HDR_LENGTH + FEAT_SEL_RESET_LEN)
}

pub fn encode_enable(enable: bool) -> Result<EncodedCommand, ApcfError> {
    ApcfCommand::Enable { enable }.encode(0)
}

pub const COMPLETION_REPLY_LEN: usize = 4;
pub const ENABLE_REPLY_LEN: usize = 3;

/// Command Complete parameters of every sub-command except enable.
#[derive(BinRead, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[br(little)]
pub struct CompletionReply {
    pub status: u8,
    pub sub_code: u8,
    pub action: u8,
    pub available: u8,
}

impl CompletionReply {
    pub fn decode(bytes: &[u8]) -> Result<Self, ApcfError> {
        if bytes.len() != COMPLETION_REPLY_LEN {
            return Err(ApcfError::BadLength(bytes.len()));
        }
        Self::read(&mut Cursor::new(bytes)).map_err(|_| ApcfError::PacketFormatError)
    }
}

#[derive(BinRead, PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[br(little)]
pub struct EnableReply {
    pub status: u8,
    pub sub_code: u8,
    pub action: u8,
}

impl EnableReply {
    pub fn decode(bytes: &[u8]) -> Result<Self, ApcfError> {
        if bytes.len() != ENABLE_REPLY_LEN {
            return Err(ApcfError::BadLength(bytes.len()));
        }
        Self::read(&mut Cursor::new(bytes)).map_err(|_| ApcfError::PacketFormatError)
    }
}
