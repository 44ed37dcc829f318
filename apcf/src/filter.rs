use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::binding::FilterBindings;
use crate::command::{self, EncodedCommand};
use crate::correlator::{ConfigCallback, Correlator, Notify, RequestId, StatusCallback};
use crate::counter::CounterTable;
use crate::hci::opcodes;
use crate::host::{AddressResolver, CapabilityProvider, SecurityStore, Transport};
use crate::types::{
    Action, BdAddr, ConditionType, FilterCommand, FilterParams, SubCode, VendorCapabilities,
};
use crate::{debug, error, warn, ApcfError, OP_CONFIG, OP_ENABLE};

/// What happened to one command of an [`AdvFilter::install`] batch.
#[derive(PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandOutcome {
    pub condition: ConditionType,
    /// The request the condition went out under; `None` for conditions that have no wire
    /// form.
    pub sent: Result<Option<RequestId>, ApcfError>,
    /// Outcome of registering the IRK of an address condition, if it carried one.
    pub binding: Option<Result<(), ApcfError>>,
}

#[derive(PartialEq, Clone, Debug, Default)]
pub struct InstallReport {
    pub outcomes: Vec<CommandOutcome>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.sent.is_ok() && !matches!(o.binding, Some(Err(_))))
    }

    pub fn failures(&self) -> impl Iterator<Item = &CommandOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.sent.is_err() || matches!(o.binding, Some(Err(_))))
    }
}

/// What [`AdvFilter::clear`] sent.
#[derive(PartialEq, Clone, Debug)]
pub struct ClearReport {
    /// The FeatureSelect reset that ends the clear; its reply fires the caller's notification.
    pub reset: RequestId,
    /// Condition clears that could not be sent.
    pub skipped: Vec<(SubCode, ApcfError)>,
}

impl ClearReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Advertising packet content filter control.
///
/// Owns the resource counters, the outstanding requests, and the IRK bindings; the host
/// feeds every Command Complete of the vendor filter command back through
/// [`on_command_complete`](Self::on_command_complete).
pub struct AdvFilter<T, S, R> {
    caps: VendorCapabilities,
    pub transport: T,
    pub store: S,
    pub resolver: R,
    counters: CounterTable,
    correlator: Correlator,
    bindings: FilterBindings,
}

impl<T, S, R> AdvFilter<T, S, R>
where
    T: Transport,
    S: SecurityStore,
    R: AddressResolver,
{
    pub fn new<P: CapabilityProvider + ?Sized>(
        provider: &mut P,
        transport: T,
        store: S,
        resolver: R,
    ) -> Self {
        let caps = provider.vendor_capabilities();
        let max_filter = if caps.is_filtering_supported() { caps.max_filter } else { 0 };
        debug!("vendor capabilities {:?}", caps);
        Self {
            caps,
            transport,
            store,
            resolver,
            counters: CounterTable::new(max_filter),
            correlator: Correlator::new(),
            bindings: FilterBindings::new(),
        }
    }

    pub fn capabilities(&self) -> &VendorCapabilities {
        &self.caps
    }

    pub fn is_filtering_supported(&self) -> bool {
        self.caps.is_filtering_supported()
    }

    pub fn counters(&self) -> &CounterTable {
        &self.counters
    }

    pub fn bindings(&self) -> &FilterBindings {
        &self.bindings
    }

    pub fn outstanding(&self) -> usize {
        self.correlator.outstanding()
    }

    fn dispatch(
        &mut self,
        encoded: EncodedCommand,
        target: Option<BdAddr>,
        notify: Notify,
    ) -> Result<RequestId, ApcfError> {
        let request = self.correlator.register(encoded.sub_code, target, notify);
        if let Err(e) = self
            .transport
            .send(request, opcodes::LE_ADV_FILTER, &encoded.params)
        {
            error!("send of {:?} failed: {:?}", request, e);
            if let Some(notify) = self.correlator.cancel(request) {
                notify.fail(e);
            }
            return Err(e);
        }
        Ok(request)
    }

    /// Encodes and sends one condition. Service data only moves the counters.
    fn send_condition(
        &mut self,
        action: Action,
        filter_index: u8,
        target: Option<BdAddr>,
        command: &FilterCommand,
        notify: Option<ConfigCallback>,
    ) -> Result<Option<RequestId>, ApcfError> {
        let encoded = match command::encode_condition(action, filter_index, command, &self.resolver) {
            Ok(Some(encoded)) => encoded,
            Ok(None) => {
                let available = if action == Action::Add { 0 } else { 1 };
                self.counters
                    .update(action, ConditionType::ServiceData, target.as_ref(), available);
                if let Some(cb) = notify {
                    cb(available, action.into(), Ok(()));
                }
                return Ok(None);
            }
            Err(e) => {
                error!("{:?} not sent: {:?}", command.condition_type(), e);
                Notify::Config(notify).fail(e);
                return Err(e);
            }
        };

        // the frame carries the identity, so its counters are kept under it too
        let target = match command {
            FilterCommand::Address { address, addr_type, .. } => {
                Some(self.resolver.resolve_identity(*address, *addr_type).0)
            }
            _ => target,
        };
        self.dispatch(encoded, target, Notify::Config(notify)).map(Some)
    }

    /// Adds, deletes or clears a single condition of `filter_index`.
    ///
    /// `target` ties the condition's resource accounting to one device; conditions the
    /// controller only counts globally ignore it.
    ///
    /// An address Add carrying an IRK binds the device to `filter_index` before the frame
    /// goes out, and nothing is sent if that fails. Deleting the bound address, or clearing
    /// the index's addresses, drops the binding again.
    pub fn update_condition(
        &mut self,
        action: Action,
        filter_index: u8,
        target: Option<BdAddr>,
        command: &FilterCommand,
        notify: impl FnOnce(u8, u8, Result<(), ApcfError>) + 'static,
    ) -> Result<Option<RequestId>, ApcfError> {
        if !self.is_filtering_supported() {
            notify(0, OP_ENABLE, Err(ApcfError::Unsupported));
            return Err(ApcfError::Unsupported);
        }
        if let Err(e) = command.check_mask() {
            notify(0, OP_CONFIG, Err(e));
            return Err(e);
        }

        let bound = match (action, command) {
            (
                Action::Add,
                FilterCommand::Address {
                    address,
                    addr_type,
                    irk: Some(irk),
                },
            ) if !irk.is_empty() => {
                if let Err(e) =
                    self.bindings
                        .bind(&mut self.store, filter_index, *address, *addr_type, *irk)
                {
                    error!("binding filter index {} failed: {:?}", filter_index, e);
                    notify(0, OP_CONFIG, Err(e));
                    return Err(e);
                }
                true
            }
            _ => false,
        };

        let sent = self.send_condition(action, filter_index, target, command, Some(Box::new(notify)));
        match (&sent, command) {
            (Err(_), _) if bound => {
                self.bindings.release(&mut self.store, filter_index);
            }
            (Ok(_), FilterCommand::Address { address, .. }) if action != Action::Add => {
                let release = action == Action::Clear || self.bindings.get(filter_index) == Some(address);
                if release {
                    if let Some(address) = self.bindings.release(&mut self.store, filter_index) {
                        debug!("released binding of filter index {} to {:?}", filter_index, address);
                    }
                }
            }
            _ => {}
        }
        sent
    }

    /// Adds every condition in `commands` to `filter_index`.
    ///
    /// Commands that can't be sent are skipped and show up in the returned report; `notify`
    /// fires once, right away, with success regardless.
    pub fn install(
        &mut self,
        filter_index: u8,
        commands: &[FilterCommand],
        notify: impl FnOnce(u8, u8, Result<(), ApcfError>),
    ) -> InstallReport {
        let mut report = InstallReport::default();
        if !self.is_filtering_supported() {
            notify(0, OP_ENABLE, Err(ApcfError::Unsupported));
            return report;
        }

        let action = Action::Add;
        for cmd in commands {
            let condition = cmd.condition_type();
            if let Err(e) = cmd.check_mask() {
                error!("skipping {:?}: {:?}", condition, e);
                report.outcomes.push(CommandOutcome {
                    condition,
                    sent: Err(e),
                    binding: None,
                });
                continue;
            }

            let sent = self.send_condition(action, filter_index, None, cmd, None);

            let binding = match cmd {
                FilterCommand::Address {
                    address,
                    addr_type,
                    irk: Some(irk),
                } if !irk.is_empty() => Some(self.bindings.bind(
                    &mut self.store,
                    filter_index,
                    *address,
                    *addr_type,
                    *irk,
                )),
                _ => None,
            };

            report.outcomes.push(CommandOutcome {
                condition,
                sent,
                binding,
            });
        }

        notify(0, 0, Ok(()));
        report
    }

    /// Clears every condition of `filter_index` and deselects all of its features.
    ///
    /// Every clear frame is attempted; the ones the transport refuses are logged and listed
    /// in the report. The binding of the index is always dropped. Only a reset that could not
    /// be sent is an error, and `notify` then fires with it.
    pub fn clear(
        &mut self,
        filter_index: u8,
        notify: impl FnOnce(u8, u8, Result<(), ApcfError>) + 'static,
    ) -> Result<ClearReport, ApcfError> {
        if !self.is_filtering_supported() {
            notify(0, OP_ENABLE, Err(ApcfError::Unsupported));
            return Err(ApcfError::Unsupported);
        }

        let skipped = self.clear_conditions(filter_index);

        if let Some(address) = self.bindings.release(&mut self.store, filter_index) {
            debug!("released binding of filter index {} to {:?}", filter_index, address);
        }

        let encoded = match command::encode_feature_reset(filter_index) {
            Ok(encoded) => encoded,
            Err(e) => {
                notify(0, OP_CONFIG, Err(e));
                return Err(e);
            }
        };
        let reset = self.dispatch(encoded, None, Notify::Config(Some(Box::new(notify))))?;
        Ok(ClearReport { reset, skipped })
    }

    fn clear_conditions(&mut self, filter_index: u8) -> Vec<(SubCode, ApcfError)> {
        let clear = Action::Clear;
        let mut skipped = Vec::new();

        let conditions = [
            (
                SubCode::ManufacturerData,
                command::encode_manufacturer_data(clear, filter_index, 0, 0, &[], &[]),
            ),
            (SubCode::LocalName, command::encode_local_name(clear, filter_index, &[])),
        ];
        self.send_clears(conditions, &mut skipped);

        self.counters
            .update(clear, ConditionType::ServiceData, None, 1);

        let conditions = [
            (
                SubCode::ServiceUuid,
                command::encode_uuid(SubCode::ServiceUuid, clear, filter_index, &[], &[]),
            ),
            (
                SubCode::SolicitedUuid,
                command::encode_uuid(SubCode::SolicitedUuid, clear, filter_index, &[], &[]),
            ),
            (
                SubCode::ServiceData,
                command::encode_service_data_pattern(clear, filter_index, &[], &[]),
            ),
        ];
        self.send_clears(conditions, &mut skipped);
        skipped
    }

    fn send_clears<const N: usize>(
        &mut self,
        conditions: [(SubCode, Result<EncodedCommand, ApcfError>); N],
        skipped: &mut Vec<(SubCode, ApcfError)>,
    ) {
        for (sub_code, encoded) in conditions {
            let sent = encoded.and_then(|encoded| self.dispatch(encoded, None, Notify::none()));
            if let Err(e) = sent {
                warn!("skipping clear of {:?}: {:?}", sub_code, e);
                skipped.push((sub_code, e));
            }
        }
    }

    /// Sets up (`Add`), removes (`Delete`) or wipes (`Clear`, every index) the feature
    /// selection and tracking parameters of `filter_index`.
    pub fn configure(
        &mut self,
        action: Action,
        filter_index: u8,
        params: &FilterParams,
        notify: impl FnOnce(u8, u8, Result<(), ApcfError>) + 'static,
    ) -> Result<RequestId, ApcfError> {
        if !self.is_filtering_supported() {
            notify(0, OP_ENABLE, Err(ApcfError::Unsupported));
            return Err(ApcfError::Unsupported);
        }

        let notify: ConfigCallback = Box::new(notify);
        match action {
            Action::Add => {
                if self.counters.claim_generic().is_none() {
                    error!("BD Address not found!");
                    notify(0, OP_ENABLE, Err(ApcfError::UnknownAddress));
                    return Err(ApcfError::UnknownAddress);
                }
                let encoded = command::encode_feature_select(filter_index, params, self.caps.version)?;
                self.dispatch(encoded, None, Notify::Config(Some(notify)))
            }
            Action::Delete => {
                let encoded = command::encode_feature_delete(filter_index)?;
                let request = self.dispatch(encoded, None, Notify::Config(Some(notify)))?;
                if let Some(address) = self.bindings.release(&mut self.store, filter_index) {
                    warn!("filter index {} deleted, dropped binding to {:?}", filter_index, address);
                }
                Ok(request)
            }
            Action::Clear => {
                self.counters.release_all();
                let encoded = command::encode_feature_clear_all()?;
                self.dispatch(encoded, None, Notify::Config(Some(notify)))
            }
        }
    }

    /// Turns the filtering feature on or off.
    pub fn enable(
        &mut self,
        enable: bool,
        notify: impl FnOnce(u8, Result<(), ApcfError>) + 'static,
    ) -> Result<RequestId, ApcfError> {
        if !self.is_filtering_supported() {
            notify(OP_ENABLE, Err(ApcfError::Unsupported));
            return Err(ApcfError::Unsupported);
        }
        let notify: StatusCallback = Box::new(notify);
        let encoded = command::encode_enable(enable)?;
        self.dispatch(encoded, None, Notify::Status(notify))
    }

    /// Feeds the Command Complete return parameters of `request` back in.
    ///
    /// Errors describe replies that were dropped; their notifications never fire.
    pub fn on_command_complete(&mut self, request: RequestId, reply: &[u8]) -> Result<(), ApcfError> {
        self.correlator.complete(request, reply, &mut self.counters)
    }
}
