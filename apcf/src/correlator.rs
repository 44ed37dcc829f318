//! Pairs Command Complete replies with the request that caused them.
//!
//! Each outstanding command owns a context (expected sub-code, target device, notification)
//! stored under its [`RequestId`], so replies never depend on what was sent after them.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;

use crate::command::{CompletionReply, EnableReply};
use crate::counter::CounterTable;
use crate::types::{Action, BdAddr, SubCode};
use crate::{debug, error, warn, ApcfError, OP_CONFIG, OP_ENABLE};

/// Notification for filter configuration commands: `(available, action, result)`.
pub type ConfigCallback = Box<dyn FnOnce(u8, u8, Result<(), ApcfError>)>;
/// Notification for the enable command: `(action, result)`.
pub type StatusCallback = Box<dyn FnOnce(u8, Result<(), ApcfError>)>;

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RequestId {
    pub sub_code: SubCode,
    pub generation: u16,
}

pub enum Notify {
    Config(Option<ConfigCallback>),
    Status(StatusCallback),
}

impl Notify {
    pub fn none() -> Self {
        Notify::Config(None)
    }

    /// Reports a failure that happened before the controller saw the command.
    pub fn fail(self, err: ApcfError) {
        match self {
            Notify::Config(Some(cb)) => cb(0, OP_CONFIG, Err(err)),
            Notify::Config(None) => {}
            Notify::Status(cb) => cb(OP_ENABLE, Err(err)),
        }
    }
}

impl core::fmt::Debug for Notify {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Notify::Config(cb) => write!(f, "Config({})", if cb.is_some() { "cb" } else { "-" }),
            Notify::Status(_) => write!(f, "Status(cb)"),
        }
    }
}

#[derive(Debug)]
struct Pending {
    target: Option<BdAddr>,
    notify: Notify,
}

#[derive(Debug, Default)]
pub struct Correlator {
    pending: BTreeMap<RequestId, Pending>,
    generation: u16,
}

fn status_result(status: u8) -> Result<(), ApcfError> {
    if status == 0 {
        Ok(())
    } else {
        Err(ApcfError::ProcessingError(status))
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        sub_code: SubCode,
        target: Option<BdAddr>,
        notify: Notify,
    ) -> RequestId {
        let request = RequestId {
            sub_code,
            generation: self.generation,
        };
        self.generation = self.generation.wrapping_add(1);
        if self.pending.insert(request, Pending { target, notify }).is_some() {
            warn!("request {:?} reused while still outstanding", request);
        }
        request
    }

    /// Forgets a request the transport refused, handing back its notification.
    pub fn cancel(&mut self, request: RequestId) -> Option<Notify> {
        self.pending.remove(&request).map(|p| p.notify)
    }

    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// Handles the return parameters of `request`.
    ///
    /// A reply of the wrong length or echoing another sub-code is logged and dropped along
    /// with the request; its notification never fires.
    pub fn complete(
        &mut self,
        request: RequestId,
        reply: &[u8],
        counters: &mut CounterTable,
    ) -> Result<(), ApcfError> {
        let Some(pending) = self.pending.remove(&request) else {
            error!("reply for unknown request {:?}", request);
            return Err(ApcfError::UnknownRequest);
        };

        match pending.notify {
            Notify::Status(cb) => {
                let reply = EnableReply::decode(reply).inspect_err(|e| {
                    error!("APCF callback length = {}: {:?}", reply.len(), e);
                })?;
                if reply.sub_code != u8::from(SubCode::Enable) {
                    error!("bad subcode: {:#x}", reply.sub_code);
                    return Err(ApcfError::ProtocolMismatch {
                        expected: SubCode::Enable,
                        received: reply.sub_code,
                    });
                }
                cb(reply.action, status_result(reply.status));
                Ok(())
            }
            Notify::Config(cb) => {
                let reply = CompletionReply::decode(reply).inspect_err(|e| {
                    error!("bad length: {}: {:?}", reply.len(), e);
                })?;
                if reply.sub_code != u8::from(request.sub_code) {
                    error!(
                        "incorrect opcode: {:#x}, expected: {:?}",
                        reply.sub_code, request.sub_code
                    );
                    return Err(ApcfError::ProtocolMismatch {
                        expected: request.sub_code,
                        received: reply.sub_code,
                    });
                }

                let result = status_result(reply.status);
                debug!(
                    "recd: {:?} action {} status {} avail {}",
                    request.sub_code, reply.action, reply.status, reply.available
                );

                if let (Ok(()), Some(condition)) = (result, request.sub_code.condition_type()) {
                    match Action::try_from(reply.action) {
                        Ok(action) => {
                            counters.update(action, condition, pending.target.as_ref(), reply.available);
                        }
                        Err(_) => warn!("unknown echoed action {}", reply.action),
                    }
                }

                if let Some(cb) = cb {
                    cb(reply.available, reply.action, result);
                }
                Ok(())
            }
        }
    }
}
