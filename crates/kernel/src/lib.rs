//! Trust kernel — speaker registry, partitioned memory, hash-chained
//! ledger, request bus, and three-valued expression evaluation.

pub mod bus;
pub mod clock;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod facade;
pub mod ledger;
pub mod memory;
pub mod registry;
pub mod types;

pub use bus::{RequestBus, RespondError};
pub use clock::{Clock, SimulatedClock, SystemClock, Timestamp};
pub use config::KernelConfig;
pub use error::{KernelError, Result};
pub use facade::{ExpressionSummary, Kernel, SpeakerInspection, VariableInspection};
pub use ledger::Ledger;
pub use memory::Memory;
pub use registry::Registry;
pub use types::{
    Action, AlwaysTrue, BreakReason, Condition, EntryId, Expression, ExpressionId, LedgerEntry,
    Request, RequestId, RequestStatus, Speaker, SpeakerId, SpeakerStatus, Status,
    SupersessionKey, Value, Version, ROOT_SPEAKER,
};
