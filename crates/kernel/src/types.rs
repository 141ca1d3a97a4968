//! Shared data model.

use crate::clock::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type SpeakerId = u64;
pub type ExpressionId = u64;
pub type RequestId = u64;
pub type EntryId = u64;

/// Identity 0 is root, created at kernel boot.
pub const ROOT_SPEAKER: SpeakerId = 0;

/// The dynamic value domain a variable (or any recorded state) can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Status(Status),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "none"),
            Value::Status(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Value {
    /// Truthiness used by conditions: the sentinel false value is `Bool(false)`;
    /// `Null` and numeric zero are *not* automatically false — Logica has no
    /// implicit numeric truthiness, only an explicit boolean domain.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false) | Value::Null)
    }
}

/// The three-valued result of an expression evaluation, plus the break
/// reason travelling with a broken status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Status {
    Active,
    Inactive,
    Broken(BreakReason),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Active => write!(f, "active"),
            Status::Inactive => write!(f, "inactive"),
            Status::Broken(_) => write!(f, "broken"),
        }
    }
}

/// The closed set of kernel break reasons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BreakReason {
    SpeakerNotFoundOrSuspended,
    CallerNotAuthenticated,
    TargetNotFound,
    RequestNotFound,
    NotTargetSpeaker,
    NotRoot,
    WriteOwnershipViolation,
    WriteFailed,
    ActionNotFulfilled,
    MaxIterationsExceeded(u64),
}

impl fmt::Display for BreakReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakReason::SpeakerNotFoundOrSuspended => write!(f, "speaker_not_found_or_suspended"),
            BreakReason::CallerNotAuthenticated => write!(f, "caller_not_authenticated"),
            BreakReason::TargetNotFound => write!(f, "target_not_found"),
            BreakReason::RequestNotFound => write!(f, "request_not_found"),
            BreakReason::NotTargetSpeaker => write!(f, "not_target_speaker"),
            BreakReason::NotRoot => write!(f, "not_root"),
            BreakReason::WriteOwnershipViolation => write!(f, "write_ownership_violation"),
            BreakReason::WriteFailed => write!(f, "write_failed"),
            BreakReason::ActionNotFulfilled => write!(f, "action_not_fulfilled"),
            BreakReason::MaxIterationsExceeded(n) => write!(f, "max_iterations_{n}_exceeded"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeakerStatus {
    Alive,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Speaker {
    pub id: SpeakerId,
    pub name: String,
    pub created_at: Timestamp,
    pub status: SpeakerStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Version {
    Current,
    Superseded,
    Expired,
}

/// A condition attached to an expression. Implemented by the runtime bridge
/// over an AST subtree — the kernel only ever sees the trait object.
pub trait Condition: fmt::Debug {
    fn evaluate(&self) -> bool;
}

/// An action attached to an expression. `Err` models "raised/signaled
/// failure"; `Ok(fulfilled)` carries the action's fulfillment bit.
pub trait Action: fmt::Debug {
    fn perform(&self) -> Result<bool, String>;
}

/// A trivial condition/action used by kernel-internal submissions (`speak`,
/// `seal`, boot bookkeeping) that always succeed without consulting any AST.
#[derive(Debug, Clone, Copy)]
pub struct AlwaysTrue;

impl Condition for AlwaysTrue {
    fn evaluate(&self) -> bool {
        true
    }
}

impl Action for AlwaysTrue {
    fn perform(&self) -> Result<bool, String> {
        Ok(true)
    }
}

pub struct Expression {
    pub id: ExpressionId,
    pub speaker: SpeakerId,
    pub condition: Option<Box<dyn Condition>>,
    pub condition_label: String,
    pub action: String,
    pub action_fn: Option<Box<dyn Action>>,
    pub created_at: Timestamp,
    pub version: Version,
    pub status: Option<Status>,
    pub is_refusal: bool,
    pub scope_until: Option<Timestamp>,
    pub loop_condition: Option<Box<dyn Condition>>,
    pub loop_max: Option<u64>,
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("id", &self.id)
            .field("speaker", &self.speaker)
            .field("condition_label", &self.condition_label)
            .field("action", &self.action)
            .field("version", &self.version)
            .field("status", &self.status)
            .field("is_refusal", &self.is_refusal)
            .finish()
    }
}

/// The equivalence class used for supersession: resubmitting an expression
/// under the same key replaces whichever expression last held it. Brittle,
/// since it hinges on a human-authored label, but preserved as-is.
pub type SupersessionKey = (SpeakerId, String, String);

impl Expression {
    pub fn supersession_key(&self) -> SupersessionKey {
        (self.speaker, self.condition_label.clone(), self.action.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: EntryId,
    pub speaker_id: SpeakerId,
    pub operation: String,
    pub condition: Option<String>,
    pub condition_result: Option<bool>,
    pub action: String,
    pub status: Option<Status>,
    pub state_before: Option<Value>,
    pub state_after: Option<Value>,
    pub timestamp: Timestamp,
    pub prev_hash: String,
    pub entry_hash: String,
    pub break_reason: Option<BreakReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Accepted,
    Refused,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub request_id: RequestId,
    pub from_speaker: SpeakerId,
    pub to_speaker: SpeakerId,
    pub action: String,
    pub data: Option<Value>,
    pub status: RequestStatus,
    pub created_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub response_data: Option<Value>,
}
