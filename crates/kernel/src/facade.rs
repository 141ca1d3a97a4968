//! The `Kernel` façade. The single entry point wiring the
//! registry, memory, ledger and request bus together; every other crate in
//! the workspace talks to the trust root only through this surface.
//!
//! Every substore lives behind its own `Rc<RefCell<_>>`, so `Kernel` is a
//! cheap, `Clone`-able handle rather than an owned value. That is what makes
//! reentrancy actually work: an action closure
//! invoked mid-evaluation can hold its own cloned `Kernel` handle and call
//! back in (e.g. `write`) safely, because no method here ever holds a
//! `borrow`/`borrow_mut` guard across a call into user code — every borrow
//! is acquired, used, and dropped within a single statement.

use crate::bus::{RequestBus, RespondError};
use crate::clock::{Clock, Timestamp};
use crate::config::KernelConfig;
use crate::evaluator;
use crate::ledger::{AppendFields, Ledger};
use crate::memory::Memory;
use crate::registry::Registry;
use crate::types::{
    BreakReason, Expression, ExpressionId, LedgerEntry, Request, RequestId, Speaker, SpeakerId,
    Status, SupersessionKey, Value, ROOT_SPEAKER,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// A point-in-time view of one current expression, returned as part of
/// [`SpeakerInspection`].
#[derive(Debug, Clone)]
pub struct ExpressionSummary {
    pub id: ExpressionId,
    pub speaker: SpeakerId,
    pub condition_label: String,
    pub action: String,
    pub status: Option<Status>,
}

/// Return value of [`Kernel::inspect_speaker`].
#[derive(Debug, Clone)]
pub struct SpeakerInspection {
    pub speaker: Speaker,
    pub variables: Vec<String>,
    pub pending_requests: usize,
    pub expressions: Vec<ExpressionSummary>,
}

/// Return value of [`Kernel::inspect_variable`].
#[derive(Debug, Clone)]
pub struct VariableInspection {
    pub value: Value,
    pub history: Vec<LedgerEntry>,
}

#[derive(Debug, Clone)]
pub struct Kernel {
    config: Rc<KernelConfig>,
    clock: Rc<dyn Clock>,
    registry: Rc<RefCell<Registry>>,
    memory: Rc<RefCell<Memory>>,
    ledger: Rc<RefCell<Ledger>>,
    bus: Rc<RefCell<RequestBus>>,
    expressions: Rc<RefCell<HashMap<SupersessionKey, ExpressionSummary>>>,
    next_expr_id: Rc<RefCell<ExpressionId>>,
}

impl Kernel {
    /// Boots the kernel: creates the root speaker (id 0), its memory
    /// partition, and appends the genesis-linked `boot` ledger entry.
    pub fn new(config: KernelConfig, clock: Rc<dyn Clock>) -> Self {
        let mut registry = Registry::new();
        let mut memory = Memory::new();
        let mut ledger = Ledger::new(config.hash_hex_len);

        let root = registry.create("root", &*clock);
        debug_assert_eq!(root.id, ROOT_SPEAKER);
        memory.create_partition(root.id);
        ledger.append(
            AppendFields {
                speaker_id: root.id,
                operation: "boot".to_string(),
                action: "boot".to_string(),
                status: Some(Status::Active),
                ..Default::default()
            },
            &*clock,
        );

        Self {
            config: Rc::new(config),
            clock,
            registry: Rc::new(RefCell::new(registry)),
            memory: Rc::new(RefCell::new(memory)),
            ledger: Rc::new(RefCell::new(ledger)),
            bus: Rc::new(RefCell::new(RequestBus::new())),
            expressions: Rc::new(RefCell::new(HashMap::new())),
            next_expr_id: Rc::new(RefCell::new(0)),
        }
    }

    /// Supersession bookkeeping ahead of evaluation: assigns `expr.id` if
    /// unset, and if a current expression already occupies the same
    /// `(speaker, condition_label, action)` key, appends a `supersede` entry
    /// referencing the outgoing and incoming ids before this one takes over
    /// as current. Only the current-expression-set is inspected — no check
    /// that the prior expression reached a terminal ledger state first.
    fn supersede_if_needed(&self, expr: &mut Expression) {
        if expr.id == 0 {
            let mut next = self.next_expr_id.borrow_mut();
            *next += 1;
            expr.id = *next;
        }
        let key = expr.supersession_key();
        let prior = self.expressions.borrow().get(&key).map(|e| e.id);
        if let Some(old_id) = prior {
            if old_id != expr.id {
                let mut fields = BTreeMap::new();
                fields.insert("old".to_string(), Value::Int(old_id as i64));
                fields.insert("new".to_string(), Value::Int(expr.id as i64));
                self.append_ledger(AppendFields {
                    speaker_id: expr.speaker,
                    operation: "supersede".to_string(),
                    action: expr.action.clone(),
                    state_after: Some(Value::Map(fields)),
                    ..Default::default()
                });
            }
        }
        self.expressions.borrow_mut().insert(
            key,
            ExpressionSummary {
                id: expr.id,
                speaker: expr.speaker,
                condition_label: expr.condition_label.clone(),
                action: expr.action.clone(),
                status: None,
            },
        );
    }

    fn record_expression_status(&self, expr: &Expression, status: &Option<Status>) {
        if let Some(status) = status {
            let key = expr.supersession_key();
            if let Some(summary) = self.expressions.borrow_mut().get_mut(&key) {
                if summary.id == expr.id {
                    summary.status = Some(status.clone());
                }
            }
        }
    }

    fn record(&self, speaker_id: SpeakerId, operation: &str, action: &str, status: Status) -> Status {
        let break_reason = match &status {
            Status::Broken(r) => Some(r.clone()),
            _ => None,
        };
        self.ledger.borrow_mut().append(
            AppendFields {
                speaker_id,
                operation: operation.to_string(),
                action: action.to_string(),
                status: Some(status.clone()),
                break_reason,
                ..Default::default()
            },
            &*self.clock,
        );
        status
    }

    // --- Speaker registry -------------------------------------------------

    /// Root-only. Creates a speaker and its memory partition.
    pub fn create_speaker(&self, caller: SpeakerId, name: impl Into<String>) -> Result<Speaker, Status> {
        let name = name.into();
        if !self.registry.borrow().authenticate(caller) {
            return Err(self.record(
                caller,
                "create_speaker",
                &name,
                Status::Broken(BreakReason::SpeakerNotFoundOrSuspended),
            ));
        }
        if caller != ROOT_SPEAKER {
            return Err(self.record(caller, "create_speaker", &name, Status::Broken(BreakReason::NotRoot)));
        }
        let speaker = self.registry.borrow_mut().create(&name, &*self.clock);
        self.memory.borrow_mut().create_partition(speaker.id);
        self.record(caller, "create_speaker", &name, Status::Active);
        Ok(speaker)
    }

    /// Root-only.
    pub fn suspend_speaker(&self, caller: SpeakerId, target: SpeakerId) -> Result<(), Status> {
        if !self.registry.borrow().authenticate(caller) {
            return Err(self.record(
                caller,
                "suspend_speaker",
                "suspend",
                Status::Broken(BreakReason::SpeakerNotFoundOrSuspended),
            ));
        }
        if caller != ROOT_SPEAKER {
            return Err(self.record(caller, "suspend_speaker", "suspend", Status::Broken(BreakReason::NotRoot)));
        }
        if !self.registry.borrow_mut().suspend(target) {
            return Err(self.record(
                caller,
                "suspend_speaker",
                "suspend",
                Status::Broken(BreakReason::TargetNotFound),
            ));
        }
        self.record(caller, "suspend_speaker", "suspend", Status::Active);
        Ok(())
    }

    pub fn list_speakers(&self) -> Vec<Speaker> {
        self.registry.borrow().list_all()
    }

    /// Identity, variable names, pending-request count, and a summary of the
    /// target's current expressions.
    pub fn inspect_speaker(&self, id: SpeakerId) -> Option<SpeakerInspection> {
        let speaker = self.registry.borrow().get(id).cloned()?;
        let variables = self.memory.borrow().list(id);
        let pending_requests = self.bus.borrow().pending_for(id).len();
        let expressions = self
            .expressions
            .borrow()
            .values()
            .filter(|e| e.speaker == id)
            .cloned()
            .collect();
        Some(SpeakerInspection {
            speaker,
            variables,
            pending_requests,
            expressions,
        })
    }

    /// Pass-through query used by layers above (e.g. the world layer) that
    /// need to gate their own operations on speaker liveness without
    /// duplicating registry state.
    pub fn is_authenticated(&self, id: SpeakerId) -> bool {
        self.registry.borrow().authenticate(id)
    }

    // --- Memory -------------------------------------------------------------

    /// Read-any: any authenticated speaker may read any partition. Logs a
    /// `read` entry with `state_after` carrying the value read, or `Null`
    /// if `name` has never been written — this never fails for an
    /// authenticated caller.
    pub fn read(&self, caller: SpeakerId, owner: SpeakerId, name: &str) -> Result<Value, Status> {
        if !self.registry.borrow().authenticate(caller) {
            return Err(self.record(caller, "read", name, Status::Broken(BreakReason::SpeakerNotFoundOrSuspended)));
        }
        let value = self.memory.borrow().read(owner, name).unwrap_or(Value::Null);
        self.append_ledger(AppendFields {
            speaker_id: caller,
            operation: "read".to_string(),
            action: name.to_string(),
            status: Some(Status::Active),
            state_after: Some(value.clone()),
            ..Default::default()
        });
        Ok(value)
    }

    /// Write-own convenience: writes into the caller's own partition.
    pub fn write(&self, caller: SpeakerId, name: &str, value: Value) -> Result<Option<Value>, Status> {
        self.write_to(caller, caller, name, value)
    }

    /// Write ownership holds here: `target` must equal `caller`, and the
    /// name must not already be sealed.
    pub fn write_to(
        &self,
        caller: SpeakerId,
        target: SpeakerId,
        name: &str,
        value: Value,
    ) -> Result<Option<Value>, Status> {
        if !self.registry.borrow().authenticate(caller) {
            return Err(self.record(
                caller,
                "write",
                name,
                Status::Broken(BreakReason::SpeakerNotFoundOrSuspended),
            ));
        }
        if caller != target {
            return Err(self.record(caller, "write", name, Status::Broken(BreakReason::WriteOwnershipViolation)));
        }
        if self.memory.borrow().is_sealed(target, name) {
            return Err(self.record(caller, "write", name, Status::Broken(BreakReason::WriteFailed)));
        }
        let (wrote, prior) = self.memory.borrow_mut().write(target, name, value.clone());
        if !wrote {
            return Err(self.record(caller, "write", name, Status::Broken(BreakReason::WriteFailed)));
        }
        self.ledger.borrow_mut().append(
            AppendFields {
                speaker_id: caller,
                operation: "write".to_string(),
                action: name.to_string(),
                status: Some(Status::Active),
                state_before: prior.clone(),
                state_after: Some(value),
                ..Default::default()
            },
            &*self.clock,
        );
        Ok(prior)
    }

    pub fn list_vars(&self, owner: SpeakerId) -> Vec<String> {
        self.memory.borrow().list(owner)
    }

    /// Current value plus the write history for `name`: every ledger entry
    /// whose operation was a write to this owner/name pair.
    pub fn inspect_variable(&self, owner: SpeakerId, name: &str) -> Option<VariableInspection> {
        let value = self.memory.borrow().read(owner, name)?;
        let history = self.ledger.borrow().search(Some(owner), Some("write"), Some(name), None, None);
        Some(VariableInspection { value, history })
    }

    /// One-way: a sealed name can never be written again.
    pub fn seal(&self, caller: SpeakerId, name: &str) -> Result<(), Status> {
        if !self.registry.borrow().authenticate(caller) {
            return Err(self.record(
                caller,
                "seal",
                name,
                Status::Broken(BreakReason::SpeakerNotFoundOrSuspended),
            ));
        }
        self.memory.borrow_mut().seal(caller, name);
        self.record(caller, "seal", name, Status::Active);
        Ok(())
    }

    // --- Evaluation -----------------------------------------------------

    /// `None` means no status was produced (stale version, or a scope that
    /// expired this call) — mirrors `evaluator::evaluate`'s own contract.
    /// The evaluator takes `&Kernel` and acquires its own narrow borrows,
    /// so a condition/action closure may reenter this same handle.
    pub fn submit(&self, expr: &mut Expression) -> Option<Status> {
        if self.registry.borrow().authenticate(expr.speaker) {
            self.supersede_if_needed(expr);
        }
        let status = evaluator::evaluate(expr, self);
        self.record_expression_status(expr, &status);
        status
    }

    pub fn submit_loop(&self, expr: &mut Expression) -> (Status, u64) {
        if self.registry.borrow().authenticate(expr.speaker) {
            self.supersede_if_needed(expr);
        }
        let (status, count) = evaluator::evaluate_loop(expr, self, self.config.default_loop_max);
        self.record_expression_status(expr, &Some(status.clone()));
        (status, count)
    }

    pub(crate) fn authenticate(&self, id: SpeakerId) -> bool {
        self.registry.borrow().authenticate(id)
    }

    pub(crate) fn append_ledger(&self, fields: AppendFields) -> LedgerEntry {
        self.ledger.borrow_mut().append(fields, &*self.clock)
    }

    // --- Request bus ------------------------------------------------------

    pub fn request(
        &self,
        from: SpeakerId,
        to: SpeakerId,
        action: impl Into<String>,
        data: Option<Value>,
        expires_at: Option<Timestamp>,
    ) -> Result<Request, Status> {
        let action = action.into();
        if !self.registry.borrow().authenticate(from) {
            return Err(self.record(from, "request", &action, Status::Broken(BreakReason::SpeakerNotFoundOrSuspended)));
        }
        if self.registry.borrow().get(to).is_none() {
            return Err(self.record(from, "request", &action, Status::Broken(BreakReason::TargetNotFound)));
        }
        let request = self
            .bus
            .borrow_mut()
            .create(from, to, action.clone(), data, expires_at, &*self.clock);
        self.record(from, "request", &action, Status::Active);
        Ok(request)
    }

    pub fn respond(
        &self,
        request_id: RequestId,
        responder: SpeakerId,
        accept: bool,
        response_data: Option<Value>,
    ) -> Result<Request, Status> {
        if !self.registry.borrow().authenticate(responder) {
            return Err(self.record(
                responder,
                "respond",
                "respond",
                Status::Broken(BreakReason::SpeakerNotFoundOrSuspended),
            ));
        }
        let outcome = self.bus.borrow_mut().respond(request_id, responder, accept, response_data);
        match outcome {
            Ok(request) => {
                self.record(responder, "respond", &request.action, Status::Active);
                Ok(request)
            }
            Err(RespondError::NotFound) | Err(RespondError::NotPending) => Err(self.record(
                responder,
                "respond",
                "respond",
                Status::Broken(BreakReason::RequestNotFound),
            )),
            Err(RespondError::NotTarget) => Err(self.record(
                responder,
                "respond",
                "respond",
                Status::Broken(BreakReason::NotTargetSpeaker),
            )),
        }
    }

    pub fn pending_requests(&self, speaker: SpeakerId) -> Vec<Request> {
        self.bus.borrow().pending_for(speaker)
    }

    pub fn requests_from(&self, speaker: SpeakerId) -> Vec<Request> {
        self.bus.borrow().pending_from(speaker)
    }

    /// Sweeps expired pending requests into `Expired`. Never runs on its
    /// own — nothing in the kernel advances time automatically, so callers
    /// must invoke this explicitly.
    pub fn check_timeouts(&self) -> Vec<Request> {
        let expired = self.bus.borrow_mut().check_timeouts(&*self.clock);
        for request in &expired {
            self.ledger.borrow_mut().append(
                AppendFields {
                    speaker_id: request.from_speaker,
                    operation: "timeout".to_string(),
                    action: request.action.clone(),
                    ..Default::default()
                },
                &*self.clock,
            );
        }
        expired
    }

    // --- Ledger -----------------------------------------------------------

    pub fn ledger_read(&self, from: usize, to: usize) -> Vec<LedgerEntry> {
        self.ledger.borrow().read(from, to)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn ledger_search(
        &self,
        speaker: Option<SpeakerId>,
        operation: Option<&str>,
        action: Option<&str>,
        from_time: Option<Timestamp>,
        to_time: Option<Timestamp>,
    ) -> Vec<LedgerEntry> {
        self.ledger.borrow().search(speaker, operation, action, from_time, to_time)
    }

    pub fn ledger_count(&self) -> usize {
        self.ledger.borrow().len()
    }

    pub fn ledger_verify(&self) -> bool {
        self.ledger.borrow().verify()
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;

    fn kernel() -> Kernel {
        Kernel::new(KernelConfig::default(), Rc::new(SimulatedClock::new()))
    }

    #[test]
    fn boot_creates_root_and_genesis_entry() {
        let k = kernel();
        assert_eq!(k.list_speakers().len(), 1);
        assert_eq!(k.ledger_count(), 1);
        assert!(k.ledger_verify());
    }

    #[test]
    fn only_root_may_create_speakers() {
        let k = kernel();
        let a = k.create_speaker(ROOT_SPEAKER, "A").unwrap();
        let err = k.create_speaker(a.id, "B").unwrap_err();
        assert_eq!(err, Status::Broken(BreakReason::NotRoot));
    }

    #[test]
    fn write_ownership_rejects_cross_partition_write() {
        let k = kernel();
        let a = k.create_speaker(ROOT_SPEAKER, "A").unwrap();
        let b = k.create_speaker(ROOT_SPEAKER, "B").unwrap();
        let err = k.write_to(a.id, b.id, "x", Value::Int(1)).unwrap_err();
        assert_eq!(err, Status::Broken(BreakReason::WriteOwnershipViolation));
    }

    #[test]
    fn read_any_write_own() {
        let k = kernel();
        let a = k.create_speaker(ROOT_SPEAKER, "A").unwrap();
        let b = k.create_speaker(ROOT_SPEAKER, "B").unwrap();
        k.write(a.id, "x", Value::Int(42)).unwrap();
        assert_eq!(k.read(b.id, a.id, "x").unwrap(), Value::Int(42));
    }

    #[test]
    fn sealed_write_fails_forever() {
        let k = kernel();
        let a = k.create_speaker(ROOT_SPEAKER, "A").unwrap();
        k.write(a.id, "quota", Value::Int(1)).unwrap();
        k.seal(a.id, "quota").unwrap();
        let err = k.write(a.id, "quota", Value::Int(2)).unwrap_err();
        assert_eq!(err, Status::Broken(BreakReason::WriteFailed));
    }

    #[test]
    fn request_to_unknown_speaker_is_broken() {
        let k = kernel();
        let a = k.create_speaker(ROOT_SPEAKER, "A").unwrap();
        let err = k.request(a.id, 999, "help", None, None).unwrap_err();
        assert_eq!(err, Status::Broken(BreakReason::TargetNotFound));
    }

    #[test]
    fn respond_by_wrong_speaker_is_broken() {
        let k = kernel();
        let a = k.create_speaker(ROOT_SPEAKER, "A").unwrap();
        let b = k.create_speaker(ROOT_SPEAKER, "B").unwrap();
        let req = k.request(a.id, b.id, "help", None, None).unwrap();
        let err = k.respond(req.request_id, a.id, true, None).unwrap_err();
        assert_eq!(err, Status::Broken(BreakReason::NotTargetSpeaker));
    }

    #[test]
    fn full_ledger_round_trip_verifies() {
        let k = kernel();
        let a = k.create_speaker(ROOT_SPEAKER, "A").unwrap();
        k.write(a.id, "x", Value::Int(1)).unwrap();
        k.seal(a.id, "x").unwrap();
        assert!(k.ledger_verify());
        assert!(k.ledger_count() >= 3);
    }

    #[test]
    fn action_can_reenter_kernel_write_during_evaluation() {
        use crate::types::{Action, Expression, Version};

        #[derive(Debug)]
        struct ReentrantAction {
            kernel: Kernel,
            speaker: SpeakerId,
        }
        impl Action for ReentrantAction {
            fn perform(&self) -> Result<bool, String> {
                self.kernel.write(self.speaker, "nested", Value::Int(1)).map_err(|s| s.to_string())?;
                Ok(true)
            }
        }

        let k = kernel();
        let a = k.create_speaker(ROOT_SPEAKER, "A").unwrap();
        let mut expr = Expression {
            id: 0,
            speaker: a.id,
            condition: None,
            condition_label: "cond".to_string(),
            action: "act".to_string(),
            action_fn: Some(Box::new(ReentrantAction { kernel: k.clone(), speaker: a.id })),
            created_at: 0,
            version: Version::Current,
            status: None,
            is_refusal: false,
            scope_until: None,
            loop_condition: None,
            loop_max: None,
        };
        let status = k.submit(&mut expr).unwrap();
        assert_eq!(status, Status::Active);
        assert_eq!(k.read(a.id, a.id, "nested").unwrap(), Value::Int(1));
    }

    #[test]
    fn resubmitting_same_key_supersedes_the_prior_expression() {
        use crate::types::{AlwaysTrue, Expression, Version};

        fn publish_expr(speaker: SpeakerId) -> Expression {
            Expression {
                id: 0,
                speaker,
                condition: None,
                condition_label: "\u{22a4}".to_string(),
                action: "publish:x".to_string(),
                action_fn: Some(Box::new(AlwaysTrue)),
                created_at: 0,
                version: Version::Current,
                status: None,
                is_refusal: false,
                scope_until: None,
                loop_condition: None,
                loop_max: None,
            }
        }

        let k = kernel();
        let a = k.create_speaker(ROOT_SPEAKER, "A").unwrap();
        let mut e1 = publish_expr(a.id);
        k.submit(&mut e1).unwrap();
        let before = k.ledger_count();

        let mut e2 = publish_expr(a.id);
        k.submit(&mut e2).unwrap();

        assert_ne!(e1.id, e2.id);
        let entries = k.ledger_read(before, k.ledger_count());
        assert!(entries.iter().any(|entry| entry.operation == "supersede"));
    }
}
