//! Three-valued expression evaluation.
//!
//! Every step here goes through `&Kernel` rather than raw `&Registry`/`&mut
//! Ledger` references. That is the piece that makes reentrancy safe: each
//! call into the kernel (`authenticate`, `append_ledger`, `now`) acquires
//! and releases its own `RefCell` borrow, so a `condition.evaluate()` or
//! `action.perform()` invoked from inside `evaluate_core` can itself call
//! back into this same kernel (e.g. `Kernel::write`) without ever finding a
//! borrow still held from the outer call.

use crate::facade::Kernel;
use crate::ledger::AppendFields;
use crate::types::{BreakReason, Expression, Status, Value, Version};
use std::collections::BTreeMap;

fn auth_broken_entry(expr: &Expression, kernel: &Kernel) -> Status {
    let reason = BreakReason::SpeakerNotFoundOrSuspended;
    kernel.append_ledger(AppendFields {
        speaker_id: expr.speaker,
        operation: "evaluate".to_string(),
        action: expr.action.clone(),
        status: Some(Status::Broken(reason.clone())),
        break_reason: Some(reason.clone()),
        ..Default::default()
    });
    Status::Broken(reason)
}

/// Runs steps 1-3 (authentication, version gate, scope gate), then delegates
/// to [`evaluate_core`] for steps 4-7. Returns `None` when no status change
/// occurs (stale version, or a scope that just expired).
pub fn evaluate(expr: &mut Expression, kernel: &Kernel) -> Option<Status> {
    if !kernel.authenticate(expr.speaker) {
        return Some(auth_broken_entry(expr, kernel));
    }

    if expr.version != Version::Current {
        return None;
    }

    if let Some(scope_until) = expr.scope_until {
        if kernel.now() > scope_until {
            expr.version = Version::Expired;
            kernel.append_ledger(AppendFields {
                speaker_id: expr.speaker,
                operation: "expire".to_string(),
                action: expr.action.clone(),
                ..Default::default()
            });
            return None;
        }
    }

    Some(evaluate_core(expr, kernel))
}

/// Steps 4-7: condition, action, refusal inversion, terminal status.
fn evaluate_core(expr: &mut Expression, kernel: &Kernel) -> Status {
    let condition_met = match &expr.condition {
        None => true,
        Some(condition) => condition.evaluate(),
    };

    if !condition_met {
        expr.status = Some(Status::Inactive);
        kernel.append_ledger(AppendFields {
            speaker_id: expr.speaker,
            operation: "evaluate".to_string(),
            condition: Some(expr.condition_label.clone()),
            condition_result: Some(false),
            action: expr.action.clone(),
            status: Some(Status::Inactive),
            ..Default::default()
        });
        return Status::Inactive;
    }

    let mut fulfilled = true;
    if let Some(action) = &expr.action_fn {
        match action.perform() {
            Err(_failure) => {
                let reason = BreakReason::ActionNotFulfilled;
                expr.status = Some(Status::Broken(reason.clone()));
                kernel.append_ledger(AppendFields {
                    speaker_id: expr.speaker,
                    operation: "evaluate".to_string(),
                    condition: Some(expr.condition_label.clone()),
                    condition_result: Some(true),
                    action: expr.action.clone(),
                    status: Some(Status::Broken(reason.clone())),
                    break_reason: Some(reason.clone()),
                    ..Default::default()
                });
                return Status::Broken(reason);
            }
            Ok(result) => fulfilled = result,
        }
    }

    if expr.is_refusal {
        fulfilled = !fulfilled;
    }

    let status = if fulfilled {
        Status::Active
    } else {
        Status::Broken(BreakReason::ActionNotFulfilled)
    };
    expr.status = Some(status.clone());

    let break_reason = match &status {
        Status::Broken(r) => Some(r.clone()),
        _ => None,
    };
    kernel.append_ledger(AppendFields {
        speaker_id: expr.speaker,
        operation: "evaluate".to_string(),
        condition: Some(expr.condition_label.clone()),
        condition_result: Some(true),
        action: expr.action.clone(),
        status: Some(status.clone()),
        break_reason,
        ..Default::default()
    });
    status
}

fn iterations_value(count: u64) -> Value {
    let mut map = BTreeMap::new();
    map.insert("iterations".to_string(), Value::Int(count as i64));
    Value::Map(map)
}

/// Bounded-loop evaluation. `max_iter` defaults to `expr.loop_max`, falling
/// back to `default_max` when unset (direct kernel API use without the
/// compiler's static `max` enforcement).
pub fn evaluate_loop(expr: &mut Expression, kernel: &Kernel, default_max: u64) -> (Status, u64) {
    if !kernel.authenticate(expr.speaker) {
        return (auth_broken_entry(expr, kernel), 0);
    }

    let max_iter = expr.loop_max.unwrap_or(default_max);

    // max = 0 means zero iterations, never enters the bound-checking race,
    // and is reported as a clean loop_end, not a bound-exceeded break.
    if max_iter == 0 {
        kernel.append_ledger(AppendFields {
            speaker_id: expr.speaker,
            operation: "loop_end".to_string(),
            condition: Some(expr.condition_label.clone()),
            condition_result: Some(false),
            action: expr.action.clone(),
            status: Some(Status::Inactive),
            state_after: Some(iterations_value(0)),
            ..Default::default()
        });
        return (Status::Inactive, 0);
    }

    let mut count = 0u64;
    while count < max_iter {
        if !kernel.authenticate(expr.speaker) {
            return (auth_broken_entry(expr, kernel), count);
        }

        if let Some(loop_condition) = &expr.loop_condition {
            if !loop_condition.evaluate() {
                kernel.append_ledger(AppendFields {
                    speaker_id: expr.speaker,
                    operation: "loop_end".to_string(),
                    condition: Some(expr.condition_label.clone()),
                    condition_result: Some(false),
                    action: expr.action.clone(),
                    status: Some(Status::Inactive),
                    state_after: Some(iterations_value(count)),
                    ..Default::default()
                });
                return (Status::Inactive, count);
            }
        }

        let status = evaluate_core(expr, kernel);
        if matches!(status, Status::Broken(_) | Status::Inactive) {
            return (status, count);
        }
        count += 1;
    }

    let reason = BreakReason::MaxIterationsExceeded(max_iter);
    kernel.append_ledger(AppendFields {
        speaker_id: expr.speaker,
        operation: "loop_bound_exceeded".to_string(),
        action: expr.action.clone(),
        status: Some(Status::Broken(reason.clone())),
        break_reason: Some(reason.clone()),
        ..Default::default()
    });
    (Status::Broken(reason), count)
}
