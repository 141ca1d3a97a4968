//! Kernel-level scenarios and invariants that need a full booted `Kernel`
//! rather than the isolated substore unit tests in `src/`.

use kernel::{BreakReason, Kernel, KernelConfig, SimulatedClock, Status, Value, ROOT_SPEAKER};
use std::rc::Rc;

fn booted() -> (Kernel, Rc<SimulatedClock>) {
    let clock = Rc::new(SimulatedClock::new());
    let kernel = Kernel::new(KernelConfig::default(), clock.clone());
    (kernel, clock)
}

/// S3 — write ownership at runtime.
#[test]
fn cross_partition_write_to_is_observable_and_recoverable() {
    let (kernel, _clock) = booted();
    let a = kernel.create_speaker(ROOT_SPEAKER, "A").unwrap();
    let b = kernel.create_speaker(ROOT_SPEAKER, "B").unwrap();

    let err = kernel.write_to(a.id, b.id, "x", Value::Int(1)).unwrap_err();
    assert_eq!(err, Status::Broken(BreakReason::WriteOwnershipViolation));
    assert_eq!(kernel.read(a.id, b.id, "x").unwrap(), Value::Null);
    assert!(kernel.ledger_verify());

    let entries = kernel.ledger_search(Some(a.id), Some("write"), Some("x"), None, None);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].break_reason, Some(BreakReason::WriteOwnershipViolation));
}

/// Invariant 7 — a freshly booted kernel is a one-entry, verifying ledger.
#[test]
fn fresh_boot_is_one_entry_and_verifies() {
    let (kernel, _clock) = booted();
    assert_eq!(kernel.ledger_count(), 1);
    assert!(kernel.ledger_verify());
    let boot_entry = &kernel.ledger_read(0, 1)[0];
    assert_eq!(boot_entry.operation, "boot");
    assert_eq!(boot_entry.prev_hash, "genesis");
}

/// Invariant 10 — a request past its deadline expires on the next sweep
/// regardless of how many unrelated requests are swept alongside it.
#[test]
fn expired_request_transitions_on_next_sweep() {
    let (kernel, clock) = booted();
    let a = kernel.create_speaker(ROOT_SPEAKER, "A").unwrap();
    let b = kernel.create_speaker(ROOT_SPEAKER, "B").unwrap();

    let req = kernel.request(a.id, b.id, "help", None, Some(5)).unwrap();
    clock.set(10);
    let expired = kernel.check_timeouts();

    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].request_id, req.request_id);
    assert!(kernel.pending_requests(b.id).is_empty());
}

/// Invariant 11 — speaker ids are sequential and never reused, even across
/// a suspension.
#[test]
fn speaker_ids_are_sequential_and_never_reused() {
    let (kernel, _clock) = booted();
    let a = kernel.create_speaker(ROOT_SPEAKER, "A").unwrap();
    let b = kernel.create_speaker(ROOT_SPEAKER, "B").unwrap();
    assert_eq!(b.id, a.id + 1);

    kernel.suspend_speaker(ROOT_SPEAKER, a.id).unwrap();
    let c = kernel.create_speaker(ROOT_SPEAKER, "C").unwrap();
    assert_eq!(c.id, b.id + 1);
}

/// `inspect_speaker`/`inspect_variable` surface variable names, pending
/// request counts, current expression summaries, and per-variable write
/// history.
#[test]
fn inspection_surfaces_variables_requests_and_history() {
    let (kernel, _clock) = booted();
    let a = kernel.create_speaker(ROOT_SPEAKER, "A").unwrap();
    let b = kernel.create_speaker(ROOT_SPEAKER, "B").unwrap();

    kernel.write(a.id, "x", Value::Int(1)).unwrap();
    kernel.write(a.id, "x", Value::Int(2)).unwrap();
    kernel.request(b.id, a.id, "help", None, None).unwrap();

    let inspection = kernel.inspect_speaker(a.id).unwrap();
    assert_eq!(inspection.variables, vec!["x".to_string()]);
    assert_eq!(inspection.pending_requests, 1);

    let history = kernel.inspect_variable(a.id, "x").unwrap();
    assert_eq!(history.value, Value::Int(2));
    assert_eq!(history.history.len(), 2);
}
