//! The runtime bridge. Walks a checked `Program` and drives it against a
//! `kernel::Kernel` and a `world::WorldRegistry`.
//!
//! `Bridge` lives behind `Rc<RefCell<Bridge>>` for the same reason the
//! kernel's own substores do: a `when` statement's action body can contain
//! another `when` statement, which submits a nested expression to the
//! kernel, whose condition/action closures borrow this same `Bridge`
//! again. Every function here follows the kernel's own discipline —
//! `bridge.borrow()`/`borrow_mut()` is acquired, used, and dropped within a
//! single statement, never held across a call that might reenter.

use crate::error::{Result, RuntimeError};
use crate::ops::{OpAction, OpCondition};
use kernel::{Expression, Kernel, SpeakerId, Status, Value, Version, ROOT_SPEAKER};
use lang::{BinaryOp, Expr, Program, Stmt, UnaryOp};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use world::WorldRegistry;

/// Control-flow signal threaded back up out of `exec_block`/`exec_stmt`:
/// `return` and an explicit `fail` both short-circuit the rest of the block.
#[derive(Debug, Clone)]
pub(crate) enum Flow {
    Normal,
    Return(Value),
    Failed(String),
}

#[derive(Debug)]
pub struct Bridge {
    kernel: Kernel,
    worlds: WorldRegistry,
    speakers: HashMap<String, SpeakerId>,
    worlds_by_name: HashMap<String, world::WorldId>,
    functions: HashMap<String, (Vec<String>, Vec<Stmt>)>,
    scopes: Vec<HashMap<String, Value>>,
    output: Vec<String>,
}

/// Accumulated result of driving a whole program through the bridge.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub output: Vec<String>,
    pub broken: bool,
}

impl Bridge {
    pub fn new(kernel: Kernel, worlds: WorldRegistry) -> Self {
        Self {
            kernel,
            worlds,
            speakers: HashMap::new(),
            worlds_by_name: HashMap::new(),
            functions: HashMap::new(),
            scopes: Vec::new(),
            output: Vec::new(),
        }
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    fn speaker_id(&self, name: &str) -> Option<SpeakerId> {
        self.speakers.get(name).copied()
    }

    fn lookup_local(&self, name: &str) -> Option<Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).cloned())
    }

    fn in_function_scope(&self) -> bool {
        !self.scopes.is_empty()
    }

    fn set_local(&mut self, name: &str, value: Value) {
        if let Some(top) = self.scopes.last_mut() {
            top.insert(name.to_string(), value);
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }
}

/// Runs a whole checked program with `ROOT_SPEAKER` as the ambient caller.
/// Every `speaker`/`world` declaration and every top-level statement outside
/// an `as` block acts with root's authority: every op outside an `as` block
/// runs as root.
pub fn run_program(bridge: &Rc<RefCell<Bridge>>, program: &Program) -> Result<RunOutcome> {
    let flow = exec_block(bridge, program, ROOT_SPEAKER)?;
    let broken = matches!(flow, Flow::Failed(_));
    let output = bridge.borrow().output.clone();
    Ok(RunOutcome { output, broken })
}

pub(crate) fn exec_block(bridge: &Rc<RefCell<Bridge>>, stmts: &[Stmt], caller: SpeakerId) -> Result<Flow> {
    for stmt in stmts {
        let flow = exec_stmt(bridge, stmt, caller)?;
        if !matches!(flow, Flow::Normal) {
            return Ok(flow);
        }
    }
    Ok(Flow::Normal)
}

fn exec_stmt(bridge: &Rc<RefCell<Bridge>>, stmt: &Stmt, caller: SpeakerId) -> Result<Flow> {
    match stmt {
        Stmt::SpeakerDecl { name, .. } => {
            let kernel = bridge.borrow().kernel.clone();
            let speaker = kernel
                .create_speaker(ROOT_SPEAKER, name.clone())
                .map_err(RuntimeError::Kernel)?;
            bridge.borrow_mut().speakers.insert(name.clone(), speaker.id);
            Ok(Flow::Normal)
        }
        Stmt::WorldDecl { name, .. } => {
            let kernel = bridge.borrow().kernel.clone();
            let world = {
                let mut b = bridge.borrow_mut();
                b.worlds.create_world(&kernel, caller, name.clone())
            }?;
            bridge.borrow_mut().worlds_by_name.insert(name.clone(), world.id);
            Ok(Flow::Normal)
        }
        Stmt::AsBlock { speaker, body, .. } => {
            let name = literal_name(speaker)?;
            let id = bridge
                .borrow()
                .speaker_id(&name)
                .ok_or_else(|| RuntimeError::UnknownSpeaker(name.clone()))?;
            exec_block(bridge, body, id)
        }
        Stmt::Let { target, value, .. } => {
            let v = eval_expr(bridge, value, caller)?;
            let stays_local = !target.base.contains('.') && bridge.borrow().in_function_scope();
            if stays_local {
                bridge.borrow_mut().set_local(&target.base, v);
            } else {
                let kernel = bridge.borrow().kernel.clone();
                kernel.write(caller, &target.base, v).map_err(RuntimeError::Kernel)?;
            }
            Ok(Flow::Normal)
        }
        Stmt::Speak { value, .. } => {
            let v = eval_expr(bridge, value, caller)?;
            tracing::info!(speaker = caller, value = %v, "speak");
            bridge.borrow_mut().output.push(v.to_string());
            Ok(Flow::Normal)
        }
        Stmt::When {
            condition,
            when_body,
            otherwise_body,
            broken_body,
            line,
        } => {
            // The language has no named-condition syntax, so the
            // supersession key is derived from the `when` statement's
            // source line: resubmitting the *same* `when` (e.g. one nested
            // inside a `while` body) supersedes its own prior run, while
            // two distinct `when` statements never collide.
            let kernel = bridge.borrow().kernel.clone();
            let cond = OpCondition::new(bridge.clone(), condition.clone(), caller);
            let action = OpAction::new(bridge.clone(), when_body.clone(), caller);
            let mut expr = Expression {
                id: 0,
                speaker: caller,
                condition: Some(Box::new(cond)),
                condition_label: format!("when@{line}"),
                action: format!("when_action@{line}"),
                action_fn: Some(Box::new(action)),
                created_at: 0,
                version: Version::Current,
                status: None,
                is_refusal: false,
                scope_until: None,
                loop_condition: None,
                loop_max: None,
            };
            match kernel.submit(&mut expr) {
                // Active means when_body's action already ran inside submit.
                Some(Status::Active) | None => Ok(Flow::Normal),
                Some(Status::Inactive) => exec_block(bridge, otherwise_body, caller),
                Some(Status::Broken(_)) => exec_block(bridge, broken_body, caller),
            }
        }
        Stmt::If { branches, else_body, .. } => {
            for (condition, body) in branches {
                if eval_expr(bridge, condition, caller)?.is_truthy() {
                    return exec_block(bridge, body, caller);
                }
            }
            exec_block(bridge, else_body, caller)
        }
        Stmt::While { condition, max, body, .. } => {
            let mut count = 0u64;
            while count < *max {
                if !eval_expr(bridge, condition, caller)?.is_truthy() {
                    break;
                }
                let flow = exec_block(bridge, body, caller)?;
                if !matches!(flow, Flow::Normal) {
                    return Ok(flow);
                }
                count += 1;
            }
            Ok(Flow::Normal)
        }
        Stmt::FnDef { name, params, body, .. } => {
            bridge
                .borrow_mut()
                .functions
                .insert(name.clone(), (params.clone(), body.clone()));
            Ok(Flow::Normal)
        }
        Stmt::Return { value, .. } => {
            let v = match value {
                Some(expr) => eval_expr(bridge, expr, caller)?,
                None => Value::Null,
            };
            Ok(Flow::Return(v))
        }
        Stmt::Request { target, action, data, .. } => {
            let to = resolve_speaker_expr(bridge, target)?;
            let data_val = match data {
                Some(expr) => Some(eval_expr(bridge, expr, caller)?),
                None => None,
            };
            let kernel = bridge.borrow().kernel.clone();
            kernel
                .request(caller, to, action.clone(), data_val, None)
                .map_err(RuntimeError::Kernel)?;
            Ok(Flow::Normal)
        }
        Stmt::Respond { request_id, accept, data, .. } => {
            let id = match eval_expr(bridge, request_id, caller)? {
                Value::Int(n) => n as u64,
                other => return Err(RuntimeError::TypeError(format!("request id must be an integer, got {other}"))),
            };
            let data_val = match data {
                Some(expr) => Some(eval_expr(bridge, expr, caller)?),
                None => None,
            };
            let kernel = bridge.borrow().kernel.clone();
            kernel
                .respond(id, caller, *accept, data_val)
                .map_err(RuntimeError::Kernel)?;
            Ok(Flow::Normal)
        }
        Stmt::Inspect { target, .. } => {
            let name = literal_name(target)?;
            let id = bridge
                .borrow()
                .speaker_id(&name)
                .ok_or_else(|| RuntimeError::UnknownSpeaker(name.clone()))?;
            let kernel = bridge.borrow().kernel.clone();
            let vars = kernel.list_vars(id);
            bridge.borrow_mut().output.push(format!("{name}: {vars:?}"));
            Ok(Flow::Normal)
        }
        Stmt::History { target, .. } => {
            let name = literal_name(target)?;
            let id = bridge
                .borrow()
                .speaker_id(&name)
                .ok_or_else(|| RuntimeError::UnknownSpeaker(name.clone()))?;
            let kernel = bridge.borrow().kernel.clone();
            let entries = kernel.ledger_search(Some(id), None, None, None, None);
            bridge.borrow_mut().output.push(format!("{} entries for {name}", entries.len()));
            Ok(Flow::Normal)
        }
        Stmt::LedgerRead { last, .. } => {
            let kernel = bridge.borrow().kernel.clone();
            let count = kernel.ledger_count();
            let from = match last {
                Some(n) => count.saturating_sub(*n as usize),
                None => 0,
            };
            let entries = kernel.ledger_read(from, count);
            bridge.borrow_mut().output.push(format!("{} ledger entries", entries.len()));
            Ok(Flow::Normal)
        }
        Stmt::VerifyLedger { .. } => {
            let kernel = bridge.borrow().kernel.clone();
            let ok = kernel.ledger_verify();
            bridge.borrow_mut().output.push(format!("ledger_verify: {ok}"));
            if ok {
                Ok(Flow::Normal)
            } else {
                Ok(Flow::Failed("ledger verification failed".to_string()))
            }
        }
        Stmt::Seal { target, .. } => {
            let kernel = bridge.borrow().kernel.clone();
            kernel.seal(caller, &target.base).map_err(RuntimeError::Kernel)?;
            Ok(Flow::Normal)
        }
        Stmt::Pass { .. } => Ok(Flow::Normal),
        Stmt::Fail { .. } => Ok(Flow::Failed("fail".to_string())),
        Stmt::ExprStmt { value, .. } => {
            eval_expr(bridge, value, caller)?;
            Ok(Flow::Normal)
        }
    }
}

fn literal_name(expr: &Expr) -> Result<String> {
    match expr {
        Expr::Identifier(name) => Ok(name.clone()),
        _ => Err(RuntimeError::NotASpeaker),
    }
}

fn resolve_speaker_expr(bridge: &Rc<RefCell<Bridge>>, expr: &Expr) -> Result<SpeakerId> {
    let name = literal_name(expr)?;
    bridge
        .borrow()
        .speaker_id(&name)
        .ok_or(RuntimeError::UnknownSpeaker(name))
}

pub(crate) fn eval_expr(bridge: &Rc<RefCell<Bridge>>, expr: &Expr, caller: SpeakerId) -> Result<Value> {
    match expr {
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::Float(f) => Ok(Value::Float(*f)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::NoneLit => Ok(Value::Null),
        Expr::Identifier(name) => {
            if let Some(v) = bridge.borrow().lookup_local(name) {
                return Ok(v);
            }
            let kernel = bridge.borrow().kernel.clone();
            kernel.read(caller, caller, name).map_err(RuntimeError::Kernel)
        }
        Expr::Read(inner) => match inner.as_ref() {
            Expr::MemberAccess(base, name) => {
                let owner = resolve_speaker_expr(bridge, base)?;
                let kernel = bridge.borrow().kernel.clone();
                kernel.read(caller, owner, name).map_err(RuntimeError::Kernel)
            }
            other => eval_expr(bridge, other, caller),
        },
        Expr::MemberAccess(base, name) => {
            let owner = resolve_speaker_expr(bridge, base)?;
            let kernel = bridge.borrow().kernel.clone();
            kernel.read(caller, owner, name).map_err(RuntimeError::Kernel)
        }
        Expr::Index(base, idx) => {
            let base_val = eval_expr(bridge, base, caller)?;
            let idx_val = eval_expr(bridge, idx, caller)?;
            index_value(base_val, idx_val)
        }
        Expr::Call(callee, args) => {
            let name = literal_name(callee)?;
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval_expr(bridge, arg, caller)?);
            }
            call_function(bridge, &name, values, caller)
        }
        Expr::Unary(op, operand) => {
            let v = eval_expr(bridge, operand, caller)?;
            unary_op(*op, v)
        }
        Expr::Binary(BinaryOp::And, left, right) => {
            let l = eval_expr(bridge, left, caller)?;
            if !l.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval_expr(bridge, right, caller)?.is_truthy()))
        }
        Expr::Binary(BinaryOp::Or, left, right) => {
            let l = eval_expr(bridge, left, caller)?;
            if l.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval_expr(bridge, right, caller)?.is_truthy()))
        }
        Expr::Binary(op, left, right) => {
            let l = eval_expr(bridge, left, caller)?;
            let r = eval_expr(bridge, right, caller)?;
            binary_op(*op, l, r)
        }
    }
}

fn call_function(bridge: &Rc<RefCell<Bridge>>, name: &str, args: Vec<Value>, caller: SpeakerId) -> Result<Value> {
    let (params, body) = bridge
        .borrow()
        .functions
        .get(name)
        .cloned()
        .ok_or_else(|| RuntimeError::UnknownFunction(name.to_string()))?;
    if params.len() != args.len() {
        return Err(RuntimeError::ArityMismatch {
            name: name.to_string(),
            expected: params.len(),
            got: args.len(),
        });
    }

    {
        let mut b = bridge.borrow_mut();
        b.push_scope();
        for (param, value) in params.into_iter().zip(args) {
            b.set_local(&param, value);
        }
    }
    let flow = exec_block(bridge, &body, caller);
    bridge.borrow_mut().pop_scope();

    match flow? {
        Flow::Return(v) => Ok(v),
        _ => Ok(Value::Null),
    }
}

fn unary_op(op: UnaryOp, v: Value) -> Result<Value> {
    match (op, v) {
        (UnaryOp::Neg, Value::Int(n)) => Ok(Value::Int(-n)),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, _) => Err(RuntimeError::TypeError("unary '-' requires a number".to_string())),
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
    }
}

fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn arith(l: Value, r: Value, fi: impl Fn(i64, i64) -> i64, ff: impl Fn(f64, f64) -> f64) -> Result<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(fi(a, b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(ff(a as f64, b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(ff(a, b as f64))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(ff(a, b))),
        _ => Err(RuntimeError::TypeError("arithmetic requires numeric operands".to_string())),
    }
}

fn cmp(l: &Value, r: &Value, pred: impl Fn(std::cmp::Ordering) -> bool) -> Result<Value> {
    match (numeric(l), numeric(r)) {
        (Some(a), Some(b)) => Ok(Value::Bool(pred(a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)))),
        _ => Err(RuntimeError::TypeError("comparison requires numeric operands".to_string())),
    }
}

fn binary_op(op: BinaryOp, l: Value, r: Value) -> Result<Value> {
    use std::cmp::Ordering;
    match op {
        BinaryOp::Add => match (&l, &r) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            _ => arith(l, r, |a, b| a.wrapping_add(b), |a, b| a + b),
        },
        BinaryOp::Sub => arith(l, r, |a, b| a.wrapping_sub(b), |a, b| a - b),
        BinaryOp::Mul => arith(l, r, |a, b| a.wrapping_mul(b), |a, b| a * b),
        BinaryOp::Div => {
            let (a, b) = (numeric(&l), numeric(&r));
            match (a, b) {
                (Some(_), Some(b)) if b == 0.0 => Err(RuntimeError::DivisionByZero),
                (Some(a), Some(b)) if matches!((&l, &r), (Value::Int(_), Value::Int(_))) => {
                    Ok(Value::Int((a / b) as i64))
                }
                (Some(a), Some(b)) => Ok(Value::Float(a / b)),
                _ => Err(RuntimeError::TypeError("arithmetic requires numeric operands".to_string())),
            }
        }
        BinaryOp::Mod => match (l, r) {
            (Value::Int(_), Value::Int(0)) => Err(RuntimeError::DivisionByZero),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a % b)),
            _ => Err(RuntimeError::TypeError("'%' requires integer operands".to_string())),
        },
        BinaryOp::Eq => Ok(Value::Bool(l == r)),
        BinaryOp::NotEq => Ok(Value::Bool(l != r)),
        BinaryOp::Lt => cmp(&l, &r, |o| o == Ordering::Less),
        BinaryOp::LtEq => cmp(&l, &r, |o| o != Ordering::Greater),
        BinaryOp::Gt => cmp(&l, &r, |o| o == Ordering::Greater),
        BinaryOp::GtEq => cmp(&l, &r, |o| o != Ordering::Less),
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuited in eval_expr"),
    }
}

fn index_value(base: Value, idx: Value) -> Result<Value> {
    match (base, idx) {
        (Value::List(items), Value::Int(i)) => {
            let i = usize::try_from(i).map_err(|_| RuntimeError::TypeError("index must not be negative".to_string()))?;
            items
                .get(i)
                .cloned()
                .ok_or_else(|| RuntimeError::TypeError(format!("index {i} out of bounds")))
        }
        (Value::Map(map), Value::Str(key)) => map
            .get(&key)
            .cloned()
            .ok_or_else(|| RuntimeError::TypeError(format!("no key '{key}' in map"))),
        _ => Err(RuntimeError::TypeError("value is not indexable with the given index".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::{KernelConfig, SimulatedClock};
    use lang::compile_source;
    use world::WorldConfig;

    fn new_bridge() -> Rc<RefCell<Bridge>> {
        let kernel = Kernel::new(KernelConfig::default(), Rc::new(SimulatedClock::new()));
        let worlds = WorldRegistry::new(WorldConfig::default());
        Rc::new(RefCell::new(Bridge::new(kernel, worlds)))
    }

    #[test]
    fn speaker_decl_and_own_write_read_round_trip() {
        let bridge = new_bridge();
        let program = compile_source("speaker teacher\nas teacher {\nlet grade = 95\n}\n").unwrap();
        run_program(&bridge, &program).unwrap();
        let kernel = bridge.borrow().kernel().clone();
        let id = bridge.borrow().speaker_id("teacher").unwrap();
        assert_eq!(kernel.read(id, id, "grade").unwrap(), Value::Int(95));
    }

    #[test]
    fn when_runs_action_on_true_condition() {
        let bridge = new_bridge();
        let program = compile_source(
            "speaker teacher\nas teacher {\nwhen true {\nlet ok = 1\n} otherwise {\nlet ok = 0\n}\n}\n",
        )
        .unwrap();
        run_program(&bridge, &program).unwrap();
        let kernel = bridge.borrow().kernel().clone();
        let id = bridge.borrow().speaker_id("teacher").unwrap();
        assert_eq!(kernel.read(id, id, "ok").unwrap(), Value::Int(1));
    }

    #[test]
    fn when_runs_otherwise_on_false_condition() {
        let bridge = new_bridge();
        let program = compile_source(
            "speaker teacher\nas teacher {\nwhen false {\nlet ok = 1\n} otherwise {\nlet ok = 0\n}\n}\n",
        )
        .unwrap();
        run_program(&bridge, &program).unwrap();
        let kernel = bridge.borrow().kernel().clone();
        let id = bridge.borrow().speaker_id("teacher").unwrap();
        assert_eq!(kernel.read(id, id, "ok").unwrap(), Value::Int(0));
    }

    #[test]
    fn nested_when_inside_when_action_reenters_kernel_safely() {
        let bridge = new_bridge();
        let program = compile_source(
            "speaker teacher\nas teacher {\nwhen true {\nwhen true {\nlet deep = 1\n}\n}\n}\n",
        )
        .unwrap();
        run_program(&bridge, &program).unwrap();
        let kernel = bridge.borrow().kernel().clone();
        let id = bridge.borrow().speaker_id("teacher").unwrap();
        assert_eq!(kernel.read(id, id, "deep").unwrap(), Value::Int(1));
    }

    #[test]
    fn function_locals_never_touch_kernel_memory() {
        let bridge = new_bridge();
        let program = compile_source(
            "speaker teacher\nfn double(x) {\nreturn x * 2\n}\nas teacher {\nlet result = double(21)\n}\n",
        )
        .unwrap();
        run_program(&bridge, &program).unwrap();
        let kernel = bridge.borrow().kernel().clone();
        let id = bridge.borrow().speaker_id("teacher").unwrap();
        assert_eq!(kernel.read(id, id, "result").unwrap(), Value::Int(42));
        assert_eq!(kernel.read(id, id, "x").unwrap(), Value::Null);
    }

    #[test]
    fn while_loop_respects_static_max_bound() {
        let bridge = new_bridge();
        let program = compile_source(
            "speaker teacher\nas teacher {\nlet count = 0\nwhile count < 3 max 10 {\nlet count = count + 1\n}\n}\n",
        )
        .unwrap();
        run_program(&bridge, &program).unwrap();
        let kernel = bridge.borrow().kernel().clone();
        let id = bridge.borrow().speaker_id("teacher").unwrap();
        assert_eq!(kernel.read(id, id, "count").unwrap(), Value::Int(3));
    }

    #[test]
    fn explicit_fail_statement_marks_outcome_broken() {
        let bridge = new_bridge();
        let program = compile_source("fail\n").unwrap();
        let outcome = run_program(&bridge, &program).unwrap();
        assert!(outcome.broken);
    }
}
