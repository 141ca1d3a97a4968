//! Wraps an AST subtree plus a captured `Bridge` handle so it can stand in
//! for `kernel::Condition`/`kernel::Action`. The kernel never sees
//! `lang::Expr`/`lang::Stmt`, only these two trait objects; all AST-walking
//! happens here, inside the runtime crate.

use crate::bridge::{eval_expr, exec_block, Bridge, Flow};
use kernel::{Action, Condition, SpeakerId};
use lang::{Expr, Stmt};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug)]
pub(crate) struct OpCondition {
    bridge: Rc<RefCell<Bridge>>,
    expr: Expr,
    caller: SpeakerId,
}

impl OpCondition {
    pub(crate) fn new(bridge: Rc<RefCell<Bridge>>, expr: Expr, caller: SpeakerId) -> Self {
        Self { bridge, expr, caller }
    }
}

impl Condition for OpCondition {
    /// Errors inside a condition expression (e.g. reading an unknown
    /// speaker) are treated the same as a false condition rather than
    /// propagated, since `Condition::evaluate` has no `Result` to carry them.
    fn evaluate(&self) -> bool {
        eval_expr(&self.bridge, &self.expr, self.caller)
            .map(|v| v.is_truthy())
            .unwrap_or(false)
    }
}

#[derive(Debug)]
pub(crate) struct OpAction {
    bridge: Rc<RefCell<Bridge>>,
    body: Vec<Stmt>,
    caller: SpeakerId,
}

impl OpAction {
    pub(crate) fn new(bridge: Rc<RefCell<Bridge>>, body: Vec<Stmt>, caller: SpeakerId) -> Self {
        Self { bridge, body, caller }
    }
}

impl Action for OpAction {
    fn perform(&self) -> Result<bool, String> {
        match exec_block(&self.bridge, &self.body, self.caller) {
            Ok(Flow::Failed(message)) => Err(message),
            Ok(_) => Ok(true),
            Err(e) => Err(e.to_string()),
        }
    }
}
