//! Runtime bridge wiring the language front-end to the trust kernel and
//! the world layer.

pub mod bridge;
pub mod error;
mod ops;

pub use bridge::{run_program, Bridge, RunOutcome};
pub use error::{Result, RuntimeError};

use kernel::Kernel;
use std::cell::RefCell;
use std::rc::Rc;
use world::WorldRegistry;

/// Lexes, parses, axiom-checks and runs `source` in one call.
pub fn compile_and_run(source: &str, kernel: Kernel, worlds: WorldRegistry) -> Result<RunOutcome> {
    let program = lang::compile_source(source)?;
    let bridge = Rc::new(RefCell::new(Bridge::new(kernel, worlds)));
    run_program(&bridge, &program)
}
