use std::cell::RefCell;
use std::rc::Rc;

use crate::env::EnvRef;
use crate::interner::SymId;
use crate::printer;
use crate::value::{PairRef, Value};

//===----------------------------------------------------------------------===//
// Continuation
//===----------------------------------------------------------------------===//

/// "The rest of the computation", reified. A continuation owns one
/// resumption operation and a link to its parent, chaining down to the root.
/// Captured by `call-with-current-continuation`, it becomes an ordinary
/// one-argument procedure; invoking it abandons the caller's pending work
/// and resumes this chain instead, any number of times.
pub struct Cont {
    pub op: ContOp,
    pub parent: Option<ContRef>,
    /// Source expressions this continuation continues, for diagnostics
    /// only. Tail calls make several expressions share one continuation, so
    /// entries are deduplicated by node identity.
    exprs: RefCell<Vec<Value>>,
}

pub type ContRef = Rc<Cont>;

/// The closed set of resumption operations. Each variant holds exactly the
/// state its resumption needs; none of them re-enters the evaluator
/// directly, they all hand back a pending [`Step`].
pub enum ContOp {
    /// Root of every chain; resuming it terminates the drive loop.
    Halt,
    /// Operator value arrived; evaluate the operand list of `exp` next.
    Operator { exp: PairRef, env: EnvRef },
    /// Evaluated operand list arrived; apply `operator` in the parent
    /// continuation (tail position is preserved here).
    Operands { operator: Value },
    /// One evaluated list element arrived; evaluate `rest` next.
    ListItem { rest: Value, env: EnvRef },
    /// Evaluated tail of an argument list arrived; cons `head` back on.
    ListTail { head: Value },
    /// A sequence element was evaluated for effect; continue with `rest`.
    Sequence { rest: Value, env: EnvRef },
    /// Value for a `define` arrived.
    Define { name: SymId, env: EnvRef },
    /// Value for a `set!` arrived.
    Assign { name: SymId, env: EnvRef },
    /// Test value of an `if` arrived.
    Branch { conseq: Value, alt: Value, env: EnvRef },
    /// Macro transformer result arrived; rewrite `site` in place and
    /// evaluate the expansion.
    Expand { site: PairRef, env: EnvRef },
    /// Barrier installed by `call-with-handler`: passes values through
    /// untouched, but a condition raised past it is given to `handler`.
    Handler { handler: Value },
}

impl Cont {
    pub fn halt() -> ContRef {
        Rc::new(Cont { op: ContOp::Halt, parent: None, exprs: RefCell::new(Vec::new()) })
    }

    pub fn chain(op: ContOp, parent: &ContRef) -> ContRef {
        Rc::new(Cont {
            op,
            parent: Some(parent.clone()),
            exprs: RefCell::new(Vec::new()),
        })
    }

    pub fn parent(&self) -> ContRef {
        self.parent.clone().expect("only the root continuation has no parent")
    }

    /// Record a source expression for diagnostics. Only compound
    /// expressions are worth keeping, and an expression already recorded on
    /// this continuation (by node identity) is suppressed.
    pub fn record(&self, exp: &Value) {
        let Value::Pair(p) = exp else { return };
        let mut exprs = self.exprs.borrow_mut();
        for seen in exprs.iter() {
            if let Value::Pair(q) = seen {
                if Rc::ptr_eq(p, q) {
                    return;
                }
            }
        }
        exprs.push(exp.clone());
    }

    /// Render the chain for diagnostics: this continuation's recorded
    /// expressions newest first, then the parent's, down to the root.
    pub fn render(&self) -> Vec<String> {
        let mut out = Vec::new();
        for exp in self.exprs.borrow().iter().rev() {
            out.push(printer::write_str(exp));
        }
        let mut cur = self.parent.clone();
        while let Some(k) = cur {
            for exp in k.exprs.borrow().iter().rev() {
                out.push(printer::write_str(exp));
            }
            cur = k.parent.clone();
        }
        out
    }
}

//===----------------------------------------------------------------------===//
// Step
//===----------------------------------------------------------------------===//

/// A pending unit of control flow. Anything that would otherwise call back
/// into the evaluator from tail position returns one of these instead; the
/// drive loop forces them until `Done` appears, so source-level recursion
/// never consumes host stack.
pub enum Step {
    /// The root continuation received this value.
    Done(Value),
    /// Evaluate `exp` in `env`, delivering the result to `k`.
    Eval { exp: Value, env: EnvRef, k: ContRef },
    /// Deliver `value` to `k`.
    Resume { k: ContRef, value: Value },
}
