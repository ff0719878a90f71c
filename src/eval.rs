use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use rustc_hash::FxHashMap;

use crate::cont::{Cont, ContOp, ContRef, Step};
use crate::env::{Env, EnvRef};
use crate::error::{Error, Unhandled};
use crate::interner::{self, SymId};
use crate::printer;
use crate::value::{
    list_items, Closure, CoreForm, Formals, PairRef, PrimitiveKind, Procedure,
    Syntax, SyntaxKind, Value,
};

//===----------------------------------------------------------------------===//
// Evaluator
//===----------------------------------------------------------------------===//

/// The continuation-passing evaluator. Each entry point returns a pending
/// [`Step`] instead of recursing, and [`Evaluator::run`] forces steps
/// iteratively, so tail calls consume constant host stack.
pub struct Evaluator {
    /// Head symbols dispatched as special forms: the six core forms plus
    /// every macro registered by `define`.
    special_forms: RefCell<FxHashMap<SymId, Rc<Syntax>>>,
    begin_syntax: Rc<Syntax>,
    lambda_syntax: Rc<Syntax>,
}

impl Evaluator {
    pub fn new() -> Self {
        let mut table = FxHashMap::default();
        let mut core = |name: &str, form: CoreForm| {
            let id = interner::intern(name);
            let syntax = Syntax::core(form, id);
            table.insert(id, syntax.clone());
            syntax
        };
        let begin_syntax = core("begin", CoreForm::Begin);
        core("define", CoreForm::Define);
        core("if", CoreForm::If);
        let lambda_syntax = core("lambda", CoreForm::Lambda);
        core("quote", CoreForm::Quote);
        core("set!", CoreForm::Set);
        Evaluator { special_forms: RefCell::new(table), begin_syntax, lambda_syntax }
    }

    /// The current special-form table as (name, value) pairs, so the
    /// runtime can also bind the core forms in the global environment.
    pub fn syntax_bindings(&self) -> Vec<(SymId, Value)> {
        self.special_forms
            .borrow()
            .iter()
            .map(|(&name, syntax)| (name, Value::Syntax(syntax.clone())))
            .collect()
    }

    /// Register a macro transformer under a head symbol. Done by `define`
    /// when the defined value turns out to be a macro.
    pub fn register_macro(&self, name: SymId, syntax: Rc<Syntax>) {
        debug!("registering macro {}", interner::name(name));
        self.special_forms.borrow_mut().insert(name, syntax);
    }

    fn special_form_for(&self, head: &Value) -> Option<Rc<Syntax>> {
        match head {
            Value::Symbol(id) => self.special_forms.borrow().get(id).cloned(),
            Value::Syntax(s) => Some(s.clone()),
            _ => None,
        }
    }

    //===------------------------------------------------------------------===//
    // Drive loop
    //===------------------------------------------------------------------===//

    /// Evaluate one expression to a value, or to the unhandled condition
    /// that aborted it.
    pub fn eval(&self, exp: &Value, env: &EnvRef) -> Result<Value, Unhandled> {
        self.run(Step::Eval { exp: exp.clone(), env: env.clone(), k: Cont::halt() })
    }

    /// Force pending steps until a value reaches a root continuation.
    pub fn run(&self, mut step: Step) -> Result<Value, Unhandled> {
        loop {
            step = match step {
                Step::Done(value) => return Ok(value),
                Step::Eval { exp, env, k } => self.eval_step(exp, env, k)?,
                Step::Resume { k, value } => self.resume(&k, value)?,
            };
        }
    }

    //===------------------------------------------------------------------===//
    // Expression dispatch
    //===------------------------------------------------------------------===//

    fn eval_step(&self, exp: Value, env: EnvRef, k: ContRef) -> Result<Step, Unhandled> {
        k.record(&exp);
        match exp {
            Value::Pair(p) => {
                let head = p.car();
                if let Some(syntax) = self.special_form_for(&head) {
                    return self.dispatch_syntax(&syntax, &p, env, k);
                }
                let operator_k = Cont::chain(
                    ContOp::Operator { exp: p, env: env.clone() },
                    &k,
                );
                operator_k.record(&head);
                Ok(Step::Eval { exp: head, env, k: operator_k })
            }
            Value::Symbol(id) => match env.lookup(id) {
                Ok(value) => Ok(Step::Resume { k, value }),
                Err(e) => self.raise(&k, e),
            },
            other => Ok(Step::Resume { k, value: other }),
        }
    }

    fn resume(&self, k: &ContRef, value: Value) -> Result<Step, Unhandled> {
        match &k.op {
            ContOp::Halt => Ok(Step::Done(value)),
            ContOp::Operator { exp, env } => {
                let operands_k = Cont::chain(
                    ContOp::Operands { operator: value },
                    &k.parent(),
                );
                let rands = exp.cdr();
                operands_k.record(&rands);
                self.eval_list(rands, env.clone(), operands_k)
            }
            ContOp::Operands { operator } => {
                // Application happens in the continuation the whole call
                // expression had: tail position is preserved.
                self.apply(operator.clone(), value, &k.parent())
            }
            ContOp::ListItem { rest, env } => {
                let tail_k =
                    Cont::chain(ContOp::ListTail { head: value }, &k.parent());
                tail_k.record(rest);
                self.eval_list(rest.clone(), env.clone(), tail_k)
            }
            ContOp::ListTail { head } => Ok(Step::Resume {
                k: k.parent(),
                value: Value::cons(head.clone(), value),
            }),
            ContOp::Sequence { rest, env } => {
                self.eval_sequence(rest.clone(), env.clone(), &k.parent())
            }
            ContOp::Define { name, env } => {
                if let Value::Syntax(s) = &value {
                    if s.is_macro() {
                        self.register_macro(*name, s.clone());
                    }
                }
                match env.define(*name, value.clone()) {
                    Ok(()) => Ok(Step::Resume { k: k.parent(), value }),
                    Err(e) => self.raise(k, e),
                }
            }
            ContOp::Assign { name, env } => match env.assign(*name, value.clone()) {
                Ok(()) => Ok(Step::Resume { k: k.parent(), value }),
                Err(e) => self.raise(k, e),
            },
            ContOp::Branch { conseq, alt, env } => {
                let target = if value.is_false() { alt } else { conseq };
                Ok(Step::Eval {
                    exp: target.clone(),
                    env: env.clone(),
                    k: k.parent(),
                })
            }
            ContOp::Expand { site, env } => {
                self.cache_expansion(site, &value);
                Ok(Step::Eval { exp: value, env: env.clone(), k: k.parent() })
            }
            ContOp::Handler { .. } => {
                // No condition reached this barrier; pass the value along.
                Ok(Step::Resume { k: k.parent(), value })
            }
        }
    }

    /// Evaluate an operand list strictly left to right, delivering the
    /// evaluated list to `k`.
    fn eval_list(&self, exps: Value, env: EnvRef, k: ContRef) -> Result<Step, Unhandled> {
        match exps {
            Value::Null => Ok(Step::Resume { k, value: Value::Null }),
            Value::Pair(p) => {
                let first = p.car();
                let item_k = Cont::chain(
                    ContOp::ListItem { rest: p.cdr(), env: env.clone() },
                    &k,
                );
                item_k.record(&first);
                Ok(Step::Eval { exp: first, env, k: item_k })
            }
            other => self.raise(
                &k,
                Error::MalformedForm {
                    form: "application",
                    reason: format!("improper operand list ending in {}", other.type_name()),
                },
            ),
        }
    }

    /// Evaluate a body as an implicit `begin`: all but the last expression
    /// for effect, the last one in tail position on `k`.
    fn eval_sequence(
        &self,
        body: Value,
        env: EnvRef,
        k: &ContRef,
    ) -> Result<Step, Unhandled> {
        match body {
            Value::Null => Ok(Step::Resume { k: k.clone(), value: Value::Undefined }),
            Value::Pair(p) => {
                let first = p.car();
                let rest = p.cdr();
                if rest.is_null() {
                    return Ok(Step::Eval { exp: first, env, k: k.clone() });
                }
                let seq_k =
                    Cont::chain(ContOp::Sequence { rest, env: env.clone() }, k);
                seq_k.record(&first);
                Ok(Step::Eval { exp: first, env, k: seq_k })
            }
            other => self.raise(
                k,
                Error::MalformedForm {
                    form: "begin",
                    reason: format!("improper body ending in {}", other.type_name()),
                },
            ),
        }
    }

    //===------------------------------------------------------------------===//
    // Application
    //===------------------------------------------------------------------===//

    /// Apply a procedure to an evaluated argument list in continuation `k`.
    pub fn apply(
        &self,
        operator: Value,
        args: Value,
        k: &ContRef,
    ) -> Result<Step, Unhandled> {
        let argv = match list_items(&args) {
            Some(argv) => argv,
            None => {
                return self.raise(
                    k,
                    Error::TypeMismatch {
                        expected: "proper argument list",
                        found: args.type_name().to_string(),
                    },
                );
            }
        };
        match operator {
            Value::Procedure(Procedure::Primitive(p)) => match &p.kind {
                PrimitiveKind::Pure(f) => match f(&argv) {
                    Ok(value) => Ok(Step::Resume { k: k.clone(), value }),
                    Err(e) => self.raise(k, e),
                },
                PrimitiveKind::Control(f) => f(self, argv, k),
            },
            Value::Procedure(Procedure::Closure(c)) => {
                match Env::bind(&c.env, &c.formals, argv) {
                    Ok(call_env) => self.eval_sequence(c.body.clone(), call_env, k),
                    Err(e) => self.raise(k, e),
                }
            }
            Value::Procedure(Procedure::Continuation(target)) => {
                if argv.len() != 1 {
                    return self.raise(
                        k,
                        Error::ArityMismatch { expected: "1".to_string(), got: argv.len() },
                    );
                }
                let mut argv = argv;
                // Invoking an escape continuation discards `k` entirely and
                // transfers control to the captured chain.
                Ok(Step::Resume { k: target, value: argv.swap_remove(0) })
            }
            other => self.raise(
                k,
                Error::TypeMismatch { expected: "procedure", found: other.type_name().to_string() },
            ),
        }
    }

    //===------------------------------------------------------------------===//
    // Conditions
    //===------------------------------------------------------------------===//

    /// Raise a condition in continuation `origin`: walk the parent chain for
    /// a handler barrier; unhandled conditions abort the current top-level
    /// evaluation with the continuation rendering attached.
    pub fn raise(&self, origin: &ContRef, error: Error) -> Result<Step, Unhandled> {
        let mut cur = origin.clone();
        loop {
            if let ContOp::Handler { handler } = &cur.op {
                debug!("condition {} caught by handler", error.tag());
                let args = Value::list(vec![
                    condition_value(&error),
                    Value::Procedure(Procedure::Continuation(origin.clone())),
                ]);
                return self.apply(handler.clone(), args, &cur.parent());
            }
            let Some(next) = cur.parent.clone() else { break };
            cur = next;
        }
        Err(Unhandled { error, trace: origin.render() })
    }

    //===------------------------------------------------------------------===//
    // Special forms
    //===------------------------------------------------------------------===//

    fn dispatch_syntax(
        &self,
        syntax: &Rc<Syntax>,
        exp: &PairRef,
        env: EnvRef,
        k: ContRef,
    ) -> Result<Step, Unhandled> {
        match &syntax.kind {
            SyntaxKind::Core(CoreForm::Begin) => self.eval_sequence(exp.cdr(), env, &k),
            SyntaxKind::Core(CoreForm::Define) => self.syn_define(exp, env, k),
            SyntaxKind::Core(CoreForm::If) => self.syn_if(exp, env, k),
            SyntaxKind::Core(CoreForm::Lambda) => self.syn_lambda(exp, env, k),
            SyntaxKind::Core(CoreForm::Quote) => self.syn_quote(exp, k),
            SyntaxKind::Core(CoreForm::Set) => self.syn_set(exp, env, k),
            SyntaxKind::Macro(transformer) => {
                debug!(
                    "expanding macro call {}",
                    printer::write_str(&Value::Pair(exp.clone()))
                );
                let expand_k = Cont::chain(
                    ContOp::Expand { site: exp.clone(), env: env.clone() },
                    &k,
                );
                expand_k.record(&Value::Pair(exp.clone()));
                // The transformer sees the entire unevaluated expression as
                // its argument list.
                self.apply(
                    Value::Procedure(transformer.clone()),
                    Value::Pair(exp.clone()),
                    &expand_k,
                )
            }
        }
    }

    fn syn_define(&self, exp: &PairRef, env: EnvRef, k: ContRef) -> Result<Step, Unhandled> {
        let form = Value::Pair(exp.clone());
        let Some(items) = list_items(&form) else {
            return self.raise(&k, malformed("define", "improper form"));
        };
        match items.get(1) {
            Some(Value::Symbol(name)) => {
                if items.len() != 3 {
                    return self.raise(
                        &k,
                        malformed("define", "expected (define name expression)"),
                    );
                }
                let value_exp = items[2].clone();
                let define_k =
                    Cont::chain(ContOp::Define { name: *name, env: env.clone() }, &k);
                define_k.record(&value_exp);
                Ok(Step::Eval { exp: value_exp, env, k: define_k })
            }
            Some(Value::Pair(target)) => {
                // (define (name . formals) body...) sugars to a lambda.
                let name = match target.car() {
                    Value::Symbol(s) => s,
                    other => {
                        return self.raise(
                            &k,
                            malformed(
                                "define",
                                &format!("procedure name must be a symbol, got {}",
                                    other.type_name()),
                            ),
                        );
                    }
                };
                let body = match exp.cdr() {
                    Value::Pair(p) => p.cdr(),
                    _ => Value::Null,
                };
                let lambda_exp = Value::cons(
                    Value::Syntax(self.lambda_syntax.clone()),
                    Value::cons(target.cdr(), body),
                );
                let define_k =
                    Cont::chain(ContOp::Define { name, env: env.clone() }, &k);
                Ok(Step::Eval { exp: lambda_exp, env, k: define_k })
            }
            Some(other) => self.raise(
                &k,
                malformed(
                    "define",
                    &format!("cannot define a {}", other.type_name()),
                ),
            ),
            None => self.raise(&k, malformed("define", "expected (define name expression)")),
        }
    }

    fn syn_if(&self, exp: &PairRef, env: EnvRef, k: ContRef) -> Result<Step, Unhandled> {
        let form = Value::Pair(exp.clone());
        let Some(items) = list_items(&form) else {
            return self.raise(&k, malformed("if", "improper form"));
        };
        if items.len() != 3 && items.len() != 4 {
            return self.raise(&k, malformed("if", "expected 2 or 3 operands"));
        }
        let test = items[1].clone();
        let branch_k = Cont::chain(
            ContOp::Branch {
                conseq: items[2].clone(),
                alt: items.get(3).cloned().unwrap_or(Value::Undefined),
                env: env.clone(),
            },
            &k,
        );
        branch_k.record(&test);
        Ok(Step::Eval { exp: test, env, k: branch_k })
    }

    fn syn_lambda(&self, exp: &PairRef, env: EnvRef, k: ContRef) -> Result<Step, Unhandled> {
        let rest = match exp.cdr() {
            Value::Pair(p) => p,
            _ => return self.raise(&k, malformed("lambda", "expected (lambda formals body...)")),
        };
        let formals = match Formals::parse(&rest.car()) {
            Ok(f) => f,
            Err(e) => return self.raise(&k, e),
        };
        let closure = Closure {
            formals,
            body: rest.cdr(),
            env,
            name: RefCell::new(None),
        };
        Ok(Step::Resume {
            k,
            value: Value::Procedure(Procedure::Closure(Rc::new(closure))),
        })
    }

    fn syn_quote(&self, exp: &PairRef, k: ContRef) -> Result<Step, Unhandled> {
        let form = Value::Pair(exp.clone());
        match list_items(&form) {
            Some(items) if items.len() == 2 => {
                Ok(Step::Resume { k, value: items[1].clone() })
            }
            _ => self.raise(&k, malformed("quote", "expected exactly one operand")),
        }
    }

    fn syn_set(&self, exp: &PairRef, env: EnvRef, k: ContRef) -> Result<Step, Unhandled> {
        let form = Value::Pair(exp.clone());
        let Some(items) = list_items(&form) else {
            return self.raise(&k, malformed("set!", "improper form"));
        };
        if items.len() != 3 {
            return self.raise(&k, malformed("set!", "expected (set! name expression)"));
        }
        let name = match &items[1] {
            Value::Symbol(s) => *s,
            other => {
                return self.raise(
                    &k,
                    malformed(
                        "set!",
                        &format!("target must be a symbol, got {}", other.type_name()),
                    ),
                );
            }
        };
        let value_exp = items[2].clone();
        let assign_k = Cont::chain(ContOp::Assign { name, env: env.clone() }, &k);
        assign_k.record(&value_exp);
        Ok(Step::Eval { exp: value_exp, env, k: assign_k })
    }

    //===------------------------------------------------------------------===//
    // Macro cache
    //===------------------------------------------------------------------===//

    /// Destructively replace the call-site node with the expansion, so the
    /// next visit to the same physical node skips the transformer. A
    /// non-pair expansion is cached as `(begin <expansion>)` using the
    /// begin syntax object itself in head position.
    fn cache_expansion(&self, site: &PairRef, expansion: &Value) {
        match expansion {
            Value::Pair(p) => {
                if Rc::ptr_eq(site, p) {
                    return;
                }
                *site.car.borrow_mut() = p.car();
                *site.cdr.borrow_mut() = p.cdr();
            }
            other => {
                *site.car.borrow_mut() = Value::Syntax(self.begin_syntax.clone());
                *site.cdr.borrow_mut() = Value::cons(other.clone(), Value::Null);
            }
        }
        debug!("cached macro expansion in place");
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn malformed(form: &'static str, reason: &str) -> Error {
    Error::MalformedForm { form, reason: reason.to_string() }
}

/// Condition data handed to scheme-level handlers: `(tag message)`.
fn condition_value(error: &Error) -> Value {
    Value::list(vec![
        Value::Symbol(interner::intern(error.tag())),
        Value::string(&error.to_string()),
    ])
}
