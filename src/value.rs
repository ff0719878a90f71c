use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::cont::{ContRef, Step};
use crate::env::EnvRef;
use crate::error::{Error, Unhandled};
use crate::eval::Evaluator;
use crate::interner::SymId;
use crate::printer;

//===----------------------------------------------------------------------===//
// Value
//===----------------------------------------------------------------------===//

/// A cons cell. Both slots are mutable and the cell is addressed by `Rc`
/// identity; `set-car!`/`set-cdr!` can create shared and cyclic structure.
pub struct Pair {
    pub car: RefCell<Value>,
    pub cdr: RefCell<Value>,
}

pub type PairRef = Rc<Pair>;

impl Pair {
    pub fn car(&self) -> Value {
        self.car.borrow().clone()
    }

    pub fn cdr(&self) -> Value {
        self.cdr.borrow().clone()
    }
}

#[derive(Clone)]
pub enum Value {
    Null,
    /// The unspecified value, produced by empty bodies and one-armed `if`.
    Undefined,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(Rc<str>),
    Symbol(SymId),
    Vector(Rc<RefCell<Vec<Value>>>),
    Pair(PairRef),
    Procedure(Procedure),
    Syntax(Rc<Syntax>),
}

impl Value {
    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Pair(Rc::new(Pair { car: RefCell::new(car), cdr: RefCell::new(cdr) }))
    }

    pub fn string(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    /// Build a proper list.
    pub fn list(items: Vec<Value>) -> Value {
        Value::list_with_tail(items, Value::Null)
    }

    /// Build a list ending in `tail` (a dotted list unless `tail` is null).
    pub fn list_with_tail(items: Vec<Value>, tail: Value) -> Value {
        let mut out = tail;
        for item in items.into_iter().rev() {
            out = Value::cons(item, out);
        }
        out
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The only false value is `#f`; everything else is truthy.
    pub fn is_false(&self) -> bool {
        matches!(self, Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Char(_) => "character",
            Value::Str(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Vector(_) => "vector",
            Value::Pair(_) => "pair",
            Value::Procedure(_) => "procedure",
            Value::Syntax(_) => "syntax",
        }
    }

    /// Record the name a value is being defined under, for diagnostics.
    /// First name wins; primitives already carry their name.
    pub fn got_name(&self, name: SymId) {
        match self {
            Value::Procedure(Procedure::Closure(c)) => {
                let mut slot = c.name.borrow_mut();
                if slot.is_none() {
                    *slot = Some(name);
                }
            }
            Value::Syntax(s) => {
                let mut slot = s.name.borrow_mut();
                if slot.is_none() {
                    *slot = Some(name);
                }
            }
            _ => {}
        }
    }
}

/// Collect a proper list into a vector; `None` for improper lists.
pub fn list_items(value: &Value) -> Option<Vec<Value>> {
    let mut out = Vec::new();
    let mut cur = value.clone();
    loop {
        match cur {
            Value::Null => return Some(out),
            Value::Pair(p) => {
                out.push(p.car());
                cur = p.cdr();
            }
            _ => return None,
        }
    }
}

//===----------------------------------------------------------------------===//
// Procedure
//===----------------------------------------------------------------------===//

/// Everything that can sit in operator position after evaluation. Each
/// variant is applied the same way: evaluated argument list in, one pending
/// step out.
#[derive(Clone)]
pub enum Procedure {
    Primitive(Rc<Primitive>),
    Closure(Rc<Closure>),
    Continuation(ContRef),
}

pub struct Primitive {
    pub name: &'static str,
    pub kind: PrimitiveKind,
}

/// Pure primitives map arguments to a value (or a condition). Control
/// primitives steer evaluation themselves: they see the evaluator and the
/// current continuation and produce the next pending step.
pub enum PrimitiveKind {
    Pure(fn(&[Value]) -> Result<Value, Error>),
    Control(fn(&Evaluator, Vec<Value>, &ContRef) -> Result<Step, Unhandled>),
}

pub struct Closure {
    pub formals: Formals,
    /// List of body expressions, evaluated as an implicit `begin`.
    pub body: Value,
    pub env: EnvRef,
    pub name: RefCell<Option<SymId>>,
}

//===----------------------------------------------------------------------===//
// Formals
//===----------------------------------------------------------------------===//

/// Parsed parameter specification of a closure: fixed names plus an
/// optional rest parameter that captures the remaining arguments as a list.
#[derive(Clone, Debug)]
pub struct Formals {
    pub required: Vec<SymId>,
    pub rest: Option<SymId>,
}

impl Formals {
    pub fn parse(spec: &Value) -> Result<Formals, Error> {
        let mut required = Vec::new();
        let mut cur = spec.clone();
        loop {
            match cur {
                Value::Null => return Ok(Formals { required, rest: None }),
                Value::Symbol(s) => return Ok(Formals { required, rest: Some(s) }),
                Value::Pair(p) => {
                    match p.car() {
                        Value::Symbol(s) => required.push(s),
                        other => {
                            return Err(Error::MalformedForm {
                                form: "lambda",
                                reason: format!(
                                    "formal parameters must be symbols, got {}",
                                    other.type_name()
                                ),
                            });
                        }
                    }
                    cur = p.cdr();
                }
                other => {
                    return Err(Error::MalformedForm {
                        form: "lambda",
                        reason: format!(
                            "bad formal parameter list tail: {}",
                            other.type_name()
                        ),
                    });
                }
            }
        }
    }

    /// Human description of the accepted argument count, for arity errors.
    pub fn expected_text(&self) -> String {
        match (self.required.len(), self.rest.is_some()) {
            (n, false) => format!("{}", n),
            (0, true) => "any number".to_string(),
            (n, true) => format!("at least {}", n),
        }
    }
}

//===----------------------------------------------------------------------===//
// Syntax
//===----------------------------------------------------------------------===//

/// A special-form handler. Syntax values are first class: they are bound in
/// the global environment under their form names, dispatched when a symbol
/// in head position resolves through the special-form table, and the macro
/// cache writes the `begin` syntax object directly into rewritten nodes.
pub struct Syntax {
    pub name: RefCell<Option<SymId>>,
    pub kind: SyntaxKind,
}

pub enum SyntaxKind {
    Core(CoreForm),
    /// A macro: the wrapped transformer is applied to the entire
    /// unevaluated call expression.
    Macro(Procedure),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CoreForm {
    Begin,
    Define,
    If,
    Lambda,
    Quote,
    Set,
}

impl Syntax {
    pub fn core(form: CoreForm, name: SymId) -> Rc<Syntax> {
        Rc::new(Syntax { name: RefCell::new(Some(name)), kind: SyntaxKind::Core(form) })
    }

    pub fn macro_from(transformer: Procedure) -> Rc<Syntax> {
        Rc::new(Syntax { name: RefCell::new(None), kind: SyntaxKind::Macro(transformer) })
    }

    pub fn is_macro(&self) -> bool {
        matches!(self.kind, SyntaxKind::Macro(_))
    }
}

//===----------------------------------------------------------------------===//
// Equivalence
//===----------------------------------------------------------------------===//

/// `eqv?`-style identity: pointer identity for heap values, value identity
/// for immediates.
pub fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Undefined, Value::Undefined) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Char(x), Value::Char(y)) => x == y,
        (Value::Symbol(x), Value::Symbol(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y),
        (Value::Vector(x), Value::Vector(y)) => Rc::ptr_eq(x, y),
        (Value::Pair(x), Value::Pair(y)) => Rc::ptr_eq(x, y),
        (Value::Syntax(x), Value::Syntax(y)) => Rc::ptr_eq(x, y),
        (Value::Procedure(x), Value::Procedure(y)) => match (x, y) {
            (Procedure::Primitive(p), Procedure::Primitive(q)) => Rc::ptr_eq(p, q),
            (Procedure::Closure(p), Procedure::Closure(q)) => Rc::ptr_eq(p, q),
            (Procedure::Continuation(p), Procedure::Continuation(q)) => {
                Rc::ptr_eq(p, q)
            }
            _ => false,
        },
        _ => false,
    }
}

/// Structural `equal?`. Shared and cyclic structure is guarded with a
/// visited set keyed on node identity; a revisited node pair compares equal.
pub fn equal(a: &Value, b: &Value) -> bool {
    fn go(a: &Value, b: &Value, seen: &mut FxHashSet<(usize, usize)>) -> bool {
        match (a, b) {
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::Pair(x), Value::Pair(y)) => {
                let key = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
                if !seen.insert(key) {
                    return true;
                }
                go(&x.car(), &y.car(), seen) && go(&x.cdr(), &y.cdr(), seen)
            }
            (Value::Vector(x), Value::Vector(y)) => {
                let key = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
                if !seen.insert(key) {
                    return true;
                }
                let (x, y) = (x.borrow(), y.borrow());
                x.len() == y.len()
                    && x.iter().zip(y.iter()).all(|(a, b)| go(a, b, seen))
            }
            _ => identical(a, b),
        }
    }
    go(a, b, &mut FxHashSet::default())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", printer::display_str(self))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", printer::write_str(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner;

    #[test]
    fn formals_fixed() {
        let spec = Value::list(vec![
            Value::Symbol(interner::intern("a")),
            Value::Symbol(interner::intern("b")),
        ]);
        let formals = Formals::parse(&spec).unwrap();
        assert_eq!(formals.required.len(), 2);
        assert!(formals.rest.is_none());
    }

    #[test]
    fn formals_dotted_rest() {
        let spec = Value::list_with_tail(
            vec![Value::Symbol(interner::intern("a"))],
            Value::Symbol(interner::intern("rest")),
        );
        let formals = Formals::parse(&spec).unwrap();
        assert_eq!(formals.required.len(), 1);
        assert_eq!(formals.rest, Some(interner::intern("rest")));
    }

    #[test]
    fn formals_single_symbol_collects_everything() {
        let formals =
            Formals::parse(&Value::Symbol(interner::intern("args"))).unwrap();
        assert!(formals.required.is_empty());
        assert!(formals.rest.is_some());
    }

    #[test]
    fn formals_reject_non_symbols() {
        let spec = Value::list(vec![Value::Int(1)]);
        assert!(Formals::parse(&spec).is_err());
    }

    #[test]
    fn equal_handles_cycles() {
        let a = Value::cons(Value::Int(1), Value::Null);
        if let Value::Pair(p) = &a {
            *p.cdr.borrow_mut() = a.clone();
        }
        let b = Value::cons(Value::Int(1), Value::Null);
        if let Value::Pair(p) = &b {
            *p.cdr.borrow_mut() = b.clone();
        }
        assert!(equal(&a, &b));
        assert!(!identical(&a, &b));
    }

    #[test]
    fn equal_compares_strings_by_content() {
        assert!(equal(&Value::string("abc"), &Value::string("abc")));
        assert!(!identical(&Value::string("abc"), &Value::string("abc")));
    }
}
