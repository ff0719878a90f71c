use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use itertools::Itertools;

use crate::cont::{Cont, ContOp, ContRef, Step};
use crate::env::{location, Location};
use crate::error::{Error, Unhandled};
use crate::eval::Evaluator;
use crate::interner;
use crate::printer;
use crate::runtime::BindingsProvider;
use crate::value::{
    equal, identical, list_items, Primitive, PrimitiveKind, Procedure, Syntax, Value,
};

/// The builtin procedure library, packaged as a bindings provider so the
/// interpreter merges it like any other extension bundle.
pub struct Builtins;

fn pure(name: &'static str, f: fn(&[Value]) -> Result<Value, Error>) -> (String, Location) {
    let proc = Primitive { name, kind: PrimitiveKind::Pure(f) };
    (name.to_string(), location(Value::Procedure(Procedure::Primitive(Rc::new(proc)))))
}

fn control(
    name: &'static str,
    f: fn(&Evaluator, Vec<Value>, &ContRef) -> Result<Step, Unhandled>,
) -> (String, Location) {
    let proc = Primitive { name, kind: PrimitiveKind::Control(f) };
    (name.to_string(), location(Value::Procedure(Procedure::Primitive(Rc::new(proc)))))
}

impl BindingsProvider for Builtins {
    fn bindings(&self) -> Vec<(String, Location)> {
        let mut out = vec![
            // Pairs
            pure("cons", prim_cons),
            pure("car", prim_car),
            pure("cdr", prim_cdr),
            pure("set-car!", prim_set_car),
            pure("set-cdr!", prim_set_cdr),
            pure("pair?", prim_is_pair),
            pure("null?", prim_is_null),
            pure("list?", prim_is_list),
            // Equivalence
            pure("eq?", prim_eqv),
            pure("eqv?", prim_eqv),
            pure("equal?", prim_equal),
            // Numbers
            pure("+", prim_add),
            pure("-", prim_sub),
            pure("*", prim_mul),
            pure("quotient", prim_quotient),
            pure("remainder", prim_remainder),
            pure("=", prim_num_eq),
            pure("<", prim_lt),
            pure(">", prim_gt),
            pure("<=", prim_le),
            pure(">=", prim_ge),
            pure("number?", prim_is_number),
            // Type predicates
            pure("boolean?", prim_is_boolean),
            pure("symbol?", prim_is_symbol),
            pure("char?", prim_is_char),
            pure("string?", prim_is_string),
            pure("vector?", prim_is_vector),
            pure("procedure?", prim_is_procedure),
            // Symbols
            pure("symbol->string", prim_symbol_to_string),
            pure("string->symbol", prim_string_to_symbol),
            pure("gensym", prim_gensym),
            // Strings
            pure("string-length", prim_string_length),
            pure("string-append", prim_string_append),
            // Vectors
            pure("vector", prim_vector),
            pure("make-vector", prim_make_vector),
            pure("vector-ref", prim_vector_ref),
            pure("vector-set!", prim_vector_set),
            pure("vector-length", prim_vector_length),
            pure("vector->list", prim_vector_to_list),
            pure("list->vector", prim_list_to_vector),
            // Macros
            pure("procedure->macro", prim_procedure_to_macro),
            // Output
            pure("display", prim_display),
            pure("write", prim_write),
            pure("newline", prim_newline),
            // Control
            control("apply", prim_apply),
            control("call-with-handler", prim_call_with_handler),
            control("error", prim_error),
        ];
        // call/cc is the same procedure under its short name: one location,
        // two bindings.
        let callcc = control("call-with-current-continuation", prim_call_cc);
        out.push(("call/cc".to_string(), callcc.1.clone()));
        out.push(callcc);
        out
    }
}

//===----------------------------------------------------------------------===//
// Helpers
//===----------------------------------------------------------------------===//

fn want(args: &[Value], n: usize) -> Result<(), Error> {
    if args.len() == n {
        Ok(())
    } else {
        Err(Error::ArityMismatch { expected: n.to_string(), got: args.len() })
    }
}

fn pair_of(v: &Value) -> Result<&Rc<crate::value::Pair>, Error> {
    match v {
        Value::Pair(p) => Ok(p),
        other => Err(Error::TypeMismatch { expected: "pair", found: other.type_name().to_string() }),
    }
}

#[derive(Copy, Clone)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(x) => x,
        }
    }

    fn to_value(self) -> Value {
        match self {
            Num::Int(n) => Value::Int(n),
            Num::Float(x) => Value::Float(x),
        }
    }
}

fn num_of(v: &Value) -> Result<Num, Error> {
    match v {
        Value::Int(n) => Ok(Num::Int(*n)),
        Value::Float(x) => Ok(Num::Float(*x)),
        other => {
            Err(Error::TypeMismatch { expected: "number", found: other.type_name().to_string() })
        }
    }
}

fn int_of(v: &Value) -> Result<i64, Error> {
    match v {
        Value::Int(n) => Ok(*n),
        other => {
            Err(Error::TypeMismatch { expected: "integer", found: other.type_name().to_string() })
        }
    }
}

fn overflow() -> Error {
    Error::HostInterop("integer overflow".to_string())
}

//===----------------------------------------------------------------------===//
// Pairs
//===----------------------------------------------------------------------===//

fn prim_cons(args: &[Value]) -> Result<Value, Error> {
    want(args, 2)?;
    Ok(Value::cons(args[0].clone(), args[1].clone()))
}

fn prim_car(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    Ok(pair_of(&args[0])?.car())
}

fn prim_cdr(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    Ok(pair_of(&args[0])?.cdr())
}

fn prim_set_car(args: &[Value]) -> Result<Value, Error> {
    want(args, 2)?;
    *pair_of(&args[0])?.car.borrow_mut() = args[1].clone();
    Ok(Value::Undefined)
}

fn prim_set_cdr(args: &[Value]) -> Result<Value, Error> {
    want(args, 2)?;
    *pair_of(&args[0])?.cdr.borrow_mut() = args[1].clone();
    Ok(Value::Undefined)
}

fn prim_is_pair(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Pair(_))))
}

fn prim_is_null(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    Ok(Value::Bool(args[0].is_null()))
}

fn prim_is_list(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    // Tortoise and hare, so cyclic structure answers #f instead of hanging.
    let mut slow = args[0].clone();
    let mut fast = args[0].clone();
    loop {
        for _ in 0..2 {
            fast = match fast {
                Value::Null => return Ok(Value::Bool(true)),
                Value::Pair(p) => p.cdr(),
                _ => return Ok(Value::Bool(false)),
            };
        }
        slow = match slow {
            Value::Pair(p) => p.cdr(),
            _ => return Ok(Value::Bool(false)),
        };
        if identical(&fast, &slow) {
            return Ok(Value::Bool(false));
        }
    }
}

//===----------------------------------------------------------------------===//
// Equivalence
//===----------------------------------------------------------------------===//

fn prim_eqv(args: &[Value]) -> Result<Value, Error> {
    want(args, 2)?;
    Ok(Value::Bool(identical(&args[0], &args[1])))
}

fn prim_equal(args: &[Value]) -> Result<Value, Error> {
    want(args, 2)?;
    Ok(Value::Bool(equal(&args[0], &args[1])))
}

//===----------------------------------------------------------------------===//
// Numbers
//===----------------------------------------------------------------------===//

fn prim_add(args: &[Value]) -> Result<Value, Error> {
    let mut acc = Num::Int(0);
    for arg in args {
        acc = match (acc, num_of(arg)?) {
            (Num::Int(a), Num::Int(b)) => Num::Int(a.checked_add(b).ok_or_else(overflow)?),
            (a, b) => Num::Float(a.as_f64() + b.as_f64()),
        };
    }
    Ok(acc.to_value())
}

fn prim_sub(args: &[Value]) -> Result<Value, Error> {
    if args.is_empty() {
        return Err(Error::ArityMismatch {
            expected: "at least 1".to_string(),
            got: 0,
        });
    }
    let mut acc = num_of(&args[0])?;
    if args.len() == 1 {
        return match acc {
            Num::Int(n) => Ok(Value::Int(n.checked_neg().ok_or_else(overflow)?)),
            Num::Float(x) => Ok(Value::Float(-x)),
        };
    }
    for arg in &args[1..] {
        acc = match (acc, num_of(arg)?) {
            (Num::Int(a), Num::Int(b)) => Num::Int(a.checked_sub(b).ok_or_else(overflow)?),
            (a, b) => Num::Float(a.as_f64() - b.as_f64()),
        };
    }
    Ok(acc.to_value())
}

fn prim_mul(args: &[Value]) -> Result<Value, Error> {
    let mut acc = Num::Int(1);
    for arg in args {
        acc = match (acc, num_of(arg)?) {
            (Num::Int(a), Num::Int(b)) => Num::Int(a.checked_mul(b).ok_or_else(overflow)?),
            (a, b) => Num::Float(a.as_f64() * b.as_f64()),
        };
    }
    Ok(acc.to_value())
}

fn prim_quotient(args: &[Value]) -> Result<Value, Error> {
    want(args, 2)?;
    let (a, b) = (int_of(&args[0])?, int_of(&args[1])?);
    if b == 0 {
        return Err(Error::HostInterop("quotient: division by zero".to_string()));
    }
    Ok(Value::Int(a.checked_div(b).ok_or_else(overflow)?))
}

fn prim_remainder(args: &[Value]) -> Result<Value, Error> {
    want(args, 2)?;
    let (a, b) = (int_of(&args[0])?, int_of(&args[1])?);
    if b == 0 {
        return Err(Error::HostInterop("remainder: division by zero".to_string()));
    }
    Ok(Value::Int(a.checked_rem(b).ok_or_else(overflow)?))
}

fn compare(args: &[Value], ok: fn(std::cmp::Ordering) -> bool) -> Result<Value, Error> {
    if args.len() < 2 {
        return Err(Error::ArityMismatch {
            expected: "at least 2".to_string(),
            got: args.len(),
        });
    }
    for window in args.windows(2) {
        let (a, b) = (num_of(&window[0])?, num_of(&window[1])?);
        let ordering = match (a, b) {
            (Num::Int(a), Num::Int(b)) => a.cmp(&b),
            (a, b) => match a.as_f64().partial_cmp(&b.as_f64()) {
                Some(o) => o,
                None => return Ok(Value::Bool(false)),
            },
        };
        if !ok(ordering) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn prim_num_eq(args: &[Value]) -> Result<Value, Error> {
    compare(args, |o| o.is_eq())
}

fn prim_lt(args: &[Value]) -> Result<Value, Error> {
    compare(args, |o| o.is_lt())
}

fn prim_gt(args: &[Value]) -> Result<Value, Error> {
    compare(args, |o| o.is_gt())
}

fn prim_le(args: &[Value]) -> Result<Value, Error> {
    compare(args, |o| o.is_le())
}

fn prim_ge(args: &[Value]) -> Result<Value, Error> {
    compare(args, |o| o.is_ge())
}

fn prim_is_number(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Int(_) | Value::Float(_))))
}

//===----------------------------------------------------------------------===//
// Type predicates
//===----------------------------------------------------------------------===//

fn prim_is_boolean(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Bool(_))))
}

fn prim_is_symbol(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Symbol(_))))
}

fn prim_is_char(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Char(_))))
}

fn prim_is_string(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Str(_))))
}

fn prim_is_vector(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Vector(_))))
}

fn prim_is_procedure(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Procedure(_))))
}

//===----------------------------------------------------------------------===//
// Symbols
//===----------------------------------------------------------------------===//

fn prim_symbol_to_string(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    match &args[0] {
        Value::Symbol(id) => Ok(Value::string(&interner::name(*id))),
        other => {
            Err(Error::TypeMismatch { expected: "symbol", found: other.type_name().to_string() })
        }
    }
}

fn prim_string_to_symbol(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    match &args[0] {
        Value::Str(s) => Ok(Value::Symbol(interner::intern(s))),
        other => {
            Err(Error::TypeMismatch { expected: "string", found: other.type_name().to_string() })
        }
    }
}

static GENSYM_COUNTER: AtomicU64 = AtomicU64::new(0);

fn prim_gensym(args: &[Value]) -> Result<Value, Error> {
    want(args, 0)?;
    let n = GENSYM_COUNTER.fetch_add(1, Ordering::Relaxed);
    Ok(Value::Symbol(interner::intern(&format!("g__{}", n))))
}

//===----------------------------------------------------------------------===//
// Strings
//===----------------------------------------------------------------------===//

fn str_of(v: &Value) -> Result<&Rc<str>, Error> {
    match v {
        Value::Str(s) => Ok(s),
        other => {
            Err(Error::TypeMismatch { expected: "string", found: other.type_name().to_string() })
        }
    }
}

fn prim_string_length(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    Ok(Value::Int(str_of(&args[0])?.chars().count() as i64))
}

fn prim_string_append(args: &[Value]) -> Result<Value, Error> {
    let mut out = String::new();
    for arg in args {
        out.push_str(str_of(arg)?);
    }
    Ok(Value::string(&out))
}

//===----------------------------------------------------------------------===//
// Vectors
//===----------------------------------------------------------------------===//

fn vec_of(v: &Value) -> Result<&Rc<std::cell::RefCell<Vec<Value>>>, Error> {
    match v {
        Value::Vector(v) => Ok(v),
        other => {
            Err(Error::TypeMismatch { expected: "vector", found: other.type_name().to_string() })
        }
    }
}

fn prim_vector(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Vector(Rc::new(std::cell::RefCell::new(args.to_vec()))))
}

fn prim_make_vector(args: &[Value]) -> Result<Value, Error> {
    if args.is_empty() || args.len() > 2 {
        return Err(Error::ArityMismatch {
            expected: "1 or 2".to_string(),
            got: args.len(),
        });
    }
    let len = int_of(&args[0])?;
    if len < 0 {
        return Err(Error::HostInterop("make-vector: negative length".to_string()));
    }
    let fill = args.get(1).cloned().unwrap_or(Value::Undefined);
    Ok(Value::Vector(Rc::new(std::cell::RefCell::new(vec![fill; len as usize]))))
}

fn vector_index(v: &[Value], idx: i64) -> Result<usize, Error> {
    if idx < 0 || idx as usize >= v.len() {
        return Err(Error::HostInterop(format!(
            "vector index {} out of range 0..{}",
            idx,
            v.len()
        )));
    }
    Ok(idx as usize)
}

fn prim_vector_ref(args: &[Value]) -> Result<Value, Error> {
    want(args, 2)?;
    let v = vec_of(&args[0])?.borrow();
    let idx = vector_index(&v, int_of(&args[1])?)?;
    Ok(v[idx].clone())
}

fn prim_vector_set(args: &[Value]) -> Result<Value, Error> {
    want(args, 3)?;
    let mut v = vec_of(&args[0])?.borrow_mut();
    let idx = vector_index(&v, int_of(&args[1])?)?;
    v[idx] = args[2].clone();
    Ok(Value::Undefined)
}

fn prim_vector_length(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    Ok(Value::Int(vec_of(&args[0])?.borrow().len() as i64))
}

fn prim_vector_to_list(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    Ok(Value::list(vec_of(&args[0])?.borrow().clone()))
}

fn prim_list_to_vector(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    match list_items(&args[0]) {
        Some(items) => Ok(Value::Vector(Rc::new(std::cell::RefCell::new(items)))),
        None => Err(Error::TypeMismatch {
            expected: "proper list",
            found: args[0].type_name().to_string(),
        }),
    }
}

//===----------------------------------------------------------------------===//
// Macros
//===----------------------------------------------------------------------===//

fn prim_procedure_to_macro(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    match &args[0] {
        Value::Procedure(p) => Ok(Value::Syntax(Syntax::macro_from(p.clone()))),
        other => {
            Err(Error::TypeMismatch { expected: "procedure", found: other.type_name().to_string() })
        }
    }
}

//===----------------------------------------------------------------------===//
// Output
//===----------------------------------------------------------------------===//

fn prim_display(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    print!("{}", printer::display_str(&args[0]));
    Ok(Value::Undefined)
}

fn prim_write(args: &[Value]) -> Result<Value, Error> {
    want(args, 1)?;
    print!("{}", printer::write_str(&args[0]));
    Ok(Value::Undefined)
}

fn prim_newline(args: &[Value]) -> Result<Value, Error> {
    want(args, 0)?;
    println!();
    Ok(Value::Undefined)
}

//===----------------------------------------------------------------------===//
// Control
//===----------------------------------------------------------------------===//

fn prim_apply(ev: &Evaluator, mut args: Vec<Value>, k: &ContRef) -> Result<Step, Unhandled> {
    if args.len() != 2 {
        let got = args.len();
        return ev.raise(k, Error::ArityMismatch { expected: "2".to_string(), got });
    }
    let arg_list = args.swap_remove(1);
    let operator = args.swap_remove(0);
    ev.apply(operator, arg_list, k)
}

fn prim_call_cc(ev: &Evaluator, mut args: Vec<Value>, k: &ContRef) -> Result<Step, Unhandled> {
    if args.len() != 1 {
        let got = args.len();
        return ev.raise(k, Error::ArityMismatch { expected: "1".to_string(), got });
    }
    let receiver = args.swap_remove(0);
    let reified = Value::Procedure(Procedure::Continuation(k.clone()));
    ev.apply(receiver, Value::list(vec![reified]), k)
}

fn prim_call_with_handler(
    ev: &Evaluator,
    mut args: Vec<Value>,
    k: &ContRef,
) -> Result<Step, Unhandled> {
    if args.len() != 2 {
        let got = args.len();
        return ev.raise(k, Error::ArityMismatch { expected: "2".to_string(), got });
    }
    let handler = args.swap_remove(1);
    let thunk = args.swap_remove(0);
    let barrier = Cont::chain(ContOp::Handler { handler }, k);
    ev.apply(thunk, Value::Null, &barrier)
}

fn prim_error(ev: &Evaluator, args: Vec<Value>, k: &ContRef) -> Result<Step, Unhandled> {
    let message = args.iter().map(printer::display_str).join(" ");
    ev.raise(k, Error::HostInterop(message))
}
