use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::interner;
use crate::value::{Procedure, SyntaxKind, Value};

//===----------------------------------------------------------------------===//
// Printer
//===----------------------------------------------------------------------===//

/// `display` form: strings and characters print as themselves.
pub fn display_str(value: &Value) -> String {
    let mut out = String::new();
    render(value, &mut out, false, &mut FxHashSet::default());
    out
}

/// `write` form: strings quoted and escaped, characters as `#\x` literals.
pub fn write_str(value: &Value) -> String {
    let mut out = String::new();
    render(value, &mut out, true, &mut FxHashSet::default());
    out
}

/// The visited set holds the nodes on the current rendering path, so cycles
/// created through `set-car!`/`set-cdr!` print as `...` instead of hanging.
/// Shared acyclic structure still prints in full.
fn render(value: &Value, out: &mut String, write: bool, path: &mut FxHashSet<usize>) {
    match value {
        Value::Null => out.push_str("()"),
        Value::Undefined => out.push_str("#<undefined>"),
        Value::Bool(true) => out.push_str("#t"),
        Value::Bool(false) => out.push_str("#f"),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Float(x) => out.push_str(&x.to_string()),
        Value::Char(c) => {
            if write {
                match c {
                    ' ' => out.push_str("#\\space"),
                    '\n' => out.push_str("#\\newline"),
                    '\t' => out.push_str("#\\tab"),
                    c => {
                        out.push_str("#\\");
                        out.push(*c);
                    }
                }
            } else {
                out.push(*c);
            }
        }
        Value::Str(s) => {
            if write {
                out.push('"');
                for c in s.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        c => out.push(c),
                    }
                }
                out.push('"');
            } else {
                out.push_str(s);
            }
        }
        Value::Symbol(id) => out.push_str(&interner::name(*id)),
        Value::Vector(v) => {
            let key = Rc::as_ptr(v) as usize;
            if !path.insert(key) {
                out.push_str("#(...)");
                return;
            }
            out.push_str("#(");
            let items = v.borrow();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                render(item, out, write, path);
            }
            out.push(')');
            path.remove(&key);
        }
        Value::Pair(first) => {
            let key = Rc::as_ptr(first) as usize;
            if !path.insert(key) {
                out.push_str("(...)");
                return;
            }
            let mut spine = vec![key];
            out.push('(');
            render(&first.car(), out, write, path);
            let mut cur = first.cdr();
            loop {
                match cur {
                    Value::Null => break,
                    Value::Pair(p) => {
                        let k = Rc::as_ptr(&p) as usize;
                        if !path.insert(k) {
                            out.push_str(" ...");
                            break;
                        }
                        spine.push(k);
                        out.push(' ');
                        render(&p.car(), out, write, path);
                        cur = p.cdr();
                    }
                    other => {
                        out.push_str(" . ");
                        render(&other, out, write, path);
                        break;
                    }
                }
            }
            out.push(')');
            for k in spine {
                path.remove(&k);
            }
        }
        Value::Procedure(p) => match p {
            Procedure::Primitive(p) => {
                out.push_str("#<procedure ");
                out.push_str(p.name);
                out.push('>');
            }
            Procedure::Closure(c) => match *c.name.borrow() {
                Some(name) => {
                    out.push_str("#<procedure ");
                    out.push_str(&interner::name(name));
                    out.push('>');
                }
                None => out.push_str("#<procedure>"),
            },
            Procedure::Continuation(_) => out.push_str("#<continuation>"),
        },
        Value::Syntax(s) => {
            let tag = match s.kind {
                SyntaxKind::Core(_) => "syntax",
                SyntaxKind::Macro(_) => "macro",
            };
            match *s.name.borrow() {
                Some(name) => {
                    out.push_str(&format!("#<{} {}>", tag, interner::name(name)))
                }
                None => out.push_str(&format!("#<{}>", tag)),
            }
        }
    }
}
