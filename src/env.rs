use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::Error;
use crate::interner::{self, SymId};
use crate::value::{Formals, Value};

/// A single mutable storage cell. Bindings map names to locations, not to
/// values, so every environment and closure holding a location observes
/// later assignments made through any alias.
pub type Location = Rc<RefCell<Value>>;

pub fn location(value: Value) -> Location {
    Rc::new(RefCell::new(value))
}

/// One layer of name -> location bindings, chained to the enclosing layer.
/// A strict frame refuses redefinition of a name it already binds.
pub struct Env {
    frame: RefCell<FxHashMap<SymId, Location>>,
    strict: bool,
    parent: Option<EnvRef>,
}

pub type EnvRef = Rc<Env>;

impl Env {
    pub fn root(strict: bool) -> EnvRef {
        Rc::new(Env { frame: RefCell::new(FxHashMap::default()), strict, parent: None })
    }

    /// Layer a fresh permissive frame on top of `parent`.
    pub fn extend(parent: &EnvRef) -> EnvRef {
        Env::extend_with_policy(parent, false)
    }

    /// Layer a fresh frame with an explicit redefinition policy; used for
    /// the global chain (initial frame and frames created by `protect`).
    pub fn extend_with_policy(parent: &EnvRef, strict: bool) -> EnvRef {
        Rc::new(Env {
            frame: RefCell::new(FxHashMap::default()),
            strict,
            parent: Some(parent.clone()),
        })
    }

    /// Allocate a fresh location for `name` in this innermost frame. Under
    /// the default policy a redefinition simply rebinds the name; a strict
    /// frame signals a name clash instead.
    pub fn define(&self, name: SymId, value: Value) -> Result<(), Error> {
        let mut frame = self.frame.borrow_mut();
        if self.strict && frame.contains_key(&name) {
            return Err(Error::HostInterop(format!(
                "{} is already defined in this scope",
                interner::name(name)
            )));
        }
        value.got_name(name);
        frame.insert(name, location(value));
        Ok(())
    }

    /// Bind `name` to an already existing location, replacing any previous
    /// binding of the name in this frame. Used by `require` merges, where
    /// the most recently merged bundle wins.
    pub fn define_location(&self, name: SymId, loc: Location) {
        loc.borrow().got_name(name);
        self.frame.borrow_mut().insert(name, loc);
    }

    /// Mutate the nearest existing binding of `name`.
    pub fn assign(&self, name: SymId, value: Value) -> Result<(), Error> {
        match self.location(name) {
            Some(loc) => {
                value.got_name(name);
                *loc.borrow_mut() = value;
                Ok(())
            }
            None => Err(Error::UnboundIdentifier(interner::name(name))),
        }
    }

    pub fn lookup(&self, name: SymId) -> Result<Value, Error> {
        match self.location(name) {
            Some(loc) => Ok(loc.borrow().clone()),
            None => Err(Error::UnboundIdentifier(interner::name(name))),
        }
    }

    /// Outward search for the location bound to `name`.
    pub fn location(&self, name: SymId) -> Option<Location> {
        if let Some(loc) = self.frame.borrow().get(&name) {
            return Some(loc.clone());
        }
        let mut cur = self.parent.clone();
        while let Some(env) = cur {
            if let Some(loc) = env.frame.borrow().get(&name) {
                return Some(loc.clone());
            }
            cur = env.parent.clone();
        }
        None
    }

    /// Bind a formal parameter spec against an evaluated argument list in a
    /// fresh frame layered on `parent`.
    pub fn bind(
        parent: &EnvRef,
        formals: &Formals,
        args: Vec<Value>,
    ) -> Result<EnvRef, Error> {
        if args.len() < formals.required.len()
            || (formals.rest.is_none() && args.len() > formals.required.len())
        {
            return Err(Error::ArityMismatch {
                expected: formals.expected_text(),
                got: args.len(),
            });
        }
        let env = Env::extend(parent);
        let mut args = args.into_iter();
        for &name in &formals.required {
            match args.next() {
                Some(value) => env.define(name, value)?,
                None => break,
            }
        }
        if let Some(rest) = formals.rest {
            env.define(rest, Value::list(args.collect()))?;
        }
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::intern;

    #[test]
    fn define_then_lookup() {
        let env = Env::root(false);
        env.define(intern("x"), Value::Int(1)).unwrap();
        assert!(matches!(env.lookup(intern("x")), Ok(Value::Int(1))));
    }

    #[test]
    fn lookup_missing_is_unbound() {
        let env = Env::root(false);
        assert!(matches!(
            env.lookup(intern("nope")),
            Err(Error::UnboundIdentifier(_))
        ));
    }

    #[test]
    fn inner_frame_shadows_outer() {
        let outer = Env::root(false);
        outer.define(intern("x"), Value::Int(1)).unwrap();
        let inner = Env::extend(&outer);
        inner.define(intern("x"), Value::Int(2)).unwrap();
        assert!(matches!(inner.lookup(intern("x")), Ok(Value::Int(2))));
        assert!(matches!(outer.lookup(intern("x")), Ok(Value::Int(1))));
    }

    #[test]
    fn assign_mutates_nearest_binding() {
        let outer = Env::root(false);
        outer.define(intern("x"), Value::Int(1)).unwrap();
        let inner = Env::extend(&outer);
        inner.assign(intern("x"), Value::Int(5)).unwrap();
        assert!(matches!(outer.lookup(intern("x")), Ok(Value::Int(5))));
    }

    #[test]
    fn assign_unbound_fails() {
        let env = Env::root(false);
        assert!(env.assign(intern("ghost"), Value::Null).is_err());
    }

    #[test]
    fn locations_are_shared_across_extensions() {
        let outer = Env::root(false);
        outer.define(intern("shared"), Value::Int(0)).unwrap();
        let a = Env::extend(&outer);
        let b = Env::extend(&outer);
        a.assign(intern("shared"), Value::Int(7)).unwrap();
        assert!(matches!(b.lookup(intern("shared")), Ok(Value::Int(7))));
    }

    #[test]
    fn strict_frame_refuses_redefinition() {
        let env = Env::root(true);
        env.define(intern("once"), Value::Int(1)).unwrap();
        assert!(env.define(intern("once"), Value::Int(2)).is_err());
    }

    #[test]
    fn permissive_frame_allows_redefinition() {
        let env = Env::root(false);
        env.define(intern("twice"), Value::Int(1)).unwrap();
        env.define(intern("twice"), Value::Int(2)).unwrap();
        assert!(matches!(env.lookup(intern("twice")), Ok(Value::Int(2))));
    }

    #[test]
    fn bind_fixed_arity() {
        let env = Env::root(false);
        let formals = Formals { required: vec![intern("a"), intern("b")], rest: None };
        let bound = Env::bind(&env, &formals, vec![Value::Int(1), Value::Int(2)]).unwrap();
        assert!(matches!(bound.lookup(intern("b")), Ok(Value::Int(2))));
    }

    #[test]
    fn bind_rejects_wrong_arity() {
        let env = Env::root(false);
        let formals = Formals { required: vec![intern("a"), intern("b")], rest: None };
        assert!(Env::bind(&env, &formals, vec![Value::Int(1)]).is_err());
        assert!(Env::bind(
            &env,
            &formals,
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        )
        .is_err());
    }

    #[test]
    fn bind_collects_rest_arguments() {
        let env = Env::root(false);
        let formals =
            Formals { required: vec![intern("a")], rest: Some(intern("rest")) };
        let bound =
            Env::bind(&env, &formals, vec![Value::Int(1), Value::Int(2), Value::Int(3)])
                .unwrap();
        match bound.lookup(intern("rest")).unwrap() {
            Value::Pair(p) => assert!(matches!(p.car(), Value::Int(2))),
            other => panic!("expected list, got {:?}", other),
        }
    }
}
