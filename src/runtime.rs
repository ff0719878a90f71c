use std::cell::RefCell;
use std::fmt;

use log::debug;
use rustc_hash::FxHashMap;

use crate::env::{Env, EnvRef, Location};
use crate::error::{SourceError, Unhandled};
use crate::eval::Evaluator;
use crate::interner::{self, SymId};
use crate::primitives::Builtins;
use crate::reader;
use crate::value::Value;

/// Derived forms and list utilities, loaded before user code and then
/// protected.
const BOOTSTRAP: &str = include_str!("bootstrap.scm");

//===----------------------------------------------------------------------===//
// Config
//===----------------------------------------------------------------------===//

#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    /// Keep symbol spellings as written instead of folding to lower case.
    pub case_sensitive: bool,
    /// Signal a name clash when a top-level frame redefines a name.
    pub strict_redefine: bool,
}

//===----------------------------------------------------------------------===//
// BindingsProvider
//===----------------------------------------------------------------------===//

/// An externally constructed bundle of name -> location bindings, merged
/// into the global environment by [`Interpreter::require`]. Locations are
/// merged as-is, so a bundle can alias cells it also hands to other
/// bundles or keeps for itself.
pub trait BindingsProvider {
    fn bindings(&self) -> Vec<(String, Location)>;
}

//===----------------------------------------------------------------------===//
// LoadError
//===----------------------------------------------------------------------===//

#[derive(Debug, Clone)]
pub enum LoadError {
    Read(SourceError),
    Eval(Unhandled),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoadError::Read(e) => write!(f, "{}", e),
            LoadError::Eval(e) => write!(f, "{}", e),
        }
    }
}

impl From<SourceError> for LoadError {
    fn from(e: SourceError) -> Self {
        LoadError::Read(e)
    }
}

impl From<Unhandled> for LoadError {
    fn from(e: Unhandled) -> Self {
        LoadError::Eval(e)
    }
}

//===----------------------------------------------------------------------===//
// Interpreter
//===----------------------------------------------------------------------===//

/// The interpreter facade: owns the evaluator, the global environment and
/// the reader-constant table, and exposes the incremental
/// compile/execute surface.
pub struct Interpreter {
    evaluator: Evaluator,
    global: RefCell<EnvRef>,
    constants: RefCell<FxHashMap<String, Value>>,
    last_result: RefCell<Value>,
    config: Config,
}

impl Interpreter {
    /// A bare interpreter: core special forms only, no primitives and no
    /// bootstrap library.
    pub fn bare(config: Config) -> Self {
        let evaluator = Evaluator::new();
        let global = Env::root(config.strict_redefine);
        for (name, syntax) in evaluator.syntax_bindings() {
            global.define_location(name, crate::env::location(syntax));
        }
        Interpreter {
            evaluator,
            global: RefCell::new(global),
            constants: RefCell::new(FxHashMap::default()),
            last_result: RefCell::new(Value::Undefined),
            config,
        }
    }

    /// The standard setup: builtin procedures merged, bootstrap library
    /// loaded, environment protected so user redefinitions shadow it.
    pub fn with_defaults(config: Config) -> Result<Self, LoadError> {
        let interp = Self::bare(config);
        interp.require(&Builtins);
        interp.load_str(BOOTSTRAP)?;
        interp.protect();
        Ok(interp)
    }

    /// Submit one parsed expression. It is evaluated immediately, so its
    /// side effects happen exactly once no matter how often `execute` is
    /// called afterwards.
    pub fn compile(&self, exp: &Value) -> Result<(), Unhandled> {
        let env = self.global.borrow().clone();
        let value = self.evaluator.eval(exp, &env)?;
        *self.last_result.borrow_mut() = value;
        Ok(())
    }

    /// The value of the last expression submitted so far.
    pub fn execute(&self) -> Value {
        self.last_result.borrow().clone()
    }

    /// Compile and report the resulting value in one call.
    pub fn run(&self, exp: &Value) -> Result<Value, Unhandled> {
        self.compile(exp)?;
        Ok(self.execute())
    }

    /// Whether `name` is currently bound at top level.
    pub fn is_defined(&self, name: &str) -> bool {
        let id = self.intern(name);
        self.global.borrow().location(id).is_some()
    }

    /// Merge an extension bundle into the global environment. On a name
    /// collision the most recently merged bundle wins.
    pub fn require(&self, provider: &dyn BindingsProvider) {
        let global = self.global.borrow().clone();
        let bindings = provider.bindings();
        debug!("require: merging {} bindings", bindings.len());
        for (name, loc) in bindings {
            global.define_location(self.intern(&name), loc);
        }
    }

    /// Introduce a new top-level frame above all current ones, so future
    /// redefinitions shadow bindings captured by code loaded earlier
    /// instead of mutating them.
    pub fn protect(&self) {
        let protected = {
            let global = self.global.borrow();
            Env::extend_with_policy(&global, self.config.strict_redefine)
        };
        *self.global.borrow_mut() = protected;
        debug!("protected global environment");
    }

    /// Register a reader constant: a symbol replaced by a fixed value at
    /// read time. Pass-through to the reader; the evaluator never sees the
    /// symbol.
    pub fn reader_constant(&self, name: &str, value: Value) {
        self.constants.borrow_mut().insert(name.to_string(), value);
    }

    /// Read a source string into parsed expressions.
    pub fn read(&self, source: &str) -> Result<Vec<Value>, SourceError> {
        reader::read_all(source, self.config.case_sensitive, &self.constants.borrow())
    }

    /// Read and run every expression in `source`; the value of the last
    /// one is the result.
    pub fn load_str(&self, source: &str) -> Result<Value, LoadError> {
        for exp in self.read(source)? {
            self.compile(&exp)?;
        }
        Ok(self.execute())
    }

    fn intern(&self, name: &str) -> SymId {
        interner::intern_folded(name, self.config.case_sensitive)
    }
}
