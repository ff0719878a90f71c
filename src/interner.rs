use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::sync::Mutex;

/// Identifier of an interned symbol. Two symbols with the same spelling
/// (after optional case folding) always share one id, so identity equality
/// coincides with spelling equality and environments can key on the id.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymId(pub u32);

struct Table {
    map: FxHashMap<String, u32>, // text -> id
    rev: Vec<String>,            // id -> text
}

impl Table {
    fn new() -> Self {
        Self { map: FxHashMap::default(), rev: Vec::new() }
    }

    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.map.get(s) {
            return id;
        }
        let id = self.rev.len() as u32;
        self.rev.push(s.to_owned());
        self.map.insert(self.rev[id as usize].clone(), id);
        id
    }

    fn resolve(&self, id: u32) -> &str {
        &self.rev[id as usize]
    }
}

static SYMBOLS: Lazy<Mutex<Table>> = Lazy::new(|| Mutex::new(Table::new()));

/// Intern a symbol exactly as spelled.
pub fn intern(s: &str) -> SymId {
    SymId(SYMBOLS.lock().unwrap().intern(s))
}

/// Intern a symbol, folding to lower case unless the reader runs in
/// case-sensitive mode.
pub fn intern_folded(s: &str, case_sensitive: bool) -> SymId {
    if case_sensitive || s.chars().all(|c| !c.is_ascii_uppercase()) {
        intern(s)
    } else {
        intern(&s.to_ascii_lowercase())
    }
}

pub fn name(id: SymId) -> String {
    SYMBOLS.lock().unwrap().resolve(id.0).to_owned()
}
