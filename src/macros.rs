use std::collections::HashMap;

/// The macro table: a growable map from macro name to its fully normalized
/// expansion text.
///
/// Populated by the parser whenever a macro-definition entry (`@string`) is
/// parsed, and read during postprocessing to expand macro references.
/// Names are matched exactly as written. Redefinition follows
/// last-definition-wins; the caller ([`Context::define_macro`]) is
/// responsible for reporting the accompanying content diagnostic.
///
/// [`Context::define_macro`]: crate::Context::define_macro
#[derive(Debug, Default)]
pub struct MacroTable {
    map: HashMap<String, String>,
}

impl MacroTable {
    pub fn new() -> MacroTable {
        MacroTable::default()
    }

    /// Install `text` under `name`, returning the previous expansion if the
    /// name was already defined.
    pub fn define(&mut self, name: &str, text: String) -> Option<String> {
        self.map.insert(name.to_owned(), text)
    }

    /// The expansion text stored for `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}
