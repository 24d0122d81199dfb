use serde_json::{Map, Value};

/// The two-tier variable context expressions are evaluated against.
///
/// `base` plays the role of the host's global namespace and may be replaced;
/// `custom` only ever grows through [`Context::extend`].
#[derive(Clone, Debug, Default)]
pub struct Context {
    base: Map<String, Value>,
    custom: Map<String, Value>,
}

impl Context {
    pub fn new(base: Map<String, Value>) -> Self {
        Self {
            base,
            custom: Map::new(),
        }
    }

    pub fn base(&self) -> &Map<String, Value> {
        &self.base
    }

    pub fn custom(&self) -> &Map<String, Value> {
        &self.custom
    }

    pub fn set_base(&mut self, base: Map<String, Value>) {
        self.base = base;
    }

    pub fn merge_base(&mut self, entries: Map<String, Value>) {
        self.base.extend(entries);
    }

    /// Merge into the custom layer; same-named keys are overwritten, nothing is removed.
    pub fn extend(&mut self, entries: Map<String, Value>) {
        self.custom.extend(entries);
    }

    pub fn scope(&self) -> Scope<'_> {
        Scope {
            custom: &self.custom,
            base: &self.base,
        }
    }

    /// Scope whose base layer is `base` instead of the stored one.
    pub fn scope_over<'a>(&'a self, base: &'a Map<String, Value>) -> Scope<'a> {
        Scope {
            custom: &self.custom,
            base,
        }
    }

    /// Materialized overlay, custom entries winning.
    pub fn merged(&self) -> Map<String, Value> {
        self.scope().merged()
    }
}

/// Borrowed view used for a single evaluation: custom bindings shadow base ones.
#[derive(Clone, Copy, Debug)]
pub struct Scope<'a> {
    custom: &'a Map<String, Value>,
    base: &'a Map<String, Value>,
}

impl<'a> Scope<'a> {
    pub fn new(custom: &'a Map<String, Value>, base: &'a Map<String, Value>) -> Self {
        Self { custom, base }
    }

    pub fn lookup(&self, name: &str) -> Option<&'a Value> {
        self.custom.get(name).or_else(|| self.base.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn merged(&self) -> Map<String, Value> {
        let mut out = self.base.clone();
        out.extend(self.custom.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }
}
