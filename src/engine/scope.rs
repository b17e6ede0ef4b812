//! Scope tree navigation and lazy compilation.
//!
//! The [`Engine`] owns an arena of namespaces and a cursor into it. All
//! reads go through `compile`, which executes a namespace's deferred value
//! at most once; re-entrant compilation (a value that reads the namespace
//! it is populating) is cut off by the namespace's [`EvalCell`] and simply
//! sees the keys added so far.
//!
//! Key lookup walks the parent chain nearest-first, so a key bound in an
//! inner scope shadows the same key further out.

use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};

use crate::util::{fs, words};

use super::expand;
use super::namespace::{Namespace, SpaceId};
use super::parser;
use super::statement::{EvalState, Statement, ValueStatement, ValueParts};

pub struct Engine {
    spaces: Vec<Namespace>,
    current: SpaceId,
    stash: Vec<SpaceId>,
}

const ROOT: SpaceId = 0;

impl Engine {
    pub fn new() -> Self {
        Engine {
            spaces: vec![Namespace::new(None, None)],
            current: ROOT,
            stash: Vec::new(),
        }
    }

    /// Parse a build file and install it as the root scope's value.
    /// Must be called before any key is read.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let source = fs::read_to_string(path)?;
        self.load_source(&source)
            .with_context(|| format!("failed to load {}", path.display()))
    }

    /// Parse build-file source text and install it as the root value.
    pub fn load_source(&mut self, source: &str) -> Result<()> {
        let block = parser::parse(source)?;
        self.spaces[ROOT].statement = Some(Rc::new(ValueStatement::tree(block)));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Enter the child namespace bound to `name`. With inheritance the key
    /// is looked up along the parent chain; the child node itself is always
    /// created under the current namespace, so inherited values see the
    /// current scope when they expand macros.
    pub fn enter_key(&mut self, name: &str, allow_inheritance: bool) -> bool {
        self.compile(self.current);

        let mut found = None;
        let mut space = Some(self.current);
        while let Some(id) = space {
            self.compile(id);
            if self.spaces[id].contains(name) {
                found = self.spaces[id].value_of(name);
                break;
            }
            if !allow_inheritance {
                break;
            }
            space = self.spaces[id].parent;
        }
        let Some(value) = found else { return false };

        // Reuse the cached child when the bound value is unchanged.
        if let Some(&child) = self.spaces[self.current].children.get(name) {
            let same = match (&self.spaces[child].statement, &value) {
                (None, None) => true,
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                _ => false,
            };
            if same {
                self.current = child;
                return true;
            }
        }

        let child = self.alloc(Namespace::new(Some(self.current), value));
        let current = self.current;
        self.spaces[current].children.insert(name.to_string(), child);
        self.current = child;
        true
    }

    /// Enter `name`, first making sure its value accepts seeded defaults.
    /// A value already declared in the file is preserved and executes after
    /// the seeded statements, so declared keys win.
    pub fn enter_default_key(&mut self, name: &str) {
        self.compile(self.current);
        let current = self.current;
        match self.spaces[current].value_of(name) {
            None => {
                self.spaces[current].add_raw(
                    name.to_string(),
                    Some(Rc::new(ValueStatement::seeded(None))),
                );
            }
            Some(declared) => {
                let already = declared.as_ref().is_some_and(|v| v.is_seeded());
                if !already {
                    self.spaces[current].add_raw(
                        name.to_string(),
                        Some(Rc::new(ValueStatement::seeded(declared))),
                    );
                }
            }
        }
        let entered = self.enter_key(name, false);
        debug_assert!(entered);
    }

    /// Enter a fresh anonymous overlay namespace. It has no value of its
    /// own; keys added to it shadow the chain below through inheritance.
    pub fn enter_unnamed_key(&mut self) {
        let child = self.alloc(Namespace::new(Some(self.current), None));
        self.current = child;
    }

    /// Move back to the parent namespace. False at the root.
    pub fn leave_key(&mut self) -> bool {
        match self.spaces[self.current].parent {
            Some(parent) => {
                self.current = parent;
                true
            }
            None => false,
        }
    }

    /// Remember the current position for a later [`pop_key`](Self::pop_key).
    pub fn push_key(&mut self) {
        self.stash.push(self.current);
    }

    pub fn pop_key(&mut self) -> bool {
        match self.stash.pop() {
            Some(space) => {
                self.current = space;
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    /// All keys of the current namespace, in declaration order.
    pub fn get_keys(&mut self) -> Vec<String> {
        self.compile(self.current);
        self.spaces[self.current].keys()
    }

    pub fn get_first_key(&mut self) -> Option<String> {
        self.compile(self.current);
        self.spaces[self.current].first_key()
    }

    /// The keys of the value bound to `name`, or empty when unbound.
    pub fn get_keys_of(&mut self, name: &str, allow_inheritance: bool) -> Vec<String> {
        if self.enter_key(name, allow_inheritance) {
            let keys = self.get_keys();
            self.leave_key();
            keys
        } else {
            Vec::new()
        }
    }

    pub fn get_first_key_of(&mut self, name: &str, allow_inheritance: bool) -> Option<String> {
        if self.enter_key(name, allow_inheritance) {
            let first = self.get_first_key();
            self.leave_key();
            first
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Bind `name` to a literal value unless the key already exists.
    /// Existing declarations always win over defaults.
    pub fn add_default_key(&mut self, name: &str, value: Option<&str>) {
        self.compile(self.current);
        if self.spaces[self.current].contains(name) {
            return;
        }
        let value = value.map(|v| Rc::new(ValueStatement::literal(v)));
        let current = self.current;
        self.spaces[current].add_raw(name.to_string(), value);
    }

    /// Seed a default statement into the current namespace's value, to be
    /// executed lazily before any file-declared content. The namespace must
    /// have been entered with [`enter_default_key`](Self::enter_default_key)
    /// and not yet compiled; otherwise the key is added directly.
    pub fn add_resolvable_key(&mut self, name: &str, value: Option<&str>) {
        let statement = match value {
            Some(v) => Statement::Assign {
                key: name.to_string(),
                value: Rc::new(ValueStatement::literal(v)),
            },
            None => Statement::Word(name.to_string()),
        };
        if let Some(root) = self.spaces[self.current].statement.clone() {
            if root.is_seeded() && self.spaces[self.current].cell.state() == EvalState::Idle {
                root.push_seeded(statement);
                return;
            }
        }
        let current = self.current;
        self.execute_statement(&statement, current);
    }

    /// Forget everything in the current namespace so its value can be
    /// executed again from scratch.
    pub fn reset_key(&mut self) {
        let current = self.current;
        self.spaces[current].clear();
        self.spaces[current].cell.rewind();
    }

    /// Declare a key: macro-expand it, split into words, glob-expand words
    /// containing `*` or `?`, and bind each resulting key to `value`.
    pub(crate) fn add_variable(
        &mut self,
        space: SpaceId,
        key: &str,
        value: Option<Rc<ValueStatement>>,
    ) {
        let expanded = expand::evaluate(self, key);
        for word in words::split_words(&expanded) {
            if word.contains(['*', '?']) {
                match fs::find_files(&word) {
                    Ok(files) => {
                        for file in files {
                            self.spaces[space].add_raw(file, value.clone());
                        }
                    }
                    Err(err) => tracing::warn!("skipping key `{}`: {}", word, err),
                }
            } else {
                self.spaces[space].add_raw(word, value.clone());
            }
        }
    }

    /// Bind a loop variable in the current namespace, overwriting any
    /// previous binding. Used by `foreach`.
    pub(crate) fn bind_word(&mut self, name: &str, word: &str) {
        let current = self.current;
        self.spaces[current].add_raw(
            name.to_string(),
            Some(Rc::new(ValueStatement::literal(word))),
        );
    }

    // ------------------------------------------------------------------
    // Compilation
    // ------------------------------------------------------------------

    /// Execute the namespace's deferred value exactly once. Re-entrant or
    /// repeated calls return immediately.
    pub(crate) fn compile(&mut self, space: SpaceId) {
        if self.spaces[space].cell.state() != EvalState::Idle {
            return;
        }
        self.spaces[space].cell.try_begin();
        if let Some(root) = self.spaces[space].statement.clone() {
            let saved = self.current;
            self.current = space;
            self.execute_value(&root, space);
            self.current = saved;
        }
        self.spaces[space].cell.complete();
    }

    fn execute_value(&mut self, value: &Rc<ValueStatement>, space: SpaceId) {
        // A value referring to itself (directly or through a chain of
        // references) yields nothing instead of recursing forever.
        if !value.cell().try_begin() {
            tracing::debug!("cyclic value skipped");
            return;
        }
        match value.visit() {
            ValueParts::Literal(text) => self.add_variable(space, text, None),
            ValueParts::Tree(statement) => self.execute_statement(statement, space),
            ValueParts::Seeded { seeded, declared } => {
                for statement in &seeded {
                    self.execute_statement(statement, space);
                }
                if let Some(declared) = declared {
                    self.execute_value(&declared, space);
                }
            }
        }
        value.cell().rewind();
    }

    fn execute_statement(&mut self, statement: &Statement, space: SpaceId) {
        match statement {
            Statement::Block(statements) => {
                for s in statements {
                    self.execute_statement(s, space);
                }
            }
            Statement::Assign { key, value } => {
                self.add_variable(space, key, Some(value.clone()));
            }
            Statement::Binary { left, right } => {
                self.execute_statement(left, space);
                self.execute_statement(right, space);
            }
            Statement::Word(text) => self.add_variable(space, text, None),
            Statement::Reference(name) => match self.lookup(space, name) {
                Some(Some(value)) => self.execute_value(&value, space),
                Some(None) => {}
                None => tracing::debug!("unresolved reference `{}`", name),
            },
        }
    }

    /// Nearest-first lookup of `name` along the parent chain.
    fn lookup(&mut self, from: SpaceId, name: &str) -> Option<Option<Rc<ValueStatement>>> {
        let mut space = Some(from);
        while let Some(id) = space {
            self.compile(id);
            if let Some(value) = self.spaces[id].value_of(name) {
                return Some(value);
            }
            space = self.spaces[id].parent;
        }
        None
    }

    fn alloc(&mut self, namespace: Namespace) -> SpaceId {
        self.spaces.push(namespace);
        self.spaces.len() - 1
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(source: &str) -> Engine {
        let mut engine = Engine::new();
        engine.load_source(source).unwrap();
        engine
    }

    #[test]
    fn test_keys_in_declaration_order() {
        let mut engine = engine_with("b\na\nc = \"1\"");
        assert_eq!(engine.get_keys(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_enter_key_and_read_value() {
        let mut engine = engine_with("group = { x = \"1\", y = \"2\" }");
        assert!(engine.enter_key("group", false));
        assert_eq!(engine.get_keys(), vec!["x", "y"]);
        assert_eq!(engine.get_keys_of("x", false), vec!["1"]);
        assert!(engine.leave_key());
        assert!(!engine.leave_key(), "root has no parent");
    }

    #[test]
    fn test_missing_key_yields_nothing() {
        let mut engine = engine_with("a = \"1\"");
        assert!(!engine.enter_key("nope", true));
        assert!(engine.get_keys_of("nope", true).is_empty());
    }

    #[test]
    fn test_inheritance_nearest_first() {
        let mut engine = engine_with("v = \"outer\"\ngroup = { inner = { } }\nmid = { v = \"mid\", inner = { } }");
        assert!(engine.enter_key("group", false));
        assert!(engine.enter_key("inner", false));
        // found at the root, two levels up
        assert_eq!(engine.get_keys_of("v", true), vec!["outer"]);
        engine.leave_key();
        engine.leave_key();

        assert!(engine.enter_key("mid", false));
        assert!(engine.enter_key("inner", false));
        // the nearer binding shadows the root one
        assert_eq!(engine.get_keys_of("v", true), vec!["mid"]);
        // without inheritance the key is invisible
        assert!(engine.get_keys_of("v", false).is_empty());
    }

    #[test]
    fn test_unnamed_overlay_shadows() {
        let mut engine = engine_with("v = \"file\"");
        engine.enter_unnamed_key();
        engine.add_default_key("v", Some("overlay"));
        assert_eq!(engine.get_keys_of("v", true), vec!["overlay"]);
        engine.leave_key();
        assert_eq!(engine.get_keys_of("v", true), vec!["file"]);
    }

    #[test]
    fn test_add_default_key_never_overwrites() {
        let mut engine = engine_with("CC = \"clang\"");
        engine.add_default_key("CC", Some("gcc"));
        engine.add_default_key("CXX", Some("g++"));
        assert_eq!(engine.get_keys_of("CC", false), vec!["clang"]);
        assert_eq!(engine.get_keys_of("CXX", false), vec!["g++"]);
    }

    #[test]
    fn test_declared_keys_win_over_seeded() {
        let mut engine = engine_with("tools = { extra = \"1\", name = \"mine\" }");
        engine.enter_default_key("tools");
        engine.add_resolvable_key("name", Some("seeded"));
        engine.add_resolvable_key("added", Some("2"));
        // seeded defaults execute first, file content last
        assert_eq!(engine.get_keys_of("name", false), vec!["mine"]);
        assert_eq!(engine.get_keys_of("added", false), vec!["2"]);
        assert_eq!(engine.get_keys(), vec!["name", "added", "extra"]);
    }

    #[test]
    fn test_enter_default_key_creates_missing_group() {
        let mut engine = engine_with("");
        engine.enter_default_key("configurations");
        engine.add_resolvable_key("Debug", None);
        engine.add_resolvable_key("Release", None);
        assert_eq!(engine.get_keys(), vec!["Debug", "Release"]);
        engine.leave_key();
        assert!(engine.enter_key("configurations", false));
        assert_eq!(engine.get_first_key().as_deref(), Some("Debug"));
    }

    #[test]
    fn test_push_pop_key() {
        let mut engine = engine_with("a = { b = { } }");
        engine.push_key();
        engine.enter_key("a", false);
        engine.enter_key("b", false);
        assert!(engine.pop_key());
        assert_eq!(engine.get_keys(), vec!["a"]);
        assert!(!engine.pop_key());
    }

    #[test]
    fn test_reset_key_allows_recompilation() {
        let mut engine = engine_with("a = \"1\"\nb");
        assert_eq!(engine.get_keys().len(), 2);
        engine.reset_key();
        assert_eq!(engine.get_keys(), vec!["a", "b"]);
    }

    #[test]
    fn test_compile_runs_value_exactly_once() {
        use std::fs;
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("one.c"), "").unwrap();

        let mut engine = engine_with(&format!("\"{}/*.c\"", tmp.path().display()));
        assert_eq!(engine.get_keys().len(), 1);

        // A second compilation would pick this file up; memoization must not.
        fs::write(tmp.path().join("two.c"), "").unwrap();
        assert_eq!(engine.get_keys().len(), 1);
    }

    #[test]
    fn test_reference_merges_keys() {
        let mut engine = engine_with("base = { x = \"1\", y = \"2\" }\nuser = base + { y = \"3\" }");
        assert!(engine.enter_key("user", false));
        assert_eq!(engine.get_keys(), vec!["x", "y"]);
        assert_eq!(engine.get_keys_of("y", false), vec!["3"]);
    }

    #[test]
    fn test_self_reference_yields_empty() {
        let mut engine = engine_with("a = a");
        assert!(engine.enter_key("a", false));
        assert!(engine.get_keys().is_empty());
    }

    #[test]
    fn test_mutual_reference_terminates() {
        let mut engine = engine_with("a = b\nb = a");
        assert!(engine.enter_key("a", false));
        assert!(engine.get_keys().is_empty());
    }

    #[test]
    fn test_glob_keys_expand_per_match() {
        use std::fs;
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("a.c"), "").unwrap();
        fs::write(tmp.path().join("b.c"), "").unwrap();

        let mut engine =
            engine_with(&format!("files = {{ \"{}/*.c\" = \"1\" }}", tmp.path().display()));
        assert!(engine.enter_key("files", false));
        let keys = engine.get_keys();
        assert_eq!(keys.len(), 2);
        assert!(keys[0].ends_with("a.c"));
        assert!(keys[1].ends_with("b.c"));
        // both expanded keys carry the declared value
        assert_eq!(engine.get_keys_of(&keys[0], false), vec!["1"]);
    }
}
