//! Statement tree and deferred values.
//!
//! A parsed build file is a tree of [`Statement`]s. Assignments do not
//! carry evaluated values; they carry a [`ValueStatement`] that is executed
//! lazily, into whichever namespace happens to be current when the value is
//! first needed. The same value may therefore execute several times, once
//! per namespace, which is what makes template groups work.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Evaluation progress of a namespace or a deferred value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvalState {
    #[default]
    Idle,
    Running,
    Done,
}

/// Tri-state evaluation marker.
///
/// Namespaces drive it `Idle -> Running -> Done` for memoization; deferred
/// values drive it `Idle -> Running -> Idle` so they can run again in a
/// different namespace while still catching self-reference cycles.
#[derive(Debug, Default)]
pub struct EvalCell(Cell<EvalState>);

impl EvalCell {
    pub fn state(&self) -> EvalState {
        self.0.get()
    }

    /// Begin evaluation. Returns false when already running or done,
    /// in which case the caller must not evaluate.
    pub fn try_begin(&self) -> bool {
        if self.0.get() == EvalState::Idle {
            self.0.set(EvalState::Running);
            true
        } else {
            false
        }
    }

    /// Mark evaluation finished for good.
    pub fn complete(&self) {
        self.0.set(EvalState::Done);
    }

    /// Return to idle so evaluation may run again later.
    pub fn rewind(&self) {
        self.0.set(EvalState::Idle);
    }
}

/// One node of a parsed build file.
#[derive(Debug)]
pub enum Statement {
    /// Sequence of statements, executed in order.
    Block(Vec<Statement>),
    /// `key = value`. The key is macro-expanded when executed; the value
    /// stays deferred.
    Assign {
        key: String,
        value: Rc<ValueStatement>,
    },
    /// `left + right`: both sides execute into the same namespace.
    Binary {
        left: Box<Statement>,
        right: Box<Statement>,
    },
    /// A bare word: declares the key (or keys, after expansion) with no value.
    Word(String),
    /// A named reference: executes the referenced value in the current
    /// namespace, merging its keys in.
    Reference(String),
}

/// A value bound to a key, executed lazily per namespace.
#[derive(Debug)]
pub struct ValueStatement {
    body: ValueBody,
    cell: EvalCell,
}

#[derive(Debug)]
enum ValueBody {
    /// Plain text; executing it declares its words as keys.
    Literal(String),
    /// A parsed subtree.
    Tree(Statement),
    /// A value that accepts seeded default statements. Seeded statements
    /// run first, then the originally declared value (if any), so declared
    /// keys overwrite seeded ones.
    Seeded {
        seeded: RefCell<Vec<Rc<Statement>>>,
        declared: Option<Rc<ValueStatement>>,
    },
}

impl ValueStatement {
    pub fn literal(text: impl Into<String>) -> Self {
        ValueStatement {
            body: ValueBody::Literal(text.into()),
            cell: EvalCell::default(),
        }
    }

    pub fn tree(statement: Statement) -> Self {
        ValueStatement {
            body: ValueBody::Tree(statement),
            cell: EvalCell::default(),
        }
    }

    pub fn seeded(declared: Option<Rc<ValueStatement>>) -> Self {
        ValueStatement {
            body: ValueBody::Seeded {
                seeded: RefCell::new(Vec::new()),
                declared,
            },
            cell: EvalCell::default(),
        }
    }

    pub fn is_seeded(&self) -> bool {
        matches!(self.body, ValueBody::Seeded { .. })
    }

    /// Append a seeded default statement. No effect on non-seeded values.
    pub fn push_seeded(&self, statement: Statement) {
        if let ValueBody::Seeded { seeded, .. } = &self.body {
            seeded.borrow_mut().push(Rc::new(statement));
        }
    }

    pub(crate) fn cell(&self) -> &EvalCell {
        &self.cell
    }

    pub(crate) fn visit(&self) -> ValueParts<'_> {
        match &self.body {
            ValueBody::Literal(text) => ValueParts::Literal(text),
            ValueBody::Tree(statement) => ValueParts::Tree(statement),
            ValueBody::Seeded { seeded, declared } => ValueParts::Seeded {
                seeded: {
                    let n = seeded.borrow().len();
                    (0..n).map(|i| seeded.borrow()[i].clone()).collect()
                },
                declared: declared.clone(),
            },
        }
    }
}

/// Borrowed view of a value's body for execution.
pub(crate) enum ValueParts<'a> {
    Literal(&'a str),
    Tree(&'a Statement),
    Seeded {
        seeded: Vec<Rc<Statement>>,
        declared: Option<Rc<ValueStatement>>,
    },
}
