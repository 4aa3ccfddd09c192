//! Expression Classification
//!
//! Two pure classifications drive the inlining policy of the rewrite passes:
//! stability (may an expression ever be duplicated or relocated?) and
//! complexity (is it cheap to re-evaluate?). Stability is decided by function
//! name against an extensible registry of non-deterministic builtins.

use std::collections::HashSet;

use anyhow::{bail, Result};

use crate::algebra::Expression;

/// Whether an expression yields the same value on every evaluation.
///
/// An unstable expression must never be substituted into another position:
/// moving it changes how many times, and in what context, its value is
/// produced, which is observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Stable,
    Unstable,
}

/// Whether re-evaluating an expression is considered cheap.
///
/// Constants and bare variable references are simple; every function call is
/// complex, however trivial its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Complex,
}

/// Registry of function names whose calls are non-deterministic.
///
/// Seeded with the SPARQL builtins that produce a fresh value per invocation;
/// extension functions with the same property can be registered at runtime.
/// Matching is case-insensitive, as with the builtin dispatch elsewhere in
/// the SPARQL world (`RAND` and `rand` are the same function).
#[derive(Debug, Clone)]
pub struct UnstableFunctions {
    names: HashSet<String>,
}

impl UnstableFunctions {
    /// Empty registry with no unstable names at all
    pub fn empty() -> Self {
        UnstableFunctions {
            names: HashSet::new(),
        }
    }

    /// Register a function name as non-deterministic
    pub fn register(&mut self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            bail!("cannot register an empty function name as unstable");
        }
        self.names.insert(name.to_ascii_lowercase());
        Ok(())
    }

    /// Whether `name` is registered as non-deterministic
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.to_ascii_lowercase())
    }

    /// Classify an expression: unstable if it or any sub-expression calls a
    /// registered name
    pub fn classify(&self, expr: &Expression) -> Stability {
        match expr {
            Expression::Variable(_) | Expression::Literal(_) | Expression::Iri(_) => {
                Stability::Stable
            }
            Expression::Function { name, args } => {
                if self.contains(name) {
                    return Stability::Unstable;
                }
                for arg in args {
                    if self.classify(arg) == Stability::Unstable {
                        return Stability::Unstable;
                    }
                }
                Stability::Stable
            }
        }
    }
}

impl Default for UnstableFunctions {
    /// The baseline non-deterministic builtins: random value, UUID as IRI,
    /// UUID as string, fresh blank node.
    fn default() -> Self {
        let mut registry = UnstableFunctions::empty();
        for name in ["rand", "uuid", "struuid", "bnode"] {
            registry
                .register(name)
                .expect("baseline unstable builtins are valid names");
        }
        registry
    }
}

/// Classify how expensive an expression is to re-evaluate.
pub fn classify_complexity(expr: &Expression) -> Complexity {
    match expr {
        Expression::Variable(_) | Expression::Literal(_) | Expression::Iri(_) => {
            Complexity::Simple
        }
        Expression::Function { .. } => Complexity::Complex,
    }
}
