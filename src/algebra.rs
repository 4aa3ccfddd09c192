//! SPARQL Algebra Module
//!
//! This module provides the algebraic representation of query plans that the
//! rewrite passes operate on: terms, triple patterns, expression trees, and
//! the operator tree itself. Trees are immutable; every transformation builds
//! new nodes and leaves its input untouched.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Variable identifier
pub type Variable = String;

/// Well-known XSD datatype IRIs used by literal constructors.
pub mod xsd {
    pub const BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    pub const INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
}

/// IRI (Internationalized Resource Identifier)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Iri(pub String);

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

/// Literal value with optional language tag or datatype
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub value: String,
    pub language: Option<String>,
    pub datatype: Option<Iri>,
}

impl Literal {
    /// Plain literal without language tag or datatype
    pub fn plain(value: impl Into<String>) -> Self {
        Literal {
            value: value.into(),
            language: None,
            datatype: None,
        }
    }

    /// Literal with an explicit datatype IRI
    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Literal {
            value: value.into(),
            language: None,
            datatype: Some(Iri(datatype.into())),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Booleans and integers print bare, matching SSE conventions.
        if let Some(dt) = &self.datatype {
            if dt.0 == xsd::BOOLEAN || dt.0 == xsd::INTEGER {
                return write!(f, "{}", self.value);
            }
        }
        write!(f, "\"{}\"", self.value)?;
        if let Some(lang) = &self.language {
            write!(f, "@{}", lang)?;
        } else if let Some(dt) = &self.datatype {
            write!(f, "^^{}", dt)?;
        }
        Ok(())
    }
}

/// RDF term (subject, predicate, or object)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    Variable(Variable),
    Iri(Iri),
    Literal(Literal),
    BlankNode(String),
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(v) => write!(f, "?{}", v),
            Term::Iri(iri) => write!(f, "{}", iri),
            Term::Literal(lit) => write!(f, "{}", lit),
            Term::BlankNode(id) => write!(f, "_:{}", id),
        }
    }
}

impl Term {
    fn collect_variables(&self, vars: &mut Vec<Variable>) {
        if let Term::Variable(var) = self {
            vars.push(var.clone());
        }
    }
}

/// Triple pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriplePattern {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl TriplePattern {
    /// Create a new triple pattern
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        TriplePattern {
            subject,
            predicate,
            object,
        }
    }

    fn collect_variables(&self, vars: &mut Vec<Variable>) {
        self.subject.collect_variables(vars);
        self.predicate.collect_variables(vars);
        self.object.collect_variables(vars);
    }
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(triple {} {} {})",
            self.subject, self.predicate, self.object
        )
    }
}

/// Expression tree appearing in filters, sort conditions, and bindings.
///
/// Operators (`&&`, `>`, `*`, ...) are spelled as function calls, as in SSE;
/// the classifiers in [`crate::classify`] treat every call the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Variable reference
    Variable(Variable),
    /// Literal constant
    Literal(Literal),
    /// IRI constant
    Iri(Iri),
    /// Function call (named builtin, operator, or extension function)
    Function { name: String, args: Vec<Expression> },
}

impl Expression {
    /// Variable reference expression
    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable(name.into())
    }

    /// Boolean literal expression
    pub fn boolean(value: bool) -> Self {
        Expression::Literal(Literal::typed(value.to_string(), xsd::BOOLEAN))
    }

    /// Integer literal expression
    pub fn integer(value: i64) -> Self {
        Expression::Literal(Literal::typed(value.to_string(), xsd::INTEGER))
    }

    /// Plain string literal expression
    pub fn string(value: impl Into<String>) -> Self {
        Expression::Literal(Literal::plain(value))
    }

    /// IRI constant expression
    pub fn iri(iri: impl Into<String>) -> Self {
        Expression::Iri(Iri(iri.into()))
    }

    /// Function call expression
    pub fn function(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Function {
            name: name.into(),
            args,
        }
    }

    /// All variables mentioned in this expression, in syntactic order
    pub fn variables(&self) -> Vec<Variable> {
        let mut vars = Vec::new();
        self.collect_variables(&mut vars);
        vars
    }

    pub(crate) fn collect_variables(&self, vars: &mut Vec<Variable>) {
        match self {
            Expression::Variable(var) => vars.push(var.clone()),
            Expression::Function { args, .. } => {
                for arg in args {
                    arg.collect_variables(vars);
                }
            }
            Expression::Literal(_) | Expression::Iri(_) => {}
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Variable(v) => write!(f, "?{}", v),
            Expression::Literal(lit) => write!(f, "{}", lit),
            Expression::Iri(iri) => write!(f, "{}", iri),
            Expression::Function { name, args } => {
                write!(f, "({}", name)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Order condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCondition {
    pub expr: Expression,
    pub ascending: bool,
}

impl OrderCondition {
    /// Ascending sort condition
    pub fn asc(expr: Expression) -> Self {
        OrderCondition {
            expr,
            ascending: true,
        }
    }

    /// Descending sort condition
    pub fn desc(expr: Expression) -> Self {
        OrderCondition {
            expr,
            ascending: false,
        }
    }
}

impl fmt::Display for OrderCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ascending {
            write!(f, "{}", self.expr)
        } else {
            write!(f, "(desc {})", self.expr)
        }
    }
}

/// Query plan operator tree.
///
/// A closed union: the kinds the rewrite passes reason about are modeled
/// explicitly, and everything else travels through [`Algebra::Other`], which
/// the passes treat conservatively (recursed into, never reasoned across).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Algebra {
    /// Unit table: one row, no bindings
    Table,

    /// Basic graph pattern; binds whatever variables its patterns mention
    Bgp(Vec<TriplePattern>),

    /// Assignment (BIND): evaluates each expression per input row and binds
    /// the result. Later bindings may reference earlier ones; a variable is
    /// bound at most once per node.
    Extend {
        pattern: Box<Algebra>,
        bindings: Vec<(Variable, Expression)>,
    },

    /// Filter by a conjunction of boolean expressions
    Filter {
        pattern: Box<Algebra>,
        conditions: Vec<Expression>,
    },

    /// Projection: the only visibility boundary. Variables not listed are
    /// invisible to every ancestor.
    Project {
        pattern: Box<Algebra>,
        variables: Vec<Variable>,
    },

    /// Sort: each condition expression may be evaluated more than once per
    /// row while ordering
    OrderBy {
        pattern: Box<Algebra>,
        conditions: Vec<OrderCondition>,
    },

    /// Join of two independently evaluated branches; a binding made in one
    /// branch is never visible in the other
    Join {
        left: Box<Algebra>,
        right: Box<Algebra>,
    },

    /// Opaque operator of an unmodeled kind (union, minus, service, group,
    /// ...). Children are real subtrees; expression slots are evaluation
    /// positions with unknown multiplicity.
    Other {
        name: String,
        children: Vec<Algebra>,
        expressions: Vec<Expression>,
    },
}

impl Algebra {
    /// Create a new BGP from triple patterns
    pub fn bgp(patterns: Vec<TriplePattern>) -> Self {
        Algebra::Bgp(patterns)
    }

    /// Create an assignment node binding `bindings` over `pattern`
    pub fn extend(pattern: Algebra, bindings: Vec<(Variable, Expression)>) -> Self {
        Algebra::Extend {
            pattern: Box::new(pattern),
            bindings,
        }
    }

    /// Create an assignment node with a single binding
    pub fn bind(pattern: Algebra, variable: impl Into<Variable>, expr: Expression) -> Self {
        Algebra::extend(pattern, vec![(variable.into(), expr)])
    }

    /// Create a filter over a conjunction of conditions
    pub fn filter(pattern: Algebra, conditions: Vec<Expression>) -> Self {
        Algebra::Filter {
            pattern: Box::new(pattern),
            conditions,
        }
    }

    /// Create a projection
    pub fn project(pattern: Algebra, variables: Vec<impl Into<Variable>>) -> Self {
        Algebra::Project {
            pattern: Box::new(pattern),
            variables: variables.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a sort node
    pub fn order_by(pattern: Algebra, conditions: Vec<OrderCondition>) -> Self {
        Algebra::OrderBy {
            pattern: Box::new(pattern),
            conditions,
        }
    }

    /// Create a join of two patterns
    pub fn join(left: Algebra, right: Algebra) -> Self {
        Algebra::Join {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Create an opaque node of an unmodeled operator kind
    pub fn other(
        name: impl Into<String>,
        children: Vec<Algebra>,
        expressions: Vec<Expression>,
    ) -> Self {
        Algebra::Other {
            name: name.into(),
            children,
            expressions,
        }
    }

    /// All variables mentioned anywhere in this tree, deduplicated and sorted
    pub fn variables(&self) -> Vec<Variable> {
        let mut vars = self.mentioned_variables();
        vars.sort();
        vars.dedup();
        vars
    }

    /// All variable mentions in syntactic order, duplicates preserved.
    /// Counts definitions and projection lists as well as expression
    /// positions.
    pub fn mentioned_variables(&self) -> Vec<Variable> {
        let mut vars = Vec::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables(&self, vars: &mut Vec<Variable>) {
        match self {
            Algebra::Table => {}
            Algebra::Bgp(patterns) => {
                for pattern in patterns {
                    pattern.collect_variables(vars);
                }
            }
            Algebra::Extend { pattern, bindings } => {
                pattern.collect_variables(vars);
                for (var, expr) in bindings {
                    vars.push(var.clone());
                    expr.collect_variables(vars);
                }
            }
            Algebra::Filter {
                pattern,
                conditions,
            } => {
                pattern.collect_variables(vars);
                for condition in conditions {
                    condition.collect_variables(vars);
                }
            }
            Algebra::Project { pattern, variables } => {
                pattern.collect_variables(vars);
                vars.extend(variables.clone());
            }
            Algebra::OrderBy {
                pattern,
                conditions,
            } => {
                pattern.collect_variables(vars);
                for condition in conditions {
                    condition.expr.collect_variables(vars);
                }
            }
            Algebra::Join { left, right } => {
                left.collect_variables(vars);
                right.collect_variables(vars);
            }
            Algebra::Other {
                children,
                expressions,
                ..
            } => {
                for child in children {
                    child.collect_variables(vars);
                }
                for expr in expressions {
                    expr.collect_variables(vars);
                }
            }
        }
    }
}

impl fmt::Display for Algebra {
    /// Compact single-line SSE rendering, e.g.
    /// `(project (?y) (filter (exprlist ?x) (extend ((?x true)) (table unit))))`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algebra::Table => write!(f, "(table unit)"),
            Algebra::Bgp(patterns) => {
                write!(f, "(bgp")?;
                for pattern in patterns {
                    write!(f, " {}", pattern)?;
                }
                write!(f, ")")
            }
            Algebra::Extend { pattern, bindings } => {
                write!(f, "(extend (")?;
                for (i, (var, expr)) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "(?{} {})", var, expr)?;
                }
                write!(f, ") {})", pattern)
            }
            Algebra::Filter {
                pattern,
                conditions,
            } => {
                write!(f, "(filter (exprlist")?;
                for condition in conditions {
                    write!(f, " {}", condition)?;
                }
                write!(f, ") {})", pattern)
            }
            Algebra::Project { pattern, variables } => {
                write!(f, "(project (")?;
                for (i, var) in variables.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "?{}", var)?;
                }
                write!(f, ") {})", pattern)
            }
            Algebra::OrderBy {
                pattern,
                conditions,
            } => {
                write!(f, "(order (")?;
                for (i, condition) in conditions.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", condition)?;
                }
                write!(f, ") {})", pattern)
            }
            Algebra::Join { left, right } => write!(f, "(join {} {})", left, right),
            Algebra::Other {
                name,
                children,
                expressions,
            } => {
                write!(f, "({}", name)?;
                if !expressions.is_empty() {
                    write!(f, " (exprlist")?;
                    for expr in expressions {
                        write!(f, " {}", expr)?;
                    }
                    write!(f, ")")?;
                }
                for child in children {
                    write!(f, " {}", child)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Convenience macros for building algebra trees
#[macro_export]
macro_rules! triple {
    ($s:expr, $p:expr, $o:expr) => {
        $crate::algebra::TriplePattern::new($s, $p, $o)
    };
}

#[macro_export]
macro_rules! var {
    ($name:expr) => {
        $crate::algebra::Term::Variable($name.to_string())
    };
}

#[macro_export]
macro_rules! iri {
    ($iri:expr) => {
        $crate::algebra::Term::Iri($crate::algebra::Iri($iri.to_string()))
    };
}

#[macro_export]
macro_rules! literal {
    ($value:expr) => {
        $crate::algebra::Term::Literal($crate::algebra::Literal::plain($value.to_string()))
    };
    ($value:expr, lang: $lang:expr) => {
        $crate::algebra::Term::Literal($crate::algebra::Literal {
            value: $value.to_string(),
            language: Some($lang.to_string()),
            datatype: None,
        })
    };
    ($value:expr, datatype: $dt:expr) => {
        $crate::algebra::Term::Literal($crate::algebra::Literal::typed(
            $value.to_string(),
            $dt.to_string(),
        ))
    };
}
