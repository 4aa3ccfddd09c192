//! Usage and Visibility Analysis
//!
//! Answers the two questions the rewrite driver asks about a variable: how
//! many syntactic uses of it are reachable before its scope ends, and what
//! kind of position each use sits in. Positions matter because they decide
//! whether a use can accept a substitution at all, and whether the
//! substituted expression would risk repeated evaluation there.

use std::collections::{HashMap, HashSet};

use crate::algebra::{Algebra, Expression, Term, Variable};

/// Per-variable use counts, split by position kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSummary {
    /// Uses at expression positions evaluated at most once per row (filter
    /// conditions, assignment expressions). Substitution targets.
    pub once: usize,
    /// Uses at expression positions that may be evaluated more than once per
    /// row (sort keys). Substitution targets only for simple expressions, or
    /// under the aggressive policy.
    pub repeated: usize,
    /// Uses that can never accept a substitution: graph-pattern mentions,
    /// projection lists, opaque operators, and anything in the sibling branch
    /// of a join. These keep a binding alive without offering an inline site.
    pub pinned: usize,
}

impl UsageSummary {
    /// Total use count across all position kinds
    pub fn total(&self) -> usize {
        self.once + self.repeated + self.pinned
    }

    /// Fold another summary into this one
    pub fn merge(&mut self, other: UsageSummary) {
        self.once += other.once;
        self.repeated += other.repeated;
        self.pinned += other.pinned;
    }

    /// The same total with every use demoted to pinned. Applied to regions a
    /// substitution must never reach (join siblings, subtrees below the
    /// defining node).
    pub fn as_pinned(&self) -> Self {
        UsageSummary {
            once: 0,
            repeated: 0,
            pinned: self.total(),
        }
    }
}

/// The set of variables visible past an operator, when it narrows visibility:
/// exactly a projection's retained list. Every other operator passes its
/// child bindings through untouched.
pub fn escapes(op: &Algebra) -> Option<&[Variable]> {
    match op {
        Algebra::Project { variables, .. } => Some(variables),
        _ => None,
    }
}

/// Uses of every variable within `op`, as visible from above the subtree.
///
/// Descent stops where attribution would change: an `Extend` that binds a
/// name seals everything at or beneath it for that name (reported as a single
/// pinned use, since the subtree produces the variable and a join on it stays
/// meaningful), and a `Project` hides all names it does not retain (retained
/// names pass through with their below-counts demoted to pinned, plus one
/// pinned use for the boundary itself). Everything under an `Other` node
/// counts pinned, definitions included.
pub fn usage_map(op: &Algebra) -> HashMap<Variable, UsageSummary> {
    let mut map: HashMap<Variable, UsageSummary> = HashMap::new();
    match op {
        Algebra::Table => {}
        Algebra::Bgp(patterns) => {
            for pattern in patterns {
                for term in [&pattern.subject, &pattern.predicate, &pattern.object] {
                    if let Term::Variable(var) = term {
                        map.entry(var.clone()).or_default().pinned += 1;
                    }
                }
            }
        }
        Algebra::Filter {
            pattern,
            conditions,
        } => {
            map = usage_map(pattern);
            for condition in conditions {
                add_expression_uses(condition, &mut map, Position::Once);
            }
        }
        Algebra::OrderBy {
            pattern,
            conditions,
        } => {
            map = usage_map(pattern);
            for condition in conditions {
                add_expression_uses(&condition.expr, &mut map, Position::Repeated);
            }
        }
        Algebra::Extend { pattern, bindings } => {
            map = usage_map(pattern);
            for (_, expr) in bindings {
                add_expression_uses(expr, &mut map, Position::Once);
            }
            // A bound name seals its subtree: deeper mentions belong to the
            // inner binding, and the definition itself keeps the variable in
            // the subtree's output schema.
            for (var, _) in bindings {
                map.insert(
                    var.clone(),
                    UsageSummary {
                        pinned: 1,
                        ..Default::default()
                    },
                );
            }
        }
        Algebra::Project { pattern, variables } => {
            let below = usage_map(pattern);
            for var in variables {
                let mut entry = below
                    .get(var)
                    .copied()
                    .unwrap_or_default()
                    .as_pinned();
                entry.pinned += 1;
                map.insert(var.clone(), entry);
            }
        }
        Algebra::Join { left, right } => {
            map = usage_map(left);
            for (var, summary) in usage_map(right) {
                map.entry(var).or_default().merge(summary);
            }
        }
        Algebra::Other { .. } => {
            for var in op.mentioned_variables() {
                map.entry(var).or_default().pinned += 1;
            }
        }
    }
    map
}

/// Uses of a single variable within `op`; see [`usage_map`].
pub fn usage(op: &Algebra, var: &str) -> UsageSummary {
    usage_map(op).get(var).copied().unwrap_or_default()
}

#[derive(Clone, Copy)]
enum Position {
    Once,
    Repeated,
}

fn add_expression_uses(
    expr: &Expression,
    map: &mut HashMap<Variable, UsageSummary>,
    position: Position,
) {
    for var in expr.variables() {
        let entry = map.entry(var).or_default();
        match position {
            Position::Once => entry.once += 1,
            Position::Repeated => entry.repeated += 1,
        }
    }
}

/// Top-down context threaded through the rewrite: which projection currently
/// bounds visibility, how often each variable has already been used on the
/// path from that boundary down to the current node, and which names the
/// assignments on that path re-bind.
///
/// Immutable by construction: every step derives a new context, so each
/// node's rewrite stays independently testable.
#[derive(Debug, Clone, Default)]
pub struct ScopeContext {
    scope: Option<Vec<Variable>>,
    above: HashMap<Variable, UsageSummary>,
    rebound: HashSet<Variable>,
}

impl ScopeContext {
    /// Context at the tree root: no enclosing projection, nothing above.
    /// Also the barrier context used beneath opaque operators.
    pub fn root() -> Self {
        ScopeContext::default()
    }

    /// Fresh context entered at a projection boundary
    pub fn project(variables: &[Variable]) -> Self {
        ScopeContext {
            scope: Some(variables.to_vec()),
            above: HashMap::new(),
            rebound: HashSet::new(),
        }
    }

    /// Whether an enclosing projection bounds the current position
    pub fn in_scope(&self) -> bool {
        self.scope.is_some()
    }

    /// Whether the bounding projection retains `var` (making it visible past
    /// the scope boundary)
    pub fn scope_retains(&self, var: &str) -> bool {
        match &self.scope {
            Some(variables) => variables.iter().any(|v| v == var),
            None => false,
        }
    }

    /// Accumulated uses of `var` between the scope boundary and here
    pub fn above(&self, var: &str) -> UsageSummary {
        self.above.get(var).copied().unwrap_or_default()
    }

    /// Whether an assignment between the scope boundary and the current node
    /// re-binds `var`. An expression mentioning such a name must not move
    /// above that assignment: there the name denotes the newer binding.
    pub fn is_rebound(&self, var: &str) -> bool {
        self.rebound.contains(var)
    }

    /// Context below a filter: its conditions' mentions are once-per-row uses
    pub fn with_once<'a>(&self, exprs: impl IntoIterator<Item = &'a Expression>) -> Self {
        let mut next = self.clone();
        for expr in exprs {
            for var in expr.variables() {
                next.above.entry(var).or_default().once += 1;
            }
        }
        next
    }

    /// Context below a sort: its keys' mentions are repeat-risk uses
    pub fn with_repeated<'a>(&self, exprs: impl IntoIterator<Item = &'a Expression>) -> Self {
        let mut next = self.clone();
        for expr in exprs {
            for var in expr.variables() {
                next.above.entry(var).or_default().repeated += 1;
            }
        }
        next
    }

    /// Context entering one join branch: everything the sibling branch can
    /// see or produce counts as pinned, since a join on a shared variable
    /// must keep the binding alive and no substitution may cross branches
    pub fn with_sibling(&self, sibling: &Algebra) -> Self {
        let mut next = self.clone();
        for (var, summary) in usage_map(sibling) {
            next.above.entry(var).or_default().merge(summary.as_pinned());
        }
        next
    }

    /// Context below an assignment node. Counters for names the node binds
    /// are cleared first: mentions above a re-binding belong to the
    /// re-binding, not to whatever produces the name beneath. The same names
    /// are recorded as re-bound for everything deeper. The node's own
    /// expressions then count as once-per-row uses of the *child's*
    /// variables; mentions of the node's own bound names are same-node
    /// sibling references, which the driver accounts for separately.
    pub fn with_bindings(&self, bindings: &[(Variable, Expression)]) -> Self {
        let mut next = self.clone();
        for (var, _) in bindings {
            next.above.remove(var);
            next.rebound.insert(var.clone());
        }
        for (_, expr) in bindings {
            for var in expr.variables() {
                if bindings.iter().any(|(bound, _)| *bound == var) {
                    continue;
                }
                next.above.entry(var).or_default().once += 1;
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{Expression, OrderCondition};
    use crate::{iri, triple, var};

    fn x_filter(child: Algebra) -> Algebra {
        Algebra::filter(child, vec![Expression::variable("x")])
    }

    #[test]
    fn test_filter_mentions_count_once() {
        let tree = Algebra::filter(
            Algebra::Table,
            vec![Expression::function(
                ">",
                vec![
                    Expression::function(
                        "*",
                        vec![Expression::variable("x"), Expression::variable("x")],
                    ),
                    Expression::integer(16),
                ],
            )],
        );
        assert_eq!(
            usage(&tree, "x"),
            UsageSummary {
                once: 2,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_order_keys_count_repeated() {
        let tree = Algebra::order_by(
            Algebra::Table,
            vec![OrderCondition::asc(Expression::variable("x"))],
        );
        assert_eq!(
            usage(&tree, "x"),
            UsageSummary {
                repeated: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_pattern_mentions_count_pinned() {
        let tree = Algebra::bgp(vec![triple!(var!("x"), iri!("http://p"), var!("y"))]);
        assert_eq!(
            usage(&tree, "x"),
            UsageSummary {
                pinned: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_rebinding_extend_seals_the_name() {
        // The filter mention below the binding belongs to that binding, not
        // to anything above this subtree; from outside, only the definition
        // itself is visible.
        let tree = Algebra::bind(x_filter(Algebra::Table), "x", Expression::boolean(true));
        assert_eq!(
            usage(&tree, "x"),
            UsageSummary {
                pinned: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_extend_expressions_count_for_other_names() {
        let tree = Algebra::bind(Algebra::Table, "x", Expression::variable("y"));
        assert_eq!(
            usage(&tree, "y"),
            UsageSummary {
                once: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_excluding_project_hides_uses() {
        let tree = Algebra::project(x_filter(Algebra::Table), vec!["y"]);
        assert_eq!(usage(&tree, "x"), UsageSummary::default());
    }

    #[test]
    fn test_retaining_project_reports_boundary_use() {
        let tree = Algebra::project(x_filter(Algebra::Table), vec!["x"]);
        let summary = usage(&tree, "x");
        assert_eq!(summary.once, 0);
        assert!(summary.pinned >= 1);
    }

    #[test]
    fn test_join_merges_branches() {
        let tree = Algebra::join(
            x_filter(Algebra::Table),
            Algebra::bgp(vec![triple!(var!("x"), iri!("http://p"), var!("z"))]),
        );
        let summary = usage(&tree, "x");
        assert_eq!(summary.once, 1);
        assert_eq!(summary.pinned, 1);
        assert_eq!(summary.total(), 2);
    }

    #[test]
    fn test_other_counts_everything_pinned() {
        let tree = Algebra::other(
            "minus",
            vec![Algebra::project(x_filter(Algebra::Table), vec!["y"])],
            vec![Expression::variable("x")],
        );
        let summary = usage(&tree, "x");
        assert_eq!(summary.once, 0);
        assert_eq!(summary.repeated, 0);
        // Conservative: the mention inside the inner projection and the raw
        // expression slot both count.
        assert_eq!(summary.pinned, 2);
    }

    #[test]
    fn test_escapes_only_for_project() {
        let project = Algebra::project(Algebra::Table, vec!["a", "b"]);
        assert_eq!(escapes(&project), Some(&["a".to_string(), "b".to_string()][..]));
        assert_eq!(escapes(&Algebra::Table), None);
    }

    #[test]
    fn test_scope_context_resets_at_project() {
        let ctx = ScopeContext::root().with_once([&Expression::variable("x")]);
        assert!(!ctx.in_scope());
        assert_eq!(ctx.above("x").once, 1);

        let fresh = ScopeContext::project(&["y".to_string()]);
        assert!(fresh.in_scope());
        assert!(fresh.scope_retains("y"));
        assert!(!fresh.scope_retains("x"));
        assert_eq!(fresh.above("x"), UsageSummary::default());
    }

    #[test]
    fn test_scope_context_bindings_clear_rebound_names() {
        let ctx = ScopeContext::project(&["z".to_string()])
            .with_once([&Expression::variable("x")])
            .with_bindings(&[(
                "x".to_string(),
                Expression::function("ucase", vec![Expression::variable("w")]),
            )]);
        // The mention above the re-binding no longer attributes below it.
        assert_eq!(ctx.above("x"), UsageSummary::default());
        // The re-binding's own expression references the child's ?w.
        assert_eq!(ctx.above("w").once, 1);
        // Everything deeper sees ?x as re-bound on the path.
        assert!(ctx.is_rebound("x"));
        assert!(!ctx.is_rebound("w"));
    }

    #[test]
    fn test_rebound_names_reset_at_a_projection() {
        let ctx = ScopeContext::root().with_bindings(&[("x".to_string(), Expression::integer(1))]);
        assert!(ctx.is_rebound("x"));
        let fresh = ScopeContext::project(&["x".to_string()]);
        assert!(!fresh.is_rebound("x"));
    }

    #[test]
    fn test_scope_context_sibling_counts_pinned() {
        let sibling = x_filter(Algebra::Table);
        let ctx = ScopeContext::project(&["z".to_string()]).with_sibling(&sibling);
        let summary = ctx.above("x");
        assert_eq!(summary.once, 0);
        assert_eq!(summary.pinned, 1);
    }
}
