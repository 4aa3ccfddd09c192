//! Assignment Elimination
//!
//! Removes or in-lines variable assignments that are provably invisible in
//! the final results. An assignment is only touchable beneath a projection
//! that does not retain its variable: within that scope an unused assignment
//! is removed outright, and a single-use assignment of a stable expression is
//! in-lined into its one use site, provided the move cannot change what any
//! name in the expression refers to. Everything else is left alone, trading
//! missed opportunities for exact preservation of observable semantics.
//!
//! The driver walks the tree once per sweep. A scope context travels down,
//! accumulating how often each variable is referenced between the bounding
//! projection and the current node; a substitution map travels back up,
//! carrying in-lined expressions into the ancestor positions that referenced
//! them, and ending at the scope boundary. Sweeps repeat until the plan stops
//! changing, so assignments that only become dead once a later sweep removes
//! their last reference are picked up as well.

use std::collections::HashMap;

use tracing::debug;

use crate::algebra::{Algebra, Expression, OrderCondition, Variable};
use crate::classify::{classify_complexity, Complexity, Stability, UnstableFunctions};
use crate::optimizer::substitute::substitute_all_in_expr;
use crate::optimizer::usage::{usage, ScopeContext, UsageSummary};

/// The assignment-elimination rewrite pass.
///
/// By default only trivially cheap expressions may be in-lined into
/// positions that evaluate more than once per row (sort keys); the
/// aggressive policy lifts that restriction. Stability judgements come from
/// the configured [`UnstableFunctions`] registry.
#[derive(Debug, Clone, Default)]
pub struct EliminateAssignments {
    aggressive: bool,
    functions: UnstableFunctions,
}

impl EliminateAssignments {
    /// Create a pass with the baseline unstable-function registry
    pub fn new(aggressive: bool) -> Self {
        EliminateAssignments {
            aggressive,
            functions: UnstableFunctions::default(),
        }
    }

    /// Create a pass with a caller-supplied unstable-function registry
    pub fn with_functions(aggressive: bool, functions: UnstableFunctions) -> Self {
        EliminateAssignments {
            aggressive,
            functions,
        }
    }

    /// Rewrite `algebra` to a fixed point and return the result.
    ///
    /// The input is never modified. Each sweep that changes the plan removes
    /// at least one assignment, so the loop terminates.
    pub fn apply(&self, algebra: &Algebra) -> Algebra {
        let mut current = algebra.clone();
        loop {
            let (next, _) = self.rewrite(&current, &ScopeContext::root());
            if next == current {
                return next;
            }
            debug!("elimination sweep changed the plan, sweeping again");
            current = next;
        }
    }

    /// One bottom-up sweep over `op`.
    ///
    /// Returns the rewritten subtree together with the substitutions decided
    /// inside it that ancestors still need to apply to their own expression
    /// positions. Every in-lined variable had exactly one counted use, and
    /// that use lies on the path between the subtree and its scope boundary,
    /// so the map is always fully consumed before the boundary discards it.
    /// In-lined expressions mention no name re-bound along that path, so
    /// splicing them anywhere on it never changes what they refer to.
    fn rewrite(
        &self,
        op: &Algebra,
        ctx: &ScopeContext,
    ) -> (Algebra, HashMap<Variable, Expression>) {
        match op {
            Algebra::Table | Algebra::Bgp(_) => (op.clone(), HashMap::new()),
            Algebra::Extend { pattern, bindings } => self.rewrite_extend(pattern, bindings, ctx),
            Algebra::Filter {
                pattern,
                conditions,
            } => {
                let (child, map) = self.rewrite(pattern, &ctx.with_once(conditions));
                let conditions = conditions
                    .iter()
                    .map(|condition| substitute_all_in_expr(condition, &map))
                    .collect();
                (Algebra::filter(child, conditions), map)
            }
            Algebra::Project { pattern, variables } => {
                // Fresh scope below; whatever was in-lined there has already
                // been spliced into its use site, so the map ends here.
                let (child, _) = self.rewrite(pattern, &ScopeContext::project(variables));
                (Algebra::project(child, variables.clone()), HashMap::new())
            }
            Algebra::OrderBy {
                pattern,
                conditions,
            } => {
                let key_exprs = conditions.iter().map(|condition| &condition.expr);
                let (child, map) = self.rewrite(pattern, &ctx.with_repeated(key_exprs));
                let conditions = conditions
                    .iter()
                    .map(|condition| OrderCondition {
                        expr: substitute_all_in_expr(&condition.expr, &map),
                        ascending: condition.ascending,
                    })
                    .collect();
                (Algebra::order_by(child, conditions), map)
            }
            Algebra::Join { left, right } => {
                let left_ctx = ctx.with_sibling(right);
                let right_ctx = ctx.with_sibling(left);
                let (new_left, mut map) = self.rewrite(left, &left_ctx);
                let (new_right, right_map) = self.rewrite(right, &right_ctx);
                map.extend(right_map);
                (Algebra::join(new_left, new_right), map)
            }
            Algebra::Other {
                name,
                children,
                expressions,
            } => {
                // Opaque operator: its children are rewritten in isolation,
                // since nothing may be in-lined across a node whose variable
                // handling is unknown, and its expression slots stay as they
                // are.
                let children = children
                    .iter()
                    .map(|child| self.rewrite(child, &ScopeContext::root()).0)
                    .collect();
                (
                    Algebra::other(name.clone(), children, expressions.clone()),
                    HashMap::new(),
                )
            }
        }
    }

    /// Drive the per-binding decision for one assignment node.
    ///
    /// Bindings are decided left to right against a running map, so a later
    /// binding that references an in-lined earlier sibling picks up the
    /// replacement immediately. A node whose bindings all disappear is elided
    /// in favour of its child.
    fn rewrite_extend(
        &self,
        pattern: &Algebra,
        bindings: &[(Variable, Expression)],
        ctx: &ScopeContext,
    ) -> (Algebra, HashMap<Variable, Expression>) {
        let (child, mut map) = self.rewrite(pattern, &ctx.with_bindings(bindings));

        let mut retained: Vec<(Variable, Expression)> = Vec::new();
        for (index, (var, expr)) in bindings.iter().enumerate() {
            let expr = substitute_all_in_expr(expr, &map);

            if !ctx.in_scope() {
                // No bounding projection: the variable is visible in the
                // overall results, so the assignment must stay.
                map.remove(var);
                retained.push((var.clone(), expr));
                continue;
            }

            let uses = count_uses(ctx, var, &expr, index, bindings, &retained, &child);
            if uses.total() == 0 {
                debug!("removing unused assignment ?{} = {}", var, expr);
                map.remove(var);
                continue;
            }
            if self.can_inline(&uses, &expr) && !capture_risk(ctx, &expr, index, bindings) {
                debug!("in-lining single-use assignment ?{} = {}", var, expr);
                map.insert(var.clone(), expr);
                continue;
            }
            map.remove(var);
            retained.push((var.clone(), expr));
        }

        if retained.is_empty() {
            (child, map)
        } else {
            (Algebra::extend(child, retained), map)
        }
    }

    /// Exactly one rewritable use, a stable expression, and no repeat-risk
    /// position unless the expression is trivial or the aggressive policy is
    /// on.
    fn can_inline(&self, uses: &UsageSummary, expr: &Expression) -> bool {
        if uses.total() != 1 || uses.pinned != 0 {
            return false;
        }
        if self.functions.classify(expr) != Stability::Stable {
            return false;
        }
        classify_complexity(expr) == Complexity::Simple || uses.repeated == 0 || self.aggressive
    }
}

/// Run the pass over `algebra` with the baseline unstable-function registry.
pub fn eliminate_assignments(algebra: &Algebra, aggressive: bool) -> Algebra {
    EliminateAssignments::new(aggressive).apply(algebra)
}

/// Visible uses of `var` for the binding at `index`: everything the scope
/// has accumulated above the node, the scope boundary itself when it retains
/// the variable, references from sibling bindings of the same node, and any
/// mention in the child subtree. Earlier siblings are already final, so
/// their references cannot accept a substitution; later siblings are still
/// rewritable. Child-subtree mentions cannot belong to this binding at all
/// (it is not in force below its own node), so they count as pinned and a
/// plan that mentions the name below its definition is left untouched.
fn count_uses(
    ctx: &ScopeContext,
    var: &str,
    expr: &Expression,
    index: usize,
    bindings: &[(Variable, Expression)],
    retained: &[(Variable, Expression)],
    child: &Algebra,
) -> UsageSummary {
    let mut uses = ctx.above(var);
    if ctx.scope_retains(var) {
        uses.pinned += 1;
    }
    uses.pinned += count_mentions(expr, var);
    for (_, earlier) in retained {
        uses.pinned += count_mentions(earlier, var);
    }
    for (_, later) in &bindings[index + 1..] {
        uses.once += count_mentions(later, var);
    }
    uses.pinned += usage(child, var).total();
    uses
}

fn count_mentions(expr: &Expression, var: &str) -> usize {
    expr.variables().into_iter().filter(|v| v == var).count()
}

/// Whether splicing `expr` into its one use site could change what a name in
/// it refers to. The use sits somewhere above the current node, so the
/// expression must not mention a name re-bound between here and the scope
/// boundary, nor one bound by a later sibling of the same node (the
/// expression evaluates before that sibling takes effect, the use site
/// after).
fn capture_risk(
    ctx: &ScopeContext,
    expr: &Expression,
    index: usize,
    bindings: &[(Variable, Expression)],
) -> bool {
    expr.variables().iter().any(|v| {
        ctx.is_rebound(v) || bindings[index + 1..].iter().any(|(bound, _)| bound == v)
    })
}
