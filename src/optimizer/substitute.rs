//! Variable Substitution
//!
//! Pure, non-mutating replacement of variable references by expressions.
//! The expression language has no binders, so expression-level substitution
//! is a plain recursive rebuild; tree-level substitution walks operator
//! expression positions top-down and stops wherever the name is re-bound or
//! its scope is sealed, leaving shadowed occurrences untouched.

use std::collections::HashMap;

use crate::algebra::{Algebra, Expression, OrderCondition, Variable};

/// Replace every reference to `var` inside a single expression.
pub fn substitute_in_expr(expr: &Expression, var: &str, replacement: &Expression) -> Expression {
    match expr {
        Expression::Variable(v) if v == var => replacement.clone(),
        Expression::Variable(_) | Expression::Literal(_) | Expression::Iri(_) => expr.clone(),
        Expression::Function { name, args } => Expression::Function {
            name: name.clone(),
            args: args
                .iter()
                .map(|arg| substitute_in_expr(arg, var, replacement))
                .collect(),
        },
    }
}

/// Apply a simultaneous substitution map to a single expression.
///
/// Replacements are spliced as-is: variables inside a replacement are never
/// looked up again, so the map's values may safely mention its keys.
pub fn substitute_all_in_expr(
    expr: &Expression,
    map: &HashMap<Variable, Expression>,
) -> Expression {
    match expr {
        Expression::Variable(v) => match map.get(v) {
            Some(replacement) => replacement.clone(),
            None => expr.clone(),
        },
        Expression::Literal(_) | Expression::Iri(_) => expr.clone(),
        Expression::Function { name, args } => Expression::Function {
            name: name.clone(),
            args: args
                .iter()
                .map(|arg| substitute_all_in_expr(arg, map))
                .collect(),
        },
    }
}

/// Replace free occurrences of `var` in the expression positions of a tree.
///
/// Occurrences are replaced from the root downward. Descent stops at any
/// node that starts a fresh binding of the name (an `Extend` that binds it,
/// or a `Project` that does not retain it), so occurrences beneath such a
/// node keep referring to their own binding. Within a binding node the stop
/// is positional: expressions after the re-binding keep their occurrences,
/// while the re-binding's own expression still sees the outer name. `Other`
/// nodes are opaque and are never entered. The input tree is not modified.
pub fn substitute(op: &Algebra, var: &str, replacement: &Expression) -> Algebra {
    match op {
        Algebra::Table => Algebra::Table,
        Algebra::Bgp(patterns) => Algebra::Bgp(patterns.clone()),
        Algebra::Extend { pattern, bindings } => {
            // Binding expressions evaluate in order against earlier siblings
            // and the child, so occurrences after a re-binding of the name
            // refer to that re-binding and stay put.
            let rebound_at = bindings.iter().position(|(v, _)| v == var);
            let rewritten: Vec<_> = bindings
                .iter()
                .enumerate()
                .map(|(i, (v, e))| {
                    if rebound_at.is_some_and(|stop| i > stop) {
                        (v.clone(), e.clone())
                    } else {
                        (v.clone(), substitute_in_expr(e, var, replacement))
                    }
                })
                .collect();
            let child = if rebound_at.is_some() {
                pattern.as_ref().clone()
            } else {
                substitute(pattern, var, replacement)
            };
            Algebra::extend(child, rewritten)
        }
        Algebra::Filter {
            pattern,
            conditions,
        } => Algebra::filter(
            substitute(pattern, var, replacement),
            conditions
                .iter()
                .map(|c| substitute_in_expr(c, var, replacement))
                .collect(),
        ),
        Algebra::Project { pattern, variables } => {
            let child = if variables.iter().any(|v| v == var) {
                substitute(pattern, var, replacement)
            } else {
                pattern.as_ref().clone()
            };
            Algebra::project(child, variables.clone())
        }
        Algebra::OrderBy {
            pattern,
            conditions,
        } => Algebra::order_by(
            substitute(pattern, var, replacement),
            conditions
                .iter()
                .map(|c| OrderCondition {
                    expr: substitute_in_expr(&c.expr, var, replacement),
                    ascending: c.ascending,
                })
                .collect(),
        ),
        Algebra::Join { left, right } => Algebra::join(
            substitute(left, var, replacement),
            substitute(right, var, replacement),
        ),
        Algebra::Other { .. } => op.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{Expression as E, OrderCondition};

    #[test]
    fn test_expression_substitution_replaces_all_occurrences() {
        let expr = E::function("&&", vec![E::variable("x"), E::variable("x")]);
        let result = substitute_in_expr(&expr, "x", &E::boolean(true));
        assert_eq!(
            result,
            E::function("&&", vec![E::boolean(true), E::boolean(true)])
        );
    }

    #[test]
    fn test_expression_substitution_leaves_other_names() {
        let expr = E::function(">", vec![E::variable("y"), E::integer(3)]);
        let result = substitute_in_expr(&expr, "x", &E::boolean(true));
        assert_eq!(result, expr);
    }

    #[test]
    fn test_map_substitution_is_simultaneous() {
        // ?x maps to an expression mentioning ?y; the ?y inside the spliced
        // replacement must not be resolved a second time.
        let map = HashMap::from([
            ("x".to_string(), E::function("ucase", vec![E::variable("y")])),
            ("y".to_string(), E::integer(2)),
        ]);
        let expr = E::function("concat", vec![E::variable("x"), E::variable("y")]);
        let result = substitute_all_in_expr(&expr, &map);
        assert_eq!(
            result,
            E::function(
                "concat",
                vec![
                    E::function("ucase", vec![E::variable("y")]),
                    E::integer(2),
                ],
            )
        );
    }

    #[test]
    fn test_tree_substitution_rewrites_filters_and_sort_keys() {
        let tree = Algebra::order_by(
            Algebra::filter(Algebra::Table, vec![E::variable("x")]),
            vec![OrderCondition::asc(E::variable("x"))],
        );
        let result = substitute(&tree, "x", &E::integer(1));
        assert_eq!(
            result,
            Algebra::order_by(
                Algebra::filter(Algebra::Table, vec![E::integer(1)]),
                vec![OrderCondition::asc(E::integer(1))],
            )
        );
    }

    #[test]
    fn test_tree_substitution_stops_below_a_rebinding() {
        let tree = Algebra::filter(
            Algebra::bind(
                Algebra::filter(Algebra::Table, vec![E::variable("x")]),
                "x",
                E::variable("w"),
            ),
            vec![E::variable("x")],
        );
        let result = substitute(&tree, "x", &E::boolean(true));
        // Outer occurrence replaced, the binding's own expression untouched
        // (it does not mention ?x), inner occurrence still shadowed.
        assert_eq!(
            result,
            Algebra::filter(
                Algebra::bind(
                    Algebra::filter(Algebra::Table, vec![E::variable("x")]),
                    "x",
                    E::variable("w"),
                ),
                vec![E::boolean(true)],
            )
        );
    }

    #[test]
    fn test_tree_substitution_skips_bindings_after_a_rebinding() {
        // ?y reads the node's own ?x, not the outer one.
        let tree = Algebra::extend(
            Algebra::Table,
            vec![
                ("x".to_string(), E::integer(1)),
                ("y".to_string(), E::variable("x")),
            ],
        );
        let result = substitute(&tree, "x", &E::integer(9));
        assert_eq!(result, tree);
    }

    #[test]
    fn test_rebinding_expression_still_sees_the_outer_name() {
        // Expressions at or before the re-binding evaluate against the outer
        // ?x; only the one after it reads the node's own binding.
        let tree = Algebra::extend(
            Algebra::Table,
            vec![
                ("w".to_string(), E::variable("x")),
                (
                    "x".to_string(),
                    E::function("+", vec![E::variable("x"), E::integer(1)]),
                ),
                ("y".to_string(), E::variable("x")),
            ],
        );
        let result = substitute(&tree, "x", &E::integer(9));
        assert_eq!(
            result,
            Algebra::extend(
                Algebra::Table,
                vec![
                    ("w".to_string(), E::integer(9)),
                    (
                        "x".to_string(),
                        E::function("+", vec![E::integer(9), E::integer(1)]),
                    ),
                    ("y".to_string(), E::variable("x")),
                ],
            )
        );
    }

    #[test]
    fn test_tree_substitution_stops_at_excluding_project() {
        let tree = Algebra::filter(
            Algebra::project(
                Algebra::filter(Algebra::Table, vec![E::variable("x")]),
                vec!["y"],
            ),
            vec![E::variable("x")],
        );
        let result = substitute(&tree, "x", &E::boolean(false));
        assert_eq!(
            result,
            Algebra::filter(
                Algebra::project(
                    Algebra::filter(Algebra::Table, vec![E::variable("x")]),
                    vec!["y"],
                ),
                vec![E::boolean(false)],
            )
        );
    }

    #[test]
    fn test_tree_substitution_passes_through_retaining_project() {
        let tree = Algebra::project(
            Algebra::filter(Algebra::Table, vec![E::variable("x")]),
            vec!["x"],
        );
        let result = substitute(&tree, "x", &E::integer(7));
        assert_eq!(
            result,
            Algebra::project(
                Algebra::filter(Algebra::Table, vec![E::integer(7)]),
                vec!["x"],
            )
        );
    }

    #[test]
    fn test_tree_substitution_never_enters_opaque_nodes() {
        let tree = Algebra::other(
            "minus",
            vec![Algebra::filter(Algebra::Table, vec![E::variable("x")])],
            vec![E::variable("x")],
        );
        let result = substitute(&tree, "x", &E::boolean(true));
        assert_eq!(result, tree);
    }

    #[test]
    fn test_substitution_does_not_mutate_input() {
        let tree = Algebra::filter(Algebra::Table, vec![E::variable("x")]);
        let before = tree.clone();
        let _ = substitute(&tree, "x", &E::boolean(true));
        assert_eq!(tree, before);
    }
}
