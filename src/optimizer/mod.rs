//! Query Rewriting Module
//!
//! Algebra-to-algebra rewrite passes and the analyses they are built on.
//! Passes here never change what a plan returns, only how much work is left
//! in it: any doubt about visibility or evaluation behaviour resolves to
//! leaving the plan alone.

pub mod eliminate_assignments;
pub mod substitute;
pub mod usage;

pub use eliminate_assignments::{eliminate_assignments, EliminateAssignments};
pub use substitute::{substitute, substitute_all_in_expr, substitute_in_expr};
pub use usage::{escapes, usage, usage_map, ScopeContext, UsageSummary};

use anyhow::Result;
use tracing::debug;

use crate::algebra::Algebra;
use crate::classify::UnstableFunctions;

/// Configuration for the rewrite pipeline
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// In-line single-use assignments even into positions that may evaluate
    /// the expression more than once per row
    pub aggressive_inlining: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            aggressive_inlining: false,
        }
    }
}

/// Rewrite pipeline over query plans.
///
/// Currently a single pass, assignment elimination; stability judgements for
/// it come from the registered unstable-function names.
#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    config: OptimizerConfig,
    functions: UnstableFunctions,
}

impl Optimizer {
    /// Create an optimizer with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an optimizer with custom configuration
    pub fn with_config(config: OptimizerConfig) -> Self {
        Optimizer {
            config,
            functions: UnstableFunctions::default(),
        }
    }

    /// Mark a function name as producing different values on repeated calls.
    /// Assignments whose expressions reach such a function are never in-lined.
    pub fn register_unstable_function(&mut self, name: &str) -> Result<()> {
        self.functions.register(name)
    }

    /// Rewrite a query plan, preserving its observable semantics exactly
    pub fn optimize(&self, algebra: &Algebra) -> Result<Algebra> {
        let pass = EliminateAssignments::with_functions(
            self.config.aggressive_inlining,
            self.functions.clone(),
        );
        let optimized = pass.apply(algebra);
        if optimized != *algebra {
            debug!("rewrote {} to {}", algebra, optimized);
        }
        Ok(optimized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{Expression, OrderCondition};

    fn single_use_plan(expr: Expression) -> Algebra {
        Algebra::project(
            Algebra::filter(
                Algebra::bind(Algebra::Table, "x", expr),
                vec![Expression::variable("x")],
            ),
            vec!["y"],
        )
    }

    #[test]
    fn test_optimize_applies_assignment_elimination() {
        let optimizer = Optimizer::new();
        let result = optimizer
            .optimize(&single_use_plan(Expression::boolean(true)))
            .unwrap();
        assert_eq!(
            result,
            Algebra::project(
                Algebra::filter(Algebra::Table, vec![Expression::boolean(true)]),
                vec!["y"],
            )
        );
    }

    #[test]
    fn test_registered_function_blocks_inlining() {
        let mut optimizer = Optimizer::new();
        optimizer.register_unstable_function("my:nonce").unwrap();
        let plan = single_use_plan(Expression::function("my:nonce", vec![]));
        let result = optimizer.optimize(&plan).unwrap();
        assert_eq!(result, plan);
    }

    #[test]
    fn test_aggressive_config_reaches_sort_keys() {
        let call = Expression::function(
            "concat",
            vec![Expression::string("a"), Expression::string("b")],
        );
        let plan = Algebra::project(
            Algebra::order_by(
                Algebra::bind(Algebra::Table, "x", call.clone()),
                vec![OrderCondition::asc(Expression::variable("x"))],
            ),
            vec!["y"],
        );

        let cautious = Optimizer::new().optimize(&plan).unwrap();
        assert_eq!(cautious, plan);

        let aggressive = Optimizer::with_config(OptimizerConfig {
            aggressive_inlining: true,
        })
        .optimize(&plan)
        .unwrap();
        assert_eq!(
            aggressive,
            Algebra::project(
                Algebra::order_by(Algebra::Table, vec![OrderCondition::asc(call)]),
                vec!["y"],
            )
        );
    }
}
