use crate::algebra::{AggregateExpression, Expression, Op, OrderExpression, PropFuncArg};
use crate::context::ExecutionContext;
use crate::error::QueryEvaluationError;
use crate::table::Table;
use oxrdf::{NamedNode, Variable};
use spargebra::algebra::PropertyPathExpression;
use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern};

/// The table-level operators of the algebra.
///
/// The [dispatcher](crate::eval) walks an [`Op`] tree, evaluates the children first and combines their tables
/// with these methods. All tables share the lifetime `'a` of the dataset.
///
/// [`SimpleEvaluator`](crate::SimpleEvaluator) is the reference implementation.
/// Methods consuming tables own them: a discarded table is dropped (or explicitly [closed](Table::close)).
pub trait Evaluator<'a> {
    /// The context the patterns are evaluated in
    fn context(&self) -> &ExecutionContext<'a>;

    /// The same evaluator working in another context, used to switch the active graph
    #[must_use]
    fn with_context(&self, context: ExecutionContext<'a>) -> Self
    where
        Self: Sized;

    /// Matches a basic graph pattern against the active graph
    fn basic_pattern(&self, patterns: &[TriplePattern]) -> Result<Table<'a>, QueryEvaluationError>;

    /// Matches a single property path triple against the active graph
    fn path_pattern(
        &self,
        subject: &TermPattern,
        path: &PropertyPathExpression,
        object: &TermPattern,
    ) -> Result<Table<'a>, QueryEvaluationError>;

    /// The table with a single empty solution
    fn unit(&self) -> Table<'a>;

    fn join(&self, left: Table<'a>, right: Table<'a>) -> Result<Table<'a>, QueryEvaluationError>;

    fn left_join(
        &self,
        left: Table<'a>,
        right: Table<'a>,
        expressions: &[Expression],
    ) -> Result<Table<'a>, QueryEvaluationError>;

    fn diff(&self, left: Table<'a>, right: Table<'a>) -> Result<Table<'a>, QueryEvaluationError>;

    fn minus(&self, left: Table<'a>, right: Table<'a>) -> Result<Table<'a>, QueryEvaluationError>;

    fn union(&self, left: Table<'a>, right: Table<'a>) -> Result<Table<'a>, QueryEvaluationError>;

    /// `left` if it has a solution, `right` otherwise
    fn condition(
        &self,
        left: Table<'a>,
        right: Table<'a>,
    ) -> Result<Table<'a>, QueryEvaluationError>;

    fn filter(
        &self,
        expressions: &[Expression],
        table: Table<'a>,
    ) -> Result<Table<'a>, QueryEvaluationError>;

    fn list(&self, table: Table<'a>) -> Result<Table<'a>, QueryEvaluationError>;

    fn order(
        &self,
        table: Table<'a>,
        conditions: &[OrderExpression],
    ) -> Result<Table<'a>, QueryEvaluationError>;

    fn group_by(
        &self,
        table: Table<'a>,
        variables: &[Variable],
        aggregates: &[(Variable, AggregateExpression)],
    ) -> Result<Table<'a>, QueryEvaluationError>;

    fn project(
        &self,
        table: Table<'a>,
        variables: &[Variable],
    ) -> Result<Table<'a>, QueryEvaluationError>;

    fn distinct(&self, table: Table<'a>) -> Result<Table<'a>, QueryEvaluationError>;

    fn reduced(&self, table: Table<'a>) -> Result<Table<'a>, QueryEvaluationError>;

    fn slice(
        &self,
        table: Table<'a>,
        start: usize,
        length: Option<usize>,
    ) -> Result<Table<'a>, QueryEvaluationError>;

    fn extend(
        &self,
        table: Table<'a>,
        bindings: &[(Variable, Expression)],
    ) -> Result<Table<'a>, QueryEvaluationError>;

    fn assign(
        &self,
        table: Table<'a>,
        bindings: &[(Variable, Expression)],
    ) -> Result<Table<'a>, QueryEvaluationError>;

    fn property_function(
        &self,
        table: Table<'a>,
        name: &NamedNode,
        subject: &PropFuncArg,
        object: &PropFuncArg,
    ) -> Result<Table<'a>, QueryEvaluationError>;

    fn procedure(
        &self,
        table: Table<'a>,
        name: &NamedNode,
        args: &[Expression],
    ) -> Result<Table<'a>, QueryEvaluationError>;

    /// Delegates `inner` to the service `name`
    fn service(
        &self,
        name: &NamedNodePattern,
        inner: &Op,
        silent: bool,
    ) -> Result<Table<'a>, QueryEvaluationError>;
}
