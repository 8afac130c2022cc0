use crate::aggregate;
use crate::algebra::{AggregateExpression, Expression, Op, OrderExpression, PropFuncArg};
use crate::binding::Binding;
use crate::context::ExecutionContext;
use crate::error::QueryEvaluationError;
use crate::evaluator::Evaluator;
use crate::expression::{
    ExpressionTerm, cmp_terms, eval as eval_expression, evaluate_condition, evaluate_expression,
};
use crate::options::AssignPolicy;
use crate::path::evaluate_path;
use crate::property_function::call_property_function;
use crate::table::{Table, union_variables};
use oxrdf::{NamedNode, Term, Variable};
use rustc_hash::FxHashSet;
use spargebra::algebra::PropertyPathExpression;
use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern};
use std::cmp::Ordering;

/// The reference [`Evaluator`]: every operator is the direct transcription of its definition.
///
/// Joins are nested loops, the right-hand sides of binary operators are materialized, the left-hand sides
/// are streamed. `filter`, `order` and `group_by` materialize their input.
///
/// ```
/// use oxrdf::{Dataset, Literal, Variable};
/// use sparref::algebra::Op;
/// use sparref::{Binding, EvaluationOptions, ExecutionContext, SimpleEvaluator, eval};
///
/// let x = Variable::new("x")?;
/// let values = Op::Table {
///     variables: vec![x.clone()],
///     rows: vec![
///         Binding::singleton(x.clone(), Literal::from(1).into()),
///         Binding::singleton(x.clone(), Literal::from(2).into()),
///     ],
/// };
/// let dataset = Dataset::new();
/// let evaluator = SimpleEvaluator::new(ExecutionContext::new(&dataset, EvaluationOptions::default()));
/// let rows = eval(&evaluator, &Op::join(Op::unit(), values))?.into_bindings()?;
/// assert_eq!(rows.len(), 2);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone)]
pub struct SimpleEvaluator<'a> {
    context: ExecutionContext<'a>,
}

impl<'a> SimpleEvaluator<'a> {
    pub fn new(context: ExecutionContext<'a>) -> Self {
        Self { context }
    }
}

impl<'a> Evaluator<'a> for SimpleEvaluator<'a> {
    #[inline]
    fn context(&self) -> &ExecutionContext<'a> {
        &self.context
    }

    fn with_context(&self, context: ExecutionContext<'a>) -> Self {
        Self { context }
    }

    fn basic_pattern(&self, patterns: &[TriplePattern]) -> Result<Table<'a>, QueryEvaluationError> {
        self.context
            .options()
            .stage_generator()
            .execute(Table::unit(), patterns, &self.context)
    }

    fn path_pattern(
        &self,
        subject: &TermPattern,
        path: &PropertyPathExpression,
        object: &TermPattern,
    ) -> Result<Table<'a>, QueryEvaluationError> {
        evaluate_path(subject, path, object, &self.context)
    }

    fn unit(&self) -> Table<'a> {
        Table::unit()
    }

    fn join(&self, left: Table<'a>, right: Table<'a>) -> Result<Table<'a>, QueryEvaluationError> {
        let variables = union_variables(left.variables(), right.variables());
        let right = right.into_bindings()?;
        Ok(Table::lazy(
            variables,
            left.flat_map(move |l| match l {
                Ok(l) => right
                    .iter()
                    .filter_map(|r| l.merge(r))
                    .map(Ok)
                    .collect::<Vec<_>>(),
                Err(e) => vec![Err(e)],
            }),
        ))
    }

    fn left_join(
        &self,
        left: Table<'a>,
        right: Table<'a>,
        expressions: &[Expression],
    ) -> Result<Table<'a>, QueryEvaluationError> {
        let variables = union_variables(left.variables(), right.variables());
        let right = right.into_bindings()?;
        let expressions = expressions.to_vec();
        let context = self.context.clone();
        Ok(Table::lazy(
            variables,
            left.flat_map(move |l| {
                let l = match l {
                    Ok(l) => l,
                    Err(e) => return vec![Err(e)],
                };
                let output = right
                    .iter()
                    .filter_map(|r| l.merge(r))
                    .filter(|merged| {
                        expressions
                            .iter()
                            .all(|e| evaluate_condition(e, merged, &context))
                    })
                    .map(Ok)
                    .collect::<Vec<_>>();
                if output.is_empty() {
                    vec![Ok(l)]
                } else {
                    output
                }
            }),
        ))
    }

    fn diff(&self, left: Table<'a>, right: Table<'a>) -> Result<Table<'a>, QueryEvaluationError> {
        let variables = left.variables().to_vec();
        let mut right = right.into_materialized()?;
        Ok(Table::lazy(
            variables,
            left.filter_map(move |l| match l {
                Ok(l) => match right.contains(&l) {
                    Ok(true) => None,
                    Ok(false) => Some(Ok(l)),
                    Err(e) => Some(Err(e)),
                },
                Err(e) => Some(Err(e)),
            }),
        ))
    }

    fn minus(&self, left: Table<'a>, right: Table<'a>) -> Result<Table<'a>, QueryEvaluationError> {
        let variables = left.variables().to_vec();
        let right = right.into_bindings()?;
        Ok(Table::lazy(
            variables,
            left.filter(move |l| {
                let Ok(l) = l else {
                    return true;
                };
                !right
                    .iter()
                    .any(|r| l.is_compatible(r) && !l.is_disjoint(r))
            }),
        ))
    }

    fn union(&self, left: Table<'a>, right: Table<'a>) -> Result<Table<'a>, QueryEvaluationError> {
        let variables = union_variables(left.variables(), right.variables());
        Ok(Table::lazy(variables, left.chain(right)))
    }

    fn condition(
        &self,
        mut left: Table<'a>,
        right: Table<'a>,
    ) -> Result<Table<'a>, QueryEvaluationError> {
        if left.is_empty() {
            left.close();
            Ok(right)
        } else {
            right.close();
            Ok(left)
        }
    }

    fn filter(
        &self,
        expressions: &[Expression],
        table: Table<'a>,
    ) -> Result<Table<'a>, QueryEvaluationError> {
        let variables = table.variables().to_vec();
        let mut rows = Vec::new();
        for row in table {
            let row = row?;
            if expressions
                .iter()
                .all(|e| evaluate_condition(e, &row, &self.context))
            {
                rows.push(row);
            }
        }
        Ok(Table::from_bindings(variables, rows))
    }

    fn list(&self, table: Table<'a>) -> Result<Table<'a>, QueryEvaluationError> {
        Ok(table)
    }

    fn order(
        &self,
        table: Table<'a>,
        conditions: &[OrderExpression],
    ) -> Result<Table<'a>, QueryEvaluationError> {
        let variables = table.variables().to_vec();
        let mut keyed = table
            .map(|row| {
                let row = row?;
                let keys = conditions
                    .iter()
                    .map(|c| match c {
                        OrderExpression::Asc(e) | OrderExpression::Desc(e) => {
                            eval_expression(e, &row, &self.context)
                        }
                    })
                    .collect::<Vec<_>>();
                Ok((keys, row))
            })
            .collect::<Result<Vec<(Vec<Option<ExpressionTerm>>, Binding)>, QueryEvaluationError>>()?;
        // sort_by is stable: rows with equal keys keep their input order
        keyed.sort_by(|(a, _), (b, _)| {
            for (condition, (a, b)) in conditions.iter().zip(a.iter().zip(b)) {
                let ordering = match condition {
                    OrderExpression::Asc(_) => cmp_terms(a.as_ref(), b.as_ref()),
                    OrderExpression::Desc(_) => cmp_terms(b.as_ref(), a.as_ref()),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        Ok(Table::from_bindings(
            variables,
            keyed.into_iter().map(|(_, row)| row).collect(),
        ))
    }

    fn group_by(
        &self,
        table: Table<'a>,
        variables: &[Variable],
        aggregates: &[(Variable, AggregateExpression)],
    ) -> Result<Table<'a>, QueryEvaluationError> {
        aggregate::group_by(table, variables, aggregates, &self.context)
    }

    fn project(
        &self,
        table: Table<'a>,
        variables: &[Variable],
    ) -> Result<Table<'a>, QueryEvaluationError> {
        let variables = variables.to_vec();
        Ok(Table::lazy(
            variables.clone(),
            table.map(move |row| Ok(row?.project(&variables))),
        ))
    }

    fn distinct(&self, table: Table<'a>) -> Result<Table<'a>, QueryEvaluationError> {
        let variables = table.variables().to_vec();
        let mut seen = FxHashSet::default();
        Ok(Table::lazy(
            variables,
            table.filter(move |row| match row {
                Ok(row) => seen.insert(row.clone()),
                Err(_) => true,
            }),
        ))
    }

    fn reduced(&self, table: Table<'a>) -> Result<Table<'a>, QueryEvaluationError> {
        let variables = table.variables().to_vec();
        let mut previous: Option<Binding> = None;
        Ok(Table::lazy(
            variables,
            table.filter(move |row| match row {
                Ok(row) => {
                    if previous.as_ref() == Some(row) {
                        false
                    } else {
                        previous = Some(row.clone());
                        true
                    }
                }
                Err(_) => true,
            }),
        ))
    }

    fn slice(
        &self,
        table: Table<'a>,
        start: usize,
        length: Option<usize>,
    ) -> Result<Table<'a>, QueryEvaluationError> {
        let variables = table.variables().to_vec();
        Ok(Table::lazy(
            variables,
            table.skip(start).take(length.unwrap_or(usize::MAX)),
        ))
    }

    fn extend(
        &self,
        table: Table<'a>,
        bindings: &[(Variable, Expression)],
    ) -> Result<Table<'a>, QueryEvaluationError> {
        let variables = union_variables(
            table.variables(),
            &bindings.iter().map(|(v, _)| v.clone()).collect::<Vec<_>>(),
        );
        let bindings = bindings.to_vec();
        let context = self.context.clone();
        Ok(Table::lazy(
            variables,
            table.map(move |row| {
                let mut row = row?;
                for (variable, expression) in &bindings {
                    if row.contains(variable) {
                        return Err(QueryEvaluationError::VariableRebinding(variable.clone()));
                    }
                    if let Some(value) = evaluate_expression(expression, &row, &context) {
                        row = row
                            .extended(variable.clone(), value)
                            .ok_or_else(|| {
                                QueryEvaluationError::VariableRebinding(variable.clone())
                            })?;
                    }
                }
                Ok(row)
            }),
        ))
    }

    fn assign(
        &self,
        table: Table<'a>,
        bindings: &[(Variable, Expression)],
    ) -> Result<Table<'a>, QueryEvaluationError> {
        let variables = union_variables(
            table.variables(),
            &bindings.iter().map(|(v, _)| v.clone()).collect::<Vec<_>>(),
        );
        let bindings = bindings.to_vec();
        let context = self.context.clone();
        let policy = self.context.options().assign_policy();
        Ok(Table::lazy(
            variables,
            table.filter_map(move |row| {
                let mut row = match row {
                    Ok(row) => row,
                    Err(e) => return Some(Err(e)),
                };
                for (variable, expression) in &bindings {
                    let Some(value) = evaluate_expression(expression, &row, &context) else {
                        continue;
                    };
                    match row.get(variable) {
                        None => row = row.with_overwritten(variable.clone(), value),
                        Some(existing) if *existing == value => (),
                        Some(existing) => match policy {
                            AssignPolicy::DropConflicting => return None,
                            AssignPolicy::Overwrite => {
                                row = row.with_overwritten(variable.clone(), value);
                            }
                            AssignPolicy::Error => {
                                return Some(Err(QueryEvaluationError::AssignConflict {
                                    variable: variable.clone(),
                                    existing: existing.clone(),
                                    new: value,
                                }));
                            }
                        },
                    }
                }
                Some(Ok(row))
            }),
        ))
    }

    fn property_function(
        &self,
        table: Table<'a>,
        name: &NamedNode,
        subject: &PropFuncArg,
        object: &PropFuncArg,
    ) -> Result<Table<'a>, QueryEvaluationError> {
        let function = self
            .context
            .options()
            .property_functions()
            .get(name)
            .ok_or_else(|| QueryEvaluationError::UnknownPropertyFunction(name.clone()))?;
        function
            .build(subject, object)
            .map_err(QueryEvaluationError::PropertyFunction)?;
        let variables = union_variables(
            table.variables(),
            &arg_variables([subject, object]).collect::<Vec<_>>(),
        );
        let (name, subject, object) = (name.clone(), subject.clone(), object.clone());
        let context = self.context.clone();
        Ok(Table::lazy(
            variables,
            table.flat_map(move |row| {
                match row.and_then(|row| {
                    call_property_function(&name, &subject, &object, &row, &context)
                }) {
                    Ok(rows) => rows.into_iter().map(Ok).collect::<Vec<_>>(),
                    Err(e) => vec![Err(e)],
                }
            }),
        ))
    }

    fn procedure(
        &self,
        table: Table<'a>,
        name: &NamedNode,
        args: &[Expression],
    ) -> Result<Table<'a>, QueryEvaluationError> {
        if !self.context.options().procedures().contains(name) {
            return Err(QueryEvaluationError::UnknownProcedure(name.clone()));
        }
        let variables = table.variables().to_vec();
        let (name, args) = (name.clone(), args.to_vec());
        let context = self.context.clone();
        Ok(Table::lazy(
            variables,
            table.flat_map(move |row| {
                match row.and_then(|row| call_procedure(&name, &args, &row, &context)) {
                    Ok(rows) => rows.into_iter().map(Ok).collect::<Vec<_>>(),
                    Err(e) => vec![Err(e)],
                }
            }),
        ))
    }

    fn service(
        &self,
        name: &NamedNodePattern,
        inner: &Op,
        silent: bool,
    ) -> Result<Table<'a>, QueryEvaluationError> {
        let result = match name {
            NamedNodePattern::NamedNode(name) => self.call_service(name, inner),
            NamedNodePattern::Variable(_) => Err(QueryEvaluationError::UnboundService),
        };
        match result {
            Err(error) if silent => {
                tracing::debug!(service = %name, %error, "silent service failed");
                Ok(Table::unit())
            }
            result => result,
        }
    }
}

impl<'a> SimpleEvaluator<'a> {
    /// Fully reads the service answer, so that `SILENT` also covers errors raised while iterating
    fn call_service(&self, name: &NamedNode, inner: &Op) -> Result<Table<'a>, QueryEvaluationError> {
        let solutions = self
            .context
            .options()
            .service_handler()
            .handle(name, inner)?;
        let variables = solutions.variables().to_vec();
        let rows = solutions
            .into_bindings()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Table::from_bindings(variables, rows))
    }
}

fn call_procedure(
    name: &NamedNode,
    args: &[Expression],
    row: &Binding,
    context: &ExecutionContext<'_>,
) -> Result<Vec<Binding>, QueryEvaluationError> {
    let procedure = context
        .options()
        .procedures()
        .get(name)
        .ok_or_else(|| QueryEvaluationError::UnknownProcedure(name.clone()))?;
    let args = args
        .iter()
        .map(|e| evaluate_expression(e, row, context))
        .collect::<Vec<Option<Term>>>();
    Ok(procedure
        .execute(&args, context)
        .map_err(QueryEvaluationError::Procedure)?
        .into_iter()
        .filter_map(|binding| binding.merge(row))
        .collect())
}

fn arg_variables<'b>(args: [&'b PropFuncArg; 2]) -> impl Iterator<Item = Variable> + 'b {
    args.into_iter()
        .flat_map(PropFuncArg::nodes)
        .filter_map(|node| match node {
            TermPattern::Variable(v) => Some(v.clone()),
            _ => None,
        })
}
