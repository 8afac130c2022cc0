//! `GROUP BY` and the [set functions](https://www.w3.org/TR/sparql11-query/#setFunctions).

use crate::algebra::{AggregateExpression, Expression};
use crate::bgp::is_hidden;
use crate::binding::Binding;
use crate::context::ExecutionContext;
use crate::error::QueryEvaluationError;
use crate::expression::{
    ExpressionTerm, NumericBinaryOperands, build_plain_literal, cmp_terms, eval,
    string_and_language,
};
use crate::table::Table;
use oxrdf::{Term, Variable};
use oxsdatatypes::{Decimal, Double, Float, Integer};
use rustc_hash::{FxHashMap, FxHashSet};
use spargebra::algebra::AggregateFunction;
use std::cmp::Ordering;

/// Groups the rows of `table` by the values of `variables` and computes `aggregates` for each group.
///
/// Groups are output in the order of their first row. A variable missing from a row is a key value of its own.
/// Without grouping variables, an empty input still produces a single group.
pub(crate) fn group_by<'a>(
    table: Table<'a>,
    variables: &[Variable],
    aggregates: &[(Variable, AggregateExpression)],
    context: &ExecutionContext<'a>,
) -> Result<Table<'a>, QueryEvaluationError> {
    let mut output_variables = variables.to_vec();
    output_variables.extend(aggregates.iter().map(|(v, _)| v.clone()));

    let mut group_keys = FxHashMap::<Vec<Option<Term>>, usize>::default();
    let mut groups = Vec::<(Vec<Option<Term>>, Vec<Binding>)>::new();
    if variables.is_empty() {
        groups.push((Vec::new(), Vec::new()));
        group_keys.insert(Vec::new(), 0);
    }
    for row in table {
        let row = row?;
        let key = variables
            .iter()
            .map(|v| row.get(v).cloned())
            .collect::<Vec<_>>();
        let position = *group_keys.entry(key.clone()).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[position].1.push(row);
    }

    let rows = groups
        .into_iter()
        .map(|(key, rows)| {
            let mut result = variables
                .iter()
                .zip(key)
                .filter_map(|(v, value)| Some((v.clone(), value?)))
                .collect::<Binding>();
            for (variable, aggregate) in aggregates {
                match compute(aggregate, &rows, context) {
                    Some(value) => result = result.with_overwritten(variable.clone(), value),
                    None => tracing::trace!(%variable, "aggregate evaluation failed"),
                }
            }
            result
        })
        .collect();
    Ok(Table::from_bindings(output_variables, rows))
}

fn compute(
    aggregate: &AggregateExpression,
    rows: &[Binding],
    context: &ExecutionContext<'_>,
) -> Option<Term> {
    match aggregate {
        AggregateExpression::CountSolutions { distinct } => {
            let count = if *distinct {
                // Blank nodes of the pattern are not part of the solutions
                rows.iter()
                    .map(|row| row.without(is_hidden))
                    .collect::<FxHashSet<_>>()
                    .len()
            } else {
                rows.len()
            };
            Some(ExpressionTerm::IntegerLiteral(i64::try_from(count).ok()?.into()).into())
        }
        AggregateExpression::FunctionCall {
            name,
            expr,
            distinct,
        } => {
            if let AggregateFunction::Custom(name) = name {
                let builder = context.options().custom_aggregate_function(name)?;
                let mut accumulator = builder();
                for value in values(expr, rows, *distinct, context) {
                    accumulator.accumulate(value.into());
                }
                return accumulator.finish();
            }
            let mut accumulator = accumulator_for(name);
            for value in values(expr, rows, *distinct, context) {
                accumulator.add(value);
            }
            Some(accumulator.finish()?.into())
        }
    }
}

/// The values of `expression` on `rows`, evaluation errors skipped
fn values(
    expression: &Expression,
    rows: &[Binding],
    distinct: bool,
    context: &ExecutionContext<'_>,
) -> Vec<ExpressionTerm> {
    let values = rows.iter().filter_map(|row| eval(expression, row, context));
    if distinct {
        let mut seen = FxHashSet::default();
        values.filter(|v| seen.insert(v.clone())).collect()
    } else {
        values.collect()
    }
}

fn accumulator_for(function: &AggregateFunction) -> Box<dyn Accumulator> {
    match function {
        AggregateFunction::Count => Box::new(CountAccumulator::default()),
        AggregateFunction::Sum => Box::new(SumAccumulator::default()),
        AggregateFunction::Avg => Box::new(AvgAccumulator::default()),
        AggregateFunction::Min => Box::new(MinAccumulator::default()),
        AggregateFunction::Max => Box::new(MaxAccumulator::default()),
        AggregateFunction::Sample => Box::new(SampleAccumulator::default()),
        AggregateFunction::GroupConcat { separator } => Box::new(GroupConcatAccumulator::new(
            separator.as_deref().unwrap_or(" ").into(),
        )),
        AggregateFunction::Custom(_) => Box::new(FailingAccumulator),
    }
}

trait Accumulator {
    fn add(&mut self, element: ExpressionTerm);

    fn finish(&mut self) -> Option<ExpressionTerm>;
}

#[derive(Default)]
struct CountAccumulator {
    count: i64,
}

impl Accumulator for CountAccumulator {
    fn add(&mut self, _element: ExpressionTerm) {
        self.count += 1;
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        Some(ExpressionTerm::IntegerLiteral(self.count.into()))
    }
}

struct SumAccumulator {
    sum: Option<ExpressionTerm>,
}

impl Default for SumAccumulator {
    fn default() -> Self {
        Self {
            sum: Some(ExpressionTerm::IntegerLiteral(Integer::default())),
        }
    }
}

impl Accumulator for SumAccumulator {
    fn add(&mut self, element: ExpressionTerm) {
        let Some(sum) = self.sum.take() else {
            return;
        };
        self.sum = match NumericBinaryOperands::new(sum, element) {
            Some(NumericBinaryOperands::Float(v1, v2)) => Some(ExpressionTerm::FloatLiteral(v1 + v2)),
            Some(NumericBinaryOperands::Double(v1, v2)) => {
                Some(ExpressionTerm::DoubleLiteral(v1 + v2))
            }
            Some(NumericBinaryOperands::Integer(v1, v2)) => {
                v1.checked_add(v2).map(ExpressionTerm::IntegerLiteral)
            }
            Some(NumericBinaryOperands::Decimal(v1, v2)) => {
                v1.checked_add(v2).map(ExpressionTerm::DecimalLiteral)
            }
            None => None,
        };
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        self.sum.take()
    }
}

#[derive(Default)]
struct AvgAccumulator {
    sum: SumAccumulator,
    count: i64,
}

impl Accumulator for AvgAccumulator {
    fn add(&mut self, element: ExpressionTerm) {
        self.sum.add(element);
        self.count += 1;
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        let sum = self.sum.finish()?;
        if self.count == 0 {
            return Some(ExpressionTerm::IntegerLiteral(0.into()));
        }
        let count = Integer::from(self.count);
        match sum {
            ExpressionTerm::FloatLiteral(sum) => {
                Some(ExpressionTerm::FloatLiteral(sum / Float::from(count)))
            }
            ExpressionTerm::DoubleLiteral(sum) => {
                Some(ExpressionTerm::DoubleLiteral(sum / Double::from(count)))
            }
            ExpressionTerm::IntegerLiteral(sum) => Some(ExpressionTerm::DecimalLiteral(
                Decimal::from(sum).checked_div(count)?,
            )),
            ExpressionTerm::DecimalLiteral(sum) => {
                Some(ExpressionTerm::DecimalLiteral(sum.checked_div(count)?))
            }
            _ => None,
        }
    }
}

#[derive(Default)]
struct MinAccumulator {
    min: Option<ExpressionTerm>,
}

impl Accumulator for MinAccumulator {
    fn add(&mut self, element: ExpressionTerm) {
        if self
            .min
            .as_ref()
            .is_none_or(|min| cmp_terms(Some(&element), Some(min)) == Ordering::Less)
        {
            self.min = Some(element);
        }
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        self.min.take()
    }
}

#[derive(Default)]
struct MaxAccumulator {
    max: Option<ExpressionTerm>,
}

impl Accumulator for MaxAccumulator {
    fn add(&mut self, element: ExpressionTerm) {
        if self
            .max
            .as_ref()
            .is_none_or(|max| cmp_terms(Some(&element), Some(max)) == Ordering::Greater)
        {
            self.max = Some(element);
        }
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        self.max.take()
    }
}

#[derive(Default)]
struct SampleAccumulator {
    value: Option<ExpressionTerm>,
}

impl Accumulator for SampleAccumulator {
    fn add(&mut self, element: ExpressionTerm) {
        if self.value.is_none() {
            self.value = Some(element);
        }
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        self.value.take()
    }
}

struct GroupConcatAccumulator {
    concat: Option<String>,
    language: Option<Option<String>>,
    separator: String,
}

impl GroupConcatAccumulator {
    fn new(separator: String) -> Self {
        Self {
            concat: Some(String::new()),
            language: None,
            separator,
        }
    }
}

impl Accumulator for GroupConcatAccumulator {
    fn add(&mut self, element: ExpressionTerm) {
        let Some(concat) = self.concat.as_mut() else {
            return;
        };
        let Some((value, e_language)) = string_and_language(element) else {
            self.concat = None;
            return;
        };
        if let Some(lang) = &self.language {
            if *lang != e_language {
                self.language = Some(None);
            }
            concat.push_str(&self.separator);
        } else {
            self.language = Some(e_language);
        }
        concat.push_str(&value);
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        self.concat
            .take()
            .map(|result| build_plain_literal(result, self.language.take().flatten()))
    }
}

/// Unknown custom aggregate
struct FailingAccumulator;

impl Accumulator for FailingAccumulator {
    fn add(&mut self, _: ExpressionTerm) {}

    fn finish(&mut self) -> Option<ExpressionTerm> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{AggregateFunctionAccumulator, EvaluationOptions};
    use oxrdf::{Dataset, Literal, NamedNode};

    fn x() -> Variable {
        Variable::new_unchecked("x")
    }

    fn call(name: AggregateFunction) -> AggregateExpression {
        AggregateExpression::FunctionCall {
            name,
            expr: Expression::Variable(x()),
            distinct: false,
        }
    }

    fn aggregate_all(
        rows: Vec<Binding>,
        aggregate: AggregateExpression,
        options: EvaluationOptions,
    ) -> Option<Term> {
        let dataset = Dataset::new();
        let context = ExecutionContext::new(&dataset, options);
        let result = Variable::new_unchecked("r");
        let table = Table::from_bindings(vec![x()], rows);
        let mut rows = group_by(table, &[], &[(result.clone(), aggregate)], &context)
            .unwrap()
            .into_bindings()
            .unwrap();
        assert_eq!(rows.len(), 1);
        rows.pop().unwrap().get(&result).cloned()
    }

    fn numbers(values: &[i64]) -> Vec<Binding> {
        values
            .iter()
            .map(|v| Binding::singleton(x(), Literal::from(*v).into()))
            .collect()
    }

    #[test]
    fn empty_input_defaults() {
        let options = EvaluationOptions::default;
        assert_eq!(
            aggregate_all(Vec::new(), call(AggregateFunction::Count), options()),
            Some(Literal::from(0).into())
        );
        assert_eq!(
            aggregate_all(Vec::new(), call(AggregateFunction::Sum), options()),
            Some(Literal::from(0).into())
        );
        assert_eq!(
            aggregate_all(Vec::new(), call(AggregateFunction::Avg), options()),
            Some(Literal::from(0).into())
        );
        assert_eq!(
            aggregate_all(
                Vec::new(),
                call(AggregateFunction::GroupConcat { separator: None }),
                options()
            ),
            Some(Literal::from("").into())
        );
        assert_eq!(
            aggregate_all(Vec::new(), call(AggregateFunction::Min), options()),
            None
        );
        assert_eq!(
            aggregate_all(Vec::new(), call(AggregateFunction::Sample), options()),
            None
        );
    }

    #[test]
    fn numeric_aggregates() {
        let options = EvaluationOptions::default;
        assert_eq!(
            aggregate_all(numbers(&[1, 2, 3]), call(AggregateFunction::Sum), options()),
            Some(Literal::from(6).into())
        );
        assert_eq!(
            aggregate_all(numbers(&[1, 2, 3]), call(AggregateFunction::Avg), options()),
            Some(Literal::from(Decimal::from(2)).into())
        );
        assert_eq!(
            aggregate_all(numbers(&[3, 1, 2]), call(AggregateFunction::Min), options()),
            Some(Literal::from(1).into())
        );
        assert_eq!(
            aggregate_all(numbers(&[3, 1, 2]), call(AggregateFunction::Max), options()),
            Some(Literal::from(3).into())
        );
        assert_eq!(
            aggregate_all(
                numbers(&[1, 1, 2]),
                AggregateExpression::FunctionCall {
                    name: AggregateFunction::Count,
                    expr: Expression::Variable(x()),
                    distinct: true,
                },
                options()
            ),
            Some(Literal::from(2).into())
        );
    }

    #[test]
    fn sum_type_error_leaves_unbound() {
        let mut rows = numbers(&[1]);
        rows.push(Binding::singleton(x(), Literal::from("a").into()));
        assert_eq!(
            aggregate_all(rows, call(AggregateFunction::Sum), EvaluationOptions::default()),
            None
        );
    }

    #[test]
    fn group_concat_with_separator() {
        assert_eq!(
            aggregate_all(
                numbers(&[1, 2]),
                call(AggregateFunction::GroupConcat {
                    separator: Some(", ".into())
                }),
                EvaluationOptions::default()
            ),
            None // integers are not strings
        );
        let rows = ["a", "b"]
            .into_iter()
            .map(|v| Binding::singleton(x(), Literal::from(v).into()))
            .collect();
        assert_eq!(
            aggregate_all(
                rows,
                call(AggregateFunction::GroupConcat {
                    separator: Some(", ".into())
                }),
                EvaluationOptions::default()
            ),
            Some(Literal::from("a, b").into())
        );
    }

    struct Product(i64);

    impl AggregateFunctionAccumulator for Product {
        fn accumulate(&mut self, element: Term) {
            if let Term::Literal(l) = element {
                self.0 *= l.value().parse::<i64>().unwrap_or(1);
            }
        }

        fn finish(&mut self) -> Option<Term> {
            Some(Literal::from(self.0).into())
        }
    }

    #[test]
    fn custom_aggregate() {
        let name = NamedNode::new_unchecked("http://example.com/product");
        let options = EvaluationOptions::default()
            .with_custom_aggregate_function(name.clone(), || Box::new(Product(1)));
        assert_eq!(
            aggregate_all(
                numbers(&[2, 3, 4]),
                call(AggregateFunction::Custom(name.clone())),
                options
            ),
            Some(Literal::from(24).into())
        );
        assert_eq!(
            aggregate_all(
                numbers(&[2]),
                call(AggregateFunction::Custom(name)),
                EvaluationOptions::default()
            ),
            None
        );
    }

    #[test]
    fn groups_keep_first_seen_order() {
        let dataset = Dataset::new();
        let context = ExecutionContext::new(&dataset, EvaluationOptions::default());
        let y = Variable::new_unchecked("y");
        let rows = [(2, 1), (1, 1), (2, 1)]
            .into_iter()
            .map(|(k, v)| {
                [(x(), Literal::from(k).into()), (y.clone(), Literal::from(v).into())]
                    .into_iter()
                    .collect::<Binding>()
            })
            .chain([Binding::singleton(y.clone(), Literal::from(5).into())])
            .collect();
        let count = Variable::new_unchecked("c");
        let groups = group_by(
            Table::from_bindings(vec![x(), y.clone()], rows),
            &[x()],
            &[(count.clone(), call(AggregateFunction::Count))],
            &context,
        )
        .unwrap()
        .into_bindings()
        .unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].get(&x()), Some(&Literal::from(2).into()));
        assert_eq!(groups[0].get(&count), Some(&Literal::from(2).into()));
        assert_eq!(groups[1].get(&x()), Some(&Literal::from(1).into()));
        assert_eq!(groups[2].get(&x()), None);
        assert_eq!(groups[2].get(&count), Some(&Literal::from(0).into()));
    }
}
