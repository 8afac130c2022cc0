use crate::algebra::Op;
use crate::error::QueryEvaluationError;
use crate::eval::{dataset_names_at, graph_at, quad_pattern_at};
use crate::evaluator::Evaluator;
use crate::table::Table;

/// Evaluates `op` bottom-up: the children are evaluated first and their tables combined with `evaluator`
pub(crate) fn dispatch<'a, E: Evaluator<'a>>(
    evaluator: &E,
    op: &Op,
) -> Result<Table<'a>, QueryEvaluationError> {
    dispatch_at(evaluator, op, 0)
}

pub(crate) fn dispatch_at<'a, E: Evaluator<'a>>(
    evaluator: &E,
    op: &Op,
    depth: usize,
) -> Result<Table<'a>, QueryEvaluationError> {
    let table = visit(evaluator, op, depth)?;
    if evaluator.context().options().is_debug() {
        tracing::debug!(
            depth,
            op = op.name(),
            variables = ?table.variables(),
            "evaluated algebra node"
        );
    }
    Ok(table)
}

fn visit<'a, E: Evaluator<'a>>(
    evaluator: &E,
    op: &Op,
    depth: usize,
) -> Result<Table<'a>, QueryEvaluationError> {
    let child = |op: &Op| dispatch_at(evaluator, op, depth + 1);
    match op {
        Op::Bgp { patterns } => evaluator.basic_pattern(patterns),
        Op::Path {
            subject,
            path,
            object,
        } => evaluator.path_pattern(subject, path, object),
        Op::QuadPattern {
            graph_name,
            patterns,
        } => quad_pattern_at(evaluator, graph_name, patterns),
        Op::Graph { name, inner } => graph_at(evaluator, name, inner, depth + 1),
        Op::DatasetNames { graph_name } => dataset_names_at(evaluator, graph_name),
        Op::Join { left, right } => evaluator.join(child(left)?, child(right)?),
        Op::LeftJoin {
            left,
            right,
            expressions,
        } => evaluator.left_join(child(left)?, child(right)?, expressions),
        Op::Union { left, right } => evaluator.union(child(left)?, child(right)?),
        Op::Diff { left, right } => evaluator.diff(child(left)?, child(right)?),
        Op::Minus { left, right } => evaluator.minus(child(left)?, child(right)?),
        Op::Conditional { left, right } => evaluator.condition(child(left)?, child(right)?),
        Op::Filter { expressions, inner } => evaluator.filter(expressions, child(inner)?),
        Op::Sequence(elements) => {
            let mut table = evaluator.unit();
            for element in elements {
                table = evaluator.join(table, child(element)?)?;
            }
            Ok(table)
        }
        Op::Disjunction(elements) => {
            let mut table = Table::empty();
            for element in elements {
                table = evaluator.union(table, child(element)?)?;
            }
            Ok(table)
        }
        Op::Extend { inner, bindings } => evaluator.extend(child(inner)?, bindings),
        Op::Assign { inner, bindings } => evaluator.assign(child(inner)?, bindings),
        Op::OrderBy { inner, conditions } => evaluator.order(child(inner)?, conditions),
        Op::TopN {
            inner,
            limit,
            conditions,
        } => {
            let ordered = evaluator.order(child(inner)?, conditions)?;
            evaluator.slice(ordered, 0, Some(*limit))
        }
        Op::Project { inner, variables } => evaluator.project(child(inner)?, variables),
        Op::Distinct { inner } => evaluator.distinct(child(inner)?),
        Op::Reduced { inner } => evaluator.reduced(child(inner)?),
        Op::Slice {
            inner,
            start,
            length,
        } => evaluator.slice(child(inner)?, *start, *length),
        Op::Group {
            inner,
            variables,
            aggregates,
        } => evaluator.group_by(child(inner)?, variables, aggregates),
        Op::Table { variables, rows } => Ok(Table::from_bindings(variables.clone(), rows.clone())),
        Op::Null => Ok(Table::empty()),
        Op::Label { inner, .. } => match inner {
            Some(inner) => child(inner),
            None => Ok(evaluator.unit()),
        },
        Op::List { inner } => evaluator.list(child(inner)?),
        Op::Service {
            name,
            inner,
            silent,
        } => evaluator.service(name, inner, *silent),
        Op::PropertyFunction {
            name,
            subject,
            object,
            inner,
        } => evaluator.property_function(child(inner)?, name, subject, object),
        Op::Procedure { name, args, inner } => evaluator.procedure(child(inner)?, name, args),
        Op::Extension { name } => Err(QueryEvaluationError::UnsupportedOperation(name.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Binding;
    use crate::context::ExecutionContext;
    use crate::options::EvaluationOptions;
    use crate::simple::SimpleEvaluator;
    use oxrdf::{Dataset, Literal, Variable};

    fn values(name: &str, values: &[i64]) -> Op {
        let v = Variable::new_unchecked(name);
        Op::Table {
            variables: vec![v.clone()],
            rows: values
                .iter()
                .map(|i| Binding::singleton(v.clone(), Literal::from(*i).into()))
                .collect(),
        }
    }

    fn count(op: &Op) -> usize {
        let dataset = Dataset::new();
        let evaluator = SimpleEvaluator::new(ExecutionContext::new(
            &dataset,
            EvaluationOptions::default().with_debug(),
        ));
        dispatch(&evaluator, op).unwrap().into_bindings().unwrap().len()
    }

    #[test]
    fn sequence_and_disjunction() {
        assert_eq!(count(&Op::Sequence(Vec::new())), 1);
        assert_eq!(count(&Op::Disjunction(Vec::new())), 0);
        assert_eq!(
            count(&Op::Sequence(vec![values("x", &[1, 2]), values("y", &[1, 2, 3])])),
            6
        );
        assert_eq!(
            count(&Op::Disjunction(vec![values("x", &[1, 2]), values("x", &[1])])),
            3
        );
    }

    #[test]
    fn top_n_is_order_then_slice() {
        let op = Op::TopN {
            inner: Box::new(values("x", &[3, 1, 2])),
            limit: 2,
            conditions: vec![crate::algebra::OrderExpression::Asc(
                Variable::new_unchecked("x").into(),
            )],
        };
        assert_eq!(count(&op), 2);
    }

    #[test]
    fn labels_null_and_extensions() {
        assert_eq!(
            count(&Op::Label {
                label: "empty".into(),
                inner: None
            }),
            1
        );
        assert_eq!(count(&Op::Null), 0);
        let dataset = Dataset::new();
        let evaluator = SimpleEvaluator::new(ExecutionContext::new(
            &dataset,
            EvaluationOptions::default(),
        ));
        assert!(matches!(
            dispatch(&evaluator, &Op::Extension { name: "x".into() }),
            Err(QueryEvaluationError::UnsupportedOperation(_))
        ));
    }
}
