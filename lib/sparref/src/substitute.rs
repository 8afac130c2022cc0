//! Instantiates an algebra tree with the values of a binding.

use crate::algebra::{Expression, Op, OrderExpression, PropFuncArg};
use crate::binding::Binding;
use oxrdf::{Term, Variable};
use spargebra::term::{GraphNamePattern, NamedNodePattern, TermPattern, TriplePattern};

/// Replaces the variables of `op` bound in `binding` by their values.
///
/// Only IRIs and literals are written into graph patterns: a blank node value in a pattern would be read
/// as a fresh variable, and a literal can not name a predicate or a graph. The variables left in place
/// must be checked by joining the evaluation result with `binding`.
/// Expressions receive all values.
///
/// The substitution stops at the scope boundaries: below a projection only the projected variables are
/// replaced, below a grouping only the grouping keys.
/// `MINUS` and difference nodes are kept as they are and joined with `binding` instead.
pub fn substitute(op: &Op, binding: &Binding) -> Op {
    if binding.is_empty() {
        return op.clone();
    }
    match op {
        Op::Bgp { patterns } => Op::Bgp {
            patterns: triple_patterns(patterns, binding),
        },
        Op::Path {
            subject,
            path,
            object,
        } => Op::Path {
            subject: term_pattern(subject, binding),
            path: path.clone(),
            object: term_pattern(object, binding),
        },
        Op::QuadPattern {
            graph_name,
            patterns,
        } => Op::QuadPattern {
            graph_name: match graph_name {
                GraphNamePattern::Variable(v) => match binding.get(v) {
                    Some(Term::NamedNode(g)) => GraphNamePattern::NamedNode(g.clone()),
                    _ => graph_name.clone(),
                },
                _ => graph_name.clone(),
            },
            patterns: triple_patterns(patterns, binding),
        },
        Op::Graph { name, inner } => Op::Graph {
            name: named_node_pattern(name, binding),
            inner: Box::new(substitute(inner, binding)),
        },
        Op::DatasetNames { graph_name } => Op::DatasetNames {
            graph_name: named_node_pattern(graph_name, binding),
        },
        Op::Join { left, right } => Op::Join {
            left: Box::new(substitute(left, binding)),
            right: Box::new(substitute(right, binding)),
        },
        Op::LeftJoin {
            left,
            right,
            expressions,
        } => Op::LeftJoin {
            left: Box::new(substitute(left, binding)),
            right: Box::new(substitute(right, binding)),
            expressions: expressions
                .iter()
                .map(|e| substitute_expression(e, binding))
                .collect(),
        },
        Op::Union { left, right } => Op::Union {
            left: Box::new(substitute(left, binding)),
            right: Box::new(substitute(right, binding)),
        },
        // Replacing a variable on both sides would remove it from the shared domain of the rows
        Op::Diff { .. } | Op::Minus { .. } => Op::join(
            op.clone(),
            Op::Table {
                variables: binding.variables().cloned().collect(),
                rows: vec![binding.clone()],
            },
        ),
        Op::Conditional { left, right } => Op::Conditional {
            left: Box::new(substitute(left, binding)),
            right: Box::new(substitute(right, binding)),
        },
        Op::Filter { expressions, inner } => Op::Filter {
            expressions: expressions
                .iter()
                .map(|e| substitute_expression(e, binding))
                .collect(),
            inner: Box::new(substitute(inner, binding)),
        },
        Op::Sequence(ops) => Op::Sequence(ops.iter().map(|o| substitute(o, binding)).collect()),
        Op::Disjunction(ops) => {
            Op::Disjunction(ops.iter().map(|o| substitute(o, binding)).collect())
        }
        Op::Extend { inner, bindings } => Op::Extend {
            inner: Box::new(substitute(inner, binding)),
            bindings: substitute_bindings(bindings, binding),
        },
        Op::Assign { inner, bindings } => Op::Assign {
            inner: Box::new(substitute(inner, binding)),
            bindings: substitute_bindings(bindings, binding),
        },
        Op::OrderBy { inner, conditions } => Op::OrderBy {
            inner: Box::new(substitute(inner, binding)),
            conditions: substitute_conditions(conditions, binding),
        },
        Op::TopN {
            inner,
            limit,
            conditions,
        } => Op::TopN {
            inner: Box::new(substitute(inner, binding)),
            limit: *limit,
            conditions: substitute_conditions(conditions, binding),
        },
        Op::Project { inner, variables } => Op::Project {
            inner: Box::new(substitute(inner, &binding.project(variables))),
            variables: variables.clone(),
        },
        Op::Distinct { inner } => Op::Distinct {
            inner: Box::new(substitute(inner, binding)),
        },
        Op::Reduced { inner } => Op::Reduced {
            inner: Box::new(substitute(inner, binding)),
        },
        Op::Slice {
            inner,
            start,
            length,
        } => Op::Slice {
            inner: Box::new(substitute(inner, binding)),
            start: *start,
            length: *length,
        },
        Op::Group {
            inner,
            variables,
            aggregates,
        } => Op::Group {
            inner: Box::new(substitute(inner, &binding.project(variables))),
            variables: variables.clone(),
            aggregates: aggregates.clone(),
        },
        Op::Table { variables, rows } => Op::Table {
            variables: variables.clone(),
            rows: rows
                .iter()
                .filter(|row| row.is_compatible(binding))
                .cloned()
                .collect(),
        },
        Op::Label { label, inner } => Op::Label {
            label: label.clone(),
            inner: inner.as_ref().map(|i| Box::new(substitute(i, binding))),
        },
        Op::List { inner } => Op::List {
            inner: Box::new(substitute(inner, binding)),
        },
        Op::Service {
            name,
            inner,
            silent,
        } => Op::Service {
            name: named_node_pattern(name, binding),
            inner: Box::new(substitute(inner, binding)),
            silent: *silent,
        },
        Op::PropertyFunction {
            name,
            subject,
            object,
            inner,
        } => Op::PropertyFunction {
            name: name.clone(),
            subject: map_arg(subject, |p| term_pattern(p, binding)),
            object: map_arg(object, |p| term_pattern(p, binding)),
            inner: Box::new(substitute(inner, binding)),
        },
        Op::Procedure { name, args, inner } => Op::Procedure {
            name: name.clone(),
            args: args
                .iter()
                .map(|e| substitute_expression(e, binding))
                .collect(),
            inner: Box::new(substitute(inner, binding)),
        },
        Op::Null | Op::Extension { .. } => op.clone(),
    }
}

/// Replaces the variables of `expression` bound in `binding` by their values
pub fn substitute_expression(expression: &Expression, binding: &Binding) -> Expression {
    let sub = |e: &Expression| Box::new(substitute_expression(e, binding));
    match expression {
        Expression::Variable(v) => match binding.get(v) {
            Some(value) => value.clone().into(),
            None => expression.clone(),
        },
        Expression::Bound(v) if binding.contains(v) => Expression::Literal(true.into()),
        Expression::NamedNode(_)
        | Expression::Literal(_)
        | Expression::BlankNode(_)
        | Expression::Bound(_) => expression.clone(),
        Expression::Or(a, b) => Expression::Or(sub(a), sub(b)),
        Expression::And(a, b) => Expression::And(sub(a), sub(b)),
        Expression::Equal(a, b) => Expression::Equal(sub(a), sub(b)),
        Expression::SameTerm(a, b) => Expression::SameTerm(sub(a), sub(b)),
        Expression::Greater(a, b) => Expression::Greater(sub(a), sub(b)),
        Expression::GreaterOrEqual(a, b) => Expression::GreaterOrEqual(sub(a), sub(b)),
        Expression::Less(a, b) => Expression::Less(sub(a), sub(b)),
        Expression::LessOrEqual(a, b) => Expression::LessOrEqual(sub(a), sub(b)),
        Expression::Add(a, b) => Expression::Add(sub(a), sub(b)),
        Expression::Subtract(a, b) => Expression::Subtract(sub(a), sub(b)),
        Expression::Multiply(a, b) => Expression::Multiply(sub(a), sub(b)),
        Expression::Divide(a, b) => Expression::Divide(sub(a), sub(b)),
        Expression::UnaryPlus(e) => Expression::UnaryPlus(sub(e)),
        Expression::UnaryMinus(e) => Expression::UnaryMinus(sub(e)),
        Expression::Not(e) => Expression::Not(sub(e)),
        Expression::Exists(op) => Expression::Exists(Box::new(substitute(op, binding))),
        Expression::If(a, b, c) => Expression::If(sub(a), sub(b), sub(c)),
        Expression::Coalesce(l) => Expression::Coalesce(
            l.iter()
                .map(|e| substitute_expression(e, binding))
                .collect(),
        ),
        Expression::FunctionCall(f, args) => Expression::FunctionCall(
            f.clone(),
            args.iter()
                .map(|e| substitute_expression(e, binding))
                .collect(),
        ),
    }
}

/// Replaces all the bound variables of a property function argument, blank nodes included
pub(crate) fn substitute_arg(arg: &PropFuncArg, binding: &Binding) -> PropFuncArg {
    map_arg(arg, |pattern| match pattern {
        TermPattern::Variable(v) => binding
            .get(v)
            .map_or_else(|| pattern.clone(), |value| to_term_pattern(value.clone())),
        _ => pattern.clone(),
    })
}

pub(crate) fn to_term_pattern(term: Term) -> TermPattern {
    match term {
        Term::NamedNode(t) => t.into(),
        Term::BlankNode(t) => t.into(),
        Term::Literal(t) => t.into(),
    }
}

fn map_arg(arg: &PropFuncArg, mut f: impl FnMut(&TermPattern) -> TermPattern) -> PropFuncArg {
    match arg {
        PropFuncArg::Node(node) => PropFuncArg::Node(f(node)),
        PropFuncArg::List(list) => PropFuncArg::List(list.iter().map(f).collect()),
    }
}

fn triple_patterns(patterns: &[TriplePattern], binding: &Binding) -> Vec<TriplePattern> {
    patterns
        .iter()
        .map(|t| TriplePattern {
            subject: term_pattern(&t.subject, binding),
            predicate: named_node_pattern(&t.predicate, binding),
            object: term_pattern(&t.object, binding),
        })
        .collect()
}

fn term_pattern(pattern: &TermPattern, binding: &Binding) -> TermPattern {
    if let TermPattern::Variable(v) = pattern {
        match binding.get(v) {
            Some(Term::NamedNode(t)) => return t.clone().into(),
            Some(Term::Literal(t)) => return t.clone().into(),
            Some(Term::BlankNode(_)) | None => (),
        }
    }
    pattern.clone()
}

fn named_node_pattern(pattern: &NamedNodePattern, binding: &Binding) -> NamedNodePattern {
    if let NamedNodePattern::Variable(v) = pattern {
        if let Some(Term::NamedNode(t)) = binding.get(v) {
            return t.clone().into();
        }
    }
    pattern.clone()
}

fn substitute_bindings(
    bindings: &[(Variable, Expression)],
    binding: &Binding,
) -> Vec<(Variable, Expression)> {
    bindings
        .iter()
        .map(|(v, e)| (v.clone(), substitute_expression(e, binding)))
        .collect()
}

fn substitute_conditions(conditions: &[OrderExpression], binding: &Binding) -> Vec<OrderExpression> {
    conditions
        .iter()
        .map(|c| match c {
            OrderExpression::Asc(e) => OrderExpression::Asc(substitute_expression(e, binding)),
            OrderExpression::Desc(e) => OrderExpression::Desc(substitute_expression(e, binding)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{BlankNode, Literal, NamedNode};
    use spargebra::Query;

    fn op(query: &str) -> Op {
        let Query::Select { pattern, .. } = Query::parse(query, None).unwrap() else {
            unreachable!()
        };
        Op::from(&pattern)
    }

    #[test]
    fn iris_and_literals_are_written_into_patterns() {
        let s = Variable::new_unchecked("s");
        let o = Variable::new_unchecked("o");
        let binding: Binding = [
            (s.clone(), NamedNode::new_unchecked("http://example.com/s").into()),
            (o.clone(), BlankNode::default().into()),
        ]
        .into_iter()
        .collect();
        let Op::Project { inner, .. } = substitute(&op("SELECT * WHERE { ?s ?p ?o }"), &binding)
        else {
            panic!("expected a projection")
        };
        let Op::Bgp { patterns } = *inner else {
            panic!("expected a basic graph pattern")
        };
        assert_eq!(
            patterns[0].subject,
            TermPattern::NamedNode(NamedNode::new_unchecked("http://example.com/s"))
        );
        assert_eq!(patterns[0].object, TermPattern::Variable(o));
    }

    #[test]
    fn projection_limits_the_scope() {
        let x = Variable::new_unchecked("x");
        let binding = Binding::singleton(x, Literal::from(1).into());
        let query = op("SELECT ?y WHERE { SELECT ?y WHERE { ?x ?p ?y } }");
        assert_eq!(substitute(&query, &binding), query);
    }

    #[test]
    fn minus_is_joined_with_the_binding() {
        let s = Variable::new_unchecked("s");
        let binding = Binding::singleton(s, NamedNode::new_unchecked("http://example.com/s").into());
        let Op::Project { inner, .. } = op("SELECT * WHERE { ?s ?p ?o MINUS { ?s ?q ?x } }") else {
            unreachable!()
        };
        let Op::Join { left, right } = substitute(&inner, &binding) else {
            panic!("expected a join")
        };
        assert_eq!(*left, *inner);
        assert_eq!(
            *right,
            Op::Table {
                variables: binding.variables().cloned().collect(),
                rows: vec![binding],
            }
        );
    }

    #[test]
    fn expressions_get_all_values() {
        let x = Variable::new_unchecked("x");
        let bnode = BlankNode::default();
        let binding = Binding::singleton(x.clone(), bnode.clone().into());
        assert_eq!(
            substitute_expression(&Expression::Variable(x.clone()), &binding),
            Expression::BlankNode(bnode)
        );
        assert_eq!(
            substitute_expression(&Expression::Bound(x), &binding),
            Expression::Literal(true.into())
        );
    }

    #[test]
    fn tables_keep_compatible_rows() {
        let x = Variable::new_unchecked("x");
        let table = Op::Table {
            variables: vec![x.clone()],
            rows: vec![
                Binding::singleton(x.clone(), Literal::from(1).into()),
                Binding::singleton(x.clone(), Literal::from(2).into()),
                Binding::new(),
            ],
        };
        let Op::Table { rows, .. } =
            substitute(&table, &Binding::singleton(x, Literal::from(1).into()))
        else {
            panic!("expected a table")
        };
        assert_eq!(rows.len(), 2);
    }
}
