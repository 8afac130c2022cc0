//! The SPARQL algebra evaluated by this crate.
//!
//! [`Op`] trees are usually built from a [`spargebra`] syntax tree using the [`From`] conversions,
//! but can also be assembled by hand to exercise operators that have no SPARQL syntax
//! (`diff`, `conditional`, `sequence`, `assign`...).

use crate::binding::Binding;
use oxrdf::{BlankNode, Literal, NamedNode, Term, Variable};
use spargebra::algebra::{
    AggregateExpression as SyntaxAggregateExpression, AggregateFunction,
    Expression as SyntaxExpression, Function, GraphPattern,
    OrderExpression as SyntaxOrderExpression, PropertyPathExpression,
};
use spargebra::term::{GraphNamePattern, GroundTerm, NamedNodePattern, TermPattern, TriplePattern};
use std::fmt;

/// A node of the SPARQL algebra.
///
/// The tree is built once and only read during evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// A basic graph pattern, matched against the active graph.
    Bgp { patterns: Vec<TriplePattern> },
    /// A single property path triple.
    Path {
        subject: TermPattern,
        path: PropertyPathExpression,
        object: TermPattern,
    },
    /// A basic graph pattern bound to an explicit graph.
    QuadPattern {
        graph_name: GraphNamePattern,
        patterns: Vec<TriplePattern>,
    },
    /// [GRAPH](https://www.w3.org/TR/sparql11-query/#rGraphGraphPattern).
    Graph { name: NamedNodePattern, inner: Box<Self> },
    /// The named graphs of the dataset, bound to a variable or tested for existence.
    DatasetNames { graph_name: NamedNodePattern },
    /// [Join](https://www.w3.org/TR/sparql11-query/#defn_algJoin).
    Join { left: Box<Self>, right: Box<Self> },
    /// [LeftJoin](https://www.w3.org/TR/sparql11-query/#defn_algLeftJoin), the conditions are a conjunction.
    LeftJoin {
        left: Box<Self>,
        right: Box<Self>,
        expressions: Vec<Expression>,
    },
    /// [Union](https://www.w3.org/TR/sparql11-query/#defn_algUnion).
    Union { left: Box<Self>, right: Box<Self> },
    /// The left solutions that are not contained in any right solution.
    Diff { left: Box<Self>, right: Box<Self> },
    /// [Minus](https://www.w3.org/TR/sparql11-query/#defn_algMinus).
    Minus { left: Box<Self>, right: Box<Self> },
    /// The left solutions if there are some, the right ones otherwise.
    Conditional { left: Box<Self>, right: Box<Self> },
    /// [Filter](https://www.w3.org/TR/sparql11-query/#defn_algFilter), the conditions are a conjunction.
    Filter {
        expressions: Vec<Expression>,
        inner: Box<Self>,
    },
    /// N-ary join, evaluated in order.
    Sequence(Vec<Self>),
    /// N-ary union, evaluated in order.
    Disjunction(Vec<Self>),
    /// [Extend](https://www.w3.org/TR/sparql11-query/#defn_extend), applied in order.
    Extend {
        inner: Box<Self>,
        bindings: Vec<(Variable, Expression)>,
    },
    /// Like [`Op::Extend`] but the target variable may already be bound.
    Assign {
        inner: Box<Self>,
        bindings: Vec<(Variable, Expression)>,
    },
    /// [OrderBy](https://www.w3.org/TR/sparql11-query/#defn_algOrdered).
    OrderBy {
        inner: Box<Self>,
        conditions: Vec<OrderExpression>,
    },
    /// The first `limit` solutions according to `conditions`.
    TopN {
        inner: Box<Self>,
        limit: usize,
        conditions: Vec<OrderExpression>,
    },
    /// [Project](https://www.w3.org/TR/sparql11-query/#defn_algProjection).
    Project {
        inner: Box<Self>,
        variables: Vec<Variable>,
    },
    /// [Distinct](https://www.w3.org/TR/sparql11-query/#defn_algDistinct).
    Distinct { inner: Box<Self> },
    /// [Reduced](https://www.w3.org/TR/sparql11-query/#defn_algReduced).
    Reduced { inner: Box<Self> },
    /// [Slice](https://www.w3.org/TR/sparql11-query/#defn_algSlice).
    Slice {
        inner: Box<Self>,
        start: usize,
        length: Option<usize>,
    },
    /// [Group](https://www.w3.org/TR/sparql11-query/#aggregateAlgebra) with its aggregates.
    Group {
        inner: Box<Self>,
        variables: Vec<Variable>,
        aggregates: Vec<(Variable, AggregateExpression)>,
    },
    /// Inline solutions, like [VALUES](https://www.w3.org/TR/sparql11-query/#inline-data).
    Table {
        variables: Vec<Variable>,
        rows: Vec<Binding>,
    },
    /// Always evaluates to no solution.
    Null,
    /// A label, transparent for evaluation.
    Label {
        label: String,
        inner: Option<Box<Self>>,
    },
    /// Marks a sequence whose order matters, evaluates to its input.
    List { inner: Box<Self> },
    /// [SERVICE](https://www.w3.org/TR/sparql11-federated-query/#defn_evalService).
    Service {
        name: NamedNodePattern,
        inner: Box<Self>,
        silent: bool,
    },
    /// A call to a registered property function, for each solution of `inner`.
    PropertyFunction {
        name: NamedNode,
        subject: PropFuncArg,
        object: PropFuncArg,
        inner: Box<Self>,
    },
    /// A call to a registered procedure, for each solution of `inner`.
    Procedure {
        name: NamedNode,
        args: Vec<Expression>,
        inner: Box<Self>,
    },
    /// An extension node the reference evaluator does not know how to evaluate.
    Extension { name: String },
}

impl Op {
    /// The table with one empty solution
    pub fn unit() -> Self {
        Self::Table {
            variables: Vec::new(),
            rows: vec![Binding::new()],
        }
    }

    pub fn join(left: Self, right: Self) -> Self {
        Self::Join {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn union(left: Self, right: Self) -> Self {
        Self::Union {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn minus(left: Self, right: Self) -> Self {
        Self::Minus {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn diff(left: Self, right: Self) -> Self {
        Self::Diff {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn left_join(left: Self, right: Self, expressions: Vec<Expression>) -> Self {
        Self::LeftJoin {
            left: Box::new(left),
            right: Box::new(right),
            expressions,
        }
    }

    pub fn filter(expressions: Vec<Expression>, inner: Self) -> Self {
        Self::Filter {
            expressions,
            inner: Box::new(inner),
        }
    }

    pub fn project(inner: Self, variables: Vec<Variable>) -> Self {
        Self::Project {
            inner: Box::new(inner),
            variables,
        }
    }

    pub fn slice(inner: Self, start: usize, length: Option<usize>) -> Self {
        Self::Slice {
            inner: Box::new(inner),
            start,
            length,
        }
    }

    /// Rebuilds the node with each direct child replaced by `f(child)`
    #[must_use]
    pub(crate) fn map_children(&self, mut f: impl FnMut(&Self) -> Self) -> Self {
        let mut b = |op: &Self| Box::new(f(op));
        match self {
            Self::Bgp { .. }
            | Self::Path { .. }
            | Self::QuadPattern { .. }
            | Self::DatasetNames { .. }
            | Self::Table { .. }
            | Self::Null
            | Self::Extension { .. } => self.clone(),
            Self::Graph { name, inner } => Self::Graph {
                name: name.clone(),
                inner: b(inner),
            },
            Self::Join { left, right } => Self::Join {
                left: b(left),
                right: b(right),
            },
            Self::LeftJoin {
                left,
                right,
                expressions,
            } => Self::LeftJoin {
                left: b(left),
                right: b(right),
                expressions: expressions.clone(),
            },
            Self::Union { left, right } => Self::Union {
                left: b(left),
                right: b(right),
            },
            Self::Diff { left, right } => Self::Diff {
                left: b(left),
                right: b(right),
            },
            Self::Minus { left, right } => Self::Minus {
                left: b(left),
                right: b(right),
            },
            Self::Conditional { left, right } => Self::Conditional {
                left: b(left),
                right: b(right),
            },
            Self::Filter { expressions, inner } => Self::Filter {
                expressions: expressions.clone(),
                inner: b(inner),
            },
            Self::Sequence(elements) => Self::Sequence(elements.iter().map(|e| *b(e)).collect()),
            Self::Disjunction(elements) => {
                Self::Disjunction(elements.iter().map(|e| *b(e)).collect())
            }
            Self::Extend { inner, bindings } => Self::Extend {
                inner: b(inner),
                bindings: bindings.clone(),
            },
            Self::Assign { inner, bindings } => Self::Assign {
                inner: b(inner),
                bindings: bindings.clone(),
            },
            Self::OrderBy { inner, conditions } => Self::OrderBy {
                inner: b(inner),
                conditions: conditions.clone(),
            },
            Self::TopN {
                inner,
                limit,
                conditions,
            } => Self::TopN {
                inner: b(inner),
                limit: *limit,
                conditions: conditions.clone(),
            },
            Self::Project { inner, variables } => Self::Project {
                inner: b(inner),
                variables: variables.clone(),
            },
            Self::Distinct { inner } => Self::Distinct { inner: b(inner) },
            Self::Reduced { inner } => Self::Reduced { inner: b(inner) },
            Self::Slice {
                inner,
                start,
                length,
            } => Self::Slice {
                inner: b(inner),
                start: *start,
                length: *length,
            },
            Self::Group {
                inner,
                variables,
                aggregates,
            } => Self::Group {
                inner: b(inner),
                variables: variables.clone(),
                aggregates: aggregates.clone(),
            },
            Self::Label { label, inner } => Self::Label {
                label: label.clone(),
                inner: inner.as_deref().map(&mut b),
            },
            Self::List { inner } => Self::List { inner: b(inner) },
            Self::Service {
                name,
                inner,
                silent,
            } => Self::Service {
                name: name.clone(),
                inner: b(inner),
                silent: *silent,
            },
            Self::PropertyFunction {
                name,
                subject,
                object,
                inner,
            } => Self::PropertyFunction {
                name: name.clone(),
                subject: subject.clone(),
                object: object.clone(),
                inner: b(inner),
            },
            Self::Procedure { name, args, inner } => Self::Procedure {
                name: name.clone(),
                args: args.clone(),
                inner: b(inner),
            },
        }
    }

    /// Short name of the operator, as written in the S-expression form.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bgp { .. } => "bgp",
            Self::Path { .. } => "path",
            Self::QuadPattern { .. } => "quadpattern",
            Self::Graph { .. } => "graph",
            Self::DatasetNames { .. } => "datasetnames",
            Self::Join { .. } => "join",
            Self::LeftJoin { .. } => "leftjoin",
            Self::Union { .. } => "union",
            Self::Diff { .. } => "diff",
            Self::Minus { .. } => "minus",
            Self::Conditional { .. } => "conditional",
            Self::Filter { .. } => "filter",
            Self::Sequence(_) => "sequence",
            Self::Disjunction(_) => "disjunction",
            Self::Extend { .. } => "extend",
            Self::Assign { .. } => "assign",
            Self::OrderBy { .. } => "order",
            Self::TopN { .. } => "top",
            Self::Project { .. } => "project",
            Self::Distinct { .. } => "distinct",
            Self::Reduced { .. } => "reduced",
            Self::Slice { .. } => "slice",
            Self::Group { .. } => "group",
            Self::Table { .. } => "table",
            Self::Null => "null",
            Self::Label { .. } => "label",
            Self::List { .. } => "toList",
            Self::Service { .. } => "service",
            Self::PropertyFunction { .. } => "propfunc",
            Self::Procedure { .. } => "proc",
            Self::Extension { .. } => "ext",
        }
    }
}

impl From<&GraphPattern> for Op {
    fn from(pattern: &GraphPattern) -> Self {
        match pattern {
            GraphPattern::Bgp { patterns } => Self::Bgp {
                patterns: patterns.clone(),
            },
            GraphPattern::Path {
                subject,
                path,
                object,
            } => Self::Path {
                subject: subject.clone(),
                path: path.clone(),
                object: object.clone(),
            },
            GraphPattern::Join { left, right } => {
                Self::join(left.as_ref().into(), right.as_ref().into())
            }
            GraphPattern::LeftJoin {
                left,
                right,
                expression,
            } => Self::left_join(
                left.as_ref().into(),
                right.as_ref().into(),
                expression.as_ref().map(conjuncts).unwrap_or_default(),
            ),
            GraphPattern::Filter { expr, inner } => {
                Self::filter(conjuncts(expr), inner.as_ref().into())
            }
            GraphPattern::Union { left, right } => {
                Self::union(left.as_ref().into(), right.as_ref().into())
            }
            GraphPattern::Graph { name, inner } => Self::Graph {
                name: name.clone(),
                inner: Box::new(inner.as_ref().into()),
            },
            GraphPattern::Extend {
                inner,
                variable,
                expression,
            } => {
                // Consecutive BINDs are grouped into a single node
                let binding = (variable.clone(), Expression::from(expression));
                match Self::from(inner.as_ref()) {
                    Self::Extend {
                        inner,
                        mut bindings,
                    } => {
                        bindings.push(binding);
                        Self::Extend { inner, bindings }
                    }
                    inner => Self::Extend {
                        inner: Box::new(inner),
                        bindings: vec![binding],
                    },
                }
            }
            GraphPattern::Minus { left, right } => {
                Self::minus(left.as_ref().into(), right.as_ref().into())
            }
            GraphPattern::Values {
                variables,
                bindings,
            } => Self::Table {
                variables: variables.clone(),
                rows: bindings
                    .iter()
                    .map(|row| {
                        variables
                            .iter()
                            .zip(row)
                            .filter_map(|(variable, value)| {
                                Some((variable.clone(), ground_term(value.as_ref()?)))
                            })
                            .collect()
                    })
                    .collect(),
            },
            GraphPattern::OrderBy { inner, expression } => Self::OrderBy {
                inner: Box::new(inner.as_ref().into()),
                conditions: expression.iter().map(Into::into).collect(),
            },
            GraphPattern::Project { inner, variables } => {
                Self::project(inner.as_ref().into(), variables.clone())
            }
            GraphPattern::Distinct { inner } => Self::Distinct {
                inner: Box::new(inner.as_ref().into()),
            },
            GraphPattern::Reduced { inner } => Self::Reduced {
                inner: Box::new(inner.as_ref().into()),
            },
            GraphPattern::Slice {
                inner,
                start,
                length,
            } => Self::slice(inner.as_ref().into(), *start, *length),
            GraphPattern::Group {
                inner,
                variables,
                aggregates,
            } => Self::Group {
                inner: Box::new(inner.as_ref().into()),
                variables: variables.clone(),
                aggregates: aggregates
                    .iter()
                    .map(|(v, a)| (v.clone(), a.into()))
                    .collect(),
            },
            GraphPattern::Service {
                name,
                inner,
                silent,
            } => Self::Service {
                name: name.clone(),
                inner: Box::new(inner.as_ref().into()),
                silent: *silent,
            },
        }
    }
}

fn ground_term(term: &GroundTerm) -> Term {
    match term {
        GroundTerm::NamedNode(t) => t.clone().into(),
        GroundTerm::Literal(t) => t.clone().into(),
    }
}

/// Splits a `&&` tree into its operands
fn conjuncts(expression: &SyntaxExpression) -> Vec<Expression> {
    let mut output = Vec::new();
    add_conjuncts(expression, &mut output);
    output
}

fn add_conjuncts(expression: &SyntaxExpression, output: &mut Vec<Expression>) {
    if let SyntaxExpression::And(a, b) = expression {
        add_conjuncts(a, output);
        add_conjuncts(b, output);
    } else {
        output.push(expression.into());
    }
}

/// An [expression](https://www.w3.org/TR/sparql11-query/#expressions).
///
/// `IN` and `NOT IN` are represented by their expansion into `=` and `||`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    NamedNode(NamedNode),
    Literal(Literal),
    /// A blank node constant, only introduced by variable substitution
    BlankNode(BlankNode),
    Variable(Variable),
    /// [Logical-or](https://www.w3.org/TR/sparql11-query/#func-logical-or).
    Or(Box<Self>, Box<Self>),
    /// [Logical-and](https://www.w3.org/TR/sparql11-query/#func-logical-and).
    And(Box<Self>, Box<Self>),
    /// [RDFterm-equal](https://www.w3.org/TR/sparql11-query/#func-RDFterm-equal) and all the XSD equalities.
    Equal(Box<Self>, Box<Self>),
    /// [sameTerm](https://www.w3.org/TR/sparql11-query/#func-sameTerm).
    SameTerm(Box<Self>, Box<Self>),
    Greater(Box<Self>, Box<Self>),
    GreaterOrEqual(Box<Self>, Box<Self>),
    Less(Box<Self>, Box<Self>),
    LessOrEqual(Box<Self>, Box<Self>),
    Add(Box<Self>, Box<Self>),
    Subtract(Box<Self>, Box<Self>),
    Multiply(Box<Self>, Box<Self>),
    Divide(Box<Self>, Box<Self>),
    UnaryPlus(Box<Self>),
    UnaryMinus(Box<Self>),
    Not(Box<Self>),
    /// [EXISTS](https://www.w3.org/TR/sparql11-query/#func-filter-exists).
    Exists(Box<Op>),
    /// [BOUND](https://www.w3.org/TR/sparql11-query/#func-bound).
    Bound(Variable),
    /// [IF](https://www.w3.org/TR/sparql11-query/#func-if).
    If(Box<Self>, Box<Self>, Box<Self>),
    /// [COALESCE](https://www.w3.org/TR/sparql11-query/#func-coalesce).
    Coalesce(Vec<Self>),
    /// A regular function call.
    FunctionCall(Function, Vec<Self>),
}

impl From<Term> for Expression {
    fn from(term: Term) -> Self {
        match term {
            Term::NamedNode(t) => Self::NamedNode(t),
            Term::BlankNode(t) => Self::BlankNode(t),
            Term::Literal(t) => Self::Literal(t),
        }
    }
}

impl From<Variable> for Expression {
    fn from(variable: Variable) -> Self {
        Self::Variable(variable)
    }
}

impl From<Literal> for Expression {
    fn from(literal: Literal) -> Self {
        Self::Literal(literal)
    }
}

impl From<NamedNode> for Expression {
    fn from(node: NamedNode) -> Self {
        Self::NamedNode(node)
    }
}

impl From<&SyntaxExpression> for Expression {
    fn from(expression: &SyntaxExpression) -> Self {
        fn bin(
            a: &SyntaxExpression,
            b: &SyntaxExpression,
            build: fn(Box<Expression>, Box<Expression>) -> Expression,
        ) -> Expression {
            build(Box::new(a.into()), Box::new(b.into()))
        }

        match expression {
            SyntaxExpression::NamedNode(t) => Self::NamedNode(t.clone()),
            SyntaxExpression::Literal(t) => Self::Literal(t.clone()),
            SyntaxExpression::Variable(v) => Self::Variable(v.clone()),
            SyntaxExpression::Or(a, b) => bin(a, b, Self::Or),
            SyntaxExpression::And(a, b) => bin(a, b, Self::And),
            SyntaxExpression::Equal(a, b) => bin(a, b, Self::Equal),
            SyntaxExpression::SameTerm(a, b) => bin(a, b, Self::SameTerm),
            SyntaxExpression::Greater(a, b) => bin(a, b, Self::Greater),
            SyntaxExpression::GreaterOrEqual(a, b) => bin(a, b, Self::GreaterOrEqual),
            SyntaxExpression::Less(a, b) => bin(a, b, Self::Less),
            SyntaxExpression::LessOrEqual(a, b) => bin(a, b, Self::LessOrEqual),
            SyntaxExpression::In(a, list) => {
                let needle = Self::from(a.as_ref());
                list.iter()
                    .map(|e| Self::Equal(Box::new(needle.clone()), Box::new(e.into())))
                    .reduce(|a, b| Self::Or(Box::new(a), Box::new(b)))
                    .unwrap_or_else(|| Self::Literal(false.into()))
            }
            SyntaxExpression::Add(a, b) => bin(a, b, Self::Add),
            SyntaxExpression::Subtract(a, b) => bin(a, b, Self::Subtract),
            SyntaxExpression::Multiply(a, b) => bin(a, b, Self::Multiply),
            SyntaxExpression::Divide(a, b) => bin(a, b, Self::Divide),
            SyntaxExpression::UnaryPlus(e) => Self::UnaryPlus(Box::new(e.as_ref().into())),
            SyntaxExpression::UnaryMinus(e) => Self::UnaryMinus(Box::new(e.as_ref().into())),
            SyntaxExpression::Not(e) => Self::Not(Box::new(e.as_ref().into())),
            SyntaxExpression::Exists(p) => Self::Exists(Box::new(p.as_ref().into())),
            SyntaxExpression::Bound(v) => Self::Bound(v.clone()),
            SyntaxExpression::If(a, b, c) => Self::If(
                Box::new(a.as_ref().into()),
                Box::new(b.as_ref().into()),
                Box::new(c.as_ref().into()),
            ),
            SyntaxExpression::Coalesce(l) => Self::Coalesce(l.iter().map(Into::into).collect()),
            SyntaxExpression::FunctionCall(f, args) => {
                Self::FunctionCall(f.clone(), args.iter().map(Into::into).collect())
            }
        }
    }
}

/// A set function computed over each group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateExpression {
    /// `COUNT(*)`
    CountSolutions { distinct: bool },
    FunctionCall {
        name: AggregateFunction,
        expr: Expression,
        distinct: bool,
    },
}

impl From<&SyntaxAggregateExpression> for AggregateExpression {
    fn from(expression: &SyntaxAggregateExpression) -> Self {
        match expression {
            SyntaxAggregateExpression::CountSolutions { distinct } => Self::CountSolutions {
                distinct: *distinct,
            },
            SyntaxAggregateExpression::FunctionCall {
                name,
                expr,
                distinct,
            } => Self::FunctionCall {
                name: name.clone(),
                expr: expr.into(),
                distinct: *distinct,
            },
        }
    }
}

/// An ordering comparator used by [`Op::OrderBy`] and [`Op::TopN`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderExpression {
    Asc(Expression),
    Desc(Expression),
}

impl From<&SyntaxOrderExpression> for OrderExpression {
    fn from(expression: &SyntaxOrderExpression) -> Self {
        match expression {
            SyntaxOrderExpression::Asc(e) => Self::Asc(e.into()),
            SyntaxOrderExpression::Desc(e) => Self::Desc(e.into()),
        }
    }
}

/// An argument of a property function: a single node or an RDF collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropFuncArg {
    Node(TermPattern),
    List(Vec<TermPattern>),
}

impl PropFuncArg {
    /// The single node, if the argument is not a list
    pub fn as_node(&self) -> Option<&TermPattern> {
        match self {
            Self::Node(node) => Some(node),
            Self::List(_) => None,
        }
    }

    /// All the nodes of the argument
    pub fn nodes(&self) -> &[TermPattern] {
        match self {
            Self::Node(node) => std::slice::from_ref(node),
            Self::List(list) => list,
        }
    }
}

impl fmt::Display for PropFuncArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(node) => write!(f, "{node}"),
            Self::List(list) => {
                f.write_str("(")?;
                for (i, node) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{node}")?;
                }
                f.write_str(")")
            }
        }
    }
}

fn fmt_triple(triple: &TriplePattern, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
        f,
        "(triple {} {} {})",
        triple.subject, triple.predicate, triple.object
    )
}

fn fmt_list<T: fmt::Display>(items: &[T], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(")")
}

fn fmt_bindings(
    bindings: &[(Variable, Expression)],
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    f.write_str("(")?;
    for (i, (v, e)) in bindings.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "({v} {e})")?;
    }
    f.write_str(")")
}

/// S-expression serialization, in the style of the [SPARQL S-Expressions](https://jena.apache.org/documentation/notes/sse.html)
impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bgp { patterns } => {
                f.write_str("(bgp")?;
                for p in patterns {
                    f.write_str(" ")?;
                    fmt_triple(p, f)?;
                }
                f.write_str(")")
            }
            Self::Path {
                subject,
                path,
                object,
            } => write!(f, "(path {subject} {path} {object})"),
            Self::QuadPattern {
                graph_name,
                patterns,
            } => {
                write!(f, "(quadpattern {graph_name}")?;
                for p in patterns {
                    f.write_str(" ")?;
                    fmt_triple(p, f)?;
                }
                f.write_str(")")
            }
            Self::Graph { name, inner } => write!(f, "(graph {name} {inner})"),
            Self::DatasetNames { graph_name } => write!(f, "(datasetnames {graph_name})"),
            Self::Join { left, right }
            | Self::Union { left, right }
            | Self::Diff { left, right }
            | Self::Minus { left, right }
            | Self::Conditional { left, right } => {
                write!(f, "({} {left} {right})", self.name())
            }
            Self::LeftJoin {
                left,
                right,
                expressions,
            } => {
                write!(f, "(leftjoin {left} {right}")?;
                if !expressions.is_empty() {
                    f.write_str(" ")?;
                    fmt_list(expressions, f)?;
                }
                f.write_str(")")
            }
            Self::Filter { expressions, inner } => {
                f.write_str("(filter ")?;
                fmt_list(expressions, f)?;
                write!(f, " {inner})")
            }
            Self::Sequence(elements) | Self::Disjunction(elements) => {
                write!(f, "({}", self.name())?;
                for e in elements {
                    write!(f, " {e}")?;
                }
                f.write_str(")")
            }
            Self::Extend { inner, bindings } | Self::Assign { inner, bindings } => {
                write!(f, "({} ", self.name())?;
                fmt_bindings(bindings, f)?;
                write!(f, " {inner})")
            }
            Self::OrderBy { inner, conditions } => {
                f.write_str("(order ")?;
                fmt_list(conditions, f)?;
                write!(f, " {inner})")
            }
            Self::TopN {
                inner,
                limit,
                conditions,
            } => {
                write!(f, "(top ({limit} ")?;
                fmt_list(conditions, f)?;
                write!(f, ") {inner})")
            }
            Self::Project { inner, variables } => {
                f.write_str("(project ")?;
                fmt_list(variables, f)?;
                write!(f, " {inner})")
            }
            Self::Distinct { inner } | Self::Reduced { inner } | Self::List { inner } => {
                write!(f, "({} {inner})", self.name())
            }
            Self::Slice {
                inner,
                start,
                length,
            } => {
                write!(f, "(slice {start} ")?;
                if let Some(length) = length {
                    write!(f, "{length}")?;
                } else {
                    f.write_str("_")?;
                }
                write!(f, " {inner})")
            }
            Self::Group {
                inner,
                variables,
                aggregates,
            } => {
                f.write_str("(group ")?;
                fmt_list(variables, f)?;
                f.write_str(" (")?;
                for (i, (v, a)) in aggregates.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "({v} {a})")?;
                }
                write!(f, ") {inner})")
            }
            Self::Table { variables, rows } => {
                if variables.is_empty() && rows.len() == 1 {
                    return f.write_str("(table unit)");
                }
                if rows.is_empty() {
                    return f.write_str("(table empty)");
                }
                f.write_str("(table (vars")?;
                for v in variables {
                    write!(f, " {v}")?;
                }
                f.write_str(")")?;
                for row in rows {
                    f.write_str(" (row")?;
                    for (v, t) in row {
                        write!(f, " [{v} {t}]")?;
                    }
                    f.write_str(")")?;
                }
                f.write_str(")")
            }
            Self::Null => f.write_str("(null)"),
            Self::Label { label, inner } => {
                write!(f, "(label \"{}\"", label.escape_default())?;
                if let Some(inner) = inner {
                    write!(f, " {inner}")?;
                }
                f.write_str(")")
            }
            Self::Service {
                name,
                inner,
                silent,
            } => {
                f.write_str("(service ")?;
                if *silent {
                    f.write_str("silent ")?;
                }
                write!(f, "{name} {inner})")
            }
            Self::PropertyFunction {
                name,
                subject,
                object,
                inner,
            } => write!(f, "(propfunc {name} {subject} {object} {inner})"),
            Self::Procedure { name, args, inner } => {
                write!(f, "(proc {name} ")?;
                fmt_list(args, f)?;
                write!(f, " {inner})")
            }
            Self::Extension { name } => write!(f, "(ext {name})"),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamedNode(t) => write!(f, "{t}"),
            Self::Literal(t) => write!(f, "{t}"),
            Self::BlankNode(t) => write!(f, "{t}"),
            Self::Variable(v) => write!(f, "{v}"),
            Self::Or(a, b) => write!(f, "(|| {a} {b})"),
            Self::And(a, b) => write!(f, "(&& {a} {b})"),
            Self::Equal(a, b) => write!(f, "(= {a} {b})"),
            Self::SameTerm(a, b) => write!(f, "(sameTerm {a} {b})"),
            Self::Greater(a, b) => write!(f, "(> {a} {b})"),
            Self::GreaterOrEqual(a, b) => write!(f, "(>= {a} {b})"),
            Self::Less(a, b) => write!(f, "(< {a} {b})"),
            Self::LessOrEqual(a, b) => write!(f, "(<= {a} {b})"),
            Self::Add(a, b) => write!(f, "(+ {a} {b})"),
            Self::Subtract(a, b) => write!(f, "(- {a} {b})"),
            Self::Multiply(a, b) => write!(f, "(* {a} {b})"),
            Self::Divide(a, b) => write!(f, "(/ {a} {b})"),
            Self::UnaryPlus(e) => write!(f, "(+ {e})"),
            Self::UnaryMinus(e) => write!(f, "(- {e})"),
            Self::Not(e) => write!(f, "(! {e})"),
            Self::Exists(p) => write!(f, "(exists {p})"),
            Self::Bound(v) => write!(f, "(bound {v})"),
            Self::If(a, b, c) => write!(f, "(if {a} {b} {c})"),
            Self::Coalesce(l) => {
                f.write_str("(coalesce")?;
                for e in l {
                    write!(f, " {e}")?;
                }
                f.write_str(")")
            }
            Self::FunctionCall(function, args) => {
                write!(f, "({function}")?;
                for e in args {
                    write!(f, " {e}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for AggregateExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountSolutions { distinct } => {
                if *distinct {
                    f.write_str("(count distinct)")
                } else {
                    f.write_str("(count)")
                }
            }
            Self::FunctionCall {
                name,
                expr,
                distinct,
            } => {
                let label = match name {
                    AggregateFunction::Count => "count".into(),
                    AggregateFunction::Sum => "sum".into(),
                    AggregateFunction::Avg => "avg".into(),
                    AggregateFunction::Min => "min".into(),
                    AggregateFunction::Max => "max".into(),
                    AggregateFunction::GroupConcat { .. } => "group_concat".into(),
                    AggregateFunction::Sample => "sample".into(),
                    AggregateFunction::Custom(name) => name.to_string(),
                };
                write!(f, "({label} ")?;
                if *distinct {
                    f.write_str("distinct ")?;
                }
                write!(f, "{expr}")?;
                if let AggregateFunction::GroupConcat {
                    separator: Some(separator),
                } = name
                {
                    write!(f, " \"{}\"", separator.escape_default())?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for OrderExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc(e) => write!(f, "(asc {e})"),
            Self::Desc(e) => write!(f, "(desc {e})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spargebra::Query;

    fn pattern(query: &str) -> Op {
        let Query::Select { pattern, .. } = Query::parse(query, None).unwrap() else {
            unreachable!()
        };
        (&pattern).into()
    }

    #[test]
    fn filter_conjunctions_are_split() {
        let op = pattern("SELECT * WHERE { ?s ?p ?o FILTER(?o > 1 && ?o < 3 && BOUND(?s)) }");
        let Op::Project { inner, .. } = op else {
            panic!("expected a projection")
        };
        let Op::Filter { expressions, .. } = *inner else {
            panic!("expected a filter")
        };
        assert_eq!(expressions.len(), 3);
    }

    #[test]
    fn in_is_expanded() {
        let op = pattern("SELECT * WHERE { FILTER(1 IN (1, 2)) FILTER(1 NOT IN ()) }");
        let text = op.to_string();
        assert!(
            text.contains("(|| (= \"1\"^^<http://www.w3.org/2001/XMLSchema#integer>"),
            "{text}"
        );
        assert!(
            text.contains("(! \"false\"^^<http://www.w3.org/2001/XMLSchema#boolean>)"),
            "{text}"
        );
    }

    #[test]
    fn values_become_table() {
        let op = pattern("SELECT * WHERE { VALUES (?a ?b) { (1 UNDEF) (UNDEF 2) } }");
        let Op::Project { inner, .. } = op else {
            panic!("expected a projection")
        };
        let Op::Table { variables, rows } = *inner else {
            panic!("expected a table")
        };
        assert_eq!(variables.len(), 2);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.len() == 1));
    }

    #[test]
    fn consecutive_binds_are_merged() {
        let op = pattern("SELECT * WHERE { BIND(1 AS ?a) BIND(2 AS ?b) }");
        let Op::Project { inner, .. } = op else {
            panic!("expected a projection")
        };
        let Op::Extend { bindings, .. } = *inner else {
            panic!("expected an extend")
        };
        assert_eq!(bindings.len(), 2);
    }

    #[test]
    fn sse_serialization() {
        let x = Variable::new_unchecked("x");
        let op = Op::slice(Op::diff(Op::unit(), Op::Null), 1, None);
        assert_eq!(op.to_string(), "(slice 1 _ (diff (table unit) (null)))");
        let op = Op::Label {
            label: "a".into(),
            inner: Some(Box::new(Op::DatasetNames {
                graph_name: x.into(),
            })),
        };
        assert_eq!(op.to_string(), "(label \"a\" (datasetnames ?x))");
    }
}
