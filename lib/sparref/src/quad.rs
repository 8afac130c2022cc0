//! Quad form of the algebra: basic graph patterns carry the graph they are matched against.

use crate::algebra::Op;
use spargebra::term::{GraphNamePattern, NamedNodePattern};

/// Rewrites `op` into quad form.
///
/// Basic graph patterns outside of any `GRAPH` become [`Op::QuadPattern`]s on the default graph.
/// A `GRAPH` whose body is a non-empty basic graph pattern becomes a single [`Op::QuadPattern`].
/// The other `GRAPH` nodes are kept: their bodies are evaluated with the graph active.
/// `SERVICE` bodies are not rewritten.
///
/// ```
/// use sparref::algebra::Op;
/// use sparref::to_quad_form;
/// use spargebra::Query;
/// use spargebra::term::GraphNamePattern;
///
/// let Query::Select { pattern, .. } =
///     Query::parse("SELECT * WHERE { ?s ?p ?o GRAPH ?g { ?s ?p ?o } }", None)?
/// else {
///     unreachable!()
/// };
/// let Op::Project { inner, .. } = to_quad_form(&Op::from(&pattern)) else {
///     unreachable!()
/// };
/// let Op::Join { left, right } = *inner else {
///     unreachable!()
/// };
/// assert!(matches!(*left, Op::QuadPattern { graph_name: GraphNamePattern::DefaultGraph, .. }));
/// assert!(matches!(*right, Op::QuadPattern { graph_name: GraphNamePattern::Variable(_), .. }));
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub fn to_quad_form(op: &Op) -> Op {
    match op {
        Op::Bgp { patterns } => Op::QuadPattern {
            graph_name: GraphNamePattern::DefaultGraph,
            patterns: patterns.clone(),
        },
        Op::Graph { name, inner } => match inner.as_ref() {
            Op::Bgp { patterns } if !patterns.is_empty() => Op::QuadPattern {
                graph_name: match name {
                    NamedNodePattern::NamedNode(n) => GraphNamePattern::NamedNode(n.clone()),
                    NamedNodePattern::Variable(v) => GraphNamePattern::Variable(v.clone()),
                },
                patterns: patterns.clone(),
            },
            _ => op.clone(),
        },
        Op::Service { .. } => op.clone(),
        _ => op.map_children(to_quad_form),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spargebra::Query;

    fn quad_form(query: &str) -> String {
        let Query::Select { pattern, .. } = Query::parse(query, None).unwrap() else {
            unreachable!()
        };
        to_quad_form(&Op::from(&pattern)).to_string()
    }

    #[test]
    fn complex_graph_bodies_are_kept() {
        let op = quad_form(
            "SELECT * WHERE { GRAPH <http://example.com/g> { ?s ?p ?o OPTIONAL { ?o ?p ?s } } }",
        );
        assert!(op.contains("(graph <http://example.com/g> (leftjoin (bgp"));
        assert!(!op.contains("quadpattern"));
    }

    #[test]
    fn empty_graph_body_is_kept() {
        assert!(quad_form("SELECT * WHERE { GRAPH ?g {} }").contains("(graph ?g (bgp))"));
    }
}
