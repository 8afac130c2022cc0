#![doc = include_str!("../README.md")]
#![doc(test(attr(deny(warnings))))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![doc(html_favicon_url = "https://raw.githubusercontent.com/oxigraph/oxigraph/main/logo.svg")]
#![doc(html_logo_url = "https://raw.githubusercontent.com/oxigraph/oxigraph/main/logo.svg")]

mod aggregate;
pub mod algebra;
mod bgp;
mod binding;
mod context;
mod dataset;
mod dispatch;
mod engine;
mod error;
mod eval;
mod evaluator;
mod expression;
mod model;
mod options;
mod path;
mod procedure;
mod property_function;
mod quad;
mod service;
mod simple;
mod substitute;
mod table;

pub use crate::bgp::{SimpleStageGenerator, StageGenerator};
pub use crate::binding::Binding;
pub use crate::context::{ActiveGraph, ExecutionContext};
pub use crate::dataset::{InternalQuad, QueryableDataset};
pub use crate::engine::{
    Plan, QueryEngineFactory, QueryEngineRef, QueryEngineRefQuad, QueryEngineRegistry,
};
pub use crate::error::QueryEvaluationError;
pub use crate::eval::{eval, eval_dataset_names, eval_graph, eval_quad_pattern};
pub use crate::evaluator::Evaluator;
pub use crate::expression::{compare_terms, evaluate_condition, evaluate_expression};
pub use crate::model::{QueryResults, QuerySolution, QuerySolutionIter, QueryTripleIter};
pub use crate::options::{AggregateFunctionAccumulator, AssignPolicy, EvaluationOptions};
pub use crate::procedure::{Procedure, ProcedureRegistry};
pub use crate::property_function::{
    LIST_INDEX, LIST_LENGTH, LIST_MEMBER, PropertyFunction, PropertyFunctionRegistry, STR_SPLIT,
};
pub use crate::quad::to_quad_form;
pub use crate::service::ServiceHandler;
pub use crate::simple::SimpleEvaluator;
pub use crate::substitute::{substitute, substitute_expression};
pub use crate::table::Table;
