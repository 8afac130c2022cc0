use crate::bgp::{SimpleStageGenerator, StageGenerator};
use crate::procedure::{Procedure, ProcedureRegistry};
use crate::property_function::{PropertyFunction, PropertyFunctionRegistry};
use crate::service::{ServiceHandler, ServiceHandlerRegistry};
use oxiri::{Iri, IriParseError};
use oxrdf::{NamedNode, Term};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

pub(crate) type CustomFunction = Arc<dyn (Fn(&[Term]) -> Option<Term>) + Send + Sync>;
pub(crate) type CustomAggregateFunction =
    Arc<dyn (Fn() -> Box<dyn AggregateFunctionAccumulator + Send + Sync>) + Send + Sync>;

/// What `assign` does when its target variable is already bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssignPolicy {
    /// Keeps the row if the new value is the same as the existing one, drops it otherwise.
    #[default]
    DropConflicting,
    /// Replaces the existing value.
    Overwrite,
    /// Fails the evaluation with [`QueryEvaluationError::AssignConflict`](crate::QueryEvaluationError::AssignConflict).
    Error,
}

/// Options shared by every step of an evaluation.
///
/// Built with the `with_*` methods:
///
/// ```
/// use oxrdf::{Literal, NamedNode};
/// use sparref::{AssignPolicy, EvaluationOptions};
///
/// let options = EvaluationOptions::new()
///     .with_debug()
///     .with_assign_policy(AssignPolicy::Overwrite)
///     .with_custom_function(NamedNode::new("http://example.com/one")?, |_| {
///         Some(Literal::from(1).into())
///     })
///     .with_base_iri("http://example.com/")?;
/// assert!(options.is_debug());
/// assert_eq!(options.assign_policy(), AssignPolicy::Overwrite);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone)]
pub struct EvaluationOptions {
    debug: bool,
    strict: bool,
    assign_policy: AssignPolicy,
    union_default_graph: bool,
    base_iri: Option<Iri<String>>,
    custom_functions: FxHashMap<NamedNode, CustomFunction>,
    custom_aggregate_functions: FxHashMap<NamedNode, CustomAggregateFunction>,
    property_functions: PropertyFunctionRegistry,
    procedures: ProcedureRegistry,
    service_handler: ServiceHandlerRegistry,
    stage_generator: Arc<dyn StageGenerator + Send + Sync>,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            debug: false,
            strict: false,
            assign_policy: AssignPolicy::default(),
            union_default_graph: false,
            base_iri: None,
            custom_functions: FxHashMap::default(),
            custom_aggregate_functions: FxHashMap::default(),
            property_functions: PropertyFunctionRegistry::with_standard_functions(),
            procedures: ProcedureRegistry::default(),
            service_handler: ServiceHandlerRegistry::default(),
            stage_generator: Arc::new(SimpleStageGenerator),
        }
    }
}

impl EvaluationOptions {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for test suites: debug logging and strict result checking.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            debug: true,
            strict: true,
            assign_policy: AssignPolicy::Error,
            ..Self::default()
        }
    }

    /// Logs every evaluated algebra node at the `debug` level.
    #[inline]
    #[must_use]
    pub fn with_debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// Fails instead of logging a warning when a result binds a variable outside of the result variables.
    #[inline]
    #[must_use]
    pub fn with_strict_checking(mut self) -> Self {
        self.strict = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_assign_policy(mut self, policy: AssignPolicy) -> Self {
        self.assign_policy = policy;
        self
    }

    /// Evaluates the patterns outside of `GRAPH` against the union of all named graphs.
    #[inline]
    #[must_use]
    pub fn with_union_default_graph(mut self) -> Self {
        self.union_default_graph = true;
        self
    }

    /// Base IRI used to resolve the relative IRIs built by the `IRI` function.
    #[inline]
    pub fn with_base_iri(mut self, base_iri: impl Into<String>) -> Result<Self, IriParseError> {
        self.base_iri = Some(Iri::parse(base_iri.into())?);
        Ok(self)
    }

    /// Sets the base IRI of the query if none has been given
    #[must_use]
    pub(crate) fn with_default_base_iri(mut self, base_iri: Option<&Iri<String>>) -> Self {
        if self.base_iri.is_none() {
            self.base_iri = base_iri.cloned();
        }
        self
    }

    /// Adds a custom SPARQL evaluation function.
    ///
    /// The function gets the evaluated arguments and returns `None` on error.
    #[inline]
    #[must_use]
    pub fn with_custom_function(
        mut self,
        name: NamedNode,
        evaluator: impl Fn(&[Term]) -> Option<Term> + Send + Sync + 'static,
    ) -> Self {
        self.custom_functions.insert(name, Arc::new(evaluator));
        self
    }

    /// Adds a custom SPARQL aggregate function.
    ///
    /// `evaluator` builds a fresh accumulator for each group.
    #[inline]
    #[must_use]
    pub fn with_custom_aggregate_function(
        mut self,
        name: NamedNode,
        evaluator: impl Fn() -> Box<dyn AggregateFunctionAccumulator + Send + Sync>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.custom_aggregate_functions
            .insert(name, Arc::new(evaluator));
        self
    }

    /// Registers a [`PropertyFunction`], replacing the one with the same name if any.
    #[inline]
    #[must_use]
    pub fn with_property_function(
        mut self,
        name: NamedNode,
        function: impl PropertyFunction + 'static,
    ) -> Self {
        self.property_functions.register(name, function);
        self
    }

    /// Removes all property functions, including the standard ones.
    #[inline]
    #[must_use]
    pub fn without_property_functions(mut self) -> Self {
        self.property_functions = PropertyFunctionRegistry::default();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_procedure(mut self, name: NamedNode, procedure: impl Procedure + 'static) -> Self {
        self.procedures.register(name, procedure);
        self
    }

    /// Use a given [`ServiceHandler`] to execute `SERVICE` calls to `service_name`.
    #[inline]
    #[must_use]
    pub fn with_service_handler(
        mut self,
        service_name: impl Into<NamedNode>,
        handler: impl ServiceHandler + 'static,
    ) -> Self {
        self.service_handler = self
            .service_handler
            .with_handler(Some(service_name.into()), handler);
        self
    }

    /// Use a given [`ServiceHandler`] for the `SERVICE` calls without a dedicated handler.
    #[inline]
    #[must_use]
    pub fn with_default_service_handler(mut self, handler: impl ServiceHandler + 'static) -> Self {
        self.service_handler = self.service_handler.with_handler(None, handler);
        self
    }

    /// Replaces the [`StageGenerator`] evaluating basic graph patterns.
    #[inline]
    #[must_use]
    pub fn with_stage_generator(
        mut self,
        stage_generator: impl StageGenerator + Send + Sync + 'static,
    ) -> Self {
        self.stage_generator = Arc::new(stage_generator);
        self
    }

    #[inline]
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    #[inline]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    #[inline]
    pub fn assign_policy(&self) -> AssignPolicy {
        self.assign_policy
    }

    #[inline]
    pub fn is_union_default_graph(&self) -> bool {
        self.union_default_graph
    }

    #[inline]
    pub fn base_iri(&self) -> Option<&Iri<String>> {
        self.base_iri.as_ref()
    }

    pub(crate) fn custom_function(&self, name: &NamedNode) -> Option<&CustomFunction> {
        self.custom_functions.get(name)
    }

    pub(crate) fn custom_aggregate_function(
        &self,
        name: &NamedNode,
    ) -> Option<&CustomAggregateFunction> {
        self.custom_aggregate_functions.get(name)
    }

    #[inline]
    pub fn property_functions(&self) -> &PropertyFunctionRegistry {
        &self.property_functions
    }

    #[inline]
    pub fn procedures(&self) -> &ProcedureRegistry {
        &self.procedures
    }

    #[inline]
    pub(crate) fn service_handler(&self) -> &ServiceHandlerRegistry {
        &self.service_handler
    }

    #[inline]
    pub(crate) fn stage_generator(&self) -> &(dyn StageGenerator + Send + Sync) {
        &*self.stage_generator
    }
}

impl fmt::Debug for EvaluationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationOptions")
            .field("debug", &self.debug)
            .field("strict", &self.strict)
            .field("assign_policy", &self.assign_policy)
            .field("union_default_graph", &self.union_default_graph)
            .field("base_iri", &self.base_iri.as_ref().map(Iri::as_str))
            .field("custom_functions", &self.custom_functions.keys())
            .field(
                "custom_aggregate_functions",
                &self.custom_aggregate_functions.keys(),
            )
            .finish_non_exhaustive()
    }
}

/// A trait for custom aggregate function implementation.
///
/// The accumulator accumulates values using the [`accumulate`](Self::accumulate) method
/// and returns a final aggregated value (or an error) using [`finish`](Self::finish).
///
/// ```
/// use oxrdf::{Literal, Term};
/// use sparref::AggregateFunctionAccumulator;
///
/// # #[allow(dead_code)]
/// #[derive(Default)]
/// struct CountLiterals(i64);
///
/// impl AggregateFunctionAccumulator for CountLiterals {
///     fn accumulate(&mut self, element: Term) {
///         if element.is_literal() {
///             self.0 += 1;
///         }
///     }
///
///     fn finish(&mut self) -> Option<Term> {
///         Some(Literal::from(self.0).into())
///     }
/// }
/// ```
pub trait AggregateFunctionAccumulator {
    fn accumulate(&mut self, element: Term);
    fn finish(&mut self) -> Option<Term>;
}
