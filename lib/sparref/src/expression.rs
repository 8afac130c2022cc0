//! Interpreter for SPARQL [expressions](https://www.w3.org/TR/sparql11-query/#expressions).
//!
//! Expressions are evaluated one binding at a time by walking the [`Expression`] tree.
//! An evaluation error is represented by `None` and is never fatal: the calling operator decides what it means
//! (e.g. `FILTER` drops the solution, `BIND` leaves the variable unbound).

use crate::algebra::Expression;
use crate::binding::Binding;
use crate::context::ExecutionContext;
use crate::dispatch::dispatch;
use crate::simple::SimpleEvaluator;
use crate::substitute::substitute;
use md5::{Digest, Md5};
use oxiri::Iri;
use oxrdf::vocab::{rdf, xsd};
use oxrdf::{BlankNode, Literal, NamedNode, Term};
use oxsdatatypes::{Boolean, DateTime, Decimal, Double, Float, Integer};
use rand::random;
use regex::{Regex, RegexBuilder};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use spargebra::algebra::Function;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::mem::discriminant;

const REGEX_SIZE_LIMIT: usize = 1_000_000;

/// Evaluates `expression` against `binding`.
///
/// Returns `None` if the evaluation raises an error, e.g. an unbound variable or a type error.
///
/// ```
/// use oxrdf::{Dataset, Literal, Variable};
/// use sparref::algebra::Expression;
/// use sparref::{Binding, EvaluationOptions, ExecutionContext, evaluate_expression};
///
/// let dataset = Dataset::new();
/// let context = ExecutionContext::new(&dataset, EvaluationOptions::default());
/// let x = Variable::new("x")?;
/// let binding = Binding::singleton(x.clone(), Literal::from(2).into());
/// let double_x = Expression::Add(
///     Box::new(Expression::Variable(x.clone())),
///     Box::new(Expression::Variable(x)),
/// );
/// assert_eq!(
///     evaluate_expression(&double_x, &binding, &context),
///     Some(Literal::from(4).into())
/// );
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub fn evaluate_expression(
    expression: &Expression,
    binding: &Binding,
    context: &ExecutionContext<'_>,
) -> Option<Term> {
    // Terms that are just copied keep their original lexical form
    match expression {
        Expression::NamedNode(t) => Some(t.clone().into()),
        Expression::Literal(t) => Some(t.clone().into()),
        Expression::BlankNode(t) => Some(t.clone().into()),
        Expression::Variable(v) => binding.get(v).cloned(),
        Expression::Coalesce(l) => l
            .iter()
            .find_map(|e| evaluate_expression(e, binding, context)),
        Expression::If(a, b, c) => {
            if eval(a, binding, context)?.effective_boolean_value()? {
                evaluate_expression(b, binding, context)
            } else {
                evaluate_expression(c, binding, context)
            }
        }
        _ => Some(eval(expression, binding, context)?.into()),
    }
}

/// Evaluates `expression` against `binding` and returns its [effective boolean value](https://www.w3.org/TR/sparql11-query/#ebv).
///
/// Evaluation errors are `false`.
pub fn evaluate_condition(
    expression: &Expression,
    binding: &Binding,
    context: &ExecutionContext<'_>,
) -> bool {
    eval(expression, binding, context)
        .and_then(|v| v.effective_boolean_value())
        .unwrap_or(false)
}

/// The total order used by `ORDER BY`, `MIN` and `MAX`.
///
/// Unbound < blank nodes < IRIs < literals. Literals are ranked by kind: numbers (NaN first), booleans,
/// date times, simple literals, language-tagged strings and then the other datatypes.
/// Inside a kind they are compared by value, then by lexical form, datatype and language tag.
pub fn compare_terms(a: Option<&Term>, b: Option<&Term>) -> Ordering {
    cmp_terms(
        a.cloned().map(ExpressionTerm::from).as_ref(),
        b.cloned().map(ExpressionTerm::from).as_ref(),
    )
}

pub(crate) fn eval(
    expression: &Expression,
    binding: &Binding,
    context: &ExecutionContext<'_>,
) -> Option<ExpressionTerm> {
    match expression {
        Expression::NamedNode(t) => Some(ExpressionTerm::NamedNode(t.clone())),
        Expression::Literal(t) => Some(Term::from(t.clone()).into()),
        Expression::BlankNode(t) => Some(ExpressionTerm::BlankNode(t.clone())),
        Expression::Variable(v) => Some(binding.get(v)?.clone().into()),
        Expression::Bound(v) => Some(binding.contains(v).into()),
        Expression::Exists(pattern) => Some(exists(pattern, binding, context)?.into()),
        Expression::Or(a, b) => {
            let a = eval(a, binding, context).and_then(|v| v.effective_boolean_value());
            if a == Some(true) {
                return Some(true.into());
            }
            match eval(b, binding, context).and_then(|v| v.effective_boolean_value()) {
                Some(true) => Some(true.into()),
                Some(false) => a.map(|_| false.into()),
                None => None,
            }
        }
        Expression::And(a, b) => {
            let a = eval(a, binding, context).and_then(|v| v.effective_boolean_value());
            if a == Some(false) {
                return Some(false.into());
            }
            match eval(b, binding, context).and_then(|v| v.effective_boolean_value()) {
                Some(false) => Some(false.into()),
                Some(true) => a.map(|_| true.into()),
                None => None,
            }
        }
        Expression::Equal(a, b) => {
            equals(&eval(a, binding, context)?, &eval(b, binding, context)?).map(Into::into)
        }
        Expression::SameTerm(a, b) => Some(
            (evaluate_expression(a, binding, context)?
                == evaluate_expression(b, binding, context)?)
            .into(),
        ),
        Expression::Greater(a, b) => Some(
            (partial_cmp(&eval(a, binding, context)?, &eval(b, binding, context)?)?
                == Ordering::Greater)
                .into(),
        ),
        Expression::GreaterOrEqual(a, b) => Some(
            matches!(
                partial_cmp(&eval(a, binding, context)?, &eval(b, binding, context)?)?,
                Ordering::Greater | Ordering::Equal
            )
            .into(),
        ),
        Expression::Less(a, b) => Some(
            (partial_cmp(&eval(a, binding, context)?, &eval(b, binding, context)?)?
                == Ordering::Less)
                .into(),
        ),
        Expression::LessOrEqual(a, b) => Some(
            matches!(
                partial_cmp(&eval(a, binding, context)?, &eval(b, binding, context)?)?,
                Ordering::Less | Ordering::Equal
            )
            .into(),
        ),
        Expression::Add(a, b) => Some(
            match NumericBinaryOperands::new(eval(a, binding, context)?, eval(b, binding, context)?)?
            {
                NumericBinaryOperands::Float(v1, v2) => ExpressionTerm::FloatLiteral(v1 + v2),
                NumericBinaryOperands::Double(v1, v2) => ExpressionTerm::DoubleLiteral(v1 + v2),
                NumericBinaryOperands::Integer(v1, v2) => {
                    ExpressionTerm::IntegerLiteral(v1.checked_add(v2)?)
                }
                NumericBinaryOperands::Decimal(v1, v2) => {
                    ExpressionTerm::DecimalLiteral(v1.checked_add(v2)?)
                }
            },
        ),
        Expression::Subtract(a, b) => Some(
            match NumericBinaryOperands::new(eval(a, binding, context)?, eval(b, binding, context)?)?
            {
                NumericBinaryOperands::Float(v1, v2) => ExpressionTerm::FloatLiteral(v1 - v2),
                NumericBinaryOperands::Double(v1, v2) => ExpressionTerm::DoubleLiteral(v1 - v2),
                NumericBinaryOperands::Integer(v1, v2) => {
                    ExpressionTerm::IntegerLiteral(v1.checked_sub(v2)?)
                }
                NumericBinaryOperands::Decimal(v1, v2) => {
                    ExpressionTerm::DecimalLiteral(v1.checked_sub(v2)?)
                }
            },
        ),
        Expression::Multiply(a, b) => Some(
            match NumericBinaryOperands::new(eval(a, binding, context)?, eval(b, binding, context)?)?
            {
                NumericBinaryOperands::Float(v1, v2) => ExpressionTerm::FloatLiteral(v1 * v2),
                NumericBinaryOperands::Double(v1, v2) => ExpressionTerm::DoubleLiteral(v1 * v2),
                NumericBinaryOperands::Integer(v1, v2) => {
                    ExpressionTerm::IntegerLiteral(v1.checked_mul(v2)?)
                }
                NumericBinaryOperands::Decimal(v1, v2) => {
                    ExpressionTerm::DecimalLiteral(v1.checked_mul(v2)?)
                }
            },
        ),
        Expression::Divide(a, b) => Some(
            match NumericBinaryOperands::new(eval(a, binding, context)?, eval(b, binding, context)?)?
            {
                NumericBinaryOperands::Float(v1, v2) => ExpressionTerm::FloatLiteral(v1 / v2),
                NumericBinaryOperands::Double(v1, v2) => ExpressionTerm::DoubleLiteral(v1 / v2),
                NumericBinaryOperands::Integer(v1, v2) => {
                    ExpressionTerm::DecimalLiteral(Decimal::from(v1).checked_div(v2)?)
                }
                NumericBinaryOperands::Decimal(v1, v2) => {
                    ExpressionTerm::DecimalLiteral(v1.checked_div(v2)?)
                }
            },
        ),
        Expression::UnaryPlus(e) => match eval(e, binding, context)? {
            value @ (ExpressionTerm::IntegerLiteral(_)
            | ExpressionTerm::DecimalLiteral(_)
            | ExpressionTerm::FloatLiteral(_)
            | ExpressionTerm::DoubleLiteral(_)) => Some(value),
            _ => None,
        },
        Expression::UnaryMinus(e) => Some(match eval(e, binding, context)? {
            ExpressionTerm::IntegerLiteral(value) => {
                ExpressionTerm::IntegerLiteral(value.checked_neg()?)
            }
            ExpressionTerm::DecimalLiteral(value) => ExpressionTerm::DecimalLiteral(value.checked_neg()?),
            ExpressionTerm::FloatLiteral(value) => ExpressionTerm::FloatLiteral(-value),
            ExpressionTerm::DoubleLiteral(value) => ExpressionTerm::DoubleLiteral(-value),
            _ => return None,
        }),
        Expression::Not(e) => Some((!eval(e, binding, context)?.effective_boolean_value()?).into()),
        Expression::If(a, b, c) => {
            if eval(a, binding, context)?.effective_boolean_value()? {
                eval(b, binding, context)
            } else {
                eval(c, binding, context)
            }
        }
        Expression::Coalesce(l) => l.iter().find_map(|e| eval(e, binding, context)),
        Expression::FunctionCall(function, args) => {
            call_function(function, args, binding, context)
        }
    }
}

/// `EXISTS`: the pattern is instantiated with the current binding and evaluated from scratch
fn exists(
    pattern: &crate::algebra::Op,
    binding: &Binding,
    context: &ExecutionContext<'_>,
) -> Option<bool> {
    let pattern = substitute(pattern, binding);
    let evaluator = SimpleEvaluator::new(context.clone());
    let table = match dispatch(&evaluator, &pattern) {
        Ok(table) => table,
        Err(e) => {
            tracing::debug!(error = %e, "EXISTS evaluation failed");
            return None;
        }
    };
    for row in table {
        match row {
            Ok(row) if row.is_compatible(binding) => return Some(true),
            Ok(_) => (),
            Err(e) => {
                tracing::debug!(error = %e, "EXISTS evaluation failed");
                return None;
            }
        }
    }
    Some(false)
}

fn call_function(
    function: &Function,
    args: &[Expression],
    binding: &Binding,
    context: &ExecutionContext<'_>,
) -> Option<ExpressionTerm> {
    let arg = |i: usize| eval(args.get(i)?, binding, context);
    match function {
        Function::Str => Some(ExpressionTerm::StringLiteral(match arg(0)?.into() {
            Term::NamedNode(term) => term.into_string(),
            Term::BlankNode(_) => return None,
            Term::Literal(term) => term.destruct().0,
        })),
        Function::Lang => Some(ExpressionTerm::StringLiteral(match arg(0)? {
            ExpressionTerm::LangStringLiteral { language, .. } => language,
            ExpressionTerm::NamedNode(_) | ExpressionTerm::BlankNode(_) => return None,
            _ => String::new(),
        })),
        Function::LangMatches => {
            let ExpressionTerm::StringLiteral(mut language_tag) = arg(0)? else {
                return None;
            };
            language_tag.make_ascii_lowercase();
            let ExpressionTerm::StringLiteral(mut language_range) = arg(1)? else {
                return None;
            };
            language_range.make_ascii_lowercase();
            Some(
                if &*language_range == "*" {
                    !language_tag.is_empty()
                } else {
                    !ZipLongest::new(language_range.split('-'), language_tag.split('-')).any(
                        |parts| match parts {
                            (Some(range_subtag), Some(language_subtag)) => {
                                range_subtag != language_subtag
                            }
                            (Some(_), None) => true,
                            (None, _) => false,
                        },
                    )
                }
                .into(),
            )
        }
        Function::Datatype => Some(ExpressionTerm::NamedNode(match arg(0)? {
            ExpressionTerm::StringLiteral(_) => xsd::STRING.into(),
            ExpressionTerm::LangStringLiteral { .. } => rdf::LANG_STRING.into(),
            ExpressionTerm::BooleanLiteral(_) => xsd::BOOLEAN.into(),
            ExpressionTerm::IntegerLiteral(_) => xsd::INTEGER.into(),
            ExpressionTerm::DecimalLiteral(_) => xsd::DECIMAL.into(),
            ExpressionTerm::FloatLiteral(_) => xsd::FLOAT.into(),
            ExpressionTerm::DoubleLiteral(_) => xsd::DOUBLE.into(),
            ExpressionTerm::DateTimeLiteral(_) => xsd::DATE_TIME.into(),
            ExpressionTerm::OtherTypedLiteral { datatype, .. } => datatype,
            ExpressionTerm::NamedNode(_) | ExpressionTerm::BlankNode(_) => return None,
        })),
        Function::Iri => Some(ExpressionTerm::NamedNode(match arg(0)? {
            ExpressionTerm::NamedNode(iri) => iri,
            ExpressionTerm::StringLiteral(iri) => if let Some(base_iri) =
                context.options().base_iri()
            {
                base_iri.resolve(&iri)
            } else {
                Iri::parse(iri)
            }
            .ok()?
            .into(),
            _ => return None,
        })),
        Function::BNode => match args.first() {
            Some(id) => {
                let ExpressionTerm::StringLiteral(id) = eval(id, binding, context)? else {
                    return None;
                };
                Some(ExpressionTerm::BlankNode(BlankNode::new(id).ok()?))
            }
            None => Some(ExpressionTerm::BlankNode(BlankNode::default())),
        },
        Function::Rand => Some(ExpressionTerm::DoubleLiteral(random::<f64>().into())),
        Function::Abs => Some(match arg(0)? {
            ExpressionTerm::IntegerLiteral(value) => {
                ExpressionTerm::IntegerLiteral(value.checked_abs()?)
            }
            ExpressionTerm::DecimalLiteral(value) => ExpressionTerm::DecimalLiteral(value.checked_abs()?),
            ExpressionTerm::FloatLiteral(value) => ExpressionTerm::FloatLiteral(value.abs()),
            ExpressionTerm::DoubleLiteral(value) => ExpressionTerm::DoubleLiteral(value.abs()),
            _ => return None,
        }),
        Function::Ceil => Some(match arg(0)? {
            ExpressionTerm::IntegerLiteral(value) => ExpressionTerm::IntegerLiteral(value),
            ExpressionTerm::DecimalLiteral(value) => ExpressionTerm::DecimalLiteral(value.checked_ceil()?),
            ExpressionTerm::FloatLiteral(value) => ExpressionTerm::FloatLiteral(value.ceil()),
            ExpressionTerm::DoubleLiteral(value) => ExpressionTerm::DoubleLiteral(value.ceil()),
            _ => return None,
        }),
        Function::Floor => Some(match arg(0)? {
            ExpressionTerm::IntegerLiteral(value) => ExpressionTerm::IntegerLiteral(value),
            ExpressionTerm::DecimalLiteral(value) => {
                ExpressionTerm::DecimalLiteral(value.checked_floor()?)
            }
            ExpressionTerm::FloatLiteral(value) => ExpressionTerm::FloatLiteral(value.floor()),
            ExpressionTerm::DoubleLiteral(value) => ExpressionTerm::DoubleLiteral(value.floor()),
            _ => return None,
        }),
        Function::Round => Some(match arg(0)? {
            ExpressionTerm::IntegerLiteral(value) => ExpressionTerm::IntegerLiteral(value),
            ExpressionTerm::DecimalLiteral(value) => {
                ExpressionTerm::DecimalLiteral(value.checked_round()?)
            }
            ExpressionTerm::FloatLiteral(value) => ExpressionTerm::FloatLiteral(value.round()),
            ExpressionTerm::DoubleLiteral(value) => ExpressionTerm::DoubleLiteral(value.round()),
            _ => return None,
        }),
        Function::Concat => {
            let mut result = String::new();
            let mut language = None;
            for e in args {
                let (value, e_language) = to_string_and_language(eval(e, binding, context)?)?;
                if let Some(lang) = &language {
                    if *lang != e_language {
                        language = Some(None);
                    }
                } else {
                    language = Some(e_language);
                }
                result.push_str(&value);
            }
            Some(build_plain_literal(result, language.flatten()))
        }
        Function::SubStr => {
            let (source, language) = to_string_and_language(arg(0)?)?;
            let ExpressionTerm::IntegerLiteral(start) = arg(1)? else {
                return None;
            };
            let start = i64::from(start);
            let end = if args.len() > 2 {
                let ExpressionTerm::IntegerLiteral(length) = arg(2)? else {
                    return None;
                };
                Some(start.saturating_add(i64::from(length)))
            } else {
                None
            };
            // Characters are numbered from 1, positions out of the string select nothing
            let result = source
                .chars()
                .zip(1_i64..)
                .filter(|(_, position)| *position >= start && end.is_none_or(|end| *position < end))
                .map(|(c, _)| c)
                .collect::<String>();
            Some(build_plain_literal(result, language))
        }
        Function::StrLen => {
            let (string, _) = to_string_and_language(arg(0)?)?;
            Some(ExpressionTerm::IntegerLiteral(
                i64::try_from(string.chars().count()).ok()?.into(),
            ))
        }
        Function::Replace => {
            let (text, language) = to_string_and_language(arg(0)?)?;
            let ExpressionTerm::StringLiteral(pattern) = arg(1)? else {
                return None;
            };
            let ExpressionTerm::StringLiteral(replacement) = arg(2)? else {
                return None;
            };
            let flags = if args.len() > 3 {
                let ExpressionTerm::StringLiteral(flags) = arg(3)? else {
                    return None;
                };
                Some(flags)
            } else {
                None
            };
            let regex = compile_pattern(&pattern, flags.as_deref())?;
            Some(build_plain_literal(
                match regex.replace_all(&text, replacement.as_str()) {
                    Cow::Owned(replaced) => replaced,
                    Cow::Borrowed(_) => text,
                },
                language,
            ))
        }
        Function::UCase => {
            let (value, language) = to_string_and_language(arg(0)?)?;
            Some(build_plain_literal(value.to_uppercase(), language))
        }
        Function::LCase => {
            let (value, language) = to_string_and_language(arg(0)?)?;
            Some(build_plain_literal(value.to_lowercase(), language))
        }
        Function::StrStarts => {
            let (arg1, arg2, _) = to_argument_compatible_strings(arg(0)?, arg(1)?)?;
            Some(arg1.starts_with(arg2.as_str()).into())
        }
        Function::StrEnds => {
            let (arg1, arg2, _) = to_argument_compatible_strings(arg(0)?, arg(1)?)?;
            Some(arg1.ends_with(arg2.as_str()).into())
        }
        Function::Contains => {
            let (arg1, arg2, _) = to_argument_compatible_strings(arg(0)?, arg(1)?)?;
            Some(arg1.contains(arg2.as_str()).into())
        }
        Function::EncodeForUri => {
            let (value, _) = to_string_and_language(arg(0)?)?;
            Some(ExpressionTerm::StringLiteral(encode_for_uri(&value)))
        }
        Function::StrBefore => {
            let (arg1, arg2, language) = to_argument_compatible_strings(arg(0)?, arg(1)?)?;
            Some(if let Some(position) = arg1.find(arg2.as_str()) {
                build_plain_literal(arg1[..position].into(), language)
            } else {
                ExpressionTerm::StringLiteral(String::new())
            })
        }
        Function::StrAfter => {
            let (arg1, arg2, language) = to_argument_compatible_strings(arg(0)?, arg(1)?)?;
            Some(if let Some(position) = arg1.find(arg2.as_str()) {
                build_plain_literal(arg1[position + arg2.len()..].into(), language)
            } else {
                ExpressionTerm::StringLiteral(String::new())
            })
        }
        Function::Year => Some(ExpressionTerm::IntegerLiteral(date_time(arg(0)?)?.year().into())),
        Function::Month => Some(ExpressionTerm::IntegerLiteral(
            date_time(arg(0)?)?.month().into(),
        )),
        Function::Day => Some(ExpressionTerm::IntegerLiteral(date_time(arg(0)?)?.day().into())),
        Function::Hours => Some(ExpressionTerm::IntegerLiteral(date_time(arg(0)?)?.hour().into())),
        Function::Minutes => Some(ExpressionTerm::IntegerLiteral(
            date_time(arg(0)?)?.minute().into(),
        )),
        Function::Seconds => Some(ExpressionTerm::DecimalLiteral(date_time(arg(0)?)?.second())),
        Function::Timezone => Some(ExpressionTerm::OtherTypedLiteral {
            value: date_time(arg(0)?)?.timezone()?.to_string(),
            datatype: xsd::DAY_TIME_DURATION.into(),
        }),
        Function::Tz => Some(ExpressionTerm::StringLiteral(
            date_time(arg(0)?)?
                .timezone_offset()
                .map_or_else(String::new, |o| o.to_string()),
        )),
        Function::Now => Some(ExpressionTerm::DateTimeLiteral(context.now())),
        Function::Uuid => {
            let mut buffer = String::with_capacity(45);
            buffer.push_str("urn:uuid:");
            generate_uuid(&mut buffer);
            Some(ExpressionTerm::NamedNode(NamedNode::new_unchecked(buffer)))
        }
        Function::StrUuid => {
            let mut buffer = String::with_capacity(36);
            generate_uuid(&mut buffer);
            Some(ExpressionTerm::StringLiteral(buffer))
        }
        Function::Md5 => hash::<Md5>(arg(0)?),
        Function::Sha1 => hash::<Sha1>(arg(0)?),
        Function::Sha256 => hash::<Sha256>(arg(0)?),
        Function::Sha384 => hash::<Sha384>(arg(0)?),
        Function::Sha512 => hash::<Sha512>(arg(0)?),
        Function::StrLang => {
            let ExpressionTerm::StringLiteral(value) = arg(0)? else {
                return None;
            };
            let ExpressionTerm::StringLiteral(language) = arg(1)? else {
                return None;
            };
            Some(Term::from(Literal::new_language_tagged_literal(value, language).ok()?).into())
        }
        Function::StrDt => {
            let ExpressionTerm::StringLiteral(value) = arg(0)? else {
                return None;
            };
            let ExpressionTerm::NamedNode(datatype) = arg(1)? else {
                return None;
            };
            Some(Term::from(Literal::new_typed_literal(value, datatype)).into())
        }
        Function::IsIri => Some(matches!(arg(0)?, ExpressionTerm::NamedNode(_)).into()),
        Function::IsBlank => Some(matches!(arg(0)?, ExpressionTerm::BlankNode(_)).into()),
        Function::IsLiteral => Some(
            (!matches!(
                arg(0)?,
                ExpressionTerm::NamedNode(_) | ExpressionTerm::BlankNode(_)
            ))
            .into(),
        ),
        Function::IsNumeric => Some(
            matches!(
                arg(0)?,
                ExpressionTerm::IntegerLiteral(_)
                    | ExpressionTerm::DecimalLiteral(_)
                    | ExpressionTerm::FloatLiteral(_)
                    | ExpressionTerm::DoubleLiteral(_)
            )
            .into(),
        ),
        Function::Regex => {
            let (text, _) = to_string_and_language(arg(0)?)?;
            let ExpressionTerm::StringLiteral(pattern) = arg(1)? else {
                return None;
            };
            let flags = if args.len() > 2 {
                let ExpressionTerm::StringLiteral(flags) = arg(2)? else {
                    return None;
                };
                Some(flags)
            } else {
                None
            };
            let regex = compile_pattern(&pattern, flags.as_deref())?;
            Some(regex.is_match(&text).into())
        }
        Function::Custom(name) => {
            if let Some(function) = context.options().custom_function(name) {
                let args = args
                    .iter()
                    .map(|e| evaluate_expression(e, binding, context))
                    .collect::<Option<Vec<_>>>()?;
                return Some(function(&args)?.into());
            }
            if args.len() != 1 {
                return None;
            }
            cast(name, arg(0)?)
        }
    }
}

/// XSD [casts](https://www.w3.org/TR/sparql11-query/#FunctionMapping)
fn cast(datatype: &NamedNode, value: ExpressionTerm) -> Option<ExpressionTerm> {
    Some(match datatype.as_ref() {
        xsd::STRING => ExpressionTerm::StringLiteral(match value.into() {
            Term::NamedNode(term) => term.into_string(),
            Term::BlankNode(_) => return None,
            Term::Literal(term) => term.destruct().0,
        }),
        xsd::BOOLEAN => ExpressionTerm::BooleanLiteral(match value {
            ExpressionTerm::BooleanLiteral(value) => value,
            ExpressionTerm::FloatLiteral(value) => value.into(),
            ExpressionTerm::DoubleLiteral(value) => value.into(),
            ExpressionTerm::IntegerLiteral(value) => value.into(),
            ExpressionTerm::DecimalLiteral(value) => value.into(),
            ExpressionTerm::StringLiteral(value) => value.parse().ok()?,
            _ => return None,
        }),
        xsd::DOUBLE => ExpressionTerm::DoubleLiteral(match value {
            ExpressionTerm::FloatLiteral(value) => value.into(),
            ExpressionTerm::DoubleLiteral(value) => value,
            ExpressionTerm::IntegerLiteral(value) => value.into(),
            ExpressionTerm::DecimalLiteral(value) => value.into(),
            ExpressionTerm::BooleanLiteral(value) => value.into(),
            ExpressionTerm::StringLiteral(value) => value.parse().ok()?,
            _ => return None,
        }),
        xsd::FLOAT => ExpressionTerm::FloatLiteral(match value {
            ExpressionTerm::FloatLiteral(value) => value,
            ExpressionTerm::DoubleLiteral(value) => value.into(),
            ExpressionTerm::IntegerLiteral(value) => value.into(),
            ExpressionTerm::DecimalLiteral(value) => value.into(),
            ExpressionTerm::BooleanLiteral(value) => value.into(),
            ExpressionTerm::StringLiteral(value) => value.parse().ok()?,
            _ => return None,
        }),
        xsd::INTEGER => ExpressionTerm::IntegerLiteral(match value {
            ExpressionTerm::FloatLiteral(value) => value.try_into().ok()?,
            ExpressionTerm::DoubleLiteral(value) => value.try_into().ok()?,
            ExpressionTerm::IntegerLiteral(value) => value,
            ExpressionTerm::DecimalLiteral(value) => value.try_into().ok()?,
            ExpressionTerm::BooleanLiteral(value) => value.into(),
            ExpressionTerm::StringLiteral(value) => value.parse().ok()?,
            _ => return None,
        }),
        xsd::DECIMAL => ExpressionTerm::DecimalLiteral(match value {
            ExpressionTerm::FloatLiteral(value) => value.try_into().ok()?,
            ExpressionTerm::DoubleLiteral(value) => value.try_into().ok()?,
            ExpressionTerm::IntegerLiteral(value) => value.into(),
            ExpressionTerm::DecimalLiteral(value) => value,
            ExpressionTerm::BooleanLiteral(value) => value.into(),
            ExpressionTerm::StringLiteral(value) => value.parse().ok()?,
            _ => return None,
        }),
        xsd::DATE_TIME => ExpressionTerm::DateTimeLiteral(match value {
            ExpressionTerm::DateTimeLiteral(value) => value,
            ExpressionTerm::StringLiteral(value) => value.parse().ok()?,
            _ => return None,
        }),
        _ => return None,
    })
}

fn date_time(value: ExpressionTerm) -> Option<DateTime> {
    if let ExpressionTerm::DateTimeLiteral(value) = value {
        Some(value)
    } else {
        None
    }
}

fn hash<H: Digest>(value: ExpressionTerm) -> Option<ExpressionTerm> {
    let ExpressionTerm::StringLiteral(input) = value else {
        return None;
    };
    Some(ExpressionTerm::StringLiteral(hex::encode(
        H::new().chain_update(input.as_str()).finalize(),
    )))
}

fn encode_for_uri(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.bytes() {
        match c {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(char::from(c));
            }
            _ => {
                result.push('%');
                result.push_str(&hex::encode_upper([c]));
            }
        }
    }
    result
}

fn to_string_and_language(term: ExpressionTerm) -> Option<(String, Option<String>)> {
    match term {
        ExpressionTerm::StringLiteral(value) => Some((value, None)),
        ExpressionTerm::LangStringLiteral { value, language } => Some((value, Some(language))),
        _ => None,
    }
}

pub(crate) fn build_plain_literal(value: String, language: Option<String>) -> ExpressionTerm {
    if let Some(language) = language {
        ExpressionTerm::LangStringLiteral { value, language }
    } else {
        ExpressionTerm::StringLiteral(value)
    }
}

pub(crate) fn string_and_language(term: ExpressionTerm) -> Option<(String, Option<String>)> {
    to_string_and_language(term)
}

fn to_argument_compatible_strings(
    arg1: ExpressionTerm,
    arg2: ExpressionTerm,
) -> Option<(String, String, Option<String>)> {
    let (value1, language1) = to_string_and_language(arg1)?;
    let (value2, language2) = to_string_and_language(arg2)?;
    (language2.is_none() || language1 == language2).then_some((value1, value2, language1))
}

pub(crate) fn compile_pattern(pattern: &str, flags: Option<&str>) -> Option<Regex> {
    let mut pattern = Cow::Borrowed(pattern);
    let flags = flags.unwrap_or_default();
    if flags.contains('q') {
        pattern = regex::escape(&pattern).into();
    }
    let mut regex_builder = RegexBuilder::new(&pattern);
    regex_builder.size_limit(REGEX_SIZE_LIMIT);
    for flag in flags.chars() {
        match flag {
            's' => {
                regex_builder.dot_matches_new_line(true);
            }
            'm' => {
                regex_builder.multi_line(true);
            }
            'i' => {
                regex_builder.case_insensitive(true);
            }
            'x' => {
                regex_builder.ignore_whitespace(true);
            }
            'q' => (),
            _ => return None, // invalid option
        }
    }
    regex_builder.build().ok()
}

fn generate_uuid(buffer: &mut String) {
    let mut uuid = random::<u128>().to_le_bytes();
    uuid[6] = (uuid[6] & 0x0F) | 0x40;
    uuid[8] = (uuid[8] & 0x3F) | 0x80;
    buffer.push_str(&hex::encode(&uuid[0..4]));
    buffer.push('-');
    buffer.push_str(&hex::encode(&uuid[4..6]));
    buffer.push('-');
    buffer.push_str(&hex::encode(&uuid[6..8]));
    buffer.push('-');
    buffer.push_str(&hex::encode(&uuid[8..10]));
    buffer.push('-');
    buffer.push_str(&hex::encode(&uuid[10..16]));
}

struct ZipLongest<T1, T2, I1: Iterator<Item = T1>, I2: Iterator<Item = T2>> {
    a: I1,
    b: I2,
}

impl<T1, T2, I1: Iterator<Item = T1>, I2: Iterator<Item = T2>> ZipLongest<T1, T2, I1, I2> {
    fn new(a: I1, b: I2) -> Self {
        Self { a, b }
    }
}

impl<T1, T2, I1: Iterator<Item = T1>, I2: Iterator<Item = T2>> Iterator
    for ZipLongest<T1, T2, I1, I2>
{
    type Item = (Option<T1>, Option<T2>);

    fn next(&mut self) -> Option<Self::Item> {
        match (self.a.next(), self.b.next()) {
            (None, None) => None,
            r => Some(r),
        }
    }
}

/// A term in the value space the expression operators work on
#[derive(Debug, Clone)]
pub(crate) enum ExpressionTerm {
    NamedNode(NamedNode),
    BlankNode(BlankNode),
    StringLiteral(String),
    LangStringLiteral { value: String, language: String },
    BooleanLiteral(Boolean),
    IntegerLiteral(Integer),
    DecimalLiteral(Decimal),
    FloatLiteral(Float),
    DoubleLiteral(Double),
    DateTimeLiteral(DateTime),
    OtherTypedLiteral { value: String, datatype: NamedNode },
}

impl PartialEq for ExpressionTerm {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NamedNode(l), Self::NamedNode(r)) => l == r,
            (Self::BlankNode(l), Self::BlankNode(r)) => l == r,
            (Self::StringLiteral(l), Self::StringLiteral(r)) => l == r,
            (
                Self::LangStringLiteral {
                    value: lv,
                    language: ll,
                },
                Self::LangStringLiteral {
                    value: rv,
                    language: rl,
                },
            ) => lv == rv && ll == rl,
            (Self::BooleanLiteral(l), Self::BooleanLiteral(r)) => l == r,
            (Self::IntegerLiteral(l), Self::IntegerLiteral(r)) => l == r,
            (Self::DecimalLiteral(l), Self::DecimalLiteral(r)) => l == r,
            (Self::FloatLiteral(l), Self::FloatLiteral(r)) => l.is_identical_with(*r),
            (Self::DoubleLiteral(l), Self::DoubleLiteral(r)) => l.is_identical_with(*r),
            (Self::DateTimeLiteral(l), Self::DateTimeLiteral(r)) => l == r,
            (
                Self::OtherTypedLiteral {
                    value: lv,
                    datatype: ld,
                },
                Self::OtherTypedLiteral {
                    value: rv,
                    datatype: rd,
                },
            ) => lv == rv && ld == rd,
            _ => false,
        }
    }
}

impl Eq for ExpressionTerm {}

impl Hash for ExpressionTerm {
    fn hash<H: Hasher>(&self, state: &mut H) {
        discriminant(self).hash(state);
        match self {
            Self::NamedNode(v) => v.hash(state),
            Self::BlankNode(v) => v.hash(state),
            Self::StringLiteral(v) => v.hash(state),
            Self::LangStringLiteral { value, language } => (value, language).hash(state),
            Self::BooleanLiteral(v) => v.hash(state),
            Self::IntegerLiteral(v) => v.hash(state),
            Self::DecimalLiteral(v) => v.hash(state),
            Self::FloatLiteral(v) => v.to_be_bytes().hash(state),
            Self::DoubleLiteral(v) => v.to_be_bytes().hash(state),
            Self::DateTimeLiteral(v) => v.hash(state),
            Self::OtherTypedLiteral { value, datatype } => (value, datatype).hash(state),
        }
    }
}

impl From<Term> for ExpressionTerm {
    fn from(term: Term) -> Self {
        match term {
            Term::NamedNode(t) => Self::NamedNode(t),
            Term::BlankNode(t) => Self::BlankNode(t),
            Term::Literal(t) => {
                let (value, datatype, language) = t.destruct();
                if let Some(language) = language {
                    Self::LangStringLiteral { value, language }
                } else if let Some(datatype) = datatype {
                    parse_typed_literal(&value, datatype.as_str())
                        .unwrap_or(Self::OtherTypedLiteral { value, datatype })
                } else {
                    Self::StringLiteral(value)
                }
            }
        }
    }
}

impl From<ExpressionTerm> for Term {
    fn from(term: ExpressionTerm) -> Self {
        match term {
            ExpressionTerm::NamedNode(t) => t.into(),
            ExpressionTerm::BlankNode(t) => t.into(),
            ExpressionTerm::StringLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::LangStringLiteral { value, language } => {
                Literal::new_language_tagged_literal_unchecked(value, language).into()
            }
            ExpressionTerm::BooleanLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::IntegerLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::DecimalLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::FloatLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::DoubleLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::DateTimeLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::OtherTypedLiteral { value, datatype } => {
                Literal::new_typed_literal(value, datatype).into()
            }
        }
    }
}

impl From<bool> for ExpressionTerm {
    fn from(value: bool) -> Self {
        Self::BooleanLiteral(value.into())
    }
}

impl ExpressionTerm {
    /// The [effective boolean value](https://www.w3.org/TR/sparql11-query/#ebv) of the term
    pub(crate) fn effective_boolean_value(&self) -> Option<bool> {
        match self {
            Self::BooleanLiteral(value) => Some((*value).into()),
            Self::StringLiteral(value) => Some(!value.is_empty()),
            Self::FloatLiteral(value) => Some(Boolean::from(*value).into()),
            Self::DoubleLiteral(value) => Some(Boolean::from(*value).into()),
            Self::IntegerLiteral(value) => Some(Boolean::from(*value).into()),
            Self::DecimalLiteral(value) => Some(Boolean::from(*value).into()),
            _ => None,
        }
    }
}

fn parse_typed_literal(value: &str, datatype: &str) -> Option<ExpressionTerm> {
    Some(match datatype {
        "http://www.w3.org/2001/XMLSchema#boolean" => {
            ExpressionTerm::BooleanLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#string" => ExpressionTerm::StringLiteral(value.into()),
        "http://www.w3.org/2001/XMLSchema#float" => {
            ExpressionTerm::FloatLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#double" => {
            ExpressionTerm::DoubleLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#decimal" => {
            ExpressionTerm::DecimalLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#integer"
        | "http://www.w3.org/2001/XMLSchema#byte"
        | "http://www.w3.org/2001/XMLSchema#short"
        | "http://www.w3.org/2001/XMLSchema#int"
        | "http://www.w3.org/2001/XMLSchema#long"
        | "http://www.w3.org/2001/XMLSchema#unsignedByte"
        | "http://www.w3.org/2001/XMLSchema#unsignedShort"
        | "http://www.w3.org/2001/XMLSchema#unsignedInt"
        | "http://www.w3.org/2001/XMLSchema#unsignedLong"
        | "http://www.w3.org/2001/XMLSchema#positiveInteger"
        | "http://www.w3.org/2001/XMLSchema#negativeInteger"
        | "http://www.w3.org/2001/XMLSchema#nonPositiveInteger"
        | "http://www.w3.org/2001/XMLSchema#nonNegativeInteger" => {
            ExpressionTerm::IntegerLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#dateTime"
        | "http://www.w3.org/2001/XMLSchema#dateTimeStamp" => {
            ExpressionTerm::DateTimeLiteral(value.parse().ok()?)
        }
        _ => return None,
    })
}

/// Equality operator (=)
fn equals(a: &ExpressionTerm, b: &ExpressionTerm) -> Option<bool> {
    match a {
        ExpressionTerm::NamedNode(_)
        | ExpressionTerm::BlankNode(_)
        | ExpressionTerm::LangStringLiteral { .. } => Some(a == b),
        ExpressionTerm::StringLiteral(a) => match b {
            ExpressionTerm::StringLiteral(b) => Some(a == b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::OtherTypedLiteral { .. } => match b {
            ExpressionTerm::OtherTypedLiteral { .. } if a == b => Some(true),
            ExpressionTerm::NamedNode(_)
            | ExpressionTerm::BlankNode(_)
            | ExpressionTerm::LangStringLiteral { .. } => Some(false),
            _ => None,
        },
        ExpressionTerm::BooleanLiteral(a) => match b {
            ExpressionTerm::BooleanLiteral(b) => Some(a == b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::FloatLiteral(a) => match b {
            ExpressionTerm::FloatLiteral(b) => Some(a == b),
            ExpressionTerm::DoubleLiteral(b) => Some(Double::from(*a) == *b),
            ExpressionTerm::IntegerLiteral(b) => Some(*a == (*b).into()),
            ExpressionTerm::DecimalLiteral(b) => Some(*a == (*b).into()),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::DoubleLiteral(a) => match b {
            ExpressionTerm::FloatLiteral(b) => Some(*a == (*b).into()),
            ExpressionTerm::DoubleLiteral(b) => Some(a == b),
            ExpressionTerm::IntegerLiteral(b) => Some(*a == (*b).into()),
            ExpressionTerm::DecimalLiteral(b) => Some(*a == (*b).into()),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::IntegerLiteral(a) => match b {
            ExpressionTerm::FloatLiteral(b) => Some(Float::from(*a) == *b),
            ExpressionTerm::DoubleLiteral(b) => Some(Double::from(*a) == *b),
            ExpressionTerm::IntegerLiteral(b) => Some(a == b),
            ExpressionTerm::DecimalLiteral(b) => Some(Decimal::from(*a) == *b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::DecimalLiteral(a) => match b {
            ExpressionTerm::FloatLiteral(b) => Some(Float::from(*a) == *b),
            ExpressionTerm::DoubleLiteral(b) => Some(Double::from(*a) == *b),
            ExpressionTerm::IntegerLiteral(b) => Some(*a == (*b).into()),
            ExpressionTerm::DecimalLiteral(b) => Some(a == b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::DateTimeLiteral(a) => match b {
            ExpressionTerm::DateTimeLiteral(b) => Some(a == b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
    }
}

/// Comparison for <, >, <= and >= operators
fn partial_cmp(a: &ExpressionTerm, b: &ExpressionTerm) -> Option<Ordering> {
    if a == b {
        return Some(Ordering::Equal);
    }
    partial_cmp_literals(a, b)
}

fn partial_cmp_literals(a: &ExpressionTerm, b: &ExpressionTerm) -> Option<Ordering> {
    match a {
        ExpressionTerm::StringLiteral(a) => {
            if let ExpressionTerm::StringLiteral(b) = b {
                a.partial_cmp(b)
            } else {
                None
            }
        }
        ExpressionTerm::LangStringLiteral {
            value: va,
            language: la,
        } => {
            if let ExpressionTerm::LangStringLiteral {
                value: vb,
                language: lb,
            } = b
            {
                if la == lb { va.partial_cmp(vb) } else { None }
            } else {
                None
            }
        }
        ExpressionTerm::BooleanLiteral(a) => {
            if let ExpressionTerm::BooleanLiteral(b) = b {
                bool::from(*a).partial_cmp(&bool::from(*b))
            } else {
                None
            }
        }
        ExpressionTerm::FloatLiteral(a) => match b {
            ExpressionTerm::FloatLiteral(b) => a.partial_cmp(b),
            ExpressionTerm::DoubleLiteral(b) => Double::from(*a).partial_cmp(b),
            ExpressionTerm::IntegerLiteral(b) => a.partial_cmp(&Float::from(*b)),
            ExpressionTerm::DecimalLiteral(b) => a.partial_cmp(&(*b).into()),
            _ => None,
        },
        ExpressionTerm::DoubleLiteral(a) => match b {
            ExpressionTerm::FloatLiteral(b) => a.partial_cmp(&(*b).into()),
            ExpressionTerm::DoubleLiteral(b) => a.partial_cmp(b),
            ExpressionTerm::IntegerLiteral(b) => a.partial_cmp(&Double::from(*b)),
            ExpressionTerm::DecimalLiteral(b) => a.partial_cmp(&(*b).into()),
            _ => None,
        },
        ExpressionTerm::IntegerLiteral(a) => match b {
            ExpressionTerm::FloatLiteral(b) => Float::from(*a).partial_cmp(b),
            ExpressionTerm::DoubleLiteral(b) => Double::from(*a).partial_cmp(b),
            ExpressionTerm::IntegerLiteral(b) => a.partial_cmp(b),
            ExpressionTerm::DecimalLiteral(b) => Decimal::from(*a).partial_cmp(b),
            _ => None,
        },
        ExpressionTerm::DecimalLiteral(a) => match b {
            ExpressionTerm::FloatLiteral(b) => Float::from(*a).partial_cmp(b),
            ExpressionTerm::DoubleLiteral(b) => Double::from(*a).partial_cmp(b),
            ExpressionTerm::IntegerLiteral(b) => a.partial_cmp(&Decimal::from(*b)),
            ExpressionTerm::DecimalLiteral(b) => a.partial_cmp(b),
            _ => None,
        },
        ExpressionTerm::DateTimeLiteral(a) => {
            if let ExpressionTerm::DateTimeLiteral(b) = b {
                a.partial_cmp(b)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Total comparison used for ordering
pub(crate) fn cmp_terms(a: Option<&ExpressionTerm>, b: Option<&ExpressionTerm>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match a {
            ExpressionTerm::BlankNode(a) => match b {
                ExpressionTerm::BlankNode(b) => a.as_str().cmp(b.as_str()),
                _ => Ordering::Less,
            },
            ExpressionTerm::NamedNode(a) => match b {
                ExpressionTerm::BlankNode(_) => Ordering::Greater,
                ExpressionTerm::NamedNode(b) => a.as_str().cmp(b.as_str()),
                _ => Ordering::Less,
            },
            _ => match b {
                ExpressionTerm::NamedNode(_) | ExpressionTerm::BlankNode(_) => Ordering::Greater,
                _ => cmp_literals(a, b),
            },
        },
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Literals are first ranked by kind (see [`literal_kind`]), then by value inside a kind.
/// Literals of the same value are ordered by lexical form, datatype and language.
fn cmp_literals(a: &ExpressionTerm, b: &ExpressionTerm) -> Ordering {
    literal_kind(a)
        .cmp(&literal_kind(b))
        .then_with(|| match (a, b) {
            (
                ExpressionTerm::LangStringLiteral {
                    value: va,
                    language: la,
                },
                ExpressionTerm::LangStringLiteral {
                    value: vb,
                    language: lb,
                },
            ) => (la, va).cmp(&(lb, vb)),
            (
                ExpressionTerm::OtherTypedLiteral {
                    value: va,
                    datatype: da,
                },
                ExpressionTerm::OtherTypedLiteral {
                    value: vb,
                    datatype: db,
                },
            ) => (da.as_str(), va).cmp(&(db.as_str(), vb)),
            _ => partial_cmp_literals(a, b).unwrap_or(Ordering::Equal),
        })
        .then_with(|| {
            let (Term::Literal(a), Term::Literal(b)) = (a.clone().into(), b.clone().into()) else {
                return Ordering::Equal;
            };
            (a.value(), a.datatype(), a.language()).cmp(&(b.value(), b.datatype(), b.language()))
        })
}

/// Rank of the kinds of literals, inside which comparing by value is total:
/// NaN, numbers, booleans, date times without and with a timezone, simple literals,
/// language-tagged strings and the other datatypes.
fn literal_kind(term: &ExpressionTerm) -> u8 {
    match term {
        ExpressionTerm::FloatLiteral(v) if f32::from(*v).is_nan() => 0,
        ExpressionTerm::DoubleLiteral(v) if f64::from(*v).is_nan() => 0,
        ExpressionTerm::IntegerLiteral(_)
        | ExpressionTerm::DecimalLiteral(_)
        | ExpressionTerm::FloatLiteral(_)
        | ExpressionTerm::DoubleLiteral(_) => 1,
        ExpressionTerm::BooleanLiteral(_) => 2,
        ExpressionTerm::DateTimeLiteral(v) if v.timezone_offset().is_none() => 3,
        ExpressionTerm::DateTimeLiteral(_) => 4,
        ExpressionTerm::StringLiteral(_) => 5,
        ExpressionTerm::LangStringLiteral { .. } => 6,
        ExpressionTerm::OtherTypedLiteral { .. } => 7,
        ExpressionTerm::NamedNode(_) | ExpressionTerm::BlankNode(_) => 8,
    }
}

pub(crate) enum NumericBinaryOperands {
    Float(Float, Float),
    Double(Double, Double),
    Integer(Integer, Integer),
    Decimal(Decimal, Decimal),
}

impl NumericBinaryOperands {
    pub(crate) fn new(a: ExpressionTerm, b: ExpressionTerm) -> Option<Self> {
        Some(match (a, b) {
            (ExpressionTerm::FloatLiteral(v1), ExpressionTerm::FloatLiteral(v2)) => {
                Self::Float(v1, v2)
            }
            (ExpressionTerm::FloatLiteral(v1), ExpressionTerm::DoubleLiteral(v2)) => {
                Self::Double(v1.into(), v2)
            }
            (ExpressionTerm::FloatLiteral(v1), ExpressionTerm::IntegerLiteral(v2)) => {
                Self::Float(v1, v2.into())
            }
            (ExpressionTerm::FloatLiteral(v1), ExpressionTerm::DecimalLiteral(v2)) => {
                Self::Float(v1, v2.into())
            }
            (ExpressionTerm::DoubleLiteral(v1), ExpressionTerm::FloatLiteral(v2)) => {
                Self::Double(v1, v2.into())
            }
            (ExpressionTerm::DoubleLiteral(v1), ExpressionTerm::DoubleLiteral(v2)) => {
                Self::Double(v1, v2)
            }
            (ExpressionTerm::DoubleLiteral(v1), ExpressionTerm::IntegerLiteral(v2)) => {
                Self::Double(v1, v2.into())
            }
            (ExpressionTerm::DoubleLiteral(v1), ExpressionTerm::DecimalLiteral(v2)) => {
                Self::Double(v1, v2.into())
            }
            (ExpressionTerm::IntegerLiteral(v1), ExpressionTerm::FloatLiteral(v2)) => {
                Self::Float(v1.into(), v2)
            }
            (ExpressionTerm::IntegerLiteral(v1), ExpressionTerm::DoubleLiteral(v2)) => {
                Self::Double(v1.into(), v2)
            }
            (ExpressionTerm::IntegerLiteral(v1), ExpressionTerm::IntegerLiteral(v2)) => {
                Self::Integer(v1, v2)
            }
            (ExpressionTerm::IntegerLiteral(v1), ExpressionTerm::DecimalLiteral(v2)) => {
                Self::Decimal(v1.into(), v2)
            }
            (ExpressionTerm::DecimalLiteral(v1), ExpressionTerm::FloatLiteral(v2)) => {
                Self::Float(v1.into(), v2)
            }
            (ExpressionTerm::DecimalLiteral(v1), ExpressionTerm::DoubleLiteral(v2)) => {
                Self::Double(v1.into(), v2)
            }
            (ExpressionTerm::DecimalLiteral(v1), ExpressionTerm::IntegerLiteral(v2)) => {
                Self::Decimal(v1, v2.into())
            }
            (ExpressionTerm::DecimalLiteral(v1), ExpressionTerm::DecimalLiteral(v2)) => {
                Self::Decimal(v1, v2)
            }
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EvaluationOptions;
    use oxrdf::{Dataset, Variable};
    use spargebra::Query;

    fn eval_str(expression: &str) -> Option<Term> {
        eval_with(expression, &Binding::new())
    }

    fn eval_with(expression: &str, binding: &Binding) -> Option<Term> {
        let query = Query::parse(&format!("SELECT ({expression} AS ?r) WHERE {{}}"), None)
            .unwrap();
        let Query::Select { pattern, .. } = query else {
            unreachable!()
        };
        let crate::algebra::Op::Project { inner, .. } = crate::algebra::Op::from(&pattern) else {
            unreachable!()
        };
        let crate::algebra::Op::Extend { bindings, .. } = *inner else {
            unreachable!()
        };
        let dataset = Dataset::new();
        let context = ExecutionContext::new(&dataset, EvaluationOptions::default());
        evaluate_expression(&bindings[0].1, binding, &context)
    }

    fn int(value: i64) -> Option<Term> {
        Some(Literal::from(value).into())
    }

    #[test]
    fn arithmetic_promotion() {
        assert_eq!(eval_str("1 + 2"), int(3));
        assert_eq!(
            eval_str("1 / 2"),
            Some(Literal::from(Decimal::from(5).checked_div(10).unwrap()).into())
        );
        assert_eq!(eval_str("1 / 0"), None);
        assert_eq!(eval_str("-(3)"), int(-3));
        assert_eq!(eval_str("1 + \"a\""), None);
    }

    #[test]
    fn logical_error_recovery() {
        assert_eq!(eval_str("true || ?unbound"), Some(Literal::from(true).into()));
        assert_eq!(eval_str("?unbound || true"), Some(Literal::from(true).into()));
        assert_eq!(eval_str("false && ?unbound"), Some(Literal::from(false).into()));
        assert_eq!(eval_str("?unbound && true"), None);
        assert_eq!(eval_str("?unbound || false"), None);
    }

    #[test]
    fn string_functions() {
        assert_eq!(
            eval_str("SUBSTR(\"foobar\", 4)"),
            Some(Literal::from("bar").into())
        );
        assert_eq!(
            eval_str("SUBSTR(\"foobar\", 4, 1)"),
            Some(Literal::from("b").into())
        );
        assert_eq!(
            eval_str("UCASE(\"foo\"@en)"),
            Some(Literal::new_language_tagged_literal_unchecked("FOO", "en").into())
        );
        assert_eq!(
            eval_str("STRBEFORE(\"abc\", \"b\")"),
            Some(Literal::from("a").into())
        );
        assert_eq!(eval_str("STRAFTER(\"abc\", \"z\")"), Some(Literal::from("").into()));
        assert_eq!(
            eval_str("ENCODE_FOR_URI(\"Los Angeles\")"),
            Some(Literal::from("Los%20Angeles").into())
        );
        assert_eq!(
            eval_str("REPLACE(\"abcd\", \"b\", \"Z\")"),
            Some(Literal::from("aZcd").into())
        );
        assert_eq!(eval_str("STRLEN(\"chat\")"), int(4));
        assert_eq!(
            eval_str("CONCAT(\"a\"@en, \"b\"@en)"),
            Some(Literal::new_language_tagged_literal_unchecked("ab", "en").into())
        );
        assert_eq!(
            eval_str("LANGMATCHES(\"en-US\", \"en\")"),
            Some(Literal::from(true).into())
        );
        assert_eq!(
            eval_str("REGEX(\"Alice\", \"^ali\", \"i\")"),
            Some(Literal::from(true).into())
        );
    }

    #[test]
    fn hash_functions() {
        assert_eq!(
            eval_str("MD5(\"abc\")"),
            Some(Literal::from("900150983cd24fb0d6963f7d28e17f72").into())
        );
        assert_eq!(
            eval_str("SHA1(\"abc\")"),
            Some(Literal::from("a9993e364706816aba3e25717850c26c9cd0d89d").into())
        );
    }

    #[test]
    fn uuid() {
        let Some(Term::Literal(uuid)) = eval_str("STRUUID()") else {
            panic!("STRUUID must return a literal")
        };
        assert!(
            Regex::new("^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
                .unwrap()
                .is_match(uuid.value()),
            "{uuid} is not a valid UUID"
        );
    }

    #[test]
    fn casts_and_datatypes() {
        assert_eq!(eval_str("xsd:integer(\"12\")").or(eval_str(
            "<http://www.w3.org/2001/XMLSchema#integer>(\"12\")"
        )), int(12));
        assert_eq!(
            eval_str("DATATYPE(1.5)"),
            Some(xsd::DECIMAL.into_owned().into())
        );
        assert_eq!(
            eval_str("<http://www.w3.org/2001/XMLSchema#boolean>(\"nope\")"),
            None
        );
        assert_eq!(
            eval_str("YEAR(\"2011-01-10T14:45:13.815-05:00\"^^<http://www.w3.org/2001/XMLSchema#dateTime>)"),
            int(2011)
        );
        assert_eq!(
            eval_str("TZ(\"2011-01-10T14:45:13.815Z\"^^<http://www.w3.org/2001/XMLSchema#dateTime>)"),
            Some(Literal::from("Z").into())
        );
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval_str("1 < 1.5"), Some(Literal::from(true).into()));
        assert_eq!(eval_str("\"a\" < 1"), None);
        assert_eq!(eval_str("1 = 1.0"), Some(Literal::from(true).into()));
        assert_eq!(eval_str("sameTerm(1, 1.0)"), Some(Literal::from(false).into()));
        assert_eq!(eval_str("1 IN (2, 1)"), Some(Literal::from(true).into()));
        assert_eq!(eval_str("1 NOT IN ()"), Some(Literal::from(true).into()));
    }

    #[test]
    fn variables_keep_their_lexical_form() {
        let x = Variable::new_unchecked("x");
        let value = Term::from(Literal::new_typed_literal("01", xsd::INTEGER));
        let binding = Binding::singleton(x, value.clone());
        assert_eq!(eval_with("?x", &binding), Some(value));
        assert_eq!(eval_with("COALESCE(?y, ?x)", &binding), Some(Literal::new_typed_literal("01", xsd::INTEGER).into()));
        assert_eq!(eval_with("?x + 0", &binding), int(1));
    }

    #[test]
    fn substr_positions_out_of_the_string() {
        let text = |v: &str| Some(Term::from(Literal::from(v)));
        assert_eq!(eval_str(r#"SUBSTR("abc", 2)"#), text("bc"));
        assert_eq!(eval_str(r#"SUBSTR("abc", 0, 2)"#), text("a"));
        assert_eq!(eval_str(r#"SUBSTR("abc", -1, 3)"#), text("a"));
        assert_eq!(eval_str(r#"SUBSTR("abc", -5)"#), text("abc"));
        assert_eq!(eval_str(r#"SUBSTR("abc", 2, -1)"#), text(""));
        assert_eq!(eval_str(r#"SUBSTR("abc", 5)"#), text(""));
        assert_eq!(eval_str(r#"SUBSTR("été", 2, 1)"#), text("t"));
    }

    #[test]
    fn ordering_of_mixed_literals_does_not_depend_on_input_order() {
        let terms: Vec<Term> = vec![
            Literal::from(10).into(),
            Literal::from(9).into(),
            Literal::from("5").into(),
            Literal::from(2.5).into(),
            Literal::from(f64::NAN).into(),
            Literal::from(true).into(),
            Literal::new_language_tagged_literal_unchecked("a", "en").into(),
            Literal::new_typed_literal("2020-01-01T00:00:00", xsd::DATE_TIME).into(),
            Literal::new_typed_literal("2020-01-01T00:00:00Z", xsd::DATE_TIME).into(),
            Literal::new_typed_literal("x", NamedNode::new_unchecked("http://example.com/t")).into(),
            Literal::new_typed_literal("010", xsd::INTEGER).into(),
        ];
        let sort = |mut terms: Vec<Term>| {
            terms.sort_by(|a, b| compare_terms(Some(a), Some(b)));
            terms
        };
        let expected = sort(terms.clone());
        for rotation in 0..terms.len() {
            let mut input = terms.clone();
            input.rotate_left(rotation);
            assert_eq!(sort(input.clone()), expected);
            input.reverse();
            assert_eq!(sort(input), expected);
        }
        for a in &terms {
            for b in &terms {
                for c in &terms {
                    if compare_terms(Some(a), Some(b)).is_le()
                        && compare_terms(Some(b), Some(c)).is_le()
                    {
                        assert!(compare_terms(Some(a), Some(c)).is_le(), "{a} {b} {c}");
                    }
                }
            }
        }
        let position = |term: Term| expected.iter().position(|t| *t == term);
        assert!(position(Literal::from(9).into()) < position(Literal::from(10).into()));
        assert!(position(Literal::from(10).into()) < position(Literal::from("5").into()));
    }

    #[test]
    fn ordering() {
        let iri = Term::from(NamedNode::new_unchecked("http://example.com"));
        let bnode = Term::from(BlankNode::default());
        let one = Term::from(Literal::from(1));
        let text = Term::from(Literal::from("a"));
        assert_eq!(compare_terms(None, Some(&bnode)), Ordering::Less);
        assert_eq!(compare_terms(Some(&bnode), Some(&iri)), Ordering::Less);
        assert_eq!(compare_terms(Some(&iri), Some(&one)), Ordering::Less);
        assert_ne!(compare_terms(Some(&one), Some(&text)), Ordering::Equal);
        assert_eq!(
            compare_terms(Some(&one), Some(&text)),
            compare_terms(Some(&text), Some(&one)).reverse()
        );
    }
}
