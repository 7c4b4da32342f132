//! Declarative request binding.
//!
//! An [`Input`] type lists where each of its fields comes from. The list is
//! compiled once when the route is registered: schemas are derived, wire
//! kinds are checked against them and text constraints are prepared. At
//! request time the compiled plan fills a fresh `Default` value and collects
//! every field error instead of stopping at the first one.
//!
//! ```rust,ignore
//! #[derive(Default)]
//! struct ListUsers {
//!     limit: Option<u32>,
//!     tags: Vec<String>,
//!     session: String,
//! }
//!
//! impl Input for ListUsers {
//!     fn declare(b: &mut Bindings<Self>) {
//!         b.query("limit", |s| &mut s.limit);
//!         b.query("tags", |s| &mut s.tags).delimiter(Delimiter::Comma);
//!         b.cookie("session", |s| &mut s.session);
//!     }
//! }
//! ```

use crate::context::Context;
use crate::error::RegistrationError;
use crate::handler::Contract;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use http::Method;
use rivet_openapi::{
    Describe, MediaType, Parameter, ParameterLocation, RefOr, RequestBody, Schema, SchemaKind,
    TypeRef,
};
use rivet_validate::{
    Constraints, FieldFault, FromWire, Locale, PatternError, ValidationError, WireKind,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::TypeId;
use std::collections::BTreeMap;

/// Where a bound value is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Path,
    Query,
    Header,
    Cookie,
    Body,
}

impl Source {
    pub const fn as_str(self) -> &'static str {
        match self {
            Source::Path => "path",
            Source::Query => "query",
            Source::Header => "header",
            Source::Cookie => "cookie",
            Source::Body => "body",
        }
    }

    pub fn location(self) -> Option<ParameterLocation> {
        match self {
            Source::Path => Some(ParameterLocation::Path),
            Source::Query => Some(ParameterLocation::Query),
            Source::Header => Some(ParameterLocation::Header),
            Source::Cookie => Some(ParameterLocation::Cookie),
            Source::Body => None,
        }
    }

    /// Field path used in error reports, e.g. `query/limit`.
    pub fn field_path(self, name: &str) -> String {
        match self {
            Source::Body => "body".to_string(),
            _ => format!("{}/{name}", self.as_str()),
        }
    }
}

/// Separator for several values packed into one raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Space,
    Pipe,
}

impl Delimiter {
    pub const fn as_char(self) -> char {
        match self {
            Delimiter::Comma => ',',
            Delimiter::Space => ' ',
            Delimiter::Pipe => '|',
        }
    }

    /// OpenAPI `style` and `explode` for a delimited parameter.
    fn style(self, source: Source) -> (&'static str, bool) {
        match (self, source) {
            (Delimiter::Comma, Source::Query | Source::Cookie) => ("form", false),
            (Delimiter::Comma, _) => ("simple", false),
            (Delimiter::Space, _) => ("spaceDelimited", false),
            (Delimiter::Pipe, _) => ("pipeDelimited", false),
        }
    }
}

/// How many tokens a parameter consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    One,
    Many,
    Exactly(usize),
}

/// A field type that can be bound from path, query, header or cookie values.
///
/// Scalars consume one token, `Vec<T>` any number and `[T; N]` exactly `N`.
/// `Option<P>` makes `P` optional. Custom scalar types implement
/// [`FromWire`] and [`Describe`] and then use [`scalar_param!`](crate::scalar_param).
pub trait Param: Send + Sized + 'static {
    /// Type of each decoded token.
    type Item: FromWire + Describe;

    const ARITY: Arity = Arity::One;

    /// Missing values leave the field at its default.
    const OPTIONAL: bool = false;

    /// Type documented for the parameter.
    fn doc_type() -> TypeRef;

    /// Build the field from decoded tokens. `None` when the count is wrong.
    fn assemble(items: Vec<Self::Item>) -> Option<Self>;
}

/// Implement [`Param`] for single-token types.
#[macro_export]
macro_rules! scalar_param {
    ($($ty:ty),* $(,)?) => {$(
        impl $crate::Param for $ty {
            type Item = $ty;

            fn doc_type() -> $crate::openapi::TypeRef {
                $crate::openapi::TypeRef::of::<$ty>()
            }

            fn assemble(items: ::std::vec::Vec<$ty>) -> ::std::option::Option<$ty> {
                items.into_iter().next()
            }
        }
    )*};
}

scalar_param!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    f32,
    f64,
    String,
    NaiveDate,
    DateTime<Utc>,
);

impl<P: Param> Param for Option<P> {
    type Item = P::Item;
    const ARITY: Arity = P::ARITY;
    const OPTIONAL: bool = true;

    fn doc_type() -> TypeRef {
        P::doc_type()
    }

    fn assemble(items: Vec<Self::Item>) -> Option<Self> {
        P::assemble(items).map(Some)
    }
}

impl<T: FromWire + Describe + Send> Param for Vec<T> {
    type Item = T;
    const ARITY: Arity = Arity::Many;

    fn doc_type() -> TypeRef {
        TypeRef::of::<Vec<T>>()
    }

    fn assemble(items: Vec<T>) -> Option<Self> {
        Some(items)
    }
}

impl<T: FromWire + Describe + Send, const N: usize> Param for [T; N] {
    type Item = T;
    const ARITY: Arity = Arity::Exactly(N);

    fn doc_type() -> TypeRef {
        TypeRef::of::<[T; N]>()
    }

    fn assemble(items: Vec<T>) -> Option<Self> {
        items.try_into().ok()
    }
}

/// A handler input assembled from the request.
pub trait Input: Default + Send + 'static {
    fn declare(b: &mut Bindings<Self>);
}

impl Input for () {
    fn declare(_b: &mut Bindings<Self>) {}
}

type ValueFn<S> =
    dyn Fn(&mut S, &[&str], &Constraints, &dyn Locale, &str, &mut ValidationError) + Send + Sync;
type BodyFn<S> = dyn Fn(&mut S, &Bytes, &mut ValidationError) + Send + Sync;

enum Apply<S> {
    Values(Box<ValueFn<S>>),
    Body(Box<BodyFn<S>>),
}

#[derive(Debug, Clone, Default)]
struct RuleOptions {
    optional: bool,
    delimiter: Option<Delimiter>,
    description: Option<String>,
    deprecated: bool,
    shared: Option<String>,
    example: Option<Value>,
}

struct RuleSpec {
    arity: Arity,
    optional_type: bool,
    /// Per-token type; the body type for the body.
    item: TypeRef,
    kind: Option<WireKind>,
    doc: TypeRef,
}

struct Rule<S> {
    source: Source,
    name: String,
    options: RuleOptions,
    spec: RuleSpec,
    apply: Apply<S>,
}

/// Binding declarations of one input type.
pub struct Bindings<S> {
    rules: Vec<Rule<S>>,
}

/// Options of the binding just declared.
pub struct RuleBuilder<'a> {
    options: &'a mut RuleOptions,
}

impl RuleBuilder<'_> {
    /// A missing value leaves the field at its default.
    pub fn optional(self) -> Self {
        self.options.optional = true;
        self
    }

    /// Split each raw value on `delimiter`.
    pub fn delimiter(self, delimiter: Delimiter) -> Self {
        self.options.delimiter = Some(delimiter);
        self
    }

    pub fn description(self, description: impl Into<String>) -> Self {
        self.options.description = Some(description.into());
        self
    }

    pub fn deprecated(self) -> Self {
        self.options.deprecated = true;
        self
    }

    pub fn example(self, example: Value) -> Self {
        self.options.example = Some(example);
        self
    }

    /// Document the parameter or body once under `components` with `key`.
    pub fn shared(self, key: impl Into<String>) -> Self {
        self.options.shared = Some(key.into());
        self
    }
}

impl<S: 'static> Bindings<S> {
    fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn path<F: Param>(&mut self, name: &str, field: fn(&mut S) -> &mut F) -> RuleBuilder<'_> {
        self.value(Source::Path, name, field)
    }

    pub fn query<F: Param>(&mut self, name: &str, field: fn(&mut S) -> &mut F) -> RuleBuilder<'_> {
        self.value(Source::Query, name, field)
    }

    pub fn header<F: Param>(
        &mut self,
        name: &str,
        field: fn(&mut S) -> &mut F,
    ) -> RuleBuilder<'_> {
        self.value(Source::Header, &name.to_ascii_lowercase(), field)
    }

    pub fn cookie<F: Param>(
        &mut self,
        name: &str,
        field: fn(&mut S) -> &mut F,
    ) -> RuleBuilder<'_> {
        self.value(Source::Cookie, name, field)
    }

    /// Required JSON request body.
    pub fn body<T>(&mut self, field: fn(&mut S) -> &mut T) -> RuleBuilder<'_>
    where
        T: DeserializeOwned + Describe + Send,
    {
        self.push_body::<T>(false, move |target, value| *field(target) = value)
    }

    /// JSON request body that may be absent.
    pub fn optional_body<T>(&mut self, field: fn(&mut S) -> &mut Option<T>) -> RuleBuilder<'_>
    where
        T: DeserializeOwned + Describe + Send,
    {
        self.push_body::<T>(true, move |target, value| *field(target) = Some(value))
    }

    fn push_body<T>(
        &mut self,
        optional: bool,
        set: impl Fn(&mut S, T) + Send + Sync + 'static,
    ) -> RuleBuilder<'_>
    where
        T: DeserializeOwned + Describe + Send,
    {
        let apply = move |target: &mut S, body: &Bytes, errors: &mut ValidationError| {
            match serde_json::from_slice::<T>(body) {
                Ok(value) => set(target, value),
                Err(err) => errors.add_fault("body", &FieldFault::Invalid(err.to_string())),
            }
        };
        self.push(Rule {
            source: Source::Body,
            name: "body".to_string(),
            options: RuleOptions {
                optional,
                ..RuleOptions::default()
            },
            spec: RuleSpec {
                arity: Arity::One,
                optional_type: optional,
                item: TypeRef::of::<T>(),
                kind: None,
                doc: TypeRef::of::<T>(),
            },
            apply: Apply::Body(Box::new(apply)),
        })
    }

    fn value<F: Param>(
        &mut self,
        source: Source,
        name: &str,
        field: fn(&mut S) -> &mut F,
    ) -> RuleBuilder<'_> {
        let apply = move |target: &mut S,
                          tokens: &[&str],
                          constraints: &Constraints,
                          locale: &dyn Locale,
                          path: &str,
                          errors: &mut ValidationError| {
            let tokens = match F::ARITY {
                Arity::One => &tokens[..1],
                _ => tokens,
            };
            if let Arity::Exactly(expected) = F::ARITY {
                if tokens.len() != expected {
                    let fault = FieldFault::Count {
                        expected,
                        actual: tokens.len(),
                    };
                    errors.add_fault(path, &fault);
                    return;
                }
            }
            if let Err(fault) = constraints.check_items(tokens) {
                errors.add_fault(path, &fault);
                return;
            }
            let numeric = matches!(
                <F::Item as FromWire>::KIND,
                WireKind::Integer | WireKind::Number
            );

            let mut items = Vec::with_capacity(tokens.len());
            let mut failed = false;
            for (index, token) in tokens.iter().enumerate() {
                let decoded = constraints
                    .check(token)
                    .and_then(|()| <F::Item as FromWire>::from_wire(token, locale))
                    .and_then(|item| {
                        if numeric {
                            constraints.check_range(token, locale)?;
                        }
                        Ok(item)
                    });
                match decoded {
                    Ok(item) => items.push(item),
                    Err(err) => {
                        failed = true;
                        let at = match F::ARITY {
                            Arity::One => path.to_string(),
                            _ => format!("{path}[{index}]"),
                        };
                        errors.add_fault(at, &FieldFault::Coercion(err));
                    }
                }
            }
            if failed {
                return;
            }
            let actual = items.len();
            match F::assemble(items) {
                Some(value) => *field(target) = value,
                None => errors.add_fault(
                    path,
                    &FieldFault::Count {
                        expected: actual,
                        actual,
                    },
                ),
            }
        };

        self.push(Rule {
            source,
            name: name.to_string(),
            options: RuleOptions::default(),
            spec: RuleSpec {
                arity: F::ARITY,
                optional_type: F::OPTIONAL,
                item: TypeRef::of::<F::Item>(),
                kind: Some(<F::Item as FromWire>::KIND),
                doc: F::doc_type(),
            },
            apply: Apply::Values(Box::new(apply)),
        })
    }

    fn push(&mut self, rule: Rule<S>) -> RuleBuilder<'_> {
        self.rules.push(rule);
        let last = self.rules.len() - 1;
        RuleBuilder {
            options: &mut self.rules[last].options,
        }
    }
}

/// A documented parameter waiting for endpoint doc overrides.
#[derive(Debug, Clone)]
pub(crate) struct DocParam {
    pub source: Source,
    pub name: String,
    pub parameter: Parameter,
    pub shared: Option<String>,
}

/// A parameter recorded for the documentation cross-check.
#[derive(Debug, Clone)]
pub(crate) struct BoundParam {
    pub source: Source,
    pub name: String,
    pub doc_type: TypeId,
    pub doc_type_name: &'static str,
}

struct CompiledRule<S> {
    source: Source,
    name: String,
    field: String,
    optional: bool,
    delimiter: Option<Delimiter>,
    constraints: Constraints,
    apply: Apply<S>,
}

/// Compiled bindings of one route.
pub(crate) struct BindingPlan<S> {
    rules: Vec<CompiledRule<S>>,
}

const BODYLESS: [Method; 5] = [
    Method::GET,
    Method::HEAD,
    Method::DELETE,
    Method::OPTIONS,
    Method::TRACE,
];

impl<S: Input> BindingPlan<S> {
    /// Check the declarations of `S` for the route in `contract` and record
    /// their documentation. Faults are pushed onto `contract.errors`.
    pub(crate) fn compile(contract: &mut Contract<'_>) -> Self {
        let mut bindings = Bindings::<S>::new();
        S::declare(&mut bindings);

        let mut rules = Vec::with_capacity(bindings.rules.len());
        let mut seen: Vec<(Source, String)> = Vec::new();
        let mut bodies = 0;

        for rule in bindings.rules {
            let field = rule.source.field_path(&rule.name);
            let key = (rule.source, rule.name.clone());
            if rule.source == Source::Body {
                bodies += 1;
                if bodies == 2 {
                    contract.errors.push(RegistrationError::MultipleBodies {
                        route: contract.route.clone(),
                    });
                }
                if bodies > 1 {
                    continue;
                }
            } else if seen.contains(&key) {
                contract.errors.push(RegistrationError::DuplicateBinding {
                    route: contract.route.clone(),
                    location: rule.source.as_str(),
                    name: rule.name.clone(),
                });
                continue;
            }
            seen.push(key);

            let compiled = match rule.source {
                Source::Body => {
                    compile_body(contract, &rule.options, &rule.spec).map(|()| Constraints::new())
                }
                _ => compile_value(
                    contract,
                    rule.source,
                    &rule.name,
                    &field,
                    &rule.options,
                    &rule.spec,
                ),
            };
            let Some(constraints) = compiled else {
                continue;
            };

            rules.push(CompiledRule {
                source: rule.source,
                optional: rule.options.optional || rule.spec.optional_type,
                delimiter: rule.options.delimiter,
                name: rule.name,
                field,
                constraints,
                apply: rule.apply,
            });
        }

        BindingPlan { rules }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Fill a fresh `S` from the request.
    pub(crate) fn bind(&self, ctx: &Context) -> Result<S, ValidationError> {
        let mut target = S::default();
        let mut errors = ValidationError::new(Vec::new());

        for rule in &self.rules {
            match &rule.apply {
                Apply::Body(apply) => {
                    if ctx.body().is_empty() {
                        if !rule.optional {
                            errors.add_fault(&rule.field, &FieldFault::Required);
                        }
                        continue;
                    }
                    apply(&mut target, ctx.body(), &mut errors);
                }
                Apply::Values(apply) => {
                    let raw = raw_values(ctx, rule.source, &rule.name);
                    let tokens = split_tokens(&raw, rule.delimiter);
                    if tokens.is_empty() {
                        if !rule.optional {
                            errors.add_fault(&rule.field, &FieldFault::Required);
                        }
                        continue;
                    }
                    apply(
                        &mut target,
                        &tokens,
                        &rule.constraints,
                        ctx.locale(),
                        &rule.field,
                        &mut errors,
                    );
                }
            }
        }

        errors.into_result(target)
    }
}

fn raw_values(ctx: &Context, source: Source, name: &str) -> Vec<String> {
    match source {
        Source::Path => ctx.param(name).map(str::to_string).into_iter().collect(),
        Source::Query => ctx.query_values(name).into_iter().map(str::to_string).collect(),
        Source::Header => ctx.header_values(name).into_iter().map(str::to_string).collect(),
        Source::Cookie => ctx.cookie(name).into_iter().collect(),
        Source::Body => Vec::new(),
    }
}

fn split_tokens(raw: &[String], delimiter: Option<Delimiter>) -> Vec<&str> {
    match delimiter {
        Some(d) => raw.iter().flat_map(|v| v.split(d.as_char())).collect(),
        None => raw.iter().map(String::as_str).collect(),
    }
}

fn kind_name(kind: SchemaKind) -> &'static str {
    match kind {
        SchemaKind::Boolean => "boolean",
        SchemaKind::Integer => "integer",
        SchemaKind::Number => "number",
        SchemaKind::String => "string",
        SchemaKind::Array => "array",
        SchemaKind::Object => "object",
        SchemaKind::Null => "null",
        SchemaKind::Reference => "reference",
        SchemaKind::Union => "oneOf",
        SchemaKind::Any => "any",
    }
}

fn kind_matches(wire: WireKind, schema: SchemaKind) -> bool {
    matches!(
        (wire, schema),
        (WireKind::Boolean, SchemaKind::Boolean)
            | (WireKind::Integer, SchemaKind::Integer)
            | (WireKind::Number, SchemaKind::Number)
            | (WireKind::String, SchemaKind::String)
    )
}

fn constraints_for(schema: &Schema) -> Result<Constraints, PatternError> {
    let to_usize = |v: Option<u64>| v.and_then(|n| usize::try_from(n).ok());
    let mut constraints =
        Constraints::new().length(to_usize(schema.min_length), to_usize(schema.max_length));
    if let Some(pattern) = &schema.pattern {
        constraints = constraints.pattern(pattern)?;
    }
    if let Some(values) = &schema.enum_values {
        let allowed = values
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        constraints = constraints.one_of(allowed);
    }
    let bound = |n: &Option<serde_json::Number>| n.as_ref().and_then(|n| n.as_f64());
    Ok(constraints.range(bound(&schema.minimum), bound(&schema.maximum)))
}

fn with_items(constraints: Constraints, schema: &Schema) -> Constraints {
    let to_usize = |v: Option<u64>| v.and_then(|n| usize::try_from(n).ok());
    constraints.items(
        to_usize(schema.min_items),
        to_usize(schema.max_items),
        schema.unique_items.unwrap_or(false),
    )
}

fn compile_value(
    contract: &mut Contract<'_>,
    source: Source,
    name: &str,
    field: &str,
    options: &RuleOptions,
    spec: &RuleSpec,
) -> Option<Constraints> {
    let route = contract.route.clone();
    let mut ok = true;

    if source == Source::Path && !contract.path_params.iter().any(|p| p == name) {
        contract.errors.push(RegistrationError::UnknownPathParam {
            route: route.clone(),
            name: name.to_string(),
        });
        ok = false;
    }
    if matches!(source, Source::Path | Source::Cookie) && spec.arity != Arity::One {
        contract.errors.push(RegistrationError::MultiValueNotAllowed {
            route: route.clone(),
            location: source.as_str(),
            name: name.to_string(),
        });
        ok = false;
    }

    if options.delimiter.is_some() && spec.arity == Arity::One {
        contract.errors.push(RegistrationError::DelimiterNotAllowed {
            route: route.clone(),
            binding: field.to_string(),
        });
        ok = false;
    }

    let item_schema = match contract.registry.schema_for(&spec.item) {
        Ok(schema) => contract.registry.resolve(&schema).clone(),
        Err(err) => {
            contract.errors.push(RegistrationError::Schema { route, source: err });
            return None;
        }
    };
    if let Some(wire) = spec.kind {
        if !kind_matches(wire, item_schema.kind()) {
            contract.errors.push(RegistrationError::TypeMismatch {
                route: route.clone(),
                binding: field.to_string(),
                wire: wire.as_str(),
                schema: kind_name(item_schema.kind()).to_string(),
            });
            ok = false;
        }
    }
    let constraints = match constraints_for(&item_schema) {
        Ok(constraints) => constraints,
        Err(err) => {
            contract.errors.push(RegistrationError::InvalidPattern {
                route: route.clone(),
                binding: field.to_string(),
                message: err.to_string(),
            });
            return None;
        }
    };

    let schema = match contract.registry.schema_for(&spec.doc) {
        Ok(schema) => schema,
        Err(err) => {
            contract.errors.push(RegistrationError::Schema { route, source: err });
            return None;
        }
    };
    let constraints = match spec.arity {
        Arity::One => constraints,
        _ => with_items(constraints, contract.registry.resolve(&schema)),
    };
    let (style, explode) = match options.delimiter {
        Some(d) if spec.arity != Arity::One => {
            let (style, explode) = d.style(source);
            (Some(style.to_string()), Some(explode))
        }
        _ => (None, None),
    };
    let location = source.location()?;
    let mut parameter = Parameter {
        name: name.to_string(),
        location,
        description: options.description.clone(),
        required: source == Source::Path || !(options.optional || spec.optional_type),
        deprecated: options.deprecated,
        schema,
        style,
        explode,
    };
    if let Some(example) = &options.example {
        parameter.schema.example = Some(example.clone());
    }
    contract.bound.push(BoundParam {
        source,
        name: name.to_string(),
        doc_type: spec.doc.id(),
        doc_type_name: spec.doc.rust_name(),
    });
    contract.parameters.push(DocParam {
        source,
        name: name.to_string(),
        parameter,
        shared: options.shared.clone(),
    });

    ok.then_some(constraints)
}

fn compile_body(contract: &mut Contract<'_>, options: &RuleOptions, spec: &RuleSpec) -> Option<()> {
    let route = contract.route.clone();
    if BODYLESS.contains(&contract.method) {
        contract.errors.push(RegistrationError::BodyNotAllowed {
            route,
            method: contract.method.clone(),
        });
        return None;
    }
    let mut schema = match contract.registry.schema_for(&spec.doc) {
        Ok(schema) => schema,
        Err(source) => {
            contract.errors.push(RegistrationError::Schema { route, source });
            return None;
        }
    };
    if let Some(example) = &options.example {
        schema.example = Some(example.clone());
    }
    let body = RequestBody {
        description: options.description.clone(),
        required: !options.optional,
        content: BTreeMap::from([("application/json".to_string(), MediaType::new(schema))]),
    };
    let body = match &options.shared {
        Some(key) => match contract.components.request_bodies.register(key, body) {
            Ok(reference) => reference,
            Err(conflict) => {
                contract.errors.push(conflict.into());
                return None;
            }
        },
        None => RefOr::Item(body),
    };
    contract.request_body = Some(body);
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ComponentTables;
    use crate::path::PathParams;
    use rivet_openapi::{SchemaRegistry, Shape, StringShape};
    use std::borrow::Cow;

    #[derive(Debug, Default)]
    struct Slug(String);

    impl Describe for Slug {
        fn type_name() -> Option<Cow<'static, str>> {
            Some("Slug".into())
        }

        fn shape() -> Shape {
            Shape::String(StringShape::new().pattern("^[a-z-]+$").length(Some(2), Some(12)))
        }
    }

    impl FromWire for Slug {
        const KIND: WireKind = WireKind::String;

        fn from_wire(raw: &str, _locale: &dyn Locale) -> Result<Self, rivet_validate::CoercionError> {
            Ok(Slug(raw.to_string()))
        }
    }

    crate::scalar_param!(Slug);

    #[derive(Debug, Default)]
    struct Search {
        id: u64,
        limit: Option<u16>,
        tags: Vec<String>,
        point: [i32; 2],
        slug: Option<Slug>,
        trace: Option<String>,
        session: Option<String>,
    }

    impl Input for Search {
        fn declare(b: &mut Bindings<Self>) {
            b.path("id", |s| &mut s.id);
            b.query("limit", |s| &mut s.limit);
            b.query("tags", |s| &mut s.tags).delimiter(Delimiter::Comma);
            b.query("point", |s| &mut s.point).delimiter(Delimiter::Pipe);
            b.query("slug", |s| &mut s.slug);
            b.header("X-Trace", |s| &mut s.trace);
            b.cookie("session", |s| &mut s.session);
        }
    }

    struct Harness {
        registry: SchemaRegistry,
        components: ComponentTables,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                registry: SchemaRegistry::new(),
                components: ComponentTables::default(),
            }
        }

        fn compile<S: Input>(
            &mut self,
            method: Method,
            params: &[&str],
        ) -> (BindingPlan<S>, Vec<RegistrationError>) {
            let mut contract = Contract::new(
                format!("{method} /test"),
                method,
                params.iter().map(|p| p.to_string()).collect(),
                &mut self.registry,
                &mut self.components,
            );
            let plan = BindingPlan::<S>::compile(&mut contract);
            (plan, contract.errors)
        }
    }

    fn ctx(uri: &str, headers: &[(&str, &str)], body: &str, params: &[(&str, &str)]) -> Context {
        let mut builder = http::Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Bytes::from(body.to_string())).unwrap();
        Context::builder(request)
            .params(params.iter().copied().collect::<PathParams>())
            .build()
    }

    #[test]
    fn binds_every_source() {
        let mut h = Harness::new();
        let (plan, errors) = h.compile::<Search>(Method::GET, &["id"]);
        assert!(errors.is_empty(), "{errors:?}");

        let ctx = ctx(
            "/test?limit=10&tags=a,b&tags=c&point=3|-4&slug=hello-world",
            &[("x-trace", "t1"), ("cookie", "session=s1")],
            "",
            &[("id", "7")],
        );
        let search = plan.bind(&ctx).unwrap();
        assert_eq!(search.id, 7);
        assert_eq!(search.limit, Some(10));
        assert_eq!(search.tags, vec!["a", "b", "c"]);
        assert_eq!(search.point, [3, -4]);
        assert_eq!(search.slug.map(|s| s.0).as_deref(), Some("hello-world"));
        assert_eq!(search.trace.as_deref(), Some("t1"));
        assert_eq!(search.session.as_deref(), Some("s1"));
    }

    #[test]
    fn missing_optional_values_keep_defaults() {
        let mut h = Harness::new();
        let (plan, _) = h.compile::<Search>(Method::GET, &["id"]);
        let err = plan.bind(&ctx("/test", &[], "", &[("id", "1")])).unwrap_err();
        // `point` is a required fixed array; tags is a required Vec.
        let fields: Vec<&str> = err.fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["query/tags", "query/point"]);
        assert!(err.fields.iter().all(|f| f.code == "required"));
    }

    #[test]
    fn all_field_errors_are_reported_together() {
        let mut h = Harness::new();
        let (plan, _) = h.compile::<Search>(Method::GET, &["id"]);
        let ctx = ctx(
            "/test?limit=70000&tags=x&point=1|2|3&slug=Bad_Slug",
            &[],
            "",
            &[("id", "abc")],
        );
        let err = plan.bind(&ctx).unwrap_err();
        assert_eq!(err.get("path/id")[0].code, "format");
        assert_eq!(err.get("query/limit")[0].code, "overflow");
        assert_eq!(err.get("query/point")[0].code, "count");
        assert_eq!(err.get("query/slug")[0].code, "pattern");
        assert_eq!(err.len(), 4);
    }

    #[test]
    fn element_errors_carry_their_index() {
        #[derive(Debug, Default)]
        struct Ids {
            ids: Vec<u8>,
        }
        impl Input for Ids {
            fn declare(b: &mut Bindings<Self>) {
                b.query("ids", |s| &mut s.ids).delimiter(Delimiter::Space);
            }
        }

        let mut h = Harness::new();
        let (plan, _) = h.compile::<Ids>(Method::GET, &[]);
        let err = plan.bind(&ctx("/test?ids=1+300+x", &[], "", &[])).unwrap_err();
        let fields: Vec<&str> = err.fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["query/ids[1]", "query/ids[2]"]);
    }

    #[derive(Debug, Default, serde::Deserialize, PartialEq)]
    struct NewUser {
        name: String,
    }

    impl Describe for NewUser {
        fn type_name() -> Option<Cow<'static, str>> {
            Some("NewUser".into())
        }

        fn shape() -> Shape {
            Shape::record().field::<String>("name").build()
        }
    }

    #[derive(Debug, Default)]
    struct Create {
        user: NewUser,
    }

    impl Input for Create {
        fn declare(b: &mut Bindings<Self>) {
            b.body(|s| &mut s.user).description("User to create");
        }
    }

    #[test]
    fn body_is_decoded_as_json() {
        let mut h = Harness::new();
        let (plan, errors) = h.compile::<Create>(Method::POST, &[]);
        assert!(errors.is_empty());
        let created = plan.bind(&ctx("/test", &[], r#"{"name":"ann"}"#, &[])).unwrap();
        assert_eq!(created.user.name, "ann");

        let empty = plan.bind(&ctx("/test", &[], "", &[])).unwrap_err();
        assert_eq!(empty.get("body")[0].code, "required");

        let broken = plan.bind(&ctx("/test", &[], "{", &[])).unwrap_err();
        assert_eq!(broken.get("body")[0].code, "invalid");
    }

    #[test]
    fn optional_body_may_be_absent() {
        #[derive(Debug, Default)]
        struct Patch {
            user: Option<NewUser>,
        }
        impl Input for Patch {
            fn declare(b: &mut Bindings<Self>) {
                b.optional_body(|s| &mut s.user);
            }
        }

        let mut h = Harness::new();
        let (plan, _) = h.compile::<Patch>(Method::PATCH, &[]);
        assert!(plan.bind(&ctx("/test", &[], "", &[])).unwrap().user.is_none());
    }

    #[test]
    fn body_on_get_is_rejected() {
        let mut h = Harness::new();
        let (_, errors) = h.compile::<Create>(Method::GET, &[]);
        assert!(matches!(errors[..], [RegistrationError::BodyNotAllowed { .. }]));
    }

    #[test]
    fn declaration_faults_are_collected() {
        #[derive(Debug, Default)]
        struct Broken {
            a: u8,
            b: u8,
            c: Vec<u8>,
            d: NewUser,
            e: NewUser,
        }
        impl Input for Broken {
            fn declare(b: &mut Bindings<Self>) {
                b.path("missing", |s| &mut s.a);
                b.query("dup", |s| &mut s.b);
                b.query("dup", |s| &mut s.b);
                b.cookie("many", |s| &mut s.c);
                b.body(|s| &mut s.d);
                b.body(|s| &mut s.e);
            }
        }

        let mut h = Harness::new();
        let (_, errors) = h.compile::<Broken>(Method::POST, &[]);
        assert!(errors.iter().any(|e| matches!(e, RegistrationError::UnknownPathParam { name, .. } if name == "missing")));
        assert!(errors.iter().any(|e| matches!(e, RegistrationError::DuplicateBinding { name, .. } if name == "dup")));
        assert!(errors.iter().any(|e| matches!(e, RegistrationError::MultiValueNotAllowed { location: "cookie", .. })));
        assert!(errors.iter().any(|e| matches!(e, RegistrationError::MultipleBodies { .. })));
    }

    #[test]
    fn wire_kind_must_match_schema() {
        #[derive(Debug)]
        struct Code(u32);

        impl Describe for Code {
            fn shape() -> Shape {
                Shape::string()
            }
        }

        impl FromWire for Code {
            const KIND: WireKind = WireKind::Integer;

            fn from_wire(raw: &str, locale: &dyn Locale) -> Result<Self, rivet_validate::CoercionError> {
                u32::from_wire(raw, locale).map(Code)
            }
        }

        crate::scalar_param!(Code);

        #[derive(Debug, Default)]
        struct Lookup {
            code: Option<Code>,
        }
        impl Input for Lookup {
            fn declare(b: &mut Bindings<Self>) {
                b.query("code", |s| &mut s.code);
            }
        }

        let mut h = Harness::new();
        let (_, errors) = h.compile::<Lookup>(Method::GET, &[]);
        match &errors[..] {
            [RegistrationError::TypeMismatch { wire, schema, .. }] => {
                assert_eq!(*wire, "integer");
                assert_eq!(schema, "string");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn delimited_parameters_document_their_style() {
        let mut h = Harness::new();
        let mut contract = Contract::new(
            "GET /test".into(),
            Method::GET,
            vec!["id".into()],
            &mut h.registry,
            &mut h.components,
        );
        BindingPlan::<Search>::compile(&mut contract);
        let find = |name: &str| {
            contract
                .parameters
                .iter()
                .find(|p| p.name == name)
                .map(|p| p.parameter.clone())
                .unwrap()
        };
        let tags = find("tags");
        assert_eq!(tags.style.as_deref(), Some("form"));
        assert_eq!(tags.explode, Some(false));
        assert_eq!(find("point").style.as_deref(), Some("pipeDelimited"));
        assert!(find("id").required);
        assert!(!find("limit").required);
        assert_eq!(find("x-trace").location, ParameterLocation::Header);
    }

    #[test]
    fn delimiter_on_single_value_is_a_fault() {
        #[derive(Debug, Default)]
        struct Single {
            limit: Option<u16>,
        }
        impl Input for Single {
            fn declare(b: &mut Bindings<Self>) {
                b.query("limit", |s| &mut s.limit).delimiter(Delimiter::Comma);
            }
        }

        let mut h = Harness::new();
        let (_, errors) = h.compile::<Single>(Method::GET, &[]);
        match &errors[..] {
            [RegistrationError::DelimiterNotAllowed { binding, .. }] => assert_eq!(binding, "query/limit"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn header_values_split_on_delimiter() {
        #[derive(Debug, Default)]
        struct Tagged {
            tags: Vec<String>,
        }
        impl Input for Tagged {
            fn declare(b: &mut Bindings<Self>) {
                b.header("X-Tags", |s| &mut s.tags).delimiter(Delimiter::Comma);
            }
        }

        let mut h = Harness::new();
        let (plan, errors) = h.compile::<Tagged>(Method::GET, &[]);
        assert!(errors.is_empty(), "{errors:?}");

        let packed = plan.bind(&ctx("/test", &[("x-tags", "a,b,c")], "", &[])).unwrap();
        assert_eq!(packed.tags, vec!["a", "b", "c"]);

        let repeated = ctx("/test", &[("x-tags", "a,b"), ("x-tags", "c")], "", &[]);
        assert_eq!(plan.bind(&repeated).unwrap().tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn numeric_bounds_are_enforced() {
        #[derive(Debug, Default)]
        struct Percent(u8);

        impl Describe for Percent {
            fn shape() -> Shape {
                Shape::Custom(
                    rivet_openapi::Schema::integer()
                        .with_bounds(Some(serde_json::Number::from(0)), Some(serde_json::Number::from(100))),
                )
            }
        }

        impl FromWire for Percent {
            const KIND: WireKind = WireKind::Integer;

            fn from_wire(raw: &str, locale: &dyn Locale) -> Result<Self, rivet_validate::CoercionError> {
                u8::from_wire(raw, locale).map(Percent)
            }
        }

        crate::scalar_param!(Percent);

        #[derive(Debug, Default)]
        struct Quota {
            share: Percent,
            shares: Vec<Percent>,
        }
        impl Input for Quota {
            fn declare(b: &mut Bindings<Self>) {
                b.query("share", |s| &mut s.share);
                b.query("shares", |s| &mut s.shares).optional().delimiter(Delimiter::Comma);
            }
        }

        let mut h = Harness::new();
        let (plan, errors) = h.compile::<Quota>(Method::GET, &[]);
        assert!(errors.is_empty(), "{errors:?}");

        assert_eq!(plan.bind(&ctx("/test?share=100", &[], "", &[])).unwrap().share.0, 100);

        let err = plan
            .bind(&ctx("/test?share=101&shares=5,200", &[], "", &[]))
            .unwrap_err();
        assert_eq!(err.get("query/share")[0].code, "range");
        assert_eq!(err.get("query/shares[1]")[0].code, "range");
        assert_eq!(err.len(), 2);

        // The decoder still reports tokens the width cannot hold.
        let err = plan.bind(&ctx("/test?share=300", &[], "", &[])).unwrap_err();
        assert_eq!(err.get("query/share")[0].code, "overflow");
    }

    #[test]
    fn sequence_item_rules_are_enforced() {
        #[derive(Debug, Default)]
        struct Picks(Vec<u8>);

        impl Describe for Picks {
            fn shape() -> Shape {
                Shape::Sequence(Shape::sequence::<u8>().length(Some(1), Some(3)).unique())
            }
        }

        impl Param for Picks {
            type Item = u8;
            const ARITY: Arity = Arity::Many;

            fn doc_type() -> TypeRef {
                TypeRef::of::<Picks>()
            }

            fn assemble(items: Vec<u8>) -> Option<Self> {
                Some(Picks(items))
            }
        }

        #[derive(Debug, Default)]
        struct Draw {
            picks: Picks,
        }
        impl Input for Draw {
            fn declare(b: &mut Bindings<Self>) {
                b.query("picks", |s| &mut s.picks).delimiter(Delimiter::Comma);
            }
        }

        let mut h = Harness::new();
        let (plan, errors) = h.compile::<Draw>(Method::GET, &[]);
        assert!(errors.is_empty(), "{errors:?}");

        assert_eq!(plan.bind(&ctx("/test?picks=1,2,3", &[], "", &[])).unwrap().picks.0, vec![1, 2, 3]);

        let too_many = plan.bind(&ctx("/test?picks=1,2,3,4", &[], "", &[])).unwrap_err();
        assert_eq!(too_many.get("query/picks")[0].code, "count");

        let repeated = plan.bind(&ctx("/test?picks=4,4", &[], "", &[])).unwrap_err();
        assert_eq!(repeated.get("query/picks")[0].code, "unique");
    }
}
