//! Security providers and per-operation requirements.
//!
//! Every registered [`SecurityProvider`] is asked to authenticate each
//! routed request. The principals they produce are keyed by scheme and then
//! checked against the operation's [`SecurityRequirements`]: the request
//! passes when any one alternative is satisfied.
//!
//! ```rust,ignore
//! let api = Api::new("Users", "1.0")
//!     .security_provider(BasicAuthProvider::new("basic", |user, pass| {
//!         Ok((pass == "secret").then(|| SimplePrincipal::new(user).into_arc()))
//!     }))
//!     .route(
//!         "/user/apiKey",
//!         put(Endpoint::new(rotate_key).security(SecurityRequirements::scheme("basic"))),
//!     );
//! ```

use crate::context::Context;
use crate::error::ApiError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::header;
use rivet_openapi::{ParameterLocation, SecurityRequirementDoc, SecurityScheme};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// An authenticated identity.
pub trait Principal: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn has_role(&self, role: &str) -> bool;
}

/// Principal with a fixed role set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimplePrincipal {
    name: String,
    roles: HashSet<String>,
}

impl SimplePrincipal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: HashSet::new(),
        }
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn into_arc(self) -> Arc<dyn Principal> {
        Arc::new(self)
    }
}

impl Principal for SimplePrincipal {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Principals of one request keyed by security scheme.
#[derive(Debug, Clone, Default)]
pub struct Principals(HashMap<String, Arc<dyn Principal>>);

impl Principals {
    pub fn get(&self, scheme: &str) -> Option<&Arc<dyn Principal>> {
        self.0.get(scheme)
    }

    pub fn insert(&mut self, scheme: impl Into<String>, principal: Arc<dyn Principal>) {
        self.0.insert(scheme.into(), principal);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Principal>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// One alternative: every listed scheme must be authenticated with all of
/// its roles. An empty alternative accepts any authenticated principal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityRequirement(BTreeMap<String, Vec<String>>);

impl SecurityRequirement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `scheme` with no particular role.
    pub fn scheme(self, scheme: impl Into<String>) -> Self {
        self.roles(scheme, std::iter::empty::<String>())
    }

    /// Require `scheme` with every role in `roles`.
    pub fn roles<I, S>(mut self, scheme: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry(scheme.into())
            .or_default()
            .extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_satisfied_by(&self, principals: &Principals) -> bool {
        if self.0.is_empty() {
            return !principals.is_empty();
        }
        self.0.iter().all(|(scheme, roles)| {
            principals
                .get(scheme)
                .is_some_and(|p| roles.iter().all(|role| p.has_role(role)))
        })
    }

    pub fn to_doc(&self) -> SecurityRequirementDoc {
        self.0.clone()
    }
}

/// Alternatives for one operation. No alternatives means public.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityRequirements(Vec<SecurityRequirement>);

impl SecurityRequirements {
    pub fn public() -> Self {
        Self::default()
    }

    /// Any authenticated principal, whatever the scheme.
    pub fn authenticated() -> Self {
        Self(vec![SecurityRequirement::new()])
    }

    /// `scheme` with no particular role.
    pub fn scheme(scheme: impl Into<String>) -> Self {
        Self(vec![SecurityRequirement::new().scheme(scheme)])
    }

    pub fn any_of(alternatives: impl IntoIterator<Item = SecurityRequirement>) -> Self {
        Self(alternatives.into_iter().collect())
    }

    /// Add another alternative.
    pub fn or(mut self, requirement: SecurityRequirement) -> Self {
        self.0.push(requirement);
        self
    }

    pub fn is_public(&self) -> bool {
        self.0.is_empty()
    }

    pub fn alternatives(&self) -> &[SecurityRequirement] {
        &self.0
    }

    pub fn is_satisfied_by(&self, principals: &Principals) -> bool {
        self.0.is_empty() || self.0.iter().any(|r| r.is_satisfied_by(principals))
    }

    pub fn to_doc(&self) -> Vec<SecurityRequirementDoc> {
        self.0.iter().map(SecurityRequirement::to_doc).collect()
    }
}

/// Authenticates requests for one security scheme.
#[async_trait]
pub trait SecurityProvider: Send + Sync + 'static {
    /// Key of the scheme in requirements and the components table.
    fn scheme_key(&self) -> &str;

    fn scheme(&self) -> SecurityScheme;

    /// `Ok(None)` when the request carries no credentials for this scheme.
    /// An error aborts the request before binding.
    async fn authenticate(&self, ctx: &Context) -> Result<Option<Arc<dyn Principal>>, ApiError>;
}

type KeyCheck = dyn Fn(&str) -> Result<Option<Arc<dyn Principal>>, ApiError> + Send + Sync;
type CredentialCheck =
    dyn Fn(&str, &str) -> Result<Option<Arc<dyn Principal>>, ApiError> + Send + Sync;

/// API key read from a header, query parameter or cookie.
pub struct ApiKeyProvider {
    scheme_key: String,
    name: String,
    location: ParameterLocation,
    description: Option<String>,
    check: Arc<KeyCheck>,
}

impl ApiKeyProvider {
    pub fn new<F>(
        scheme_key: impl Into<String>,
        name: impl Into<String>,
        location: ParameterLocation,
        check: F,
    ) -> Self
    where
        F: Fn(&str) -> Result<Option<Arc<dyn Principal>>, ApiError> + Send + Sync + 'static,
    {
        Self {
            scheme_key: scheme_key.into(),
            name: name.into(),
            location,
            description: None,
            check: Arc::new(check),
        }
    }

    /// Key in the `X-API-Key` header.
    pub fn header<F>(scheme_key: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str) -> Result<Option<Arc<dyn Principal>>, ApiError> + Send + Sync + 'static,
    {
        Self::new(scheme_key, "X-API-Key", ParameterLocation::Header, check)
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn extract(&self, ctx: &Context) -> Option<String> {
        match self.location {
            ParameterLocation::Header => ctx.header(&self.name).map(str::to_string),
            ParameterLocation::Query => ctx.query(&self.name).map(str::to_string),
            ParameterLocation::Cookie => ctx.cookie(&self.name),
            ParameterLocation::Path => None,
        }
    }
}

#[async_trait]
impl SecurityProvider for ApiKeyProvider {
    fn scheme_key(&self) -> &str {
        &self.scheme_key
    }

    fn scheme(&self) -> SecurityScheme {
        let scheme = SecurityScheme::api_key(&self.name, self.location);
        match &self.description {
            Some(desc) => scheme.description(desc),
            None => scheme,
        }
    }

    async fn authenticate(&self, ctx: &Context) -> Result<Option<Arc<dyn Principal>>, ApiError> {
        match self.extract(ctx) {
            Some(key) if !key.is_empty() => (self.check)(&key),
            _ => Ok(None),
        }
    }
}

/// HTTP Basic credentials from the `Authorization` header.
pub struct BasicAuthProvider {
    scheme_key: String,
    description: Option<String>,
    check: Arc<CredentialCheck>,
}

impl BasicAuthProvider {
    pub fn new<F>(scheme_key: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str, &str) -> Result<Option<Arc<dyn Principal>>, ApiError> + Send + Sync + 'static,
    {
        Self {
            scheme_key: scheme_key.into(),
            description: None,
            check: Arc::new(check),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Split `Basic <base64(user:password)>`. `Ok(None)` for other schemes.
fn basic_credentials(value: &str) -> Result<Option<(String, String)>, ApiError> {
    let Some((scheme, encoded)) = value.trim().split_once(' ') else {
        return Ok(None);
    };
    if !scheme.eq_ignore_ascii_case("basic") {
        return Ok(None);
    }
    let malformed = || ApiError::unauthorized("Malformed basic credentials");
    let decoded = STANDARD.decode(encoded.trim()).map_err(|_| malformed())?;
    let text = String::from_utf8(decoded).map_err(|_| malformed())?;
    let (user, password) = text.split_once(':').ok_or_else(malformed)?;
    Ok(Some((user.to_string(), password.to_string())))
}

#[async_trait]
impl SecurityProvider for BasicAuthProvider {
    fn scheme_key(&self) -> &str {
        &self.scheme_key
    }

    fn scheme(&self) -> SecurityScheme {
        let scheme = SecurityScheme::basic();
        match &self.description {
            Some(desc) => scheme.description(desc),
            None => scheme,
        }
    }

    async fn authenticate(&self, ctx: &Context) -> Result<Option<Arc<dyn Principal>>, ApiError> {
        let Some(value) = ctx.header(header::AUTHORIZATION.as_str()) else {
            return Ok(None);
        };
        match basic_credentials(value)? {
            Some((user, password)) => (self.check)(&user, &password),
            None => Ok(None),
        }
    }
}
