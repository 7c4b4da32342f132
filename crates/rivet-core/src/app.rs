//! Api application builder

use crate::access::{AccessLog, AccessWriter};
use crate::config::ServerConfig;
use crate::context::{Context, ErrorHandler};
use crate::dispatch::{MethodEntry, Service, ServiceParts, Trie};
use crate::docs::{self, DocumentInfo};
use crate::error::{ApiError, RegistrationError, RegistrationErrors};
use crate::handler::{ComponentTables, Contract, Endpoint};
use crate::path::NodeId;
use crate::response::Reply;
use crate::router::{get, MethodRouter};
use crate::security::{SecurityProvider, SecurityRequirements};
use crate::server::Server;
use http::{Extensions, StatusCode};
use rivet_openapi::{Document, NamingStyle, SchemaRegistry, Server as ServerInfo, Tag};
use rivet_validate::{DefaultLocale, Locale};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Main application builder for Rivet
///
/// Routes, security and documentation are collected first; [`Api::build`]
/// compiles everything at once and reports every declaration fault together.
///
/// ```rust,ignore
/// use rivet_rs::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///     Api::new("Users", "1.0.0")
///         .security_provider(BasicAuthProvider::new("basic", check))
///         .route("/user/:id", get(get_user).put(Endpoint::new(put_user).security(SecurityRequirements::scheme("basic"))))
///         .serve_spec("/openapi.json")
///         .run("127.0.0.1:8080")
///         .await
/// }
/// ```
pub struct Api {
    info: DocumentInfo,
    naming: NamingStyle,
    locale: Arc<dyn Locale>,
    state: Extensions,
    providers: Vec<Arc<dyn SecurityProvider>>,
    default_security: Option<SecurityRequirements>,
    routes: Vec<(String, MethodRouter)>,
    path_security: Vec<(String, SecurityRequirements)>,
    path_tags: Vec<(String, Vec<String>)>,
    error_handlers: Vec<(String, ErrorHandler)>,
    access: AccessLog,
    config: ServerConfig,
    spec: Option<Arc<OnceLock<Arc<Document>>>>,
    errors: Vec<RegistrationError>,
}

impl Api {
    /// Create a new API with the document title and version
    pub fn new(title: impl Into<String>, version: impl Into<String>) -> Self {
        // Initialize tracing if not already done
        let _ = tracing_subscriber::registry()
            .with(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,rivet=debug")),
            )
            .with(tracing_subscriber::fmt::layer())
            .try_init();

        Self {
            info: DocumentInfo {
                title: title.into(),
                version: version.into(),
                ..DocumentInfo::default()
            },
            naming: NamingStyle::default(),
            locale: Arc::new(DefaultLocale),
            state: Extensions::new(),
            providers: Vec::new(),
            default_security: None,
            routes: Vec::new(),
            path_security: Vec::new(),
            path_tags: Vec::new(),
            error_handlers: Vec::new(),
            access: AccessLog::new(),
            config: ServerConfig::default(),
            spec: None,
            errors: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.info.description = Some(description.into());
        self
    }

    pub fn server(mut self, server: ServerInfo) -> Self {
        self.info.servers.push(server);
        self
    }

    /// Declare a document-level tag
    pub fn tag(mut self, tag: Tag) -> Self {
        self.info.tags.push(tag);
        self
    }

    /// Naming strategy for schema component keys
    pub fn naming(mut self, naming: NamingStyle) -> Self {
        self.naming = naming;
        self
    }

    /// Formatting strategy for wire values
    pub fn locale<L: Locale + 'static>(mut self, locale: L) -> Self {
        self.locale = Arc::new(locale);
        self
    }

    /// Add application state, available through [`Context::state`]
    pub fn state<S>(mut self, state: S) -> Self
    where
        S: Clone + Send + Sync + 'static,
    {
        self.state.insert(state);
        self
    }

    /// Register a security provider. Every provider runs on every routed
    /// request; its scheme is documented under `components/securitySchemes`.
    pub fn security_provider<P: SecurityProvider>(mut self, provider: P) -> Self {
        let key = provider.scheme_key().to_string();
        if self.providers.iter().any(|p| p.scheme_key() == key) {
            self.errors.push(RegistrationError::DuplicateProvider(key));
        } else {
            self.providers.push(Arc::new(provider));
        }
        self
    }

    /// Requirements for operations that declare none, documented at
    /// document level.
    pub fn default_security(mut self, requirements: SecurityRequirements) -> Self {
        self.default_security = Some(requirements);
        self
    }

    /// Requirements for every operation at or below `path` that declares
    /// none itself.
    pub fn path_security(mut self, path: &str, requirements: SecurityRequirements) -> Self {
        self.path_security.push((path.to_string(), requirements));
        self
    }

    /// Tags applied to every operation at or below `path`
    pub fn path_tags<I, S>(mut self, path: &str, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path_tags
            .push((path.to_string(), tags.into_iter().map(Into::into).collect()));
        self
    }

    /// Render request-time errors at or below `path` with `handler`.
    pub fn error_handler<F>(mut self, path: &str, handler: F) -> Self
    where
        F: Fn(&Context, ApiError) -> Reply + Send + Sync + 'static,
    {
        self.error_handlers.push((path.to_string(), Arc::new(handler)));
        self
    }

    /// Add an access log writer
    pub fn access_writer<W: AccessWriter>(mut self, writer: W) -> Self {
        self.access.add(Arc::new(writer));
        self
    }

    /// Server settings: body limit, environment and artifact directory
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the body size limit for request bodies
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.config.body_limit = limit;
        self
    }

    /// Add a route
    pub fn route(mut self, path: &str, method_router: MethodRouter) -> Self {
        self.routes.push((path.to_string(), method_router));
        self
    }

    /// Serve the generated OpenAPI document as JSON at `path`.
    pub fn serve_spec(mut self, path: &str) -> Self {
        let cell: Arc<OnceLock<Arc<Document>>> = Arc::new(OnceLock::new());
        let served = Arc::clone(&cell);
        let endpoint = Endpoint::new(move |_ctx: Context| {
            let cell = Arc::clone(&served);
            async move {
                let mut reply = Reply::new();
                if let Some(document) = cell.get() {
                    reply.json(StatusCode::OK, document.as_ref());
                }
                reply
            }
        })
        .summary("OpenAPI document")
        .response(200, "The OpenAPI document")
        .security(SecurityRequirements::public());
        self.spec = Some(cell);
        self.route(path, get(endpoint))
    }

    /// Compile every route into a [`Service`].
    pub fn build(self) -> Result<Service, RegistrationErrors> {
        let mut errors = self.errors;
        let mut trie = Trie::new();
        let mut registry = SchemaRegistry::with_naming(self.naming);
        let mut components = ComponentTables::default();
        let scheme_keys: Vec<&str> = self.providers.iter().map(|p| p.scheme_key()).collect();

        let mut path_security: HashMap<NodeId, SecurityRequirements> = HashMap::new();
        for (path, requirements) in self.path_security {
            match trie.path(NodeId::ROOT, &path) {
                Ok(node) => {
                    check_schemes(&requirements, &scheme_keys, &path, &mut errors);
                    path_security.insert(node, requirements);
                }
                Err(err) => errors.push(err.into()),
            }
        }

        let mut path_tags: HashMap<NodeId, Vec<String>> = HashMap::new();
        for (path, tags) in self.path_tags {
            match trie.path(NodeId::ROOT, &path) {
                Ok(node) => path_tags.entry(node).or_default().extend(tags),
                Err(err) => errors.push(err.into()),
            }
        }

        for (path, handler) in self.error_handlers {
            match trie.path(NodeId::ROOT, &path) {
                Ok(node) => trie.set_error_handler(node, handler),
                Err(err) => errors.push(err.into()),
            }
        }

        if let Some(requirements) = &self.default_security {
            check_schemes(requirements, &scheme_keys, "document", &mut errors);
        }

        let mut operations = Vec::new();
        for (path, method_router) in self.routes {
            let node = match trie.path(NodeId::ROOT, &path) {
                Ok(node) => node,
                Err(err) => {
                    errors.push(err.into());
                    continue;
                }
            };
            let path_params = trie.param_names(node);
            let chain = ancestry(&trie, node);

            for (method, endpoint) in method_router.endpoints {
                let route = format!("{method} {}", trie.node_path(node));
                let (prepare, own_security, docs) = endpoint.into_parts();

                // Own requirements, then the nearest path's, then the default
                let documented = own_security.or_else(|| {
                    chain
                        .iter()
                        .rev()
                        .find_map(|id| path_security.get(id).cloned())
                });
                if let Some(requirements) = &documented {
                    check_schemes(requirements, &scheme_keys, &route, &mut errors);
                }
                let effective = documented
                    .clone()
                    .or_else(|| self.default_security.clone())
                    .unwrap_or_default();

                let inherited_tags: Vec<String> = chain
                    .iter()
                    .filter_map(|id| path_tags.get(id))
                    .flatten()
                    .cloned()
                    .collect();

                let mut contract = Contract::new(
                    route,
                    method.clone(),
                    path_params.clone(),
                    &mut registry,
                    &mut components,
                );
                let handler = prepare(&mut contract);
                let operation =
                    docs::operation(&mut contract, docs, documented.as_ref(), &inherited_tags);
                errors.append(&mut contract.errors);

                let entry = MethodEntry {
                    handler,
                    security: effective,
                };
                match trie.handle(node, method.clone(), entry) {
                    Ok(()) => operations.push((node, method, operation)),
                    Err(err) => errors.push(err.into()),
                }
            }
        }

        if !errors.is_empty() {
            return Err(RegistrationErrors(errors));
        }

        let document = Arc::new(docs::assemble(
            self.info,
            &trie,
            operations,
            &registry,
            components,
            &self.providers,
            self.default_security.as_ref(),
        ));
        if let Some(cell) = &self.spec {
            let _ = cell.set(Arc::clone(&document));
        }

        tracing::debug!(
            nodes = trie.len(),
            schemas = registry.len(),
            "api built"
        );

        Ok(Service::new(ServiceParts {
            trie,
            providers: self.providers,
            access: self.access,
            locale: self.locale,
            state: Arc::new(self.state),
            environment: self.config.environment,
            body_limit: self.config.body_limit,
            document,
        }))
    }

    /// Build and run the server
    ///
    /// When the configuration names a spec directory, the OpenAPI document
    /// is written there as `openapi.json` and `openapi.yaml` first.
    pub async fn run(self, addr: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let spec_dir = self.config.spec_dir.clone();
        let service = self.build()?;
        if let Some(dir) = spec_dir {
            service.document().write_files(dir, "openapi")?;
        }
        Server::new(service).run(addr).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api")
            .field("title", &self.info.title)
            .field("version", &self.info.version)
            .field("routes", &self.routes.len())
            .field("providers", &self.providers.len())
            .finish_non_exhaustive()
    }
}

/// `node` and its ancestors, root first.
fn ancestry(trie: &Trie, node: NodeId) -> Vec<NodeId> {
    let mut chain = vec![node];
    let mut current = node;
    while let Some(parent) = trie.node(current).parent() {
        chain.push(parent);
        current = parent;
    }
    chain.reverse();
    chain
}

fn check_schemes(
    requirements: &SecurityRequirements,
    known: &[&str],
    route: &str,
    errors: &mut Vec<RegistrationError>,
) {
    for alternative in requirements.alternatives() {
        for scheme in alternative.schemes() {
            if !known.contains(&scheme) {
                errors.push(RegistrationError::UnknownScheme {
                    route: route.to_string(),
                    scheme: scheme.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{ApiKeyProvider, SecurityRequirement};
    use rivet_openapi::ParameterLocation;

    async fn ok(_ctx: Context) -> &'static str {
        "ok"
    }

    fn key_provider(key: &str) -> ApiKeyProvider {
        ApiKeyProvider::new(key, "X-Key", ParameterLocation::Header, |_| Ok(None))
    }

    #[test]
    fn duplicate_methods_are_reported() {
        let err = Api::new("T", "1")
            .route("/a", get(ok))
            .route("/a", get(ok))
            .build()
            .unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(matches!(err.0[0], RegistrationError::Path(_)));
    }

    #[test]
    fn every_fault_is_reported_at_once() {
        let err = Api::new("T", "1")
            .security_provider(key_provider("apiKey"))
            .security_provider(key_provider("apiKey"))
            .route("/a/:x", get(ok))
            .route("/a/:y", get(ok))
            .route(
                "/b",
                get(Endpoint::new(ok).security(SecurityRequirements::scheme("missing"))),
            )
            .build()
            .unwrap_err();
        assert_eq!(err.len(), 3);
        assert!(err.iter().any(|e| matches!(e, RegistrationError::DuplicateProvider(_))));
        assert!(err.iter().any(|e| matches!(e, RegistrationError::UnknownScheme { .. })));
    }

    #[test]
    fn path_security_is_inherited_and_documented() {
        let service = Api::new("T", "1")
            .security_provider(key_provider("apiKey"))
            .path_security("/admin", SecurityRequirements::scheme("apiKey"))
            .path_tags("/admin", ["admin"])
            .route("/admin/users", get(ok))
            .route(
                "/admin/health",
                get(Endpoint::new(ok).security(SecurityRequirements::public())),
            )
            .build()
            .unwrap();
        let doc = service.document().to_json();
        let users = &doc["paths"]["/admin/users"]["get"];
        assert_eq!(users["security"][0]["apiKey"], serde_json::json!([]));
        assert_eq!(users["tags"][0], "admin");
        let health = &doc["paths"]["/admin/health"]["get"];
        assert_eq!(health["security"], serde_json::json!([]));
    }

    #[test]
    fn default_security_is_document_level() {
        let service = Api::new("T", "1")
            .security_provider(key_provider("apiKey"))
            .default_security(SecurityRequirements::any_of([SecurityRequirement::new().scheme("apiKey")]))
            .route("/a", get(ok))
            .build()
            .unwrap();
        let doc = service.document().to_json();
        assert_eq!(doc["security"][0]["apiKey"], serde_json::json!([]));
        assert!(doc["paths"]["/a"]["get"].get("security").is_none());
        assert_eq!(doc["components"]["securitySchemes"]["apiKey"]["in"], "header");
    }

    #[test]
    fn documents_info_and_tags() {
        let service = Api::new("Users", "2.0.0")
            .description("User service")
            .server(ServerInfo::new("https://api.example.com"))
            .tag(Tag::new("users").description("User operations"))
            .build()
            .unwrap();
        let doc = service.document().to_json();
        assert_eq!(doc["info"]["title"], "Users");
        assert_eq!(doc["info"]["description"], "User service");
        assert_eq!(doc["servers"][0]["url"], "https://api.example.com");
        assert_eq!(doc["tags"][0]["name"], "users");
    }
}
