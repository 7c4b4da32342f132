//! OpenAPI assembly.
//!
//! Operations are documented while they are registered, from the same
//! compiled bindings and output catalogue the dispatcher uses. Assembly then
//! folds the path trie into the document's `paths` map.

use crate::error::RegistrationError;
use crate::handler::{ComponentTables, Contract, OperationDocs};
use crate::path::{NodeId, PathTrie};
use crate::response::ErrorDocument;
use crate::security::{SecurityProvider, SecurityRequirements};
use http::Method;
use rivet_openapi::{status_key, Document, Operation, RefOr, Response, SchemaRegistry, Server, Tag};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Finish the documentation of one operation. Faults are pushed onto
/// `contract.errors`.
pub(crate) fn operation(
    contract: &mut Contract<'_>,
    mut docs: OperationDocs,
    security: Option<&SecurityRequirements>,
    inherited_tags: &[String],
) -> Operation {
    apply_param_docs(contract, &docs);

    let mut parameters = Vec::with_capacity(contract.parameters.len());
    for param in std::mem::take(&mut contract.parameters) {
        match param.shared {
            Some(key) => match contract.components.parameters.register(&key, param.parameter) {
                Ok(reference) => parameters.push(reference),
                Err(conflict) => contract.errors.push(conflict.into()),
            },
            None => parameters.push(RefOr::Item(param.parameter)),
        }
    }

    let mut catalogue = std::mem::take(&mut contract.responses);
    catalogue.extend(std::mem::take(&mut docs.responses));
    if contract.validates && !catalogue.iter().any(|d| d.status == 422) {
        catalogue.json::<ErrorDocument>(422, "Validation failed");
    }

    let mut responses = BTreeMap::new();
    for doc in catalogue.iter() {
        let key = status_key(doc.status);
        if responses.contains_key(&key) {
            contract.errors.push(RegistrationError::DuplicateResponse {
                route: contract.route.clone(),
                status: doc.status,
            });
            continue;
        }
        let mut response = Response::new(&doc.description);
        if let Some((media_type, ty)) = &doc.content {
            match contract.registry.schema_for(ty) {
                Ok(schema) => response = response.with_content(media_type, schema),
                Err(err) => {
                    contract.errors.push(RegistrationError::Schema {
                        route: contract.route.clone(),
                        source: err,
                    });
                    continue;
                }
            }
        }
        let entry = match &doc.shared {
            Some(shared) => match contract.components.responses.register(shared, response) {
                Ok(reference) => reference,
                Err(conflict) => {
                    contract.errors.push(conflict.into());
                    continue;
                }
            },
            None => RefOr::Item(response),
        };
        responses.insert(key, entry);
    }

    let mut tags: Vec<String> = inherited_tags.to_vec();
    for tag in docs.tags {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    Operation {
        tags,
        summary: docs.summary,
        description: docs.description,
        operation_id: docs.operation_id,
        parameters,
        request_body: contract.request_body.take(),
        responses,
        security: security.map(SecurityRequirements::to_doc),
        deprecated: docs.deprecated,
    }
}

/// Check endpoint parameter docs against the bindings and merge them in.
fn apply_param_docs(contract: &mut Contract<'_>, docs: &OperationDocs) {
    for doc in &docs.params {
        let bound = contract
            .bound
            .iter()
            .find(|b| b.source == doc.source && b.name == doc.name);
        let Some(bound) = bound else {
            contract.errors.push(RegistrationError::UndocumentedParam {
                route: contract.route.clone(),
                location: doc.source.as_str(),
                name: doc.name.clone(),
            });
            continue;
        };
        if bound.doc_type != doc.doc_type {
            contract.errors.push(RegistrationError::DocumentedTypeMismatch {
                route: contract.route.clone(),
                name: doc.name.clone(),
                documented: doc.doc_type_name,
                bound: bound.doc_type_name,
            });
            continue;
        }
        let target = contract
            .parameters
            .iter_mut()
            .find(|p| p.source == doc.source && p.name == doc.name);
        if let Some(target) = target {
            if doc.description.is_some() {
                target.parameter.description = doc.description.clone();
            }
            target.parameter.deprecated |= doc.deprecated;
            if doc.example.is_some() {
                target.parameter.schema.example = doc.example.clone();
            }
        }
    }
}

/// Document-level settings of the API.
#[derive(Debug, Clone, Default)]
pub(crate) struct DocumentInfo {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub servers: Vec<Server>,
    pub tags: Vec<Tag>,
}

/// Fold documented operations and component tables into a document.
pub(crate) fn assemble<E, H>(
    info: DocumentInfo,
    trie: &PathTrie<E, H>,
    operations: Vec<(NodeId, Method, Operation)>,
    registry: &SchemaRegistry,
    components: ComponentTables,
    providers: &[Arc<dyn SecurityProvider>],
    default_security: Option<&SecurityRequirements>,
) -> Document {
    let mut document = Document::new(info.title, info.version);
    document.info.description = info.description;
    document.servers = info.servers;
    document.tags = info.tags;

    for (node, method, operation) in operations {
        document
            .paths
            .entry(trie.template_path(node))
            .or_default()
            .operations
            .insert(method.as_str().to_ascii_lowercase(), operation);
    }

    document.components.schemas = registry.schemas().clone();
    document.components.parameters = components.parameters.into_inner();
    document.components.request_bodies = components.request_bodies.into_inner();
    document.components.responses = components.responses.into_inner();
    document.components.security_schemes = providers
        .iter()
        .map(|p| (p.scheme_key().to_string(), p.scheme()))
        .collect();
    document.security = default_security.map(SecurityRequirements::to_doc);
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::{BindingPlan, Bindings, Input};
    use crate::handler::Endpoint;
    use crate::handler::ParamDoc;
    use crate::response::{Json, ResponseDocs};

    #[derive(Default)]
    struct Page {
        limit: Option<u32>,
    }

    impl Input for Page {
        fn declare(b: &mut Bindings<Self>) {
            b.query("limit", |s| &mut s.limit).shared("Limit");
        }
    }

    fn document(
        docs: OperationDocs,
        output: ResponseDocs,
    ) -> (Operation, Vec<RegistrationError>, ComponentTables) {
        let mut registry = SchemaRegistry::new();
        let mut components = ComponentTables::default();
        let (op, errors) = {
            let mut contract = Contract::new(
                "GET /items".into(),
                Method::GET,
                Vec::new(),
                &mut registry,
                &mut components,
            );
            BindingPlan::<Page>::compile(&mut contract);
            contract.validates = true;
            contract.responses = output;
            let op = operation(&mut contract, docs, None, &["items".to_string()]);
            (op, contract.errors)
        };
        (op, errors, components)
    }

    fn docs_of(endpoint: Endpoint) -> OperationDocs {
        endpoint.docs
    }

    async fn list(_ctx: crate::Context, _page: Page) -> Json<Vec<u32>> {
        Json(Vec::new())
    }

    #[test]
    fn shared_parameters_become_references() {
        let (op, errors, components) = document(OperationDocs::default(), ResponseDocs::default());
        assert!(errors.is_empty());
        let param = serde_json::to_value(&op.parameters[0]).unwrap();
        assert_eq!(param["$ref"], "#/components/parameters/Limit");
        assert!(components.parameters.get("Limit").is_some());
    }

    #[test]
    fn validating_operations_document_422() {
        let (op, _, _) = document(OperationDocs::default(), ResponseDocs::default());
        assert!(op.responses.contains_key("422"));
        assert_eq!(op.tags, vec!["items"]);
    }

    #[test]
    fn duplicate_statuses_are_rejected() {
        let mut output = ResponseDocs::default();
        output.empty(200, "OK");
        let docs = docs_of(Endpoint::new(list).response(200, "Again"));
        let (_, errors, _) = document(docs, output);
        assert!(matches!(errors[..], [RegistrationError::DuplicateResponse { status: 200, .. }]));
    }

    #[test]
    fn param_docs_are_checked_against_bindings() {
        let docs = docs_of(
            Endpoint::new(list)
                .param(ParamDoc::query::<u32>("limit").description("Page size"))
                .param(ParamDoc::query::<u32>("offset"))
                .param(ParamDoc::header::<String>("X-Missing")),
        );
        let (_, errors, components) = document(docs, ResponseDocs::default());
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, RegistrationError::UndocumentedParam { .. })));
        let limit = components.parameters.get("Limit").unwrap();
        assert_eq!(limit.description.as_deref(), Some("Page size"));
    }

    #[test]
    fn param_doc_type_must_match() {
        let docs = docs_of(Endpoint::new(list).param(ParamDoc::query::<String>("limit")));
        let (_, errors, _) = document(docs, ResponseDocs::default());
        assert!(matches!(errors[..], [RegistrationError::DocumentedTypeMismatch { .. }]));
    }

    #[test]
    fn default_status_is_keyed_default() {
        let mut output = ResponseDocs::default();
        output.json::<ErrorDocument>(0, "Error");
        let (op, _, _) = document(OperationDocs::default(), output);
        assert!(op.responses.contains_key("default"));
    }
}
