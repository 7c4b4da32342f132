//! Path trie.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Each node has
//! any number of literal children plus at most one variable child (a named
//! parameter `:name` or a wildcard suffix `*name`). Matching tries the
//! literal child first and falls back to the variable child; there is no
//! backtracking.

use http::Method;
use std::fmt;
use thiserror::Error;

/// Handle to a node of a [`PathTrie`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Root,
    Literal(String),
    Param(String),
    Wildcard(String),
}

impl Segment {
    /// Classify a segment by its leading sigil.
    pub fn parse(raw: &str) -> Result<Segment, PathError> {
        if raw.is_empty() || raw == "." || raw == ".." || raw.contains('/') {
            return Err(PathError::InvalidSegment(raw.to_string()));
        }
        let segment = match raw.as_bytes()[0] {
            b':' => Segment::Param(raw[1..].to_string()),
            b'*' => Segment::Wildcard(raw[1..].to_string()),
            _ => Segment::Literal(raw.to_string()),
        };
        if segment.name().is_empty() {
            return Err(PathError::InvalidSegment(raw.to_string()));
        }
        Ok(segment)
    }

    pub fn name(&self) -> &str {
        match self {
            Segment::Root => "",
            Segment::Literal(name) | Segment::Param(name) | Segment::Wildcard(name) => name,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Segment::Param(_) | Segment::Wildcard(_))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Root => Ok(()),
            Segment::Literal(name) => f.write_str(name),
            Segment::Param(name) => write!(f, ":{name}"),
            Segment::Wildcard(name) => write!(f, "*{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("invalid path segment {0:?}")]
    InvalidSegment(String),

    #[error("{path}: wildcard segment cannot bear subpaths")]
    WildcardChildren { path: String },

    #[error("{path}: already has variable subpath {existing}, cannot add {requested}")]
    VariableConflict {
        path: String,
        existing: String,
        requested: String,
    },

    #[error("{path}: already has a handler for method {method}")]
    DuplicateMethod { path: String, method: Method },
}

#[derive(Debug)]
pub struct PathNode<E, H> {
    segment: Segment,
    parent: Option<NodeId>,
    literals: Vec<NodeId>,
    variable: Option<NodeId>,
    methods: Vec<(Method, E)>,
    error_handler: Option<H>,
}

impl<E, H> PathNode<E, H> {
    fn new(segment: Segment, parent: Option<NodeId>) -> Self {
        Self {
            segment,
            parent,
            literals: Vec::new(),
            variable: None,
            methods: Vec::new(),
            error_handler: None,
        }
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Literal children in registration order, then the variable child.
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.literals.iter().copied().chain(self.variable)
    }

    pub fn methods(&self) -> impl Iterator<Item = (&Method, &E)> {
        self.methods.iter().map(|(m, e)| (m, e))
    }

    pub fn method(&self, method: &Method) -> Option<&E> {
        self.methods.iter().find(|(m, _)| m == method).map(|(_, e)| e)
    }

    pub fn has_methods(&self) -> bool {
        !self.methods.is_empty()
    }

    pub fn error_handler(&self) -> Option<&H> {
        self.error_handler.as_ref()
    }
}

/// Captured path parameters in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn truncate_to(&mut self, len: usize) {
        self.0.truncate(len);
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        PathParams(iter.into_iter().map(|(n, v)| (n.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found { node: NodeId, params: PathParams },
    /// `nearest` is the deepest node reached before matching failed.
    NotFound { nearest: NodeId },
}

#[derive(Debug)]
pub struct PathTrie<E, H> {
    nodes: Vec<PathNode<E, H>>,
}

impl<E, H> Default for PathTrie<E, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, H> PathTrie<E, H> {
    pub fn new() -> Self {
        Self {
            nodes: vec![PathNode::new(Segment::Root, None)],
        }
    }

    pub fn node(&self, id: NodeId) -> &PathNode<E, H> {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Return or create the child of `parent` named `name`.
    pub fn child(&mut self, parent: NodeId, name: &str) -> Result<NodeId, PathError> {
        let segment = Segment::parse(name)?;
        if matches!(self.node(parent).segment, Segment::Wildcard(_)) {
            return Err(PathError::WildcardChildren {
                path: self.node_path(parent),
            });
        }

        if let Segment::Literal(literal) = &segment {
            let existing = self.nodes[parent.0]
                .literals
                .iter()
                .copied()
                .find(|id| self.node(*id).segment.name() == literal);
            if let Some(id) = existing {
                return Ok(id);
            }
            let id = self.push(segment, parent);
            self.nodes[parent.0].literals.push(id);
            return Ok(id);
        }

        if let Some(existing) = self.node(parent).variable {
            if self.node(existing).segment == segment {
                return Ok(existing);
            }
            return Err(PathError::VariableConflict {
                path: self.node_path(parent),
                existing: self.node(existing).segment.to_string(),
                requested: segment.to_string(),
            });
        }
        let id = self.push(segment, parent);
        self.nodes[parent.0].variable = Some(id);
        Ok(id)
    }

    /// Resolve a relative, multi-segment path from `from`, creating nodes.
    ///
    /// `.` stays in place and `..` moves to the parent, stopping at the root.
    pub fn path(&mut self, from: NodeId, path: &str) -> Result<NodeId, PathError> {
        let mut current = from;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = match part {
                "." => current,
                ".." => self.node(current).parent.unwrap_or(current),
                name => self.child(current, name)?,
            };
        }
        Ok(current)
    }

    pub fn handle(&mut self, node: NodeId, method: Method, entry: E) -> Result<(), PathError> {
        if self.node(node).method(&method).is_some() {
            return Err(PathError::DuplicateMethod {
                path: self.node_path(node),
                method,
            });
        }
        self.nodes[node.0].methods.push((method, entry));
        Ok(())
    }

    pub fn set_error_handler(&mut self, node: NodeId, handler: H) {
        self.nodes[node.0].error_handler = Some(handler);
    }

    /// Error handler of `node` or of its nearest ancestor carrying one.
    pub fn error_handler_for(&self, node: NodeId) -> Option<&H> {
        let mut current = Some(node);
        while let Some(id) = current {
            let n = self.node(id);
            if let Some(handler) = &n.error_handler {
                return Some(handler);
            }
            current = n.parent;
        }
        None
    }

    /// Full route of a node, e.g. `/user/:id`.
    pub fn node_path(&self, node: NodeId) -> String {
        self.render(node, |segment| segment.to_string())
    }

    /// Route with parameters in brace syntax, e.g. `/user/{id}`.
    pub fn template_path(&self, node: NodeId) -> String {
        self.render(node, |segment| match segment {
            Segment::Param(name) | Segment::Wildcard(name) => format!("{{{name}}}"),
            other => other.to_string(),
        })
    }

    /// Names of the parameters captured on the way to `node`.
    pub fn param_names(&self, node: NodeId) -> Vec<String> {
        self.ancestry(node)
            .into_iter()
            .filter(|id| self.node(*id).segment.is_variable())
            .map(|id| self.node(id).segment.name().to_string())
            .collect()
    }

    /// Every node in depth-first order, parents before children.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            order.push(id);
            let children: Vec<NodeId> = self.node(id).children().collect();
            stack.extend(children.into_iter().rev());
        }
        order
    }

    pub fn lookup(&self, path: &str) -> Lookup {
        let mut current = NodeId::ROOT;
        let mut params = PathParams::default();
        // Parameter count captured at each visited depth, for `..`.
        let mut captured: Vec<usize> = Vec::new();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let mut index = 0;
        while index < segments.len() {
            let raw = segments[index];
            index += 1;
            match raw {
                "." => continue,
                ".." => {
                    if let Some(parent) = self.node(current).parent {
                        current = parent;
                        params.truncate_to(captured.pop().unwrap_or(0));
                    }
                    continue;
                }
                _ => {}
            }

            let value = decode(raw);
            let node = self.node(current);
            let literal = node
                .literals
                .iter()
                .copied()
                .find(|id| self.node(*id).segment.name() == value);
            let next = literal.or(node.variable);
            let Some(next) = next else {
                return Lookup::NotFound { nearest: current };
            };

            captured.push(params.len());
            match &self.node(next).segment {
                Segment::Param(name) if literal.is_none() => {
                    params.0.push((name.clone(), value));
                }
                Segment::Wildcard(name) => {
                    let rest: Vec<String> = std::iter::once(value)
                        .chain(segments[index..].iter().map(|s| decode(s)))
                        .collect();
                    params.0.push((name.clone(), rest.join("/")));
                    return Lookup::Found { node: next, params };
                }
                _ => {}
            }
            current = next;
        }
        Lookup::Found {
            node: current,
            params,
        }
    }

    fn push(&mut self, segment: Segment, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(PathNode::new(segment, Some(parent)));
        id
    }

    fn ancestry(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            chain.push(id);
            current = self.node(id).parent;
        }
        chain.reverse();
        chain
    }

    fn render(&self, node: NodeId, show: impl Fn(&Segment) -> String) -> String {
        let parts: Vec<String> = self
            .ancestry(node)
            .into_iter()
            .skip(1)
            .map(|id| show(&self.node(id).segment))
            .collect();
        format!("/{}", parts.join("/"))
    }
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
