//! Arena-backed element tree
//!
//! A [`Document`] owns every element it has ever created; elements are
//! addressed by [`NodeId`]. Replacing an element's content detaches its
//! children rather than freeing them, so ids handed out earlier never dangle.

use crate::error::{DomError, DomResult};
use crate::path::{DomPath, Step};
use indexmap::{IndexMap, IndexSet};

/// Handle to an element within one [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the element in its document's arena
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Element {
    name: String,
    attributes: IndexMap<String, String>,
    text: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Element {
    fn new(name: impl Into<String>, parent: Option<NodeId>) -> Self {
        Self {
            name: name.into(),
            attributes: IndexMap::new(),
            text: String::new(),
            children: Vec::new(),
            parent,
        }
    }
}

/// Mutable XML element tree
///
/// Accessors taking a [`NodeId`] panic if the id was issued by a different
/// document.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Element>,
    root: NodeId,
}

impl Document {
    /// Create a document with a single, empty root element
    #[must_use]
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            nodes: vec![Element::new(root_name, None)],
            root: NodeId(0),
        }
    }

    /// Root element
    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Element name
    #[inline]
    #[must_use]
    pub fn name(&self, node: NodeId) -> &str {
        &self.nodes[node.0].name
    }

    /// Text content held directly by the element
    #[inline]
    #[must_use]
    pub fn text(&self, node: NodeId) -> &str {
        &self.nodes[node.0].text
    }

    /// Replace the element's content with text, detaching any child elements
    pub fn set_text(&mut self, node: NodeId, text: impl Into<String>) -> NodeId {
        let children = std::mem::take(&mut self.nodes[node.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
        self.nodes[node.0].text = text.into();
        node
    }

    /// Attribute value
    #[inline]
    #[must_use]
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes[node.0].attributes.get(name).map(String::as_str)
    }

    /// Set (or replace) an attribute
    pub fn set_attribute(
        &mut self,
        node: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> NodeId {
        self.nodes[node.0]
            .attributes
            .insert(name.into(), value.into());
        node
    }

    /// Attributes in insertion order
    pub fn attributes(&self, node: NodeId) -> impl Iterator<Item = (&str, &str)> {
        self.nodes[node.0]
            .attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parent element, `None` for the root and detached elements
    #[inline]
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    /// Parent element, or the element itself when it has none
    #[inline]
    #[must_use]
    pub fn parent_or_self(&self, node: NodeId) -> NodeId {
        self.parent(node).unwrap_or(node)
    }

    /// Child elements in document order
    #[inline]
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// Child elements with the given name
    pub fn children_named<'a>(
        &'a self,
        node: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(node)
            .iter()
            .copied()
            .filter(move |c| self.nodes[c.0].name == name)
    }

    /// Element name without any namespace prefix (`fm:api` → `api`)
    #[inline]
    #[must_use]
    pub fn local_name(&self, node: NodeId) -> &str {
        local_part(self.name(node))
    }

    /// Child elements whose local name matches, whatever their prefix
    ///
    /// Used for configuration schemas written either bare (`<api>`) or
    /// prefixed (`<fm:api>`).
    pub fn children_local<'a>(
        &'a self,
        node: NodeId,
        local: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(node)
            .iter()
            .copied()
            .filter(move |c| local_part(&self.nodes[c.0].name) == local)
    }

    /// True if the element is reachable from the root
    #[must_use]
    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Append a new child element
    pub fn add_element(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Element::new(name, Some(parent)));
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Append a new child element holding text
    pub fn add_element_with_text(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> NodeId {
        let id = self.add_element(parent, name);
        self.nodes[id.0].text = text.into();
        id
    }

    pub(crate) fn append_text(&mut self, node: NodeId, text: &str) {
        self.nodes[node.0].text.push_str(text);
    }

    /// All elements matched by `path` from `context`, in first-seen order
    ///
    /// A trailing attribute step keeps only elements carrying that attribute.
    #[must_use]
    pub fn select(&self, context: NodeId, path: &DomPath) -> Vec<NodeId> {
        let mut steps = path.steps();
        let mut current: IndexSet<NodeId> = IndexSet::new();

        if path.is_absolute() {
            match steps.first() {
                Some(Step::Child(name)) if *name == self.nodes[self.root.0].name => {
                    current.insert(self.root);
                    steps = &steps[1..];
                }
                _ => return Vec::new(),
            }
        } else {
            current.insert(context);
        }

        for step in steps {
            let mut next = IndexSet::new();
            for node in &current {
                match step {
                    Step::Child(name) => next.extend(self.children_named(*node, name)),
                    Step::Current => {
                        next.insert(*node);
                    }
                    Step::Parent => {
                        if let Some(parent) = self.parent(*node) {
                            next.insert(parent);
                        }
                    }
                    Step::Attribute(name) => {
                        if self.attribute(*node, name).is_some() {
                            next.insert(*node);
                        }
                    }
                }
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }

        current.into_iter().collect()
    }

    /// String values matched by `path`: attribute values for attribute paths,
    /// element text otherwise
    #[must_use]
    pub fn select_values(&self, context: NodeId, path: &DomPath) -> Vec<String> {
        let nodes = self.select(context, path);
        match path.attribute() {
            Some(attr) => nodes
                .into_iter()
                .filter_map(|n| self.attribute(n, attr).map(str::to_string))
                .collect(),
            None => nodes.into_iter().map(|n| self.text(n).to_string()).collect(),
        }
    }

    /// The single element matched by `path`, if any
    ///
    /// # Errors
    /// `DomError::TooMany` if more than one element matches
    pub fn get_1e(&self, context: NodeId, path: &DomPath) -> DomResult<Option<NodeId>> {
        let matched = self.select(context, &path.element_path());
        match matched.len() {
            0 => Ok(None),
            1 => Ok(Some(matched[0])),
            count => Err(DomError::too_many(path, count)),
        }
    }

    /// The single string value matched by `path`, if any
    ///
    /// # Errors
    /// `DomError::TooMany` if more than one node matches
    pub fn get_1s(&self, context: NodeId, path: &DomPath) -> DomResult<Option<String>> {
        let mut values = self.select_values(context, path);
        match values.len() {
            0 => Ok(None),
            1 => Ok(values.pop()),
            count => Err(DomError::too_many(path, count)),
        }
    }

    /// Locate the element at `path`, creating missing elements along the way
    ///
    /// Every step must resolve to at most one element. Paths that are not
    /// plain child names cannot create anything and must already resolve.
    ///
    /// # Errors
    /// - `DomError::TooMany` if any step is ambiguous
    /// - `DomError::NotFound` if a non-simple path matches nothing
    pub fn get_create_1e(&mut self, context: NodeId, path: &DomPath) -> DomResult<NodeId> {
        self.get_create(context, path, true)
    }

    /// Like [`Document::get_create_1e`] but takes the first match at each step
    ///
    /// # Errors
    /// `DomError::NotFound` if a non-simple path matches nothing
    pub fn get_create_first(&mut self, context: NodeId, path: &DomPath) -> DomResult<NodeId> {
        self.get_create(context, path, false)
    }

    fn get_create(&mut self, context: NodeId, path: &DomPath, strict: bool) -> DomResult<NodeId> {
        let path = path.element_path();
        if !path.is_simple() {
            let matched = self.select(context, &path);
            return match matched.len() {
                0 => Err(DomError::NotFound(path.to_string())),
                n if n > 1 && strict => Err(DomError::too_many(&path, n)),
                _ => Ok(matched[0]),
            };
        }

        let mut current = context;
        for step in path.steps() {
            let Step::Child(name) = step else {
                continue;
            };
            let existing: Vec<NodeId> = self.children_named(current, name).collect();
            current = match existing.len() {
                0 => self.add_element(current, name.clone()),
                n if n > 1 && strict => return Err(DomError::too_many(&path, n)),
                _ => existing[0],
            };
        }
        Ok(current)
    }

    /// First string value at a root-relative path, for diagnostics and tests
    #[must_use]
    pub fn text_at(&self, path: &str) -> Option<String> {
        let path: DomPath = path.parse().ok()?;
        self.select_values(self.root, &path).into_iter().next()
    }

    /// Number of elements matched by a root-relative path
    #[must_use]
    pub fn count_at(&self, path: &str) -> usize {
        path.parse::<DomPath>()
            .map(|p| self.select(self.root, &p).len())
            .unwrap_or(0)
    }
}

/// Part of a qualified name after the prefix
#[must_use]
pub fn local_part(name: &str) -> &str {
    name.split_once(':').map_or(name, |(_, local)| local)
}
