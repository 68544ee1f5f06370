//! Annotated rows: a document value plus out-of-band data.
//!
//! Annotations (document id, metadata) and attachments (named side-channel
//! data such as partial aggregate state) travel with the row through the
//! pipeline without being part of its visible JSON shape. A row may be scoped
//! onto a parent row: field lookups that miss fall through to the parent.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::value::Value;

/// Attachment name for the aggregate-identity -> state map.
pub const AGGREGATES: &str = "aggregates";

/// Shared handle to an enclosing scope.
pub type ScopeRef = Arc<AnnotatedValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum Attachment {
    /// Aggregate identity (its display string) -> partial or final state.
    Aggregates(BTreeMap<String, Value>),
    Value(Value),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    pub id: Option<String>,
    pub meta: BTreeMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct AnnotatedValue {
    value: Value,
    parent: Option<ScopeRef>,
    annotations: Arc<Annotations>,
    attachments: BTreeMap<String, Attachment>,
    // Term evaluations keyed by expression text (see ORDER BY).
    cached: HashMap<String, Value>,
}

impl AnnotatedValue {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            parent: None,
            annotations: Arc::new(Annotations::default()),
            attachments: BTreeMap::new(),
            cached: HashMap::new(),
        }
    }

    /// A row whose field lookups fall through to `parent`.
    pub fn scoped(value: Value, parent: Option<ScopeRef>) -> Self {
        let mut av = Self::new(value);
        av.parent = parent;
        av
    }

    /// An empty object nested inside `parent`'s scope.
    pub fn nested_scope(parent: Option<ScopeRef>) -> Self {
        Self::scoped(Value::empty_object(), parent)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn parent(&self) -> Option<&ScopeRef> {
        self.parent.as_ref()
    }

    /// Scope-aware lookup: own fields first, then the parent chain.
    pub fn field(&self, name: &str) -> Value {
        if let Some(v) = self.value.field_ref(name) {
            return v.clone();
        }
        match &self.parent {
            Some(parent) => parent.field(name),
            None => Value::Missing,
        }
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.value.set_field(name, value);
    }

    pub fn id(&self) -> Option<&str> {
        self.annotations.id.as_deref()
    }

    pub fn set_id(&mut self, id: Option<String>) {
        Arc::make_mut(&mut self.annotations).id = id;
    }

    pub fn meta(&self) -> &BTreeMap<String, Value> {
        &self.annotations.meta
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: Value) {
        Arc::make_mut(&mut self.annotations)
            .meta
            .insert(key.into(), value);
    }

    /// Share (not copy) another row's annotations.
    pub fn share_annotations(&mut self, other: &AnnotatedValue) {
        self.annotations = Arc::clone(&other.annotations);
    }

    pub fn attachment(&self, name: &str) -> Option<&Attachment> {
        self.attachments.get(name)
    }

    pub fn set_attachment(&mut self, name: impl Into<String>, attachment: Attachment) {
        self.attachments.insert(name.into(), attachment);
    }

    pub fn remove_attachment(&mut self, name: &str) -> Option<Attachment> {
        self.attachments.remove(name)
    }

    /// The aggregates map, if present and well-formed.
    pub fn aggregates(&self) -> Option<&BTreeMap<String, Value>> {
        match self.attachments.get(AGGREGATES) {
            Some(Attachment::Aggregates(map)) => Some(map),
            _ => None,
        }
    }

    pub fn aggregates_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self.attachments.get_mut(AGGREGATES) {
            Some(Attachment::Aggregates(map)) => Some(map),
            _ => None,
        }
    }

    pub fn cached_value(&self, key: &str) -> Option<&Value> {
        self.cached.get(key)
    }

    pub fn set_cached_value(&mut self, key: impl Into<String>, value: Value) {
        self.cached.insert(key.into(), value);
    }

    /// Approximate footprint (value plus attachments), for quota accounting.
    pub fn size(&self) -> usize {
        let attached: usize = self
            .attachments
            .values()
            .map(|a| match a {
                Attachment::Aggregates(map) => {
                    map.iter().map(|(k, v)| k.len() + v.size()).sum::<usize>()
                }
                Attachment::Value(v) => v.size(),
            })
            .sum();
        self.value.size() + attached
    }
}

impl Default for AnnotatedValue {
    fn default() -> Self {
        Self::new(Value::empty_object())
    }
}

impl From<Value> for AnnotatedValue {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

// Evaluation caches are not part of a row's identity.
impl PartialEq for AnnotatedValue {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
            && self.parent == other.parent
            && self.annotations == other.annotations
            && self.attachments == other.attachments
    }
}
