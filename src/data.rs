//! The data tree templates are merged against, and field paths into it.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::PathError;

/// A leaf value of the data tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    /// Kept in its JSON form so `3` renders as `3` and `1.50` keeps its digits.
    Number(serde_json::Number),
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::String(s) => f.write_str(s),
        }
    }
}

/// Immutable view over the JSON input.
#[derive(Debug, Clone, PartialEq)]
pub enum DataNode {
    Object(BTreeMap<String, DataNode>),
    Array(Vec<DataNode>),
    Scalar(Scalar),
}

impl DataNode {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<serde_json::Value>(json).map(DataNode::from)
    }

    pub fn null() -> Self {
        DataNode::Scalar(Scalar::Null)
    }

    pub fn string(s: impl Into<String>) -> Self {
        DataNode::Scalar(Scalar::String(s.into()))
    }

    pub fn bool(b: bool) -> Self {
        DataNode::Scalar(Scalar::Bool(b))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            DataNode::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Human-readable kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            DataNode::Object(_) => "object",
            DataNode::Array(_) => "array",
            DataNode::Scalar(Scalar::Null) => "null",
            DataNode::Scalar(Scalar::Bool(_)) => "boolean",
            DataNode::Scalar(Scalar::Number(_)) => "number",
            DataNode::Scalar(Scalar::String(_)) => "string",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            DataNode::Object(m) => !m.is_empty(),
            DataNode::Array(a) => !a.is_empty(),
            DataNode::Scalar(Scalar::Null) => false,
            DataNode::Scalar(Scalar::Bool(b)) => *b,
            DataNode::Scalar(Scalar::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            DataNode::Scalar(Scalar::String(s)) => !s.is_empty(),
        }
    }

    /// The node as an array position, if it is a non-negative integer.
    pub(crate) fn as_index(&self) -> Option<usize> {
        match self {
            DataNode::Scalar(Scalar::Number(n)) => n.as_u64().and_then(|v| usize::try_from(v).ok()),
            _ => None,
        }
    }

    /// Every leaf path in the tree, objects by key and arrays by position.
    ///
    /// This is the "available fields" listing authors check their
    /// placeholders against. Empty objects and arrays count as leaves.
    pub fn field_paths(&self) -> Vec<FieldPath> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        collect_paths(self, &mut prefix, &mut out);
        out
    }
}

fn collect_paths(node: &DataNode, prefix: &mut Vec<Segment>, out: &mut Vec<FieldPath>) {
    match node {
        DataNode::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                prefix.push(Segment::Name(key.clone()));
                collect_paths(child, prefix, out);
                prefix.pop();
            }
        }
        DataNode::Array(items) if !items.is_empty() => {
            for (i, child) in items.iter().enumerate() {
                prefix.push(Segment::Index(i));
                collect_paths(child, prefix, out);
                prefix.pop();
            }
        }
        _ => {
            if !prefix.is_empty() {
                out.push(FieldPath { segments: prefix.clone() });
            }
        }
    }
}

impl From<serde_json::Value> for DataNode {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => DataNode::Scalar(Scalar::Null),
            Value::Bool(b) => DataNode::Scalar(Scalar::Bool(b)),
            Value::Number(n) => DataNode::Scalar(Scalar::Number(n)),
            Value::String(s) => DataNode::Scalar(Scalar::String(s)),
            Value::Array(items) => DataNode::Array(items.into_iter().map(DataNode::from).collect()),
            Value::Object(map) => {
                DataNode::Object(map.into_iter().map(|(k, v)| (k, DataNode::from(v))).collect())
            }
        }
    }
}

impl From<Scalar> for DataNode {
    fn from(s: Scalar) -> Self {
        DataNode::Scalar(s)
    }
}

/// One step of a field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Name(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Name(n) => f.write_str(n),
            Segment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// A dotted reference into the data tree, e.g. `Orders.0.ItemName`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Parse the textual form. Segments are ASCII alphanumerics or `_`;
    /// all-digit segments select array positions.
    pub fn parse(text: &str) -> Option<FieldPath> {
        if text.is_empty() {
            return None;
        }
        let segments = text
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return None;
                }
                if part.chars().all(|c| c.is_ascii_digit()) {
                    if let Ok(i) = part.parse::<usize>() {
                        return Some(Segment::Index(i));
                    }
                }
                Some(Segment::Name(part.to_string()))
            })
            .collect::<Option<Vec<_>>>()?;
        Some(FieldPath { segments })
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        FieldPath { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The leading name, when the path starts with one.
    pub fn root_name(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Name(n)) => Some(n),
            _ => None,
        }
    }

    /// Resolve against the data root alone, with no variables in scope.
    pub fn lookup<'d>(&self, root: &'d DataNode) -> Result<&'d DataNode, PathError> {
        self.walk(root, 0, &|_| None)
    }

    /// Walk `self.segments[from..]` starting at `start`.
    ///
    /// `index_of` maps a name to an array position when a `Name` segment
    /// meets an array; the renderer uses it to substitute loop variables.
    pub(crate) fn walk<'d>(
        &self,
        start: &'d DataNode,
        from: usize,
        index_of: &dyn Fn(&str) -> Option<usize>,
    ) -> Result<&'d DataNode, PathError> {
        if self.segments.is_empty() {
            return Err(PathError::Empty);
        }
        let mut node = start;
        for (pos, segment) in self.segments.iter().enumerate().skip(from) {
            let parent = || self.prefix(pos);
            node = match (node, segment) {
                (DataNode::Object(map), Segment::Name(key)) => {
                    map.get(key).ok_or_else(|| PathError::MissingKey { key: key.clone(), parent: parent() })?
                }
                (DataNode::Object(map), Segment::Index(i)) => map
                    .get(&i.to_string())
                    .ok_or_else(|| PathError::MissingKey { key: i.to_string(), parent: parent() })?,
                (DataNode::Array(items), Segment::Index(i)) => items
                    .get(*i)
                    .ok_or_else(|| PathError::IndexOutOfBounds { index: *i, len: items.len(), parent: parent() })?,
                (DataNode::Array(items), Segment::Name(name)) => match index_of(name) {
                    Some(i) => items
                        .get(i)
                        .ok_or_else(|| PathError::IndexOutOfBounds { index: i, len: items.len(), parent: parent() })?,
                    None => {
                        return Err(PathError::NotIndexable {
                            segment: name.clone(),
                            parent: parent(),
                            kind: node.kind(),
                        })
                    }
                },
                (DataNode::Scalar(_), seg) => {
                    return Err(PathError::NotIndexable {
                        segment: seg.to_string(),
                        parent: parent(),
                        kind: node.kind(),
                    })
                }
            };
        }
        Ok(node)
    }

    fn prefix(&self, len: usize) -> String {
        if len == 0 {
            "the data root".to_string()
        } else {
            FieldPath { segments: self.segments[..len].to_vec() }.to_string()
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}
