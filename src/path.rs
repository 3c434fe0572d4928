use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Write as _};
use std::iter::Peekable;
use std::str::{Chars, FromStr};

use serde_json::{Map, Value};

use crate::controller::{FormError, FormResult};

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A parsed field name such as `contacts[0].email` or `meta["x.y"]`.
///
/// Paths always start with a key; bracketed numbers address sequence
/// elements and bare segments address mapping entries.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    pub fn parse(input: &str) -> FormResult<Self> {
        parse_segments(input)
            .map(|segments| Self { segments })
            .map_err(|reason| FormError::InvalidPath {
                path: input.to_string(),
                reason,
            })
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> FormResult<Self> {
        match segments.first() {
            Some(PathSegment::Key(key)) if !key.is_empty() => {}
            Some(PathSegment::Key(_)) => {
                return Err(FormError::InvalidPath {
                    path: String::new(),
                    reason: "empty key",
                });
            }
            Some(PathSegment::Index(index)) => {
                return Err(FormError::InvalidPath {
                    path: format!("[{index}]"),
                    reason: "path must start with a key",
                });
            }
            None => {
                return Err(FormError::InvalidPath {
                    path: String::new(),
                    reason: "path is empty",
                });
            }
        }
        let path = Self { segments };
        if path
            .segments
            .iter()
            .any(|segment| matches!(segment, PathSegment::Key(key) if key.is_empty()))
        {
            return Err(FormError::InvalidPath {
                path: path.to_string(),
                reason: "empty key",
            });
        }
        Ok(path)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn parent(&self) -> Option<FieldPath> {
        (self.segments.len() > 1).then(|| Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn child_key(&self, key: impl Into<String>) -> FieldPath {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Key(key.into()));
        Self { segments }
    }

    pub fn child_index(&self, index: usize) -> FieldPath {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(index));
        Self { segments }
    }

    /// True when `self` equals `other` or is one of its ancestors.
    pub fn is_prefix_of(&self, other: &FieldPath) -> bool {
        other.segments.starts_with(&self.segments)
    }

    pub fn is_related_to(&self, other: &FieldPath) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }

    pub(crate) fn index_under(&self, prefix: &FieldPath) -> Option<usize> {
        if self.segments.len() <= prefix.segments.len() || !prefix.is_prefix_of(self) {
            return None;
        }
        match self.segments[prefix.segments.len()] {
            PathSegment::Index(index) => Some(index),
            PathSegment::Key(_) => None,
        }
    }

    /// Swaps the leading `from` segments for `to`; paths outside `from` are
    /// returned as they are.
    pub(crate) fn rebased(&self, from: &FieldPath, to: &FieldPath) -> FieldPath {
        if !from.is_prefix_of(self) {
            return self.clone();
        }
        let mut segments = to.segments.clone();
        segments.extend_from_slice(&self.segments[from.segments.len()..]);
        Self { segments }
    }

    /// Rewrites the row index directly below `prefix`. Paths outside the
    /// prefix pass through unchanged; `None` means the row was dropped.
    pub(crate) fn reindexed(
        self,
        prefix: &FieldPath,
        remap: impl Fn(usize) -> Option<usize>,
    ) -> Option<FieldPath> {
        let Some(index) = self.index_under(prefix) else {
            return Some(self);
        };
        let next = remap(index)?;
        let mut segments = self.segments;
        segments[prefix.segments.len()] = PathSegment::Index(next);
        Some(Self { segments })
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (position, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Index(index) => write!(f, "[{index}]")?,
                PathSegment::Key(key) if needs_quoting(key) => {
                    f.write_str("[\"")?;
                    for ch in key.chars() {
                        if ch == '"' || ch == '\\' {
                            f.write_char('\\')?;
                        }
                        f.write_char(ch)?;
                    }
                    f.write_str("\"]")?;
                }
                PathSegment::Key(key) => {
                    if position > 0 {
                        f.write_char('.')?;
                    }
                    f.write_str(key)?;
                }
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

pub trait IntoFieldPath {
    fn into_field_path(self) -> FormResult<FieldPath>;
}

impl IntoFieldPath for FieldPath {
    fn into_field_path(self) -> FormResult<FieldPath> {
        Ok(self)
    }
}

impl IntoFieldPath for &FieldPath {
    fn into_field_path(self) -> FormResult<FieldPath> {
        Ok(self.clone())
    }
}

impl IntoFieldPath for &str {
    fn into_field_path(self) -> FormResult<FieldPath> {
        FieldPath::parse(self)
    }
}

impl IntoFieldPath for String {
    fn into_field_path(self) -> FormResult<FieldPath> {
        FieldPath::parse(&self)
    }
}

impl IntoFieldPath for &String {
    fn into_field_path(self) -> FormResult<FieldPath> {
        FieldPath::parse(self)
    }
}

fn needs_quoting(key: &str) -> bool {
    key.chars()
        .any(|ch| matches!(ch, '.' | '[' | ']' | '"' | '\''))
}

fn parse_segments(input: &str) -> Result<Vec<PathSegment>, &'static str> {
    if input.is_empty() {
        return Err("path is empty");
    }

    let mut segments = Vec::new();
    let mut chars = input.chars().peekable();
    let mut key = String::new();
    let mut after_bracket = false;

    loop {
        match chars.next() {
            None => {
                if !key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut key)));
                } else if !after_bracket {
                    return Err("path ends with an empty segment");
                }
                break;
            }
            Some('.') => {
                if key.is_empty() && !after_bracket {
                    return Err("empty segment before '.'");
                }
                if !key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut key)));
                }
                after_bracket = false;
                if matches!(chars.peek(), None | Some('.') | Some('[')) {
                    return Err("empty segment after '.'");
                }
            }
            Some('[') => {
                if !key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut key)));
                }
                let segment = parse_bracket(&mut chars)?;
                if segments.is_empty() && matches!(segment, PathSegment::Index(_)) {
                    return Err("path must start with a key");
                }
                segments.push(segment);
                after_bracket = true;
                if !matches!(chars.peek(), None | Some('.') | Some('[')) {
                    return Err("expected '.' or '[' after ']'");
                }
            }
            Some(']') => return Err("unexpected ']'"),
            Some(ch) => key.push(ch),
        }
    }

    Ok(segments)
}

fn parse_bracket(chars: &mut Peekable<Chars<'_>>) -> Result<PathSegment, &'static str> {
    match chars.peek().copied() {
        Some(quote @ ('"' | '\'')) => {
            chars.next();
            let mut key = String::new();
            loop {
                match chars.next() {
                    None => return Err("unterminated quoted key"),
                    Some('\\') => match chars.next() {
                        Some(escaped) => key.push(escaped),
                        None => return Err("unterminated escape in quoted key"),
                    },
                    Some(ch) if ch == quote => break,
                    Some(ch) => key.push(ch),
                }
            }
            if chars.next() != Some(']') {
                return Err("expected ']' after quoted key");
            }
            if key.is_empty() {
                return Err("empty key");
            }
            Ok(PathSegment::Key(key))
        }
        _ => {
            let mut digits = String::new();
            loop {
                match chars.next() {
                    None => return Err("unclosed '['"),
                    Some(']') => break,
                    Some(ch) if ch.is_ascii_digit() => digits.push(ch),
                    Some(_) => return Err("index must be a non-negative integer"),
                }
            }
            if digits.is_empty() {
                return Err("empty index");
            }
            digits
                .parse::<usize>()
                .map(PathSegment::Index)
                .map_err(|_| "index is too large")
        }
    }
}

pub fn get<'a>(tree: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.segments
        .iter()
        .try_fold(tree, |node, segment| match (segment, node) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key),
            (PathSegment::Key(key), Value::Array(items)) => {
                key.parse::<usize>().ok().and_then(|index| items.get(index))
            }
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index),
            _ => None,
        })
}

pub fn get_mut<'a>(tree: &'a mut Value, path: &FieldPath) -> Option<&'a mut Value> {
    segments_mut(tree, &path.segments)
}

fn segments_mut<'a>(tree: &'a mut Value, segments: &[PathSegment]) -> Option<&'a mut Value> {
    segments
        .iter()
        .try_fold(tree, |node, segment| match (segment, node) {
            (PathSegment::Key(key), Value::Object(map)) => map.get_mut(key),
            (PathSegment::Key(key), Value::Array(items)) => key
                .parse::<usize>()
                .ok()
                .and_then(move |index| items.get_mut(index)),
            (PathSegment::Index(index), Value::Array(items)) => items.get_mut(*index),
            _ => None,
        })
}

/// Returns the slot at `path`, creating intermediate containers on the way.
/// Sibling entries of every visited container are left untouched.
pub fn slot_mut<'a>(tree: &'a mut Value, path: &FieldPath) -> &'a mut Value {
    path.segments
        .iter()
        .fold(tree, |node, segment| child_slot(node, segment))
}

fn child_slot<'a>(node: &'a mut Value, segment: &PathSegment) -> &'a mut Value {
    let index = match segment {
        PathSegment::Index(index) => Some(*index),
        PathSegment::Key(key) if node.is_array() => key.parse::<usize>().ok(),
        PathSegment::Key(_) => None,
    };

    match (segment, index) {
        (_, Some(index)) => {
            if !node.is_array() {
                *node = Value::Array(Vec::new());
            }
            let Value::Array(items) = node else {
                unreachable!("slot was normalized to an array")
            };
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            &mut items[index]
        }
        (PathSegment::Key(key), None) => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(map) = node else {
                unreachable!("slot was normalized to an object")
            };
            map.entry(key.clone()).or_insert(Value::Null)
        }
        (PathSegment::Index(_), None) => unreachable!("index segments always carry an index"),
    }
}

pub fn set(tree: &mut Value, path: &FieldPath, value: Value) {
    *slot_mut(tree, path) = value;
}

/// Removes the value at `path` and prunes ancestors left fully empty.
/// Sequence elements are blanked rather than spliced so sibling indices hold.
pub fn unset(tree: &mut Value, path: &FieldPath) -> Option<Value> {
    let (last, parents) = path.segments.split_last()?;
    let removed = remove_child(segments_mut(tree, parents)?, last)?;

    for depth in (0..parents.len()).rev() {
        let Some(container) = segments_mut(tree, &parents[..depth]) else {
            break;
        };
        let child = &parents[depth];
        let prune = match (child, &*container) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key).is_some_and(is_empty_container),
            (PathSegment::Index(index), Value::Array(items)) => {
                items.get(*index).is_some_and(is_empty_container)
            }
            _ => false,
        };
        if !prune {
            break;
        }
        remove_child(container, child);
    }

    Some(removed)
}

fn remove_child(container: &mut Value, segment: &PathSegment) -> Option<Value> {
    match (segment, container) {
        (PathSegment::Key(key), Value::Object(map)) => map.remove(key),
        (PathSegment::Index(index), Value::Array(items)) if *index < items.len() => {
            if *index + 1 == items.len() {
                return items.pop();
            }
            Some(std::mem::take(&mut items[*index]))
        }
        _ => None,
    }
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Flattens `tree` into `name -> leaf` pairs. Recursion stops early at any
/// path for which `stop` returns true, so a registered field holding a whole
/// list stays a single entry.
pub fn flatten(tree: &Value, stop: impl Fn(&FieldPath) -> bool) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    if let Value::Object(map) = tree {
        for (key, value) in map {
            let path = FieldPath {
                segments: vec![PathSegment::Key(key.clone())],
            };
            flatten_into(&path, value, &stop, &mut out);
        }
    }
    out
}

fn flatten_into(
    path: &FieldPath,
    value: &Value,
    stop: &impl Fn(&FieldPath) -> bool,
    out: &mut BTreeMap<String, Value>,
) {
    if stop(path) {
        out.insert(path.to_string(), value.clone());
        return;
    }
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten_into(&path.child_key(key.clone()), child, stop, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(&path.child_index(index), child, stop, out);
            }
        }
        _ => {
            out.insert(path.to_string(), value.clone());
        }
    }
}
