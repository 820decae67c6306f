//! Intermediate tree built from a flat `label -> value` map before it is
//! converted to `serde_json::Value` and deserialized into the typed
//! `dynamic` structs. Mirrors the node tree that
//! `original_source/pkg/config/label/label.go`'s decoder builds from
//! dotted/bracketed label paths before reflecting into Go structs.

use indexmap::IndexMap;

/// Coerces a label's raw string value into the JSON scalar its typed
/// field most likely expects, since labels carry no type information of
/// their own (spec §4.1: "scalar coercion for bool/int/duration/lists").
/// Strings that don't look like a bool or a number pass through
/// unchanged so free-form values (rule expressions, URLs, hostnames)
/// round-trip untouched.
fn leaf_to_json(raw: &str) -> serde_json::Value {
    match raw {
        "true" => return serde_json::Value::Bool(true),
        "false" => return serde_json::Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return serde_json::Value::Number(i.into());
    }
    if let Ok(u) = raw.parse::<u64>() {
        return serde_json::Value::Number(u.into());
    }
    serde_json::Value::String(raw.to_string())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelNode {
    Leaf(String),
    List(Vec<LabelNode>),
    Map(IndexMap<String, LabelNode>),
}

impl LabelNode {
    fn empty_map() -> Self {
        LabelNode::Map(IndexMap::new())
    }

    /// Inserts `value` at `segments` into this node, creating intermediate
    /// maps/lists as needed. Segments are matched case-insensitively
    /// against existing keys (spec §4.1: "label keys are matched
    /// case-insensitively"), but the first-seen casing wins so that
    /// re-encoding stays stable.
    fn insert(&mut self, segments: &[Segment], value: &str) {
        let Self::Map(map) = self else {
            // Attempting to descend through a leaf: promote in place.
            *self = Self::empty_map();
            self.insert(segments, value);
            return;
        };
        match segments.split_first() {
            None => {}
            Some((Segment::Key(key), rest)) => {
                let existing_key = map
                    .keys()
                    .find(|k| k.eq_ignore_ascii_case(key))
                    .cloned()
                    .unwrap_or_else(|| key.clone());
                let child = map.entry(existing_key).or_insert_with(Self::empty_map);
                if rest.is_empty() {
                    *child = LabelNode::Leaf(value.to_string());
                } else {
                    child.insert(rest, value);
                }
            }
            Some((Segment::Index(_), _)) => {
                // A bare index with no preceding key cannot occur: the
                // root is always a map.
            }
        }
    }

    fn insert_indexed(&mut self, key: &str, index: usize, rest: &[Segment], value: &str) {
        let Self::Map(map) = self else {
            *self = Self::empty_map();
            return self.insert_indexed(key, index, rest, value);
        };
        let existing_key = map
            .keys()
            .find(|k| k.eq_ignore_ascii_case(key))
            .cloned()
            .unwrap_or_else(|| key.to_string());
        let child = map
            .entry(existing_key)
            .or_insert_with(|| LabelNode::List(Vec::new()));
        if !matches!(child, LabelNode::List(_)) {
            *child = LabelNode::List(Vec::new());
        }
        let LabelNode::List(items) = child else {
            unreachable!("just normalized to a list above")
        };
        if items.len() <= index {
            items.resize(index + 1, Self::empty_map());
        }
        if rest.is_empty() {
            items[index] = LabelNode::Leaf(value.to_string());
        } else {
            items[index].insert(rest, value);
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            LabelNode::Leaf(s) => leaf_to_json(s),
            LabelNode::List(items) => {
                serde_json::Value::Array(items.iter().map(LabelNode::to_json).collect())
            }
            LabelNode::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => LabelNode::Leaf(String::new()),
            serde_json::Value::Bool(b) => LabelNode::Leaf(b.to_string()),
            serde_json::Value::Number(n) => LabelNode::Leaf(n.to_string()),
            serde_json::Value::String(s) => LabelNode::Leaf(s.clone()),
            serde_json::Value::Array(items) => {
                LabelNode::List(items.iter().map(LabelNode::from_json).collect())
            }
            serde_json::Value::Object(map) => LabelNode::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), LabelNode::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Flattens this node back into dotted/bracketed label paths, the
    /// inverse of [`build`]. Used by `encode_configuration` to satisfy the
    /// round-trip law `decode(encode(x)) == x`.
    pub fn flatten(&self, prefix: &str, out: &mut IndexMap<String, String>) {
        match self {
            LabelNode::Leaf(s) => {
                out.insert(prefix.to_string(), s.clone());
            }
            LabelNode::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    item.flatten(&format!("{prefix}[{i}]"), out);
                }
            }
            LabelNode::Map(map) => {
                for (k, v) in map {
                    let next = if prefix.is_empty() {
                        k.clone()
                    } else {
                        format!("{prefix}.{k}")
                    };
                    v.flatten(&next, out);
                }
            }
        }
    }
}

#[derive(Debug)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Parses a dotted/bracketed label path such as `http.routers.foo[0].rule`
/// or `http.routers.foo.middlewares.0` into segments.
fn parse_path(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for dotted in path.split('.') {
        let mut rest = dotted;
        // A leading component may still carry trailing `[N]` brackets,
        // e.g. `mirrors[2]`.
        if let Some(bracket) = rest.find('[') {
            let (key, tail) = rest.split_at(bracket);
            if !key.is_empty() {
                segments.push(Segment::Key(key.to_string()));
            }
            rest = tail;
            while let Some(close) = rest.find(']') {
                let idx_str = &rest[1..close];
                if let Ok(idx) = idx_str.parse::<usize>() {
                    segments.push(Segment::Index(idx));
                }
                rest = &rest[close + 1..];
            }
            continue;
        }
        if let Ok(idx) = rest.parse::<usize>() {
            segments.push(Segment::Index(idx));
        } else {
            segments.push(Segment::Key(rest.to_string()));
        }
    }
    segments
}

/// Builds a [`LabelNode`] tree from a flat label map, filtered to entries
/// under `root_prefix` (case-insensitive, dot-separated), per
/// spec §4.1 "Decode(labels, rootPrefix) -> LabelNode tree".
pub fn build(labels: &IndexMap<String, String>, root_prefix: &str) -> LabelNode {
    let mut root = LabelNode::empty_map();
    let prefix_with_dot = format!("{root_prefix}.");
    for (label, value) in labels {
        if !label.to_ascii_lowercase().starts_with(&prefix_with_dot.to_ascii_lowercase()) {
            continue;
        }
        let remainder = &label[prefix_with_dot.len()..];
        let segments = parse_path(remainder);
        insert_path(&mut root, &segments, value);
    }
    root
}

fn insert_path(root: &mut LabelNode, segments: &[Segment], value: &str) {
    // Find the first Index segment, if any, and split so we can thread an
    // explicit index into `insert_indexed` (LabelNode::insert doesn't
    // descend into lists on its own).
    match segments.iter().position(|s| matches!(s, Segment::Index(_))) {
        None => root.insert(segments, value),
        Some(pos) => {
            let Segment::Key(key) = &segments[pos - 1] else {
                root.insert(segments, value);
                return;
            };
            let Segment::Index(idx) = segments[pos] else {
                unreachable!()
            };
            descend_to(root, &segments[..pos - 1], key, idx, &segments[pos + 1..], value);
        }
    }
}

fn descend_to(
    root: &mut LabelNode,
    lead: &[Segment],
    key: &str,
    idx: usize,
    rest: &[Segment],
    value: &str,
) {
    if lead.is_empty() {
        root.insert_indexed(key, idx, rest, value);
        return;
    }
    let LabelNode::Map(map) = root else {
        *root = LabelNode::empty_map();
        return descend_to(root, lead, key, idx, rest, value);
    };
    let Segment::Key(lead_key) = &lead[0] else {
        return;
    };
    let existing_key = map
        .keys()
        .find(|k| k.eq_ignore_ascii_case(lead_key))
        .cloned()
        .unwrap_or_else(|| lead_key.clone());
    let child = map.entry(existing_key).or_insert_with(LabelNode::empty_map);
    descend_to(child, &lead[1..], key, idx, rest, value);
}
