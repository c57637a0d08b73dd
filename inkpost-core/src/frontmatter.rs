//! Front matter parsing and serialization for article files.
//!
//! A header is a `---` fenced block at the very start of a file. Parsing
//! keeps a verbatim raw capture for every field next to the typed value, so
//! serialization can re-emit untouched fields byte-for-byte and only
//! re-derives formatting for fields that were actually mutated.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Header opened with '---' but never closed")]
    Unterminated,

    #[error("Invalid YAML in field '{field}': {message}")]
    Yaml { field: String, message: String },

    #[error("Malformed header line: {0}")]
    FieldLine(String),

    #[error("Duplicate field: {0}")]
    DuplicateField(String),

    #[error("Field '{field}' expects {expected}")]
    FieldShape {
        field: String,
        expected: &'static str,
    },
}

/// A parsed field value: scalar, recognized timestamp, sequence, or mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Scalar(String),
    Timestamp(NaiveDateTime),
    Sequence(Vec<FieldValue>),
    Mapping(Vec<(String, FieldValue)>),
}

impl FieldValue {
    pub fn scalar(s: impl Into<String>) -> Self {
        FieldValue::Scalar(s.into())
    }

    /// Scalar text of this value, if it is one.
    pub fn as_scalar(&self) -> Option<String> {
        match self {
            FieldValue::Scalar(s) => Some(s.clone()),
            FieldValue::Timestamp(t) => Some(t.format(TIMESTAMP_FORMAT).to_string()),
            _ => None,
        }
    }
}

/// One category path: segment names from the taxonomy root to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryPath(pub Vec<String>);

impl CategoryPath {
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Parse from a display string, splitting `a/b` into segments.
    pub fn from_display(s: &str) -> Self {
        Self(
            s.split('/')
                .filter(|seg| !seg.is_empty())
                .map(|seg| seg.to_string())
                .collect(),
        )
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_with(&self, prefix: &CategoryPath) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Replace a leading `prefix` with `replacement`, if it matches.
    pub fn reprefixed(&self, prefix: &CategoryPath, replacement: &CategoryPath) -> Option<Self> {
        if !self.starts_with(prefix) {
            return None;
        }
        let mut segments = replacement.0.clone();
        segments.extend_from_slice(&self.0[prefix.0.len()..]);
        Some(Self(segments))
    }
}

impl std::fmt::Display for CategoryPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// A field the engine does not interpret, kept with its original text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawField {
    pub name: String,
    pub value: FieldValue,
    /// Exact header lines for this field, emitted verbatim on serialize.
    pub raw: String,
}

/// Structured article metadata with per-field raw capture.
///
/// Known fields are typed; everything else lives in `unknown` in original
/// relative order. A raw capture is cleared the moment its field is mutated,
/// after which the field serializes canonically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    title: Option<String>,
    title_raw: Option<String>,
    date: Option<NaiveDateTime>,
    date_raw: Option<String>,
    updated: Option<NaiveDateTime>,
    updated_raw: Option<String>,
    categories: Vec<CategoryPath>,
    categories_raw: Option<String>,
    tags: Vec<String>,
    tags_raw: Option<String>,
    unknown: Vec<RawField>,
    /// Header text before the first field (top-level comments).
    preamble: String,
    /// Whether the source text carried an explicit `---` fence.
    fenced: bool,
}

impl FrontMatter {
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn date(&self) -> Option<NaiveDateTime> {
        self.date
    }

    pub fn updated(&self) -> Option<NaiveDateTime> {
        self.updated
    }

    pub fn categories(&self) -> &[CategoryPath] {
        &self.categories
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn unknown_fields(&self) -> &[RawField] {
        &self.unknown
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.title_raw.is_none()
            && self.date.is_none()
            && self.date_raw.is_none()
            && self.updated.is_none()
            && self.updated_raw.is_none()
            && self.categories.is_empty()
            && self.categories_raw.is_none()
            && self.tags.is_empty()
            && self.tags_raw.is_none()
            && self.unknown.is_empty()
            && self.preamble.is_empty()
    }

    pub fn set_title(&mut self, title: String) -> Option<String> {
        self.title_raw = None;
        self.title.replace(title)
    }

    pub fn set_date(&mut self, date: NaiveDateTime) -> Option<NaiveDateTime> {
        self.date_raw = None;
        self.date.replace(date)
    }

    pub fn set_updated(&mut self, updated: NaiveDateTime) -> Option<NaiveDateTime> {
        self.updated_raw = None;
        self.updated.replace(updated)
    }

    pub fn set_categories(&mut self, categories: Vec<CategoryPath>) -> Vec<CategoryPath> {
        self.categories_raw = None;
        std::mem::replace(&mut self.categories, dedup_paths(categories))
    }

    pub fn set_tags(&mut self, tags: Vec<String>) -> Vec<String> {
        self.tags_raw = None;
        std::mem::replace(&mut self.tags, dedup_tags(tags))
    }

    /// Add a category path. Returns false when already present.
    pub fn add_category(&mut self, path: CategoryPath) -> bool {
        if self.categories.contains(&path) {
            return false;
        }
        self.categories_raw = None;
        self.categories.push(path);
        true
    }

    /// Remove a category path. Returns false when absent.
    pub fn remove_category(&mut self, path: &CategoryPath) -> bool {
        let Some(pos) = self.categories.iter().position(|p| p == path) else {
            return false;
        };
        self.categories_raw = None;
        self.categories.remove(pos);
        true
    }

    pub fn add_tag(&mut self, tag: &str) -> bool {
        if self.tags.iter().any(|t| t == tag) {
            return false;
        }
        self.tags_raw = None;
        self.tags.push(tag.to_string());
        true
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let Some(pos) = self.tags.iter().position(|t| t == tag) else {
            return false;
        };
        self.tags_raw = None;
        self.tags.remove(pos);
        true
    }

    /// Set an uninterpreted field, replacing any existing one by name.
    /// Returns the prior value.
    pub fn set_unknown(&mut self, name: &str, value: FieldValue) -> Option<FieldValue> {
        let raw = emit_field_block(name, &value);
        if let Some(existing) = self.unknown.iter_mut().find(|f| f.name == name) {
            existing.raw = raw;
            return Some(std::mem::replace(&mut existing.value, value));
        }
        self.unknown.push(RawField {
            name: name.to_string(),
            value,
            raw,
        });
        None
    }

    /// Current value of a field by name, known or unknown.
    pub fn field_value(&self, name: &str) -> Option<FieldValue> {
        match name {
            "title" => self.title.clone().map(FieldValue::Scalar),
            "date" => self.date.map(FieldValue::Timestamp),
            "updated" => self.updated.map(FieldValue::Timestamp),
            "categories" => {
                if self.categories.is_empty() {
                    None
                } else {
                    Some(FieldValue::Sequence(
                        self.categories.iter().map(path_value).collect(),
                    ))
                }
            }
            "tags" => {
                if self.tags.is_empty() {
                    None
                } else {
                    Some(FieldValue::Sequence(
                        self.tags.iter().cloned().map(FieldValue::Scalar).collect(),
                    ))
                }
            }
            _ => self
                .unknown
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.value.clone()),
        }
    }
}

fn path_value(path: &CategoryPath) -> FieldValue {
    if path.0.len() == 1 {
        FieldValue::Scalar(path.0[0].clone())
    } else {
        FieldValue::Sequence(path.0.iter().cloned().map(FieldValue::Scalar).collect())
    }
}

fn dedup_paths(paths: Vec<CategoryPath>) -> Vec<CategoryPath> {
    let mut out: Vec<CategoryPath> = Vec::with_capacity(paths.len());
    for p in paths {
        if !p.is_empty() && !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for t in tags {
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

/// Recognize ISO-like date and date-time literals.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Split `raw` into front matter and body.
///
/// A header is recognized only when the first line is exactly `---`; without
/// one the whole input is body and the front matter is empty. An opening
/// fence without a closing fence is an error.
pub fn parse(raw: &str) -> Result<(FrontMatter, String), HeaderError> {
    let mut lines = raw.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok((FrontMatter::default(), String::new()));
    };
    if first.trim_end() != "---" {
        return Ok((FrontMatter::default(), raw.to_string()));
    }

    let mut offset = first.len();
    let mut fence = None;
    for line in lines {
        if line.trim_end() == "---" {
            fence = Some((offset, offset + line.len()));
            break;
        }
        offset += line.len();
    }
    let Some((header_end, body_start)) = fence else {
        return Err(HeaderError::Unterminated);
    };

    let header = &raw[first.len()..header_end];
    let body = &raw[body_start..];

    let mut fm = parse_header(header)?;
    fm.fenced = true;
    Ok((fm, body.to_string()))
}

fn parse_header(header: &str) -> Result<FrontMatter, HeaderError> {
    let mut fm = FrontMatter::default();
    let mut seen: Vec<String> = Vec::new();

    for (name, raw) in split_field_blocks(header, &mut fm.preamble)? {
        if seen.iter().any(|s| s == &name) {
            return Err(HeaderError::DuplicateField(name));
        }
        seen.push(name.clone());

        let value = parse_block(&name, &raw)?;
        match name.as_str() {
            "title" => {
                let text = value.as_scalar().ok_or(HeaderError::FieldShape {
                    field: name,
                    expected: "a scalar value",
                })?;
                fm.title = Some(text);
                fm.title_raw = Some(raw);
            }
            "date" => {
                fm.date = scalar_timestamp(&value);
                fm.date_raw = Some(raw);
            }
            "updated" => {
                fm.updated = scalar_timestamp(&value);
                fm.updated_raw = Some(raw);
            }
            "categories" => {
                fm.categories = dedup_paths(category_paths(&name, &value)?);
                fm.categories_raw = Some(raw);
            }
            "tags" => {
                fm.tags = dedup_tags(tag_names(&name, &value)?);
                fm.tags_raw = Some(raw);
            }
            _ => fm.unknown.push(RawField {
                name,
                value: infer_timestamps(value),
                raw,
            }),
        }
    }

    Ok(fm)
}

/// Split the header into `(field name, verbatim block)` pairs. A block is a
/// top-level `key:` line plus every following indented, blank, or comment
/// line.
fn split_field_blocks(
    header: &str,
    preamble: &mut String,
) -> Result<Vec<(String, String)>, HeaderError> {
    let mut blocks: Vec<(String, String)> = Vec::new();

    for line in header.split_inclusive('\n') {
        let trimmed = line.trim_end();
        let continuation = line.starts_with(' ')
            || line.starts_with('\t')
            || trimmed.is_empty()
            || trimmed.starts_with('#');

        if continuation {
            match blocks.last_mut() {
                Some((_, raw)) => raw.push_str(line),
                None => preamble.push_str(line),
            }
            continue;
        }

        let Some(colon) = trimmed.find(':') else {
            return Err(HeaderError::FieldLine(trimmed.to_string()));
        };
        let name = trimmed[..colon].trim().to_string();
        if name.is_empty() {
            return Err(HeaderError::FieldLine(trimmed.to_string()));
        }
        blocks.push((name, line.to_string()));
    }

    Ok(blocks)
}

/// Parse one field block through serde_yaml and lower it to a `FieldValue`.
fn parse_block(name: &str, raw: &str) -> Result<FieldValue, HeaderError> {
    let doc: serde_yaml::Value =
        serde_yaml::from_str(raw).map_err(|e| HeaderError::Yaml {
            field: name.to_string(),
            message: e.to_string(),
        })?;
    let serde_yaml::Value::Mapping(mut map) = doc else {
        return Err(HeaderError::FieldLine(raw.trim_end().to_string()));
    };
    let value = map
        .iter_mut()
        .next()
        .map(|(_, v)| std::mem::take(v))
        .unwrap_or(serde_yaml::Value::Null);
    Ok(lower_value(value))
}

fn lower_value(value: serde_yaml::Value) -> FieldValue {
    match value {
        serde_yaml::Value::Null => FieldValue::Scalar(String::new()),
        serde_yaml::Value::Bool(b) => FieldValue::Scalar(b.to_string()),
        serde_yaml::Value::Number(n) => FieldValue::Scalar(n.to_string()),
        serde_yaml::Value::String(s) => FieldValue::Scalar(s),
        serde_yaml::Value::Sequence(items) => {
            FieldValue::Sequence(items.into_iter().map(lower_value).collect())
        }
        serde_yaml::Value::Mapping(map) => FieldValue::Mapping(
            map.into_iter()
                .map(|(k, v)| (yaml_key(&k), lower_value(v)))
                .collect(),
        ),
        serde_yaml::Value::Tagged(tagged) => lower_value(tagged.value),
    }
}

/// Date inference for uninterpreted fields: ISO-like scalars become
/// timestamps, everything else stays a string. Tag and category names are
/// never inferred, so a tag literally named `2024-01-01` keeps its text.
fn infer_timestamps(value: FieldValue) -> FieldValue {
    match value {
        FieldValue::Scalar(s) => match parse_timestamp(&s) {
            Some(ts) => FieldValue::Timestamp(ts),
            None => FieldValue::Scalar(s),
        },
        FieldValue::Sequence(items) => {
            FieldValue::Sequence(items.into_iter().map(infer_timestamps).collect())
        }
        FieldValue::Mapping(entries) => FieldValue::Mapping(
            entries
                .into_iter()
                .map(|(k, v)| (k, infer_timestamps(v)))
                .collect(),
        ),
        other => other,
    }
}

fn yaml_key(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        other => format!("{:?}", other),
    }
}

fn scalar_timestamp(value: &FieldValue) -> Option<NaiveDateTime> {
    match value {
        FieldValue::Timestamp(ts) => Some(*ts),
        FieldValue::Scalar(s) => parse_timestamp(s),
        _ => None,
    }
}

/// Interpret a `categories` value. A top-level scalar is one category
/// (split on `/` into segments); a nested sequence is one multi-segment
/// path whose segments are taken literally.
pub(crate) fn category_paths(
    field: &str,
    value: &FieldValue,
) -> Result<Vec<CategoryPath>, HeaderError> {
    let items: Vec<&FieldValue> = match value {
        FieldValue::Scalar(s) if s.is_empty() => return Ok(Vec::new()),
        FieldValue::Scalar(_) | FieldValue::Timestamp(_) => vec![value],
        FieldValue::Sequence(items) => items.iter().collect(),
        FieldValue::Mapping(_) => {
            return Err(HeaderError::FieldShape {
                field: field.to_string(),
                expected: "a sequence of category entries",
            })
        }
    };

    let mut paths = Vec::with_capacity(items.len());
    for item in items {
        match item {
            FieldValue::Scalar(s) => paths.push(CategoryPath::from_display(s)),
            FieldValue::Timestamp(ts) => paths.push(CategoryPath::new(vec![ts
                .format(TIMESTAMP_FORMAT)
                .to_string()])),
            FieldValue::Sequence(segments) => {
                let mut path = Vec::with_capacity(segments.len());
                for seg in segments {
                    let text = seg.as_scalar().ok_or(HeaderError::FieldShape {
                        field: field.to_string(),
                        expected: "scalar path segments",
                    })?;
                    if !text.is_empty() {
                        path.push(text);
                    }
                }
                paths.push(CategoryPath::new(path));
            }
            FieldValue::Mapping(_) => {
                return Err(HeaderError::FieldShape {
                    field: field.to_string(),
                    expected: "scalar or nested-list category entries",
                })
            }
        }
    }
    Ok(paths)
}

pub(crate) fn tag_names(field: &str, value: &FieldValue) -> Result<Vec<String>, HeaderError> {
    match value {
        FieldValue::Scalar(s) if s.is_empty() => Ok(Vec::new()),
        FieldValue::Scalar(_) | FieldValue::Timestamp(_) => Ok(vec![value.as_scalar().unwrap()]),
        FieldValue::Sequence(items) => items
            .iter()
            .map(|item| {
                item.as_scalar().ok_or(HeaderError::FieldShape {
                    field: field.to_string(),
                    expected: "scalar tag names",
                })
            })
            .collect(),
        FieldValue::Mapping(_) => Err(HeaderError::FieldShape {
            field: field.to_string(),
            expected: "a sequence of tag names",
        }),
    }
}

/// Re-emit a front matter and body as file text.
///
/// Known fields come first in canonical order, then unknown fields in their
/// original relative order. Fields still carrying a raw capture are emitted
/// verbatim; mutated fields are formatted canonically.
pub fn serialize(fm: &FrontMatter, body: &str) -> String {
    if fm.is_empty() && !fm.fenced {
        return body.to_string();
    }

    let mut out = String::from("---\n");
    out.push_str(&fm.preamble);

    match (&fm.title_raw, &fm.title) {
        (Some(raw), _) => out.push_str(raw),
        (None, Some(title)) => {
            out.push_str("title: ");
            out.push_str(&yaml_scalar(title));
            out.push('\n');
        }
        (None, None) => {}
    }

    match (&fm.date_raw, fm.date) {
        (Some(raw), _) => out.push_str(raw),
        (None, Some(date)) => {
            out.push_str("date: ");
            out.push_str(&date.format(TIMESTAMP_FORMAT).to_string());
            out.push('\n');
        }
        (None, None) => {}
    }

    match (&fm.updated_raw, fm.updated) {
        (Some(raw), _) => out.push_str(raw),
        (None, Some(updated)) => {
            out.push_str("updated: ");
            out.push_str(&updated.format(TIMESTAMP_FORMAT).to_string());
            out.push('\n');
        }
        (None, None) => {}
    }

    match (&fm.categories_raw, fm.categories.is_empty()) {
        (Some(raw), _) => out.push_str(raw),
        (None, false) => {
            out.push_str("categories:\n");
            for path in &fm.categories {
                out.push_str(&category_item(path));
            }
        }
        (None, true) => {}
    }

    match (&fm.tags_raw, fm.tags.is_empty()) {
        (Some(raw), _) => out.push_str(raw),
        (None, false) => {
            out.push_str("tags:\n");
            for tag in &fm.tags {
                out.push_str("  - ");
                out.push_str(&yaml_scalar(tag));
                out.push('\n');
            }
        }
        (None, true) => {}
    }

    for field in &fm.unknown {
        out.push_str(&field.raw);
    }

    out.push_str("---\n");
    out.push_str(body);
    out
}

/// Canonical emission of one category entry. Single-segment paths emit as a
/// plain item unless the name contains `/` (which would re-parse as a
/// nested path); everything else emits as a flow list.
fn category_item(path: &CategoryPath) -> String {
    if path.0.len() == 1 && !path.0[0].contains('/') {
        format!("  - {}\n", yaml_scalar(&path.0[0]))
    } else {
        let inner: Vec<String> = path.0.iter().map(|s| yaml_scalar(s)).collect();
        format!("  - [{}]\n", inner.join(", "))
    }
}

/// Emit one scalar with serde_yaml quoting rules.
fn yaml_scalar(s: &str) -> String {
    let emitted = serde_yaml::to_string(s).unwrap_or_else(|_| format!("'{}'", s));
    emitted.trim_end().to_string()
}

/// Canonical emission of an arbitrary field as a header block.
pub(crate) fn emit_field_block(name: &str, value: &FieldValue) -> String {
    let mut out = String::new();
    match value {
        FieldValue::Scalar(s) => {
            out.push_str(name);
            if s.is_empty() {
                out.push_str(":\n");
            } else {
                out.push_str(": ");
                out.push_str(&yaml_scalar(s));
                out.push('\n');
            }
        }
        FieldValue::Timestamp(ts) => {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(&ts.format(TIMESTAMP_FORMAT).to_string());
            out.push('\n');
        }
        FieldValue::Sequence(_) | FieldValue::Mapping(_) => {
            out.push_str(name);
            out.push_str(":\n");
            emit_nested(&mut out, value, 1);
        }
    }
    out
}

fn emit_nested(out: &mut String, value: &FieldValue, depth: usize) {
    let indent = "  ".repeat(depth);
    match value {
        FieldValue::Scalar(_) | FieldValue::Timestamp(_) => {
            // Handled inline by the callers below.
        }
        FieldValue::Sequence(items) => {
            for item in items {
                match item {
                    FieldValue::Scalar(s) => {
                        out.push_str(&format!("{}- {}\n", indent, yaml_scalar(s)))
                    }
                    FieldValue::Timestamp(ts) => out.push_str(&format!(
                        "{}- {}\n",
                        indent,
                        ts.format(TIMESTAMP_FORMAT)
                    )),
                    nested => {
                        out.push_str(&format!("{}-\n", indent));
                        emit_nested(out, nested, depth + 1);
                    }
                }
            }
        }
        FieldValue::Mapping(entries) => {
            for (key, val) in entries {
                match val {
                    FieldValue::Scalar(s) => {
                        out.push_str(&format!("{}{}: {}\n", indent, key, yaml_scalar(s)))
                    }
                    FieldValue::Timestamp(ts) => out.push_str(&format!(
                        "{}{}: {}\n",
                        indent,
                        key,
                        ts.format(TIMESTAMP_FORMAT)
                    )),
                    nested => {
                        out.push_str(&format!("{}{}:\n", indent, key));
                        emit_nested(out, nested, depth + 1);
                    }
                }
            }
        }
    }
}
