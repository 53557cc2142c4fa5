//! Data types for chunks, stored records, and query results.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A scalar metadata value.
///
/// This is the value space flat vector-store metadata accepts; lists and
/// nested objects are not representable. [`Metadata::tags`] is the one
/// list-shaped field and is stored as a joined string on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// A boolean flag.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// A string.
    Str(String),
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Str(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Str(v)
    }
}

/// Metadata attached to a chunk: a small reserved-key schema plus an open
/// extension area.
///
/// Serializes to a flat JSON object. Reserved keys are typed fields; any
/// other caller-supplied key lands in [`extra`](Metadata::extra) and survives
/// indexing and retrieval unchanged. `tags` is serialized as a `", "`-joined
/// string because flat store metadata rejects list values, and deserializes
/// from either form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Logical document the chunk belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    /// Zero-based position of the chunk within its document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    /// Header of the section the chunk was cut from, when section-split.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    /// Marks baseline (reference/regulatory) content as opposed to
    /// user-uploaded content.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_default: bool,
    /// Owner of user-uploaded content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Free-form labels.
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serialize_tags",
        deserialize_with = "deserialize_tags"
    )]
    pub tags: Vec<String>,
    /// Where the content came from (file name, URL, generator).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Caller-defined fields outside the reserved schema.
    #[serde(flatten)]
    pub extra: BTreeMap<String, MetaValue>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn serialize_tags<S: Serializer>(tags: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&tags.join(", "))
}

fn deserialize_tags<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TagsRepr {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match TagsRepr::deserialize(deserializer)? {
        TagsRepr::List(tags) => tags,
        TagsRepr::Joined(s) => s
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    })
}

impl Metadata {
    /// Metadata carrying only a `doc_id`.
    pub fn for_doc(doc_id: impl Into<String>) -> Self {
        Self { doc_id: Some(doc_id.into()), ..Self::default() }
    }

    /// The owning document id, or `"unknown"` when the record carries none.
    pub fn doc_id_or_unknown(&self) -> &str {
        self.doc_id.as_deref().unwrap_or("unknown")
    }

    /// Insert a caller-defined field into the extension area.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Look up a field by its wire name, reserved keys included.
    ///
    /// Backends use this for metadata-filter matching. Unset reserved keys
    /// return `None`; `tags` is viewed in its joined-string form.
    pub fn get(&self, key: &str) -> Option<MetaValue> {
        match key {
            "doc_id" => self.doc_id.clone().map(MetaValue::Str),
            "chunk_index" => self.chunk_index.map(|i| MetaValue::Int(i as i64)),
            "section_title" => self.section_title.clone().map(MetaValue::Str),
            "is_default" => Some(MetaValue::Bool(self.is_default)),
            "user_id" => self.user_id.clone().map(MetaValue::Str),
            "tags" => {
                if self.tags.is_empty() {
                    None
                } else {
                    Some(MetaValue::Str(self.tags.join(", ")))
                }
            }
            "source" => self.source.clone().map(MetaValue::Str),
            _ => self.extra.get(key).cloned(),
        }
    }

    /// Merge two metadata sets, with `overlay` winning on collision.
    ///
    /// Used at ingestion to combine document-level metadata with chunk-level
    /// fields produced by the chunker. `is_default` sticks if either side
    /// set it.
    pub fn merged(base: &Metadata, overlay: &Metadata) -> Metadata {
        let mut extra = base.extra.clone();
        extra.extend(overlay.extra.clone());
        Metadata {
            doc_id: overlay.doc_id.clone().or_else(|| base.doc_id.clone()),
            chunk_index: overlay.chunk_index.or(base.chunk_index),
            section_title: overlay.section_title.clone().or_else(|| base.section_title.clone()),
            is_default: overlay.is_default || base.is_default,
            user_id: overlay.user_id.clone().or_else(|| base.user_id.clone()),
            tags: if overlay.tags.is_empty() { base.tags.clone() } else { overlay.tags.clone() },
            source: overlay.source.clone().or_else(|| base.source.clone()),
            extra,
        }
    }
}

/// A segment of document text with its metadata.
///
/// Chunks are produced by the chunker (no embedding attached) and returned
/// by retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// Metadata inherited from the parent document plus chunk-specific fields.
    pub metadata: Metadata,
}

impl Chunk {
    /// Create a chunk from text and metadata.
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self { text: text.into(), metadata }
    }
}

/// A fully materialized index record: id, embedding, text, and metadata.
///
/// Record ids are unique per collection; writing an existing id overwrites
/// the stored record (upsert semantics).
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// Unique identifier within the collection.
    pub id: String,
    /// The embedding for `text`.
    pub embedding: Vec<f32>,
    /// The text content.
    pub text: String,
    /// Metadata stored alongside the record.
    pub metadata: Metadata,
}

/// A record read back without its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    /// Unique identifier within the collection.
    pub id: String,
    /// The text content.
    pub text: String,
    /// Metadata stored alongside the record.
    pub metadata: Metadata,
}

impl StoredChunk {
    /// Drop the id, keeping text and metadata.
    pub fn into_chunk(self) -> Chunk {
        Chunk { text: self.text, metadata: self.metadata }
    }
}

/// A retrieved record paired with its distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    /// Unique identifier within the collection.
    pub id: String,
    /// The text content.
    pub text: String,
    /// Distance to the query embedding. Lower is more relevant; values are
    /// comparable within a single query only.
    pub score: f32,
    /// Metadata stored alongside the record.
    pub metadata: Metadata,
}

impl QueryHit {
    /// Drop id and score, keeping text and metadata.
    pub fn into_chunk(self) -> Chunk {
        Chunk { text: self.text, metadata: self.metadata }
    }
}

/// Query hits for one document, ordered ascending by distance.
///
/// A grouped query returns `Vec<DocMatches>` in first-seen order: the order
/// in which documents appear in the backend's raw nearest-neighbor list.
#[derive(Debug, Clone, PartialEq)]
pub struct DocMatches {
    /// The owning document id (`"unknown"` for records without one).
    pub doc_id: String,
    /// Hits for this document, at most `top_k` of them.
    pub hits: Vec<QueryHit>,
}
