// ABOUTME: Core data model: field types, field descriptors, typed values, and records.
// ABOUTME: Values serialize to the JSON shapes extraction envelopes carry.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

/// Semantic type of a field. Anything unrecognized is `SingleLineText`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    #[default]
    SingleLineText,
    LongText,
    Number,
    Date,
    Checkbox,
    Select,
    MultipleSelect,
    Url,
    Email,
    PhoneNumber,
    Attachment,
    ForeignKey,
    Formula,
    Rollup,
    Currency,
    Percent,
    Duration,
    Rating,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::SingleLineText => "singleLineText",
            FieldType::LongText => "longText",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Checkbox => "checkbox",
            FieldType::Select => "select",
            FieldType::MultipleSelect => "multipleSelect",
            FieldType::Url => "url",
            FieldType::Email => "email",
            FieldType::PhoneNumber => "phoneNumber",
            FieldType::Attachment => "attachment",
            FieldType::ForeignKey => "foreignKey",
            FieldType::Formula => "formula",
            FieldType::Rollup => "rollup",
            FieldType::Currency => "currency",
            FieldType::Percent => "percent",
            FieldType::Duration => "duration",
            FieldType::Rating => "rating",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for type names that map to no known field type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown field type: {0}")]
pub struct UnknownFieldType(pub String);

impl FromStr for FieldType {
    type Err = UnknownFieldType;

    /// Accepts canonical names and the aliases grid vendors put in markup,
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = match s.trim().to_ascii_lowercase().as_str() {
            "singlelinetext" | "text" | "string" => FieldType::SingleLineText,
            "longtext" | "multilinetext" | "richtext" => FieldType::LongText,
            "number" | "autonumber" | "count" => FieldType::Number,
            "date" | "datetime" | "createdtime" | "lastmodifiedtime" => FieldType::Date,
            "checkbox" | "boolean" => FieldType::Checkbox,
            "select" | "singleselect" => FieldType::Select,
            "multipleselect" | "multipleselects" | "multiselect" => FieldType::MultipleSelect,
            "url" | "link" => FieldType::Url,
            "email" => FieldType::Email,
            "phonenumber" | "phone" => FieldType::PhoneNumber,
            "attachment" | "multipleattachment" | "multipleattachments" => FieldType::Attachment,
            "foreignkey" | "multiplerecordlinks" | "linkedrecord" => FieldType::ForeignKey,
            "formula" => FieldType::Formula,
            "rollup" | "lookup" => FieldType::Rollup,
            "currency" => FieldType::Currency,
            "percent" => FieldType::Percent,
            "duration" => FieldType::Duration,
            "rating" => FieldType::Rating,
            _ => return Err(UnknownFieldType(s.to_string())),
        };
        Ok(t)
    }
}

/// One discovered column or field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub index: usize,
    pub name: String,
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// One attachment found in a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
    pub filename: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    File,
}

/// A hyperlink with its visible label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub url: String,
    pub label: String,
}

/// A typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    #[serde(serialize_with = "serialize_number")]
    Number(f64),
    Text(String),
    #[serde(serialize_with = "serialize_instant")]
    Date(DateTime<Utc>),
    List(Vec<String>),
    Link(Link),
    Attachments(Vec<Attachment>),
}

fn serialize_number<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if v.fract() == 0.0 && v.abs() <= MAX_SAFE {
        s.serialize_i64(*v as i64)
    } else {
        s.serialize_f64(*v)
    }
}

pub(crate) fn serialize_instant<S: Serializer>(v: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&v.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Field values of one record, keyed by field name, in field order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Fields(IndexMap<String, Value>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name`, replacing an earlier value for the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// One extracted row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: String,
    pub fields: Fields,
}
