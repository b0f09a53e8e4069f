//! Declarative schema mapping for the secondary store.
//!
//! The secondary store keeps each record as a page whose fields are named,
//! typed properties. [`SchemaMapping`] is a table of
//! `logical field -> (property name, property kind)` entries consumed by one
//! generic encoder and one generic decoder, so a schema change on the store
//! side is a table edit rather than new translation code.

use crate::error::TranslationError;
use serde_json::{json, Map, Value};
use tandem_protocol::{parse_date, parse_timestamp, Fingerprint, Record};

/// Longest text run the secondary store accepts in one rich-text segment.
const SEGMENT_LIMIT: usize = 2000;

/// A `Record` field that can be mapped to a page property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalField {
    /// `Record::text`
    Text,
    /// `Record::category`
    Category,
    /// `Record::effective_date`
    EffectiveDate,
    /// `Record::fingerprint`
    Fingerprint,
    /// `Record::primary_id`
    PrimaryId,
    /// `Record::linked`
    Linked,
}

/// Native property type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Page title (rich-text array under `title`).
    Title,
    /// Rich-text array under `rich_text`.
    RichText,
    /// `{ "start": "YYYY-MM-DD" }` under `date`.
    Date,
    /// Array of `{ "name": .. }` under `multi_select`.
    MultiSelect,
    /// Boolean under `checkbox`.
    Checkbox,
}

impl PropertyKind {
    /// JSON key holding the property value.
    pub fn key(&self) -> &'static str {
        match self {
            PropertyKind::Title => "title",
            PropertyKind::RichText => "rich_text",
            PropertyKind::Date => "date",
            PropertyKind::MultiSelect => "multi_select",
            PropertyKind::Checkbox => "checkbox",
        }
    }
}

/// One row of the mapping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMapping {
    /// The record field.
    pub field: LogicalField,
    /// Property name in the secondary store.
    pub property: String,
    /// Property type in the secondary store.
    pub kind: PropertyKind,
}

impl PropertyMapping {
    /// Creates a mapping row.
    pub fn new(field: LogicalField, property: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            field,
            property: property.into(),
            kind,
        }
    }
}

/// A field value in transit between a `Record` and a property.
#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Text(String),
    Flag(bool),
}

/// Mapping between `Record` and the secondary store's page properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMapping {
    entries: Vec<PropertyMapping>,
    allowed_categories: Option<Vec<String>>,
}

impl SchemaMapping {
    /// Creates a mapping from explicit rows.
    pub fn new(entries: Vec<PropertyMapping>) -> Self {
        Self {
            entries,
            allowed_categories: None,
        }
    }

    /// The decision-log schema used by the reference workspace.
    pub fn decision_log() -> Self {
        Self::new(vec![
            PropertyMapping::new(LogicalField::Text, "Decision", PropertyKind::Title),
            PropertyMapping::new(LogicalField::Category, "Type", PropertyKind::MultiSelect),
            PropertyMapping::new(LogicalField::EffectiveDate, "Date", PropertyKind::Date),
            PropertyMapping::new(LogicalField::Fingerprint, "Checksum", PropertyKind::RichText),
            PropertyMapping::new(LogicalField::PrimaryId, "Primary ID", PropertyKind::RichText),
            PropertyMapping::new(LogicalField::Linked, "Synced", PropertyKind::Checkbox),
        ])
    }

    /// Restricts the categories that may be written.
    pub fn with_allowed_categories(mut self, categories: Vec<String>) -> Self {
        self.allowed_categories = if categories.is_empty() {
            None
        } else {
            Some(categories)
        };
        self
    }

    /// The mapping rows.
    pub fn entries(&self) -> &[PropertyMapping] {
        &self.entries
    }

    /// Finds the row for a field.
    pub fn property_for(&self, field: LogicalField) -> Option<&PropertyMapping> {
        self.entries.iter().find(|entry| entry.field == field)
    }

    /// Builds the `properties` object for a page create/update.
    pub fn record_to_native(&self, record: &Record) -> Result<Map<String, Value>, TranslationError> {
        let label = record.label().to_string();

        if let Some(allowed) = &self.allowed_categories {
            if !record.category.is_empty()
                && !allowed
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(&record.category))
            {
                return Err(TranslationError::new(
                    label,
                    format!("category {:?} is not permitted", record.category),
                ));
            }
        }

        let mut properties = Map::new();
        for entry in &self.entries {
            let value = match entry.field {
                LogicalField::Text => FieldValue::Text(record.text.clone()),
                LogicalField::Category => FieldValue::Text(record.category.clone()),
                LogicalField::EffectiveDate => FieldValue::Text(
                    record
                        .effective_date
                        .map(|date| date.format("%Y-%m-%d").to_string())
                        .unwrap_or_default(),
                ),
                LogicalField::Fingerprint => {
                    FieldValue::Text(record.content_fingerprint().to_string())
                }
                LogicalField::PrimaryId => match &record.primary_id {
                    Some(id) => FieldValue::Text(id.clone()),
                    None => continue,
                },
                LogicalField::Linked => FieldValue::Flag(record.primary_id.is_some()),
            };
            let encoded = encode(entry, &value).map_err(|reason| TranslationError::new(&label, reason))?;
            properties.insert(entry.property.clone(), encoded);
        }
        Ok(properties)
    }

    /// Builds the `properties` object that records a link only.
    pub fn link_properties(&self, counterpart_id: &str) -> Map<String, Value> {
        let mut properties = Map::new();
        for entry in &self.entries {
            let value = match entry.field {
                LogicalField::PrimaryId => FieldValue::Text(counterpart_id.to_string()),
                LogicalField::Linked => FieldValue::Flag(true),
                _ => continue,
            };
            if let Ok(encoded) = encode(entry, &value) {
                properties.insert(entry.property.clone(), encoded);
            }
        }
        properties
    }

    /// Builds the `properties` object that records a fingerprint only.
    ///
    /// Empty when the mapping has no fingerprint property.
    pub fn fingerprint_properties(&self, fp: &Fingerprint) -> Map<String, Value> {
        let mut properties = Map::new();
        if let Some(entry) = self.property_for(LogicalField::Fingerprint) {
            if let Ok(encoded) = encode(entry, &FieldValue::Text(fp.to_string())) {
                properties.insert(entry.property.clone(), encoded);
            }
        }
        properties
    }

    /// Query filter matching pages whose stored fingerprint equals `fp`.
    pub fn fingerprint_filter(&self, fp: &Fingerprint) -> Option<Value> {
        let entry = self.property_for(LogicalField::Fingerprint)?;
        Some(json!({
            "property": entry.property,
            entry.kind.key(): { "equals": fp.as_str() },
        }))
    }

    /// Parses a page object into a `Record`.
    pub fn native_to_record(&self, page: &Value) -> Result<Record, TranslationError> {
        let Some(page_id) = page.get("id").and_then(Value::as_str) else {
            return Err(TranslationError::new("<unknown page>", "page has no id"));
        };
        let Some(properties) = page.get("properties").and_then(Value::as_object) else {
            return Err(TranslationError::new(page_id, "page has no properties"));
        };

        // Read the link first so a failure further down can still report it.
        let counterpart = self
            .property_for(LogicalField::PrimaryId)
            .and_then(|entry| properties.get(&entry.property).map(|raw| (entry, raw)))
            .and_then(|(entry, raw)| match decode(entry, raw) {
                Ok(FieldValue::Text(id)) if !id.is_empty() => Some(id),
                _ => None,
            });
        let fail = |reason: String| {
            TranslationError::new(page_id, reason).with_counterpart(counterpart.clone())
        };

        let mut record = Record::default().with_secondary_id(page_id);
        record.primary_id = counterpart.clone();
        record.updated_at = page
            .get("last_edited_time")
            .and_then(Value::as_str)
            .and_then(parse_timestamp);

        for entry in &self.entries {
            let Some(raw) = properties.get(&entry.property) else {
                continue;
            };
            let value = decode(entry, raw).map_err(&fail)?;
            match (entry.field, value) {
                (LogicalField::Text, FieldValue::Text(text)) => record.text = text,
                (LogicalField::Category, FieldValue::Text(category)) => record.category = category,
                (LogicalField::EffectiveDate, FieldValue::Text(date)) => {
                    if !date.is_empty() {
                        record.effective_date = Some(
                            parse_date(&date)
                                .ok_or_else(|| fail(format!("invalid date {date:?}")))?,
                        );
                    }
                }
                (LogicalField::Fingerprint, FieldValue::Text(hex)) => {
                    record.fingerprint = Fingerprint::from_hex(&hex);
                }
                (LogicalField::PrimaryId, _) => {}
                (LogicalField::Linked, FieldValue::Flag(flag)) => record.linked = flag,
                (field, value) => {
                    return Err(fail(format!("{field:?} cannot hold {value:?}")));
                }
            }
        }

        Ok(record)
    }
}

impl Default for SchemaMapping {
    fn default() -> Self {
        Self::decision_log()
    }
}

fn encode(entry: &PropertyMapping, value: &FieldValue) -> Result<Value, String> {
    let encoded = match (entry.kind, value) {
        (PropertyKind::Title, FieldValue::Text(text)) => json!({ "title": rich_text(text) }),
        (PropertyKind::RichText, FieldValue::Text(text)) => json!({ "rich_text": rich_text(text) }),
        (PropertyKind::Date, FieldValue::Text(date)) if date.is_empty() => json!({ "date": null }),
        (PropertyKind::Date, FieldValue::Text(date)) => json!({ "date": { "start": date } }),
        (PropertyKind::MultiSelect, FieldValue::Text(name)) if name.is_empty() => {
            json!({ "multi_select": [] })
        }
        (PropertyKind::MultiSelect, FieldValue::Text(name)) => {
            json!({ "multi_select": [{ "name": name }] })
        }
        (PropertyKind::Checkbox, FieldValue::Flag(flag)) => json!({ "checkbox": flag }),
        (kind, value) => {
            return Err(format!(
                "property {:?} of kind {kind:?} cannot hold {value:?}",
                entry.property
            ))
        }
    };
    Ok(encoded)
}

fn decode(entry: &PropertyMapping, raw: &Value) -> Result<FieldValue, String> {
    let inner = raw.get(entry.kind.key()).unwrap_or(&Value::Null);
    let malformed = || format!("property {:?} is not a valid {:?}", entry.property, entry.kind);

    match entry.kind {
        PropertyKind::Title | PropertyKind::RichText => match inner {
            Value::Null => Ok(FieldValue::Text(String::new())),
            Value::Array(segments) => Ok(FieldValue::Text(plain_text(segments))),
            _ => Err(malformed()),
        },
        PropertyKind::Date => match inner {
            Value::Null => Ok(FieldValue::Text(String::new())),
            Value::Object(date) => Ok(FieldValue::Text(
                date.get("start")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            )),
            _ => Err(malformed()),
        },
        // Multi-valued in the store, single-valued in the record: first wins.
        PropertyKind::MultiSelect => match inner {
            Value::Null => Ok(FieldValue::Text(String::new())),
            Value::Array(options) => Ok(FieldValue::Text(
                options
                    .first()
                    .and_then(|option| option.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            )),
            _ => Err(malformed()),
        },
        PropertyKind::Checkbox => match inner {
            Value::Null => Ok(FieldValue::Flag(false)),
            Value::Bool(flag) => Ok(FieldValue::Flag(*flag)),
            _ => Err(malformed()),
        },
    }
}

fn rich_text(text: &str) -> Value {
    let chars: Vec<char> = text.chars().collect();
    let segments: Vec<Value> = chars
        .chunks(SEGMENT_LIMIT)
        .map(|chunk| {
            json!({
                "type": "text",
                "text": { "content": chunk.iter().collect::<String>() },
            })
        })
        .collect();
    Value::Array(segments)
}

fn plain_text(segments: &[Value]) -> String {
    segments
        .iter()
        .filter_map(|segment| {
            segment
                .get("plain_text")
                .or_else(|| segment.get("text").and_then(|text| text.get("content")))
                .and_then(Value::as_str)
        })
        .collect()
}
