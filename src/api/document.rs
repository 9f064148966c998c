//! Serialization structures for the Firestore REST API (v1) and their mapping to ledger records.
//!
//! Only the parts of the API that the ledger uses are modeled. Unknown value kinds and fields are
//! ignored when reading.

use crate::error::Res;
use crate::model::{Amount, LedgerDate, Record, RecordFields, RecordId, RecordPatch, Status};
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

pub(super) const DATE: &str = "date";
pub(super) const CREATED_AT: &str = "createdAt";
pub(super) const UPDATED_AT: &str = "updatedAt";
pub(super) const CREATED_BY: &str = "createdBy";

/// A Firestore value. Exactly one member is set. Members for value kinds the ledger never uses
/// are omitted, so such values read as empty.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Value {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    /// int64 values are sent as JSON strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    integer_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    double_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    array_value: Option<ArrayValue>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub(super) struct ArrayValue {
    #[serde(default)]
    values: Vec<Value>,
}

impl Value {
    pub(super) fn string(s: impl Into<String>) -> Self {
        Self {
            string_value: Some(s.into()),
            ..Default::default()
        }
    }

    /// Whole amounts are stored as integers, others as doubles.
    pub(super) fn amount(amount: Amount) -> Self {
        match amount.as_integer() {
            Some(i) => Self {
                integer_value: Some(i.to_string()),
                ..Default::default()
            },
            None => Self {
                double_value: Some(amount.as_f64()),
                ..Default::default()
            },
        }
    }

    pub(super) fn as_str(&self) -> Option<&str> {
        self.string_value.as_deref()
    }

    /// Reads an integer, a double or a numeric string. Anything else is zero.
    pub(super) fn as_amount(&self) -> Amount {
        if let Some(i) = &self.integer_value {
            return Decimal::from_str(i).map(Amount::new).unwrap_or_default();
        }
        if let Some(d) = self.double_value {
            return Amount::from_f64(d);
        }
        self.string_value
            .as_deref()
            .map(Amount::parse_lenient)
            .unwrap_or_default()
    }

    pub(super) fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        let s = self.timestamp_value.as_deref()?;
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// The strings in an array value. Non-string members are skipped.
    pub(super) fn as_strings(&self) -> Vec<String> {
        self.array_value
            .iter()
            .flat_map(|a| a.values.iter())
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }
}

/// A Firestore document.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Document {
    /// The full resource name, `projects/{p}/databases/(default)/documents/{collection}/{id}`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(super) name: String,
    #[serde(default)]
    pub(super) fields: BTreeMap<String, Value>,
}

impl Document {
    pub(super) fn new(name: impl Into<String>, fields: BTreeMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// The last segment of `name`.
    pub(super) fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or_default()
    }

    pub(super) fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    fn text(&self, field: &str) -> String {
        self.get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Converts a stored document into a record. Fails when the date is missing or invalid.
    pub(super) fn to_record(&self) -> Res<Record> {
        let raw_date = self.get(DATE).and_then(Value::as_str).unwrap_or_default();
        let date = LedgerDate::from_str(raw_date)
            .with_context(|| format!("Document '{}' has an invalid date", self.id()))?;
        if self.id().is_empty() {
            bail!("A document without a name was returned");
        }
        let identity = self.text("identity");
        let fields = RecordFields {
            date,
            location: self.text("location"),
            name: self.text("name"),
            identity: if identity.is_empty() {
                crate::model::PLACEHOLDER.to_string()
            } else {
                identity
            },
            item: self.text("item"),
            amount_due: self.get("amountDue").map(Value::as_amount).unwrap_or_default(),
            amount_paid: self
                .get("amountPaid")
                .map(Value::as_amount)
                .unwrap_or_default(),
            status: Status::parse_label(&self.text("status")),
            note: self.text("note"),
        };
        Ok(Record::new(RecordId::new(self.id()), fields)
            .with_timestamps(
                self.get(CREATED_AT).and_then(Value::as_timestamp),
                self.get(UPDATED_AT).and_then(Value::as_timestamp),
            )
            .with_created_by(self.get(CREATED_BY).and_then(Value::as_str).map(str::to_string)))
    }
}

/// The stored form of every editable field.
pub(super) fn encode_fields(f: &RecordFields) -> BTreeMap<String, Value> {
    let mut map = BTreeMap::new();
    map.insert(DATE.to_string(), Value::string(f.date.to_string()));
    map.insert("location".to_string(), Value::string(&f.location));
    map.insert("name".to_string(), Value::string(&f.name));
    map.insert("identity".to_string(), Value::string(&f.identity));
    map.insert("item".to_string(), Value::string(&f.item));
    map.insert("amountDue".to_string(), Value::amount(f.amount_due));
    map.insert("amountPaid".to_string(), Value::amount(f.amount_paid));
    map.insert("status".to_string(), Value::string(f.status.to_string()));
    map.insert("note".to_string(), Value::string(&f.note));
    map
}

/// The stored form of the fields present in `patch`.
pub(super) fn encode_patch(patch: &RecordPatch) -> BTreeMap<String, Value> {
    let mut map = BTreeMap::new();
    if let Some(date) = patch.date {
        map.insert(DATE.to_string(), Value::string(date.to_string()));
    }
    let texts = [
        ("location", &patch.location),
        ("name", &patch.name),
        ("identity", &patch.identity),
        ("item", &patch.item),
        ("note", &patch.note),
    ];
    for (key, value) in texts {
        if let Some(value) = value {
            map.insert(key.to_string(), Value::string(value));
        }
    }
    if let Some(amount) = patch.amount_due {
        map.insert("amountDue".to_string(), Value::amount(amount));
    }
    if let Some(amount) = patch.amount_paid {
        map.insert("amountPaid".to_string(), Value::amount(amount));
    }
    if let Some(status) = patch.status {
        map.insert("status".to_string(), Value::string(status.to_string()));
    }
    map
}

/// One element of a `documents:commit` request.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Write {
    #[serde(skip_serializing_if = "Option::is_none")]
    update: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delete: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    update_mask: Option<DocumentMask>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    update_transforms: Vec<FieldTransform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_document: Option<Precondition>,
}

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentMask {
    field_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldTransform {
    field_path: String,
    set_to_server_value: &'static str,
}

impl FieldTransform {
    fn request_time(field: &str) -> Self {
        Self {
            field_path: field.to_string(),
            set_to_server_value: "REQUEST_TIME",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct Precondition {
    exists: bool,
}

impl Write {
    /// Creates a document that must not exist yet, with server-assigned timestamps.
    pub(super) fn create(document: Document) -> Self {
        Self {
            update: Some(document),
            update_transforms: vec![
                FieldTransform::request_time(CREATED_AT),
                FieldTransform::request_time(UPDATED_AT),
            ],
            current_document: Some(Precondition { exists: false }),
            ..Default::default()
        }
    }

    /// Replaces the listed fields of a document that must exist and refreshes `updatedAt`.
    pub(super) fn patch(document: Document, field_paths: Vec<String>) -> Self {
        Self {
            update: Some(document),
            update_mask: Some(DocumentMask { field_paths }),
            update_transforms: vec![FieldTransform::request_time(UPDATED_AT)],
            current_document: Some(Precondition { exists: true }),
            ..Default::default()
        }
    }

    /// Deletes a document that must exist.
    pub(super) fn delete(name: impl Into<String>) -> Self {
        Self {
            delete: Some(name.into()),
            current_document: Some(Precondition { exists: true }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub(super) struct CommitRequest {
    pub(super) writes: Vec<Write>,
}

/// One element of a `documents:runQuery` response. Elements without a document only carry
/// progress information.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RunQueryResponse {
    #[serde(default)]
    pub(super) document: Option<Document>,
}

/// The error body of a failed request.
#[derive(Debug, Default, Clone, Deserialize)]
pub(super) struct ErrorEnvelope {
    pub(super) error: ErrorStatus,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub(super) struct ErrorStatus {
    #[serde(default)]
    pub(super) message: String,
    #[serde(default)]
    pub(super) status: String,
}

impl ErrorEnvelope {
    /// Reads an error body. `runQuery` wraps it in an array.
    pub(super) fn parse(body: &str) -> Option<ErrorStatus> {
        serde_json::from_str::<ErrorEnvelope>(body)
            .map(|e| e.error)
            .or_else(|_| {
                serde_json::from_str::<Vec<ErrorEnvelope>>(body)
                    .map(|v| v.into_iter().next().map(|e| e.error).unwrap_or_default())
            })
            .ok()
    }
}
