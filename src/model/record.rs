use crate::error::Error;
use crate::model::{Amount, LedgerDate};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The placeholder used for an identity or status that was not given.
pub const PLACEHOLDER: &str = "-";

/// The payment status label of a record. It is display-only and does not influence any
/// computation.
///
/// Labels are stored in Chinese. English aliases are accepted on input and anything unrecognized
/// becomes `Unspecified`.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "String")]
pub enum Status {
    /// Not yet paid.
    #[serde(rename = "未繳")]
    Unpaid,
    /// Paid in full.
    #[serde(rename = "已繳清")]
    PaidInFull,
    /// Paid out, used for expenses.
    #[serde(rename = "已支付")]
    PaidOut,
    #[default]
    #[serde(rename = "-")]
    Unspecified,
}

serde_plain::derive_display_from_serialize!(Status);

impl Status {
    /// Reads a label, never failing.
    pub fn parse_label(s: &str) -> Self {
        match s.trim() {
            "未繳" | "unpaid" => Status::Unpaid,
            "已繳清" | "paid" | "paid_in_full" => Status::PaidInFull,
            "已支付" | "paid_out" => Status::PaidOut,
            _ => Status::Unspecified,
        }
    }
}

impl From<String> for Status {
    fn from(value: String) -> Self {
        Status::parse_label(&value)
    }
}

impl FromStr for Status {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Status::parse_label(s))
    }
}

/// The stable identifier of a record. Assigned at creation and never reused.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random identifier that is also a valid remote document name.
    pub(crate) fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The user-editable fields of a ledger line item.
///
/// A non-negative `amount_due` is income and a negative one is an expense. `amount_paid` is
/// tracked independently and does not enter the statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordFields {
    /// The session date, `YYYY/MM/DD` or `YYYY-MM-DD`.
    #[schemars(with = "String")]
    pub date: LedgerDate,

    /// Where the session took place.
    #[serde(default)]
    pub location: String,

    /// The person (or the fund) the line belongs to. Required.
    pub name: String,

    /// Membership category, e.g. 會員 (member) or 非會員 (non-member). Defaults to `-`.
    #[serde(default = "placeholder")]
    pub identity: String,

    /// What the line is for, e.g. 場地費 (court fee).
    #[serde(default)]
    pub item: String,

    /// Signed amount owed. Negative for expenses.
    #[serde(default, alias = "amount_due")]
    #[schemars(with = "f64")]
    pub amount_due: Amount,

    /// Signed amount actually received or paid.
    #[serde(default, alias = "amount_paid")]
    #[schemars(with = "f64")]
    pub amount_paid: Amount,

    /// One of 未繳 (unpaid), 已繳清 (paid in full), 已支付 (paid out) or `-`. English aliases
    /// `unpaid`, `paid`, `paid_out` are accepted.
    #[serde(default)]
    #[schemars(with = "String")]
    pub status: Status,

    /// Free text.
    #[serde(default)]
    pub note: String,
}

fn placeholder() -> String {
    PLACEHOLDER.to_string()
}

fn trim_in_place(s: &mut String) {
    let trimmed = s.trim();
    if trimmed.len() != s.len() {
        *s = trimmed.to_string();
    }
}

impl RecordFields {
    /// Creates fields with the given date and name and everything else defaulted.
    pub fn new(date: LedgerDate, name: impl Into<String>) -> Self {
        Self {
            date,
            location: String::new(),
            name: name.into(),
            identity: placeholder(),
            item: String::new(),
            amount_due: Amount::ZERO,
            amount_paid: Amount::ZERO,
            status: Status::Unspecified,
            note: String::new(),
        }
    }

    /// Puts the fields in the form they are stored in: text without surrounding whitespace and a
    /// blank identity replaced by `-`. Every backing calls this before writing, so stored records
    /// read back identically from an exported CSV.
    pub fn normalize(&mut self) {
        for text in [
            &mut self.location,
            &mut self.name,
            &mut self.identity,
            &mut self.item,
            &mut self.note,
        ] {
            trim_in_place(text);
        }
        if self.identity.is_empty() {
            self.identity = placeholder();
        }
    }

    /// Rejects fields that cannot be stored.
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid("A record needs a non-empty name"));
        }
        Ok(())
    }
}

/// A partial update. Only the fields that are present replace the stored values.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    /// New session date, `YYYY/MM/DD` or `YYYY-MM-DD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub date: Option<LedgerDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Must not be blank when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,

    #[serde(default, alias = "amount_due", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<f64>")]
    pub amount_due: Option<Amount>,

    #[serde(default, alias = "amount_paid", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<f64>")]
    pub amount_paid: Option<Amount>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub status: Option<Status>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self == &RecordPatch::default()
    }

    /// The patch counterpart of `RecordFields::normalize`, applied to the present fields only.
    pub fn normalize(&mut self) {
        for text in [
            &mut self.location,
            &mut self.name,
            &mut self.identity,
            &mut self.item,
            &mut self.note,
        ]
        .into_iter()
        .flatten()
        {
            trim_in_place(text);
        }
        if self.identity.as_deref() == Some("") {
            self.identity = Some(placeholder());
        }
    }

    /// Overwrites the fields in `target` that are present in this patch.
    pub fn apply(&self, target: &mut RecordFields) {
        if let Some(date) = self.date {
            target.date = date;
        }
        if let Some(location) = &self.location {
            target.location = location.clone();
        }
        if let Some(name) = &self.name {
            target.name = name.clone();
        }
        if let Some(identity) = &self.identity {
            target.identity = identity.clone();
        }
        if let Some(item) = &self.item {
            target.item = item.clone();
        }
        if let Some(amount_due) = self.amount_due {
            target.amount_due = amount_due;
        }
        if let Some(amount_paid) = self.amount_paid {
            target.amount_paid = amount_paid;
        }
        if let Some(status) = self.status {
            target.status = status;
        }
        if let Some(note) = &self.note {
            target.note = note.clone();
        }
    }

    /// The names of the present fields as they are stored remotely.
    pub(crate) fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut push = |present: bool, name: &'static str| {
            if present {
                names.push(name)
            }
        };
        push(self.date.is_some(), "date");
        push(self.location.is_some(), "location");
        push(self.name.is_some(), "name");
        push(self.identity.is_some(), "identity");
        push(self.item.is_some(), "item");
        push(self.amount_due.is_some(), "amountDue");
        push(self.amount_paid.is_some(), "amountPaid");
        push(self.status.is_some(), "status");
        push(self.note.is_some(), "note");
        names
    }
}

/// A stored ledger line item: the editable fields plus identity and audit metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    id: RecordId,
    #[serde(flatten)]
    fields: RecordFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_by: Option<String>,
}

impl Record {
    pub(crate) fn new(id: RecordId, fields: RecordFields) -> Self {
        Self {
            id,
            fields,
            created_at: None,
            updated_at: None,
            created_by: None,
        }
    }

    pub(crate) fn with_timestamps(
        mut self,
        created_at: Option<DateTime<Utc>>,
        updated_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at;
        self
    }

    pub(crate) fn with_created_by(mut self, created_by: Option<String>) -> Self {
        self.created_by = created_by;
        self
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn fields(&self) -> &RecordFields {
        &self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut RecordFields {
        &mut self.fields
    }

    pub fn into_fields(self) -> RecordFields {
        self.fields
    }

    pub fn date(&self) -> LedgerDate {
        self.fields.date
    }

    pub fn name(&self) -> &str {
        &self.fields.name
    }

    pub fn amount_due(&self) -> Amount {
        self.fields.amount_due
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub(crate) fn set_updated_at(&mut self, updated_at: DateTime<Utc>) {
        self.updated_at = Some(updated_at);
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorType;

    fn date(s: &str) -> LedgerDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(Status::parse_label("已繳清"), Status::PaidInFull);
        assert_eq!(Status::parse_label("paid"), Status::PaidInFull);
        assert_eq!(Status::parse_label(" 未繳 "), Status::Unpaid);
        assert_eq!(Status::parse_label("paid_out"), Status::PaidOut);
        assert_eq!(Status::parse_label("whatever"), Status::Unspecified);
        assert_eq!(Status::PaidOut.to_string(), "已支付");
        assert_eq!(Status::Unspecified.to_string(), "-");
    }

    #[test]
    fn test_status_serde() {
        let s: Status = serde_json::from_str("\"unpaid\"").unwrap();
        assert_eq!(s, Status::Unpaid);
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"未繳\"");
    }

    #[test]
    fn test_fields_deserialize_defaults() {
        let json = r#"{"date": "2024-01-28", "name": "王小明", "amountDue": 300}"#;
        let fields: RecordFields = serde_json::from_str(json).unwrap();
        assert_eq!(fields.date, date("2024/01/28"));
        assert_eq!(fields.identity, "-");
        assert_eq!(fields.status, Status::Unspecified);
        assert_eq!(fields.amount_due, Amount::from(300));
        assert!(fields.amount_paid.is_zero());
        assert!(fields.location.is_empty());
    }

    #[test]
    fn test_fields_accept_snake_case_amounts() {
        let json = r#"{"date": "2024/01/21", "name": "x", "amount_due": "-2000"}"#;
        let fields: RecordFields = serde_json::from_str(json).unwrap();
        assert_eq!(fields.amount_due, Amount::from(-2000));
    }

    #[test]
    fn test_validate_rejects_blank_name() {
        let fields = RecordFields::new(date("2024/01/28"), "  ");
        let e = fields.validate().unwrap_err();
        assert_eq!(e.error_type(), ErrorType::Invalid);
        assert!(RecordFields::new(date("2024/01/28"), "李大華")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_patch_apply_only_present() {
        let mut fields = RecordFields::new(date("2024/01/28"), "李大華");
        fields.note = "下次補繳".to_string();
        let patch = RecordPatch {
            amount_paid: Some(Amount::from(350)),
            status: Some(Status::PaidInFull),
            ..Default::default()
        };
        patch.apply(&mut fields);
        assert_eq!(fields.amount_paid, Amount::from(350));
        assert_eq!(fields.status, Status::PaidInFull);
        assert_eq!(fields.note, "下次補繳");
        assert_eq!(fields.name, "李大華");
        assert_eq!(patch.field_names(), vec!["amountPaid", "status"]);
    }

    #[test]
    fn test_normalize_fields() {
        let mut fields = RecordFields::new(date("2024/01/28"), " 王小明 ");
        fields.identity = "  ".to_string();
        fields.note = " 補繳 ".to_string();
        fields.item = "場地費".to_string();
        fields.normalize();
        assert_eq!(fields.name, "王小明");
        assert_eq!(fields.identity, "-");
        assert_eq!(fields.note, "補繳");
        assert_eq!(fields.item, "場地費");
    }

    #[test]
    fn test_normalize_patch() {
        let mut patch = RecordPatch {
            identity: Some(String::new()),
            note: Some(" x ".to_string()),
            ..Default::default()
        };
        patch.normalize();
        assert_eq!(patch.identity.as_deref(), Some("-"));
        assert_eq!(patch.note.as_deref(), Some("x"));
        assert!(patch.location.is_none());
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(RecordPatch::default().is_empty());
        let patch: RecordPatch = serde_json::from_str(r#"{"note": ""}"#).unwrap();
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = Record::new(
            RecordId::new("abc"),
            RecordFields::new(date("2024/01/14"), "陳志豪"),
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], "abc");
        assert_eq!(value["date"], "2024/01/14");
        assert_eq!(value["name"], "陳志豪");
        assert!(value.get("createdBy").is_none());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = RecordId::generate();
        let b = RecordId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }
}
