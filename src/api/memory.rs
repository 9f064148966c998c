//! Implements the `Ledger` and `AllowList` traits with in-memory data.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without Firebase. Nothing here survives the process.

use crate::api::{BatchOutcome, Ledger, TEST_EMAIL};
use crate::error::Error;
use crate::gate::AllowList;
use crate::model::{Amount, Record, RecordFields, RecordId, RecordPatch, Status};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, trace};

/// A `Ledger` held in memory. By default, it is seeded with a handful of sample records.
#[derive(Debug, Clone)]
pub(crate) struct MemoryLedger {
    /// Newest insert first.
    records: Vec<Record>,
}

impl MemoryLedger {
    pub(crate) fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    fn position(&self, id: &RecordId) -> Result<usize> {
        self.records
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| Error::not_found(id))
    }

    fn insert(&mut self, fields: RecordFields) -> RecordId {
        let id = RecordId::generate();
        let now = Utc::now();
        let record = Record::new(id.clone(), fields).with_timestamps(Some(now), Some(now));
        self.records.insert(0, record);
        id
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(seed_records())
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn list_all(&mut self) -> Result<Vec<Record>> {
        let mut records = self.records.clone();
        // sort_by is stable, so equal dates keep the newest insert first
        records.sort_by(|a, b| b.date().cmp(&a.date()));
        trace!("Listing {} records from memory", records.len());
        Ok(records)
    }

    async fn create(&mut self, mut fields: RecordFields) -> Result<RecordId> {
        fields.normalize();
        fields.validate()?;
        let id = self.insert(fields);
        debug!("Created record {id} in memory");
        Ok(id)
    }

    async fn update(&mut self, id: &RecordId, patch: RecordPatch) -> Result<()> {
        let i = self.position(id)?;
        let mut fields = self.records[i].fields().clone();
        patch.apply(&mut fields);
        fields.normalize();
        fields.validate()?;
        let record = &mut self.records[i];
        *record.fields_mut() = fields;
        record.set_updated_at(Utc::now());
        debug!("Updated record {id} in memory");
        Ok(())
    }

    async fn delete(&mut self, id: &RecordId) -> Result<()> {
        let i = self.position(id)?;
        self.records.remove(i);
        debug!("Deleted record {id} from memory");
        Ok(())
    }

    /// Best effort: valid records are stored, invalid ones are counted in `rejected`.
    async fn batch_create(&mut self, records: Vec<RecordFields>) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for mut fields in records {
            fields.normalize();
            match fields.validate() {
                Ok(()) => outcome.created.push(self.insert(fields)),
                Err(e) => {
                    debug!("Rejecting a batch record: {e}");
                    outcome.rejected += 1;
                }
            }
        }
        Ok(outcome)
    }
}

/// The allow-list used offline. It only contains the offline test identity.
#[derive(Debug, Clone)]
pub(crate) struct MemoryAllowList {
    emails: Vec<String>,
}

impl MemoryAllowList {
    pub(crate) fn new(emails: Vec<String>) -> Self {
        Self { emails }
    }
}

impl Default for MemoryAllowList {
    fn default() -> Self {
        Self::new(vec![TEST_EMAIL.to_string()])
    }
}

#[async_trait]
impl AllowList for MemoryAllowList {
    async fn fetch(&self) -> Result<Vec<String>> {
        Ok(self.emails.clone())
    }
}

/// Seed records: three court-fee payments, one unpaid fee and the monthly court rental.
fn seed_records() -> Vec<Record> {
    let now = Utc::now();
    [
        ("1", "2024/01/28", "台中市", "王小明", "會員", "場地費", 300, 300, Status::PaidInFull, ""),
        ("2", "2024/01/28", "台中市", "李大華", "非會員", "場地費", 350, 0, Status::Unpaid, "下次補繳"),
        ("3", "2024/01/21", "台中市", "張美玲", "會員", "場地費", 300, 300, Status::PaidInFull, ""),
        ("4", "2024/01/21", "台中市", "公費支出", "-", "場地租金", -2000, -2000, Status::PaidOut, "1月場地費"),
        ("5", "2024/01/14", "台中市", "陳志豪", "會員", "場地費", 300, 300, Status::PaidInFull, ""),
    ]
    .into_iter()
    .filter_map(|(id, date, location, name, identity, item, due, paid, status, note)| {
        let date = date.parse().ok()?;
        let fields = RecordFields {
            date,
            location: location.to_string(),
            name: name.to_string(),
            identity: identity.to_string(),
            item: item.to_string(),
            amount_due: Amount::from(due),
            amount_paid: Amount::from(paid),
            status,
            note: note.to_string(),
        };
        Some(Record::new(RecordId::new(id), fields).with_timestamps(Some(now), Some(now)))
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorType;
    use crate::model::LedgerDate;

    fn fields(date: &str, name: &str) -> RecordFields {
        RecordFields::new(date.parse().unwrap(), name)
    }

    #[tokio::test]
    async fn test_seeded() {
        let mut ledger = MemoryLedger::default();
        let records = ledger.list_all().await.unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].name(), "王小明");
        assert_eq!(records[3].amount_due(), Amount::from(-2000));
        assert_eq!(records[3].fields().status, Status::PaidOut);
    }

    #[tokio::test]
    async fn test_list_is_date_descending_and_stable() {
        let mut ledger = MemoryLedger::default();
        let records = ledger.list_all().await.unwrap();
        let dates: Vec<LedgerDate> = records.iter().map(Record::date).collect();
        assert!(dates.windows(2).all(|w| w[0] >= w[1]));
        let ids: Vec<&str> = records.iter().map(|r| r.id().as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let mut ledger = MemoryLedger::new(Vec::new());
        let id = ledger.create(fields("2024/02/04", "林小美")).await.unwrap();
        let records = ledger.list_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id(), &id);
        assert!(records[0].created_at().is_some());
        assert_eq!(records[0].fields().identity, "-");
    }

    #[tokio::test]
    async fn test_create_puts_newest_first_among_equal_dates() {
        let mut ledger = MemoryLedger::default();
        let id = ledger.create(fields("2024/01/28", "新朋友")).await.unwrap();
        let records = ledger.list_all().await.unwrap();
        assert_eq!(records[0].id(), &id);
        assert_eq!(records[1].id().as_str(), "1");
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name() {
        let mut ledger = MemoryLedger::default();
        let e = ledger.create(fields("2024/01/28", "")).await.unwrap_err();
        assert_eq!(e.error_type(), ErrorType::Invalid);
        assert_eq!(ledger.list_all().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let mut ledger = MemoryLedger::default();
        let a = ledger.create(fields("2024/02/04", "a")).await.unwrap();
        let b = ledger.create(fields("2024/02/04", "a")).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_update_merges_present_fields() {
        let mut ledger = MemoryLedger::default();
        let id = RecordId::new("2");
        let before = ledger.list_all().await.unwrap()[1].clone();
        let patch = RecordPatch {
            amount_paid: Some(Amount::from(350)),
            status: Some(Status::PaidInFull),
            ..Default::default()
        };
        ledger.update(&id, patch).await.unwrap();
        let after = ledger.list_all().await.unwrap()[1].clone();
        assert_eq!(after.id(), &id);
        assert_eq!(after.fields().amount_paid, Amount::from(350));
        assert_eq!(after.fields().status, Status::PaidInFull);
        assert_eq!(after.fields().note, "下次補繳");
        assert!(after.updated_at() >= before.updated_at());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let mut ledger = MemoryLedger::default();
        let e = ledger
            .update(&RecordId::new("nope"), RecordPatch::default())
            .await
            .unwrap_err();
        assert!(e.is_not_found());
    }

    #[tokio::test]
    async fn test_update_to_blank_name_is_invalid() {
        let mut ledger = MemoryLedger::default();
        let patch = RecordPatch {
            name: Some(" ".to_string()),
            ..Default::default()
        };
        let e = ledger.update(&RecordId::new("1"), patch).await.unwrap_err();
        assert_eq!(e.error_type(), ErrorType::Invalid);
        assert_eq!(ledger.list_all().await.unwrap()[0].name(), "王小明");
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let mut ledger = MemoryLedger::default();
        let id = RecordId::new("3");
        ledger.delete(&id).await.unwrap();
        assert_eq!(ledger.list_all().await.unwrap().len(), 4);
        let e = ledger.delete(&id).await.unwrap_err();
        assert!(e.is_not_found());
    }

    #[tokio::test]
    async fn test_batch_is_best_effort() {
        let mut ledger = MemoryLedger::new(Vec::new());
        let outcome = ledger
            .batch_create(vec![
                fields("2024/02/04", "a"),
                fields("2024/02/04", ""),
                fields("2024/02/11", "c"),
            ])
            .await
            .unwrap();
        assert_eq!(outcome.created.len(), 2);
        assert_eq!(outcome.rejected, 1);
        let records = ledger.list_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name(), "c");
    }

    #[tokio::test]
    async fn test_writes_are_normalized() {
        let mut ledger = MemoryLedger::new(Vec::new());
        let mut f = fields("2024/02/04", " 林小美 ");
        f.identity = String::new();
        let id = ledger.create(f).await.unwrap();
        let patch = RecordPatch {
            note: Some(" 補繳 ".to_string()),
            ..Default::default()
        };
        ledger.update(&id, patch).await.unwrap();
        let record = &ledger.list_all().await.unwrap()[0];
        assert_eq!(record.name(), "林小美");
        assert_eq!(record.fields().identity, "-");
        assert_eq!(record.fields().note, "補繳");
    }

    #[tokio::test]
    async fn test_allow_list() {
        let list = MemoryAllowList::default();
        assert_eq!(list.fetch().await.unwrap(), vec![TEST_EMAIL.to_string()]);
    }
}
