//! Handlers for reading and changing records.

use crate::app::App;
use crate::commands::Out;
use crate::filter::{Criteria, Stats, View};
use crate::model::{Record, RecordFields, RecordId, RecordPatch};
use crate::Result;

/// Reloads the records and returns those matching `criteria`, newest first.
pub async fn list(app: &mut App, criteria: Criteria) -> Result<Out<View>> {
    app.reload().await?;
    app.set_criteria(criteria);
    let view = app.view();
    let mut message = format!("{} of {} records", view.records.len(), app.records().len());
    for record in &view.records {
        message.push('\n');
        message.push_str(&line(record));
    }
    Ok(Out::new(message, view))
}

/// Reloads the records and summarizes those matching `criteria`.
pub async fn stats(app: &mut App, criteria: Criteria) -> Result<Out<Stats>> {
    app.reload().await?;
    app.set_criteria(criteria);
    let view = app.view();
    let s = view.stats;
    let message = format!(
        "{} records: income {}, expense {}, balance {}",
        view.records.len(),
        s.total_income.currency(),
        s.total_expense.currency(),
        s.balance.currency()
    );
    Ok(Out::new(message, s))
}

pub async fn add(app: &mut App, fields: RecordFields) -> Result<Out<RecordId>> {
    let id = app.add(fields).await?;
    Ok(Out::new(format!("Added record {id}"), id))
}

pub async fn update(app: &mut App, id: &RecordId, patch: RecordPatch) -> Result<Out<()>> {
    app.edit(id, patch).await?;
    Ok(format!("Updated record {id}").into())
}

pub async fn delete(app: &mut App, id: &RecordId) -> Result<Out<()>> {
    app.remove(id).await?;
    Ok(format!("Deleted record {id}").into())
}

/// One record as a line of text.
fn line(record: &Record) -> String {
    let f = record.fields();
    format!(
        "{}  {}  {}  {}  {}  {}  due {}  paid {}  {}{}",
        record.id(),
        f.date,
        f.location,
        f.name,
        f.identity,
        f.item,
        f.amount_due.currency(),
        f.amount_paid.currency(),
        f.status,
        if f.note.is_empty() {
            String::new()
        } else {
            format!("  ({})", f.note)
        }
    )
}
