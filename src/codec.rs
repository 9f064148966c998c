//! Reads and writes ledger records as CSV.
//!
//! Files carry a UTF-8 byte order mark so that spreadsheet programs pick the right encoding, and
//! the header row uses the Chinese column labels. On input the English field names are accepted
//! too, in camelCase or snake_case, and columns with unknown headers are ignored.

use crate::error::{ErrorType, IntoResult};
use crate::model::{Amount, LedgerDate, Record, RecordFields, Status, PLACEHOLDER};
use crate::Result;
use anyhow::Context;
use csv::{QuoteStyle, ReaderBuilder, StringRecord, Terminator, Trim, WriterBuilder};
use serde::Serialize;
use tracing::{debug, trace};

const BOM: char = '\u{feff}';

/// The nine columns of the canonical layout, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Date,
    Location,
    Name,
    Identity,
    Item,
    AmountDue,
    AmountPaid,
    Status,
    Note,
}

const COLUMNS: [Column; 9] = [
    Column::Date,
    Column::Location,
    Column::Name,
    Column::Identity,
    Column::Item,
    Column::AmountDue,
    Column::AmountPaid,
    Column::Status,
    Column::Note,
];

impl Column {
    fn label(self) -> &'static str {
        match self {
            Column::Date => "時間",
            Column::Location => "地點",
            Column::Name => "姓名",
            Column::Identity => "身分",
            Column::Item => "項目",
            Column::AmountDue => "應收",
            Column::AmountPaid => "已收",
            Column::Status => "狀態",
            Column::Note => "備註",
        }
    }

    fn english(self) -> &'static [&'static str] {
        match self {
            Column::Date => &["date"],
            Column::Location => &["location"],
            Column::Name => &["name"],
            Column::Identity => &["identity"],
            Column::Item => &["item"],
            Column::AmountDue => &["amountdue", "amount_due"],
            Column::AmountPaid => &["amountpaid", "amount_paid"],
            Column::Status => &["status"],
            Column::Note => &["note"],
        }
    }

    /// Maps a header cell to a column.
    fn from_header(header: &str) -> Option<Column> {
        let header = header.trim();
        let lower = header.to_lowercase();
        COLUMNS
            .into_iter()
            .find(|c| c.label() == header || c.english().contains(&lower.as_str()))
    }

    fn cell(self, fields: &RecordFields) -> String {
        match self {
            Column::Date => fields.date.to_string(),
            Column::Location => fields.location.clone(),
            Column::Name => fields.name.clone(),
            Column::Identity => fields.identity.clone(),
            Column::Item => fields.item.clone(),
            Column::AmountDue => fields.amount_due.to_string(),
            Column::AmountPaid => fields.amount_paid.to_string(),
            Column::Status => fields.status.to_string(),
            Column::Note => fields.note.clone(),
        }
    }
}

/// The result of decoding a CSV file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Decoded {
    /// The rows that were accepted, in file order.
    pub records: Vec<RecordFields>,
    /// How many non-blank rows were dropped for lacking a valid date or a name.
    pub skipped: usize,
}

/// Parses CSV text into record fields.
///
/// Rows without a valid date or a non-empty name are dropped and counted in `skipped`. Amounts
/// that cannot be parsed become zero. A missing identity or status becomes `-`.
pub fn decode(text: &str) -> Result<Decoded> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = rdr
        .headers()
        .context("Unable to read the CSV header row")
        .pub_result(ErrorType::Invalid)?
        .clone();
    let columns: Vec<Option<Column>> = headers.iter().map(Column::from_header).collect();
    trace!("CSV columns: {columns:?}");

    let mut decoded = Decoded::default();
    for (i, result) in rdr.records().enumerate() {
        let row = result
            .with_context(|| format!("Unable to read CSV row {}", i + 2))
            .pub_result(ErrorType::Invalid)?;
        if row.iter().all(str::is_empty) {
            continue;
        }
        match decode_row(&columns, &row) {
            Some(fields) => decoded.records.push(fields),
            None => {
                debug!("Skipping CSV row {} without a valid date or name", i + 2);
                decoded.skipped += 1;
            }
        }
    }
    Ok(decoded)
}

fn decode_row(columns: &[Option<Column>], row: &StringRecord) -> Option<RecordFields> {
    let mut date = None;
    let mut fields = RecordFields::new(LedgerDate::today(), String::new());
    for (column, value) in columns.iter().zip(row.iter()) {
        let Some(column) = column else { continue };
        match column {
            Column::Date => date = value.parse::<LedgerDate>().ok(),
            Column::Location => fields.location = value.to_string(),
            Column::Name => fields.name = value.to_string(),
            Column::Identity if !value.is_empty() => fields.identity = value.to_string(),
            Column::Identity => fields.identity = PLACEHOLDER.to_string(),
            Column::Item => fields.item = value.to_string(),
            Column::AmountDue => fields.amount_due = Amount::parse_lenient(value),
            Column::AmountPaid => fields.amount_paid = Amount::parse_lenient(value),
            Column::Status => fields.status = Status::parse_label(value),
            Column::Note => fields.note = value.to_string(),
        }
    }
    fields.date = date?;
    if fields.name.is_empty() {
        return None;
    }
    Some(fields)
}

/// Writes records as CSV: byte order mark, the Chinese header row, then one line per record with
/// every cell quoted.
pub fn encode<'a>(records: impl IntoIterator<Item = &'a Record>) -> Result<String> {
    encode_fields(records.into_iter().map(Record::fields))
}

/// Like `encode` but for bare fields.
pub fn encode_fields<'a>(fields: impl IntoIterator<Item = &'a RecordFields>) -> Result<String> {
    let mut wtr = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    wtr.write_record(COLUMNS.iter().map(|c| c.label()))
        .context("Unable to write the CSV header row")
        .pub_result(ErrorType::Internal)?;
    for f in fields {
        wtr.write_record(COLUMNS.iter().map(|c| c.cell(f)))
            .context("Unable to write a CSV row")
            .pub_result(ErrorType::Internal)?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Unable to flush CSV output: {}", e.error()))
        .pub_result(ErrorType::Internal)?;
    let body = String::from_utf8(bytes)
        .context("CSV output was not UTF-8")
        .pub_result(ErrorType::Internal)?;
    Ok(format!("{BOM}{body}"))
}
