//! Derives the visible subset of records and the summary statistics over it.
//!
//! Both operations are pure. The application recomputes them from the full record list after
//! every mutation and every criteria change.

use crate::model::{Amount, LedgerDate, Record};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Filter criteria. Every part is optional and an empty `Criteria` selects everything.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Criteria {
    /// Inclusive lower bound on the record date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub start: Option<LedgerDate>,

    /// Inclusive upper bound on the record date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub end: Option<LedgerDate>,

    /// Case-insensitive substring of the name. Blank means no name filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Criteria {
    pub fn new(start: Option<LedgerDate>, end: Option<LedgerDate>, name: Option<String>) -> Self {
        Self { start, end, name }
    }

    /// The trimmed, lowercased name needle, if there is one.
    fn needle(&self) -> Option<String> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.needle().is_none()
    }

    fn matches(&self, record: &Record, needle: Option<&str>) -> bool {
        let date = record.date();
        if self.start.is_some_and(|start| date < start) {
            return false;
        }
        if self.end.is_some_and(|end| date > end) {
            return false;
        }
        match needle {
            Some(needle) => record.name().to_lowercase().contains(needle),
            None => true,
        }
    }
}

/// Returns the records that satisfy every present criterion, in their original order.
pub fn filter(records: &[Record], criteria: &Criteria) -> Vec<Record> {
    let needle = criteria.needle();
    records
        .iter()
        .filter(|record| criteria.matches(record, needle.as_deref()))
        .cloned()
        .collect()
}

/// Income, expense and balance computed from `amount_due` alone.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Sum of the non-negative dues.
    pub total_income: Amount,
    /// Sum of the absolute values of the negative dues.
    pub total_expense: Amount,
    /// `total_income - total_expense`.
    pub balance: Amount,
}

impl Stats {
    pub fn aggregate(records: &[Record]) -> Self {
        let (income, expense) = records.iter().map(Record::amount_due).fold(
            (Amount::ZERO, Amount::ZERO),
            |(income, expense), due| {
                if due.is_negative() {
                    (income, expense + due.abs())
                } else {
                    (income + due, expense)
                }
            },
        );
        Self {
            total_income: income,
            total_expense: expense,
            balance: income - expense,
        }
    }
}

/// What a presentation layer needs to render: the filtered records and their statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct View {
    pub records: Vec<Record>,
    pub stats: Stats,
}

impl View {
    pub fn new(records: &[Record], criteria: &Criteria) -> Self {
        let records = filter(records, criteria);
        let stats = Stats::aggregate(&records);
        Self { records, stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RecordFields, RecordId};

    fn record(id: &str, date: &str, name: &str, due: i64) -> Record {
        let mut fields = RecordFields::new(date.parse().unwrap(), name);
        fields.amount_due = Amount::from(due);
        Record::new(RecordId::new(id), fields)
    }

    fn sample() -> Vec<Record> {
        vec![
            record("1", "2024/01/28", "王小明", 300),
            record("2", "2024/01/28", "李大華", 350),
            record("3", "2024/01/21", "張美玲", 300),
            record("4", "2024/01/21", "公費支出", -2000),
            record("5", "2024/01/14", "Chen Zhihao", 300),
        ]
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id().as_str()).collect()
    }

    #[test]
    fn test_empty_criteria_is_identity() {
        let records = sample();
        assert!(Criteria::default().is_empty());
        assert_eq!(filter(&records, &Criteria::default()), records);
    }

    #[test]
    fn test_blank_name_is_no_filter() {
        let records = sample();
        let criteria = Criteria::new(None, None, Some("   ".to_string()));
        assert!(criteria.is_empty());
        assert_eq!(filter(&records, &criteria).len(), 5);
    }

    #[test]
    fn test_start_is_inclusive_and_excludes_earlier() {
        let records = sample();
        let criteria = Criteria::new(Some("2024-01-22".parse().unwrap()), None, None);
        assert_eq!(ids(&filter(&records, &criteria)), vec!["1", "2"]);

        let criteria = Criteria::new(Some("2024/01/21".parse().unwrap()), None, None);
        assert_eq!(ids(&filter(&records, &criteria)), vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn test_end_is_inclusive() {
        let records = sample();
        let criteria = Criteria::new(None, Some("2024/01/21".parse().unwrap()), None);
        assert_eq!(ids(&filter(&records, &criteria)), vec!["3", "4", "5"]);
    }

    #[test]
    fn test_name_is_case_insensitive_substring() {
        let records = sample();
        let criteria = Criteria::new(None, None, Some(" chen ".to_string()));
        assert_eq!(ids(&filter(&records, &criteria)), vec!["5"]);
        let criteria = Criteria::new(None, None, Some("大".to_string()));
        assert_eq!(ids(&filter(&records, &criteria)), vec!["2"]);
    }

    #[test]
    fn test_criteria_combine() {
        let records = sample();
        let criteria = Criteria::new(
            Some("2024/01/20".parse().unwrap()),
            Some("2024/01/27".parse().unwrap()),
            Some("張".to_string()),
        );
        assert_eq!(ids(&filter(&records, &criteria)), vec!["3"]);
    }

    #[test]
    fn test_filtered_is_subset_preserving_order() {
        let records = sample();
        let criteria = Criteria::new(None, None, Some("a".to_string()));
        let out = filter(&records, &criteria);
        let positions: Vec<usize> = out
            .iter()
            .map(|r| records.iter().position(|x| x == r).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_aggregate() {
        let records = vec![
            record("a", "2024/01/28", "a", 300),
            record("b", "2024/01/28", "b", -2000),
            record("c", "2024/01/28", "c", 300),
        ];
        let stats = Stats::aggregate(&records);
        assert_eq!(stats.total_income, Amount::from(600));
        assert_eq!(stats.total_expense, Amount::from(2000));
        assert_eq!(stats.balance, Amount::from(-1400));
        assert_eq!(stats.balance.currency(), "-$1,400");
    }

    #[test]
    fn test_aggregate_empty() {
        assert_eq!(Stats::aggregate(&[]), Stats::default());
    }

    #[test]
    fn test_aggregate_ignores_amount_paid() {
        let mut r = record("a", "2024/01/28", "a", 300);
        r.fields_mut().amount_paid = Amount::from(-99999);
        let stats = Stats::aggregate(&[r]);
        assert_eq!(stats.total_income, Amount::from(300));
        assert!(stats.total_expense.is_zero());
    }

    #[test]
    fn test_view() {
        let records = sample();
        let view = View::new(&records, &Criteria::default());
        assert_eq!(view.records.len(), 5);
        assert_eq!(view.stats.total_income, Amount::from(1250));
        assert_eq!(view.stats.total_expense, Amount::from(2000));
        assert_eq!(view.stats.balance, Amount::from(-750));
    }

    #[test]
    fn test_aggregate_huge_amounts_do_not_overflow() {
        let text = "date,name,amount_due\n\
                    2024/01/28,a,79228162514264337593543950335\n\
                    2024/01/28,b,79228162514264337593543950335\n\
                    2024/01/28,c,-79228162514264337593543950335\n";
        let decoded = crate::codec::decode(text).unwrap();
        let records: Vec<Record> = decoded
            .records
            .into_iter()
            .enumerate()
            .map(|(i, f)| Record::new(RecordId::new(i.to_string()), f))
            .collect();
        let max = Amount::parse_lenient("79228162514264337593543950335");
        let stats = Stats::aggregate(&records);
        assert_eq!(stats.total_income, max);
        assert_eq!(stats.total_expense, max);
        assert!(stats.balance.is_zero());
    }
}
