//! These structs provide the CLI interface for the ledger CLI.

use crate::filter::Criteria;
use crate::model::{Amount, LedgerDate, RecordFields, RecordId, RecordPatch, Status, PLACEHOLDER};
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// ledger: keeps the books of a badminton club.
///
/// Each line of the ledger is a session fee owed by a player, a payment received, or an expense
/// such as the monthly court rental. Non-negative dues are income and negative dues are expenses.
///
/// The records live in a Firestore collection. Until Firebase is configured in
/// `$LEDGER_HOME/config.json`, or whenever LEDGER_OFFLINE is set, the program runs offline with a
/// handful of sample records held in memory.
///
/// There is also a mode in which an AI agent can use this program through the mcp subcommand.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory and the configuration file.
    ///
    /// Pass the Firebase web-app settings (the JSON object shown in the Firebase console) as
    /// --firebase-config, and the OAuth client credentials downloaded from the Google Cloud
    /// Console as --client-secret. Both can be added later by editing the files in
    /// $LEDGER_HOME. Without Firebase settings the program runs offline.
    Init(InitArgs),
    /// Sign in with Google, or sign out with --sign-out.
    Auth(AuthArgs),
    /// Show the mode and who is signed in.
    Status,
    /// List the records, newest first.
    List(FilterArgs),
    /// Show total income, total expense and the balance.
    Stats(FilterArgs),
    /// Add a record.
    Add(AddArgs),
    /// Change some fields of a record.
    Update(UpdateArgs),
    /// Delete a record.
    Delete(DeleteArgs),
    /// Import records from a CSV file.
    Import(ImportArgs),
    /// Export the records to CSV.
    Export(ExportArgs),
    /// Run an MCP server over stdio.
    Mcp,
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where ledger configuration and secrets are held. Defaults to
    /// ~/badminton-ledger
    #[arg(long, env = "LEDGER_HOME", default_value_t = default_ledger_home())]
    ledger_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, ledger_home: PathBuf) -> Self {
        Self {
            log_level,
            ledger_home: ledger_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn ledger_home(&self) -> &DisplayPath {
        &self.ledger_home
    }
}

/// (Not shown): Args for the `ledger init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// A JSON file with the Firebase web-app settings: apiKey, authDomain, projectId,
    /// storageBucket, messagingSenderId and appId.
    #[arg(long)]
    firebase_config: Option<PathBuf>,

    /// The downloaded OAuth client credentials. The file is moved into $LEDGER_HOME/.secrets.
    #[arg(long)]
    client_secret: Option<PathBuf>,
}

impl InitArgs {
    pub fn new(firebase_config: Option<PathBuf>, client_secret: Option<PathBuf>) -> Self {
        Self {
            firebase_config,
            client_secret,
        }
    }

    pub fn firebase_config(&self) -> Option<&Path> {
        self.firebase_config.as_deref()
    }

    pub fn client_secret(&self) -> Option<&Path> {
        self.client_secret.as_deref()
    }
}

/// (Not shown): Args for the `ledger auth` command.
#[derive(Debug, Parser, Clone)]
pub struct AuthArgs {
    /// Forget the saved session instead of signing in.
    #[arg(long)]
    sign_out: bool,
}

impl AuthArgs {
    pub fn new(sign_out: bool) -> Self {
        Self { sign_out }
    }

    pub fn sign_out(&self) -> bool {
        self.sign_out
    }
}

/// (Not shown): Filter arguments shared by `list`, `stats` and `export`.
#[derive(Debug, Default, Parser, Clone)]
pub struct FilterArgs {
    /// Only records on or after this date, e.g. 2024/01/01
    #[arg(long)]
    start: Option<LedgerDate>,

    /// Only records on or before this date, e.g. 2024/01/31
    #[arg(long)]
    end: Option<LedgerDate>,

    /// Only records whose name contains this text, ignoring case
    #[arg(long)]
    name: Option<String>,
}

impl FilterArgs {
    pub fn new(start: Option<LedgerDate>, end: Option<LedgerDate>, name: Option<String>) -> Self {
        Self { start, end, name }
    }

    pub fn criteria(&self) -> Criteria {
        Criteria::new(self.start, self.end, self.name.clone())
    }
}

/// (Not shown): Args for the `ledger add` command.
#[derive(Debug, Parser, Clone)]
pub struct AddArgs {
    /// The session date, e.g. 2024/01/28. Defaults to today.
    #[arg(long)]
    date: Option<LedgerDate>,

    #[arg(long, default_value = "")]
    location: String,

    /// Who the line belongs to. Required.
    #[arg(long)]
    name: String,

    /// Membership category, e.g. 會員
    #[arg(long, default_value = PLACEHOLDER)]
    identity: String,

    /// What the line is for, e.g. 場地費
    #[arg(long, default_value = "")]
    item: String,

    /// Amount owed. Negative for expenses.
    #[arg(long, default_value_t = Amount::ZERO, allow_hyphen_values = true)]
    amount_due: Amount,

    /// Amount received or paid.
    #[arg(long, default_value_t = Amount::ZERO, allow_hyphen_values = true)]
    amount_paid: Amount,

    /// 未繳, 已繳清, 已支付 or -, or one of unpaid, paid, paid_out
    #[arg(long, default_value_t = Status::Unspecified)]
    status: Status,

    #[arg(long, default_value = "")]
    note: String,
}

impl AddArgs {
    pub fn new(fields: RecordFields) -> Self {
        Self {
            date: Some(fields.date),
            location: fields.location,
            name: fields.name,
            identity: fields.identity,
            item: fields.item,
            amount_due: fields.amount_due,
            amount_paid: fields.amount_paid,
            status: fields.status,
            note: fields.note,
        }
    }

    pub fn fields(&self) -> RecordFields {
        RecordFields {
            date: self.date.unwrap_or_else(LedgerDate::today),
            location: self.location.clone(),
            name: self.name.clone(),
            identity: self.identity.clone(),
            item: self.item.clone(),
            amount_due: self.amount_due,
            amount_paid: self.amount_paid,
            status: self.status,
            note: self.note.clone(),
        }
    }
}

/// (Not shown): Args for the `ledger update` command.
#[derive(Debug, Parser, Clone)]
pub struct UpdateArgs {
    /// The id of the record to change.
    id: RecordId,

    #[arg(long)]
    date: Option<LedgerDate>,

    #[arg(long)]
    location: Option<String>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    identity: Option<String>,

    #[arg(long)]
    item: Option<String>,

    #[arg(long, allow_hyphen_values = true)]
    amount_due: Option<Amount>,

    #[arg(long, allow_hyphen_values = true)]
    amount_paid: Option<Amount>,

    #[arg(long)]
    status: Option<Status>,

    #[arg(long)]
    note: Option<String>,
}

impl UpdateArgs {
    pub fn new(id: RecordId, patch: RecordPatch) -> Self {
        Self {
            id,
            date: patch.date,
            location: patch.location,
            name: patch.name,
            identity: patch.identity,
            item: patch.item,
            amount_due: patch.amount_due,
            amount_paid: patch.amount_paid,
            status: patch.status,
            note: patch.note,
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn patch(&self) -> RecordPatch {
        RecordPatch {
            date: self.date,
            location: self.location.clone(),
            name: self.name.clone(),
            identity: self.identity.clone(),
            item: self.item.clone(),
            amount_due: self.amount_due,
            amount_paid: self.amount_paid,
            status: self.status,
            note: self.note.clone(),
        }
    }
}

/// (Not shown): Args for the `ledger delete` command.
#[derive(Debug, Parser, Clone)]
pub struct DeleteArgs {
    /// The id of the record to delete.
    id: RecordId,
}

impl DeleteArgs {
    pub fn new(id: RecordId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }
}

/// (Not shown): Args for the `ledger import` command.
#[derive(Debug, Parser, Clone)]
pub struct ImportArgs {
    /// The CSV file to read. The header row may use the Chinese or the English column names.
    path: PathBuf,
}

impl ImportArgs {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// (Not shown): Args for the `ledger export` command.
#[derive(Debug, Parser, Clone)]
pub struct ExportArgs {
    #[clap(flatten)]
    filter: FilterArgs,

    /// Where to write the CSV. Printed to stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,
}

impl ExportArgs {
    pub fn new(filter: FilterArgs, out: Option<PathBuf>) -> Self {
        Self { filter, out }
    }

    pub fn filter(&self) -> &FilterArgs {
        &self.filter
    }

    pub fn out(&self) -> Option<&Path> {
        self.out.as_deref()
    }
}

fn default_ledger_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("badminton-ledger"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --ledger-home or LEDGER_HOME instead of relying on the default \
                ledger home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("badminton-ledger")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["ledger", "--ledger-home", "/tmp/ledger"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_add_args() {
        let args = parse(&[
            "add",
            "--date",
            "2024-1-21",
            "--name",
            "公費支出",
            "--amount-due",
            "-2000",
            "--status",
            "paid_out",
        ]);
        let Command::Add(add) = args.command() else {
            panic!("expected add");
        };
        let fields = add.fields();
        assert_eq!(fields.date.to_string(), "2024/01/21");
        assert_eq!(fields.amount_due, Amount::from(-2000));
        assert_eq!(fields.status, Status::PaidOut);
        assert_eq!(fields.identity, "-");
        assert_eq!(args.common().log_level(), LevelFilter::INFO);
    }

    #[test]
    fn test_update_args_only_present_fields() {
        let args = parse(&["update", "abc", "--note", "補繳", "--amount-paid", "350"]);
        let Command::Update(update) = args.command() else {
            panic!("expected update");
        };
        assert_eq!(update.id().as_str(), "abc");
        let patch = update.patch();
        assert_eq!(patch.note.as_deref(), Some("補繳"));
        assert_eq!(patch.amount_paid, Some(Amount::from(350)));
        assert!(patch.name.is_none());
        assert!(patch.status.is_none());
    }

    #[test]
    fn test_export_args() {
        let args = parse(&["export", "--name", "王", "--start", "2024/01/01"]);
        let Command::Export(export) = args.command() else {
            panic!("expected export");
        };
        let criteria = export.filter().criteria();
        assert_eq!(criteria.name.as_deref(), Some("王"));
        assert!(criteria.start.is_some());
        assert!(export.out().is_none());
    }

    #[test]
    fn test_bad_date_is_rejected() {
        let argv = ["ledger", "list", "--start", "yesterday"];
        assert!(Args::try_parse_from(argv).is_err());
    }
}
