use badminton_ledger::args::{Args, Command};
use badminton_ledger::{commands, App, Config, Mode, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().ledger_home().path();

    if let Command::Init(init_args) = args.command() {
        commands::init(home, init_args.firebase_config(), init_args.client_secret())
            .await?
            .print();
        return Ok(());
    }

    // Offline when LEDGER_OFFLINE is set or when config.json has no Firebase settings. Offline
    // runs start from the sample records every time.
    let config = Config::load(home).await?;
    let mut app = App::start(&config, Mode::select(&config))?;

    let _: () = match args.command() {
        Command::Init(_) => {}

        Command::Auth(auth_args) => {
            if auth_args.sign_out() {
                app.resume().await?;
            }
            commands::auth(&mut app, auth_args.sign_out())
                .await?
                .print()
        }

        Command::Mcp => commands::mcp(app).await?.print(),

        command => {
            app.resume().await?;
            run_record_command(&mut app, command).await?
        }
    };
    Ok(())
}

/// Runs a command that needs the records, after the session has been resumed.
async fn run_record_command(app: &mut App, command: &Command) -> Result<()> {
    match command {
        Command::Status => commands::status(app).await?.print(),
        Command::List(filter) => commands::list(app, filter.criteria()).await?.print(),
        Command::Stats(filter) => commands::stats(app, filter.criteria()).await?.print(),
        Command::Add(add_args) => commands::add(app, add_args.fields()).await?.print(),
        Command::Update(update_args) => {
            commands::update(app, update_args.id(), update_args.patch())
                .await?
                .print()
        }
        Command::Delete(delete_args) => commands::delete(app, delete_args.id()).await?.print(),
        Command::Import(import_args) => commands::import_file(app, import_args.path())
            .await?
            .print(),
        Command::Export(export_args) => {
            let out = commands::export(app, export_args.filter().criteria(), export_args.out())
                .await?;
            out.print();
            if export_args.out().is_none() {
                if let Some(export) = out.structure() {
                    print!("{}", export.csv);
                }
            }
        }
        Command::Init(_) | Command::Auth(_) | Command::Mcp => {}
    }
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for the library and the binary only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                level,
                env!("CARGO_BIN_NAME"),
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
