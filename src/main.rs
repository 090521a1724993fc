use std::path::PathBuf;

use bohm_sync::migrate::{self, BUILTIN};
use bohm_sync::schema::Schema;
use bohm_sync::settings::{ProjectIdentity, SyncSettings};
use bohm_sync::sheets::XlsxSpreadsheets;
use bohm_sync::store::json_dir::JsonDirStore;
use bohm_sync::{Result, ToolError, reconcile, sync};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_tracing(cli.verbose, cli.quiet).and_then(|()| run(cli)) {
        eprintln!("error: {error}");
        if reconcile::is_resumable(&error) {
            eprintln!("writes made before the failure are kept; re-run the same command to resume");
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init()
        .map_err(|err| ToolError::Logging(err.to_string()))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Sync(args) => execute_sync(args),
        Command::InitProject(args) => {
            let schema = Schema::load(&args.store.schema)?;
            let mut store = JsonDirStore::new(args.store.store);
            let project = sync::init_project(
                &mut store,
                &schema,
                &args.name,
                &args.code,
                &args.schedule_name,
            )?;
            println!("created project {} ({})", project.name, project.code);
            Ok(())
        }
        Command::Migrate(args) => {
            let schema = Schema::load(&args.store.schema)?;
            let settings = args.settings.load()?;
            let key = settings.project_identity.key(&args.project);
            let mut store = JsonDirStore::new(args.store.store);
            let report = migrate::run_migrations(&mut store, &schema, &settings, &key, BUILTIN)?;
            for (id, changed) in &report.applied {
                println!("{id}: {changed} element(s) changed");
            }
            for id in &report.already_applied {
                println!("{id}: already applied");
            }
            Ok(())
        }
    }
}

fn execute_sync(args: SyncArgs) -> Result<()> {
    let schema = Schema::load(&args.store.schema)?;
    let settings = args.settings.load()?;
    let key = settings.project_identity.key(&args.project);
    let mut store = JsonDirStore::new(args.store.store);
    let mut spreadsheets = XlsxSpreadsheets::new(args.workbooks);

    match args.direction {
        Direction::Push => {
            let report = sync::push_file(
                &mut store,
                &mut spreadsheets,
                &schema,
                &settings,
                &key,
                &args.data_file,
            )?;
            info!(?report, "push finished");
            println!(
                "pushed: {} inserted, {} updated, {} unchanged, {} deleted, {} exported",
                report.inserted,
                report.updated,
                report.unchanged,
                report.deleted,
                report.schedules.len()
            );
        }
        Direction::Pull => {
            let report = sync::pull_file(
                &mut store,
                &mut spreadsheets,
                &schema,
                &settings,
                &key,
                &args.data_file,
            )?;
            info!(?report, "pull finished");
            println!(
                "pulled: {} element(s) changed, {} field(s), {} row(s) without a stored element",
                report.elements_changed, report.fields_changed, report.missing
            );
        }
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Reconcile building element metadata across project files, a store and spreadsheets."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Push a project file out, or pull spreadsheet edits back.
    Sync(SyncArgs),
    /// Create a project record with a schedule derived from the schema.
    InitProject(InitProjectArgs),
    /// Apply the built-in data migrations to a project.
    Migrate(MigrateArgs),
}

#[derive(clap::Args)]
struct StoreArgs {
    /// Property group schema (XML).
    #[arg(long)]
    schema: PathBuf,

    /// Directory holding the document store collections.
    #[arg(long, default_value = "store")]
    store: PathBuf,
}

#[derive(clap::Args)]
struct SettingsArgs {
    /// Sync settings (JSON). Defaults apply when omitted.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Override how the project argument is matched.
    #[arg(long, value_enum)]
    project_identity: Option<IdentityArg>,

    /// Override the pause between spreadsheet write batches.
    #[arg(long)]
    cooldown_ms: Option<u64>,

    /// Rewrite every data row of existing schedules.
    #[arg(long)]
    full_resync: bool,
}

impl SettingsArgs {
    fn load(&self) -> Result<SyncSettings> {
        let mut settings = SyncSettings::load(self.settings.as_deref())?;
        if let Some(identity) = self.project_identity {
            settings.project_identity = identity.into();
        }
        if let Some(cooldown_ms) = self.cooldown_ms {
            settings.cooldown_ms = cooldown_ms;
        }
        settings.full_resync |= self.full_resync;
        Ok(settings)
    }
}

#[derive(clap::Args)]
struct SyncArgs {
    /// Sync direction.
    #[arg(long, value_enum)]
    direction: Direction,

    /// Project name or code, per the project identity setting.
    #[arg(long)]
    project: String,

    /// Project file read on push and written on pull.
    #[arg(long)]
    data_file: PathBuf,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    settings: SettingsArgs,

    /// Directory holding the review workbooks.
    #[arg(long, default_value = "workbooks")]
    workbooks: PathBuf,
}

#[derive(clap::Args)]
struct InitProjectArgs {
    #[arg(long)]
    name: String,

    #[arg(long)]
    code: String,

    #[arg(long, default_value = "Schedule")]
    schedule_name: String,

    #[command(flatten)]
    store: StoreArgs,
}

#[derive(clap::Args)]
struct MigrateArgs {
    #[arg(long)]
    project: String,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    settings: SettingsArgs,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Direction {
    Push,
    Pull,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum IdentityArg {
    Name,
    Code,
}

impl From<IdentityArg> for ProjectIdentity {
    fn from(identity: IdentityArg) -> Self {
        match identity {
            IdentityArg::Name => ProjectIdentity::Name,
            IdentityArg::Code => ProjectIdentity::Code,
        }
    }
}
