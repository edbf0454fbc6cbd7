use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use indexmap::IndexMap;
use std::{
    fs,
    path::{Path, PathBuf},
};
use streamctl::alerts::{AlertForm, AlertsClient, Trigger};
use streamctl::client::ApiClient;
use streamctl::config::{self, EffectiveConfig, Overrides, Scope, resolve, save};
use streamctl::query::{self, HttpStore, QueryRequest};
use streamctl::render::new_table;
use streamctl::schema;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

#[derive(Parser)]
#[command(
    name = "streamctl",
    version,
    about = "CLI for the Stream activity log of a WordPress site"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "URL",
        help = "Site URL override for this invocation (otherwise read from config)"
    )]
    url: Option<String>,

    #[arg(long, global = true, help = "WordPress user to authenticate as")]
    username: Option<String>,

    #[arg(
        long,
        global = true,
        help = "Application password of that user (otherwise read from config)"
    )]
    app_password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Persist the site URL and credentials given by the global options
    Configure {
        #[arg(long, help = "Nonce sent when saving alerts")]
        nonce: Option<String>,
        #[arg(
            long,
            value_enum,
            default_value_t = ScopeArg::User,
            help = "Where to write the config (local project dir or user config dir)"
        )]
        scope: ScopeArg,
    },
    /// Query activity records
    Query(QueryArgs),
    /// List known record fields (or query filters)
    Fields {
        #[arg(long, help = "List query filters instead of record fields")]
        filters: bool,
        #[arg(long, short = 'o', value_enum, default_value_t = ListFormat::Table)]
        output: ListFormat,
    },
    /// Alert rule helpers
    #[command(subcommand)]
    Alerts(AlertsCommand),
    /// Show current configuration (secrets masked)
    ConfigShow,
    /// Generate shell completion scripts
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Args)]
struct QueryArgs {
    #[arg(
        long,
        value_name = "FIELD1,FIELD2",
        help = "Fields to display (comma-separated); also limits what the store returns"
    )]
    fields: Option<String>,

    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "table",
        help = "Output format: table, count, json, json_pretty or csv"
    )]
    format: String,

    /// Filters forwarded to the record store, e.g. --author=1 --connector=posts
    /// --date_after=2024-01-01. Run `streamctl fields --filters` for the list.
    #[arg(
        value_name = "--FILTER=VALUE",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    filters: Vec<String>,
}

#[derive(Subcommand)]
enum AlertsCommand {
    /// Fetch the trigger and notification form for a new alert
    Form,
    /// Fetch the settings form of a notification type
    Settings {
        #[arg(long = "type", value_name = "TYPE")]
        alert_type: String,
        #[command(flatten)]
        trigger: TriggerArgs,
    },
    /// List the actions a connector logs
    Actions {
        #[arg(long)]
        connector: String,
        #[arg(long, short = 'o', value_enum, default_value_t = ListFormat::Table)]
        output: ListFormat,
    },
    /// Save a new alert
    Save {
        #[arg(
            long,
            value_name = "FILE",
            help = "JSON object of a row's data attributes to start from"
        )]
        row_file: Option<PathBuf>,
        #[command(flatten)]
        trigger: TriggerArgs,
        #[arg(long = "type", value_name = "TYPE")]
        alert_type: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(
            long = "setting",
            value_name = "ID=VALUE",
            help = "Notification setting, e.g. --setting email_recipient=ops@example.org"
        )]
        settings: Vec<String>,
    },
}

#[derive(Args)]
struct TriggerArgs {
    #[arg(long, help = "Trigger author (user ID or role)")]
    author: Option<String>,
    #[arg(long, help = "Trigger connector or context, e.g. posts-post")]
    context: Option<String>,
    #[arg(long, help = "Trigger action, e.g. updated")]
    action: Option<String>,
}

impl From<TriggerArgs> for Trigger {
    fn from(value: TriggerArgs) -> Self {
        Trigger {
            author: value.author,
            context: value.context,
            action: value.action,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum ListFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScopeArg {
    Local,
    User,
}

impl From<ScopeArg> for Scope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Local => Scope::Local,
            ScopeArg::User => Scope::User,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cwd = std::env::current_dir().context("reading current directory")?;
    let overrides = Overrides {
        url: cli.url.clone(),
        username: cli.username.clone(),
        app_password: cli.app_password.clone(),
    };

    match &cli.command {
        Commands::Configure { nonce, scope } => {
            let mut existing = config::load_scope((*scope).into(), &cwd)?;
            if overrides.url.is_none() && existing.url.is_none() {
                return Err(anyhow!("Provide the site with `streamctl --url <URL> configure`"));
            }
            existing.url = overrides.url.or(existing.url);
            existing.username = overrides.username.or(existing.username);
            existing.app_password = overrides.app_password.or(existing.app_password);
            existing.nonce = nonce.clone().or(existing.nonce);

            let path = save((*scope).into(), &existing, &cwd)?;
            println!("Saved configuration to {}", path.display());
            return Ok(());
        }
        Commands::ConfigShow => {
            let mut masked = config::load(&cwd)?;
            if masked.app_password.is_some() {
                masked.app_password = Some("*****".into());
            }
            if masked.nonce.is_some() {
                masked.nonce = Some("*****".into());
            }
            println!("{}", serde_json::to_string_pretty(&masked)?);
            return Ok(());
        }
        Commands::Fields { filters, output } => return print_fields(*filters, *output),
        Commands::Completion { shell } => {
            use clap_complete::{generate, shells};
            let mut cmd = Cli::command();
            let bin = cmd.get_name().to_string();
            match shell {
                CompletionShell::Bash => {
                    generate(shells::Bash, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::Zsh => {
                    generate(shells::Zsh, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::Fish => {
                    generate(shells::Fish, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::PowerShell => {
                    generate(shells::PowerShell, &mut cmd, bin, &mut std::io::stdout())
                }
            }
            return Ok(());
        }
        Commands::Query(_) | Commands::Alerts(_) => {}
    }

    let effective = resolve(&cwd, overrides)?;
    let client = ApiClient::new(
        &effective.url,
        effective.credentials.clone(),
        effective.timeout,
    )?;

    match cli.command {
        Commands::Query(args) => run_query(&client, &effective, args),
        Commands::Alerts(command) => handle_alerts(&client, &effective, command),
        _ => unreachable!("handled earlier"),
    }
}

fn run_query(client: &ApiClient, effective: &EffectiveConfig, args: QueryArgs) -> Result<()> {
    let request = QueryRequest::from_args(args.fields, args.format, &args.filters)?;
    let store = HttpStore::new(client, &effective.records_path);
    let mut stdout = std::io::stdout().lock();
    query::run(&store, &request, &effective.query, &mut stdout)
}

fn handle_alerts(
    client: &ApiClient,
    effective: &EffectiveConfig,
    command: AlertsCommand,
) -> Result<()> {
    let alerts = AlertsClient::new(client, &effective.ajax_path, effective.nonce.clone());
    match command {
        AlertsCommand::Form => {
            println!("{}", alerts.new_alert_form()?);
        }
        AlertsCommand::Settings {
            alert_type,
            trigger,
        } => {
            println!("{}", alerts.alert_settings(&alert_type, &trigger.into())?);
        }
        AlertsCommand::Actions { connector, output } => {
            let actions = alerts.connector_actions(&connector)?;
            match output {
                ListFormat::Json => println!("{}", serde_json::to_string_pretty(&actions)?),
                ListFormat::Table => {
                    let mut table = new_table(vec!["action", "label"]);
                    for (id, label) in &actions {
                        table.add_row(vec![id, label]);
                    }
                    println!("{table}");
                }
            }
        }
        AlertsCommand::Save {
            row_file,
            trigger,
            alert_type,
            status,
            settings,
        } => {
            let mut form = match row_file {
                Some(path) => AlertForm::from_row_data(&read_row_file(&path)?),
                None => AlertForm {
                    alert_type: "none".into(),
                    ..Default::default()
                },
            };
            let trigger = Trigger::from(trigger);
            form.trigger.author = trigger.author.or(form.trigger.author);
            form.trigger.context = trigger.context.or(form.trigger.context);
            form.trigger.action = trigger.action.or(form.trigger.action);
            if let Some(alert_type) = alert_type {
                form.alert_type = alert_type;
            }
            if let Some(status) = status {
                form.status = Some(status);
            }
            for setting in &settings {
                let (id, value) = setting
                    .split_once('=')
                    .ok_or_else(|| anyhow!("--setting expects ID=VALUE, got `{setting}`"))?;
                form.set(id.trim(), value);
            }
            alerts.save_alert(&form)?;
            println!("Alert saved.");
        }
    }
    Ok(())
}

fn read_row_file(path: &Path) -> Result<IndexMap<String, String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading row file {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&content).context("parsing --row-file as JSON")?;
    let serde_json::Value::Object(map) = value else {
        return Err(anyhow!("--row-file must contain a JSON object"));
    };
    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}

fn print_fields(filters: bool, output: ListFormat) -> Result<()> {
    match (filters, output) {
        (false, ListFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(schema::RECORD_FIELDS)?)
        }
        (true, ListFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(schema::FILTERS)?)
        }
        (false, ListFormat::Table) => {
            let mut table = new_table(vec!["field", "type", "default", "description"]);
            for field in schema::RECORD_FIELDS {
                table.add_row(vec![
                    field.name,
                    field.field_type,
                    if field.default { "yes" } else { "" },
                    field.description,
                ]);
            }
            println!("{table}");
        }
        (true, ListFormat::Table) => {
            let mut table = new_table(vec!["filter", "description"]);
            for filter in schema::FILTERS {
                table.add_row(vec![filter.name, filter.description]);
            }
            println!("{table}");
        }
    }
    Ok(())
}
