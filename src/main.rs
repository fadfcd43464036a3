use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ledes_gen::catalog::{load_tasks, load_timekeepers};
use ledes_gen::config::{ledes_file_name, INVOICE_NUMBER_PLACEHOLDER};
use ledes_gen::{
    generate_batch, generate_summary, parse_ledes, round_to, to_ledes, BillingPeriod, Catalogs,
    Config, EntityKind, EntityStore, InvoiceHeader, InvoiceRequest, JsonEntityStore,
};

#[derive(Parser)]
#[command(name = "ledes-gen")]
#[command(about = "Synthetic legal-billing invoice generator with LEDES 1998B output")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(long, default_value = ".ledes-gen/config.yml")]
    config: PathBuf,

    /// Path to the client/law firm id store
    #[arg(long, default_value = ".ledes-gen/ids")]
    store_path: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one or more invoices
    Generate(GenerateArgs),

    /// Parse a LEDES file and check its totals
    Validate {
        /// LEDES file to check
        file: PathBuf,
    },

    /// Manage stored client and law firm ids
    Entities {
        #[command(subcommand)]
        action: EntityAction,
    },
}

#[derive(clap::Args)]
struct GenerateArgs {
    /// First day of the billing period (YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,

    /// Last day of the billing period (YYYY-MM-DD)
    #[arg(long)]
    end: NaiveDate,

    /// Number of fee lines to attempt
    #[arg(long)]
    fees: Option<usize>,

    /// Number of expense lines
    #[arg(long)]
    expenses: Option<usize>,

    /// Ceiling on hours per timekeeper per day
    #[arg(long)]
    max_daily_hours: Option<f64>,

    /// Merge several lines into one block-billed entry
    #[arg(long)]
    block_billing: bool,

    /// Local travel (E109) rate per mile
    #[arg(long)]
    mileage_rate: Option<f64>,

    /// Mandatory line to include (repeatable)
    #[arg(long = "mandatory")]
    mandatory: Vec<String>,

    /// Task code favoured by the fee generator (repeatable)
    #[arg(long = "major-task")]
    major_tasks: Vec<String>,

    /// Timekeeper catalog (YAML or JSON)
    #[arg(long)]
    timekeepers: Option<PathBuf>,

    /// Task/activity catalog (YAML or JSON)
    #[arg(long)]
    tasks: Option<PathBuf>,

    /// Client id (defaults to the stored default client)
    #[arg(long)]
    client_id: Option<String>,

    /// Law firm id (defaults to the stored default law firm)
    #[arg(long)]
    law_firm_id: Option<String>,

    /// Invoice description
    #[arg(long, default_value = "Professional legal services")]
    description: String,

    /// Invoice number (suffixed per invoice in a batch)
    #[arg(long, default_value = "INV-1001")]
    invoice_number: String,

    /// Law firm matter id
    #[arg(long, default_value = "MATTER-001")]
    matter: String,

    /// Number of invoices, each covering the preceding period
    #[arg(long, default_value_t = 1)]
    invoices: usize,

    /// Random seed for reproducible output
    #[arg(long, env = "LEDES_GEN_SEED")]
    seed: Option<u64>,

    /// LEDES file name template ({invoice_number} is replaced)
    #[arg(long)]
    ledes_file_name: Option<String>,

    /// Directory for generated files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Also write the line items as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum EntityAction {
    /// Add or update an id
    Add {
        #[arg(value_enum)]
        kind: EntityKind,
        /// Display name
        name: String,
        /// External id written to LEDES files
        ext_id: String,
        #[arg(long, default_value = "Prod")]
        environment: String,
    },

    /// Change the name, external id or environment of a stored id
    Update {
        id: Uuid,
        /// Display name
        name: String,
        /// External id written to LEDES files
        ext_id: String,
        #[arg(long, default_value = "Prod")]
        environment: String,
    },

    /// List stored ids
    List {
        #[arg(value_enum)]
        kind: EntityKind,
        /// Filter by environment ("All" for every environment)
        #[arg(long)]
        environment: Option<String>,
    },

    /// Remove an id
    Remove { id: Uuid },

    /// Use an id when none is given to generate
    Default {
        #[arg(value_enum)]
        kind: EntityKind,
        id: Uuid,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ledes_gen=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate(args) => {
            let config = Config::load(&cli.config)?;
            run_generate(&config, &cli.store_path, args)?;
        }
        Commands::Validate { file } => {
            validate_file(&file)?;
        }
        Commands::Entities { action } => {
            let store = JsonEntityStore::new(&cli.store_path)?;
            run_entities(&store, action)?;
        }
    }

    Ok(())
}

fn run_generate(config: &Config, store_path: &Path, args: GenerateArgs) -> Result<()> {
    let store = JsonEntityStore::new(store_path)?;
    let client_id = resolve_id(&store, EntityKind::Client, args.client_id)?;
    let law_firm_id = resolve_id(&store, EntityKind::LawFirm, args.law_firm_id)?;

    let catalogs = Catalogs {
        timekeepers: match &args.timekeepers {
            Some(path) => load_timekeepers(path)?,
            None => Vec::new(),
        },
        tasks: match &args.tasks {
            Some(path) => load_tasks(path)?,
            None => Vec::new(),
        },
    };

    let header = InvoiceHeader {
        client_id,
        law_firm_id,
        description: args.description,
    };
    let period = BillingPeriod::new(args.start, args.end);
    let today = chrono::Local::now().date_naive();

    let mut request = InvoiceRequest::from_config(config, header, period, today);
    if let Some(n) = args.fees {
        request.fee_count = n;
    }
    if let Some(n) = args.expenses {
        request.expense_count = n;
    }
    if let Some(h) = args.max_daily_hours {
        request.max_daily_hours = h;
    }
    if let Some(rate) = args.mileage_rate {
        request.expenses.mileage_rate = rate;
    }
    request.block_billing |= args.block_billing;
    if !args.mandatory.is_empty() {
        request.mandatory = args.mandatory;
    }
    if !args.major_tasks.is_empty() {
        request.major_task_codes = args.major_tasks;
    }

    let file_template = args
        .ledes_file_name
        .clone()
        .unwrap_or_else(|| config.generation.ledes_file_name.clone());
    if args.invoices > 1 && !file_template.contains(INVOICE_NUMBER_PLACEHOLDER) {
        anyhow::bail!(
            "LEDES file name '{}' must contain {} when generating several invoices",
            file_template,
            INVOICE_NUMBER_PLACEHOLDER
        );
    }

    let seed = args.seed.unwrap_or_else(rand::random);
    info!(seed, invoices = args.invoices, "Generating invoices");

    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!("Failed to create output directory: {}", args.output_dir.display())
    })?;

    let results = generate_batch(&request, &catalogs, args.invoices, seed);
    let mut failed = 0;

    for (i, result) in results.into_iter().enumerate() {
        let invoice_number = if args.invoices > 1 {
            format!("{}-{:02}", args.invoice_number, i + 1)
        } else {
            args.invoice_number.clone()
        };

        let invoice = match result {
            Ok(invoice) => invoice,
            Err(e) => {
                eprintln!("Invoice {} failed: {}", invoice_number, e);
                failed += 1;
                continue;
            }
        };

        let ledes = to_ledes(&invoice, &invoice_number, &args.matter);
        let path = args
            .output_dir
            .join(ledes_file_name(&file_template, &invoice_number));
        fs::write(&path, &ledes)
            .with_context(|| format!("Failed to write LEDES file: {}", path.display()))?;
        info!(output = %path.display(), "LEDES file written");

        if args.json {
            let path = path.with_extension("json");
            let content = serde_json::to_string_pretty(&invoice)?;
            fs::write(&path, content)
                .with_context(|| format!("Failed to write JSON file: {}", path.display()))?;
        }

        println!("{}", generate_summary(&invoice, &invoice_number));
    }

    if failed > 0 {
        anyhow::bail!("{} of {} invoices failed", failed, args.invoices);
    }

    Ok(())
}

/// Explicit id, else the stored default for that kind
fn resolve_id(
    store: &impl EntityStore,
    kind: EntityKind,
    explicit: Option<String>,
) -> Result<String> {
    if let Some(id) = explicit {
        return Ok(id);
    }

    let entity = store
        .get_default(kind)?
        .with_context(|| {
            format!(
                "No --{} given and no default {:?} stored",
                flag_name(kind),
                kind
            )
        })?;

    info!(name = %entity.name, ext_id = %entity.ext_id, "Using stored default");

    Ok(entity.ext_id)
}

fn flag_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Client => "client-id",
        EntityKind::LawFirm => "law-firm-id",
    }
}

fn validate_file(path: &Path) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read LEDES file: {}", path.display()))?;

    let records = parse_ledes(&content)
        .with_context(|| format!("Failed to parse LEDES file: {}", path.display()))?;

    println!("{} records", records.len());

    let mut invoices: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for record in &records {
        let entry = invoices
            .entry(record.invoice_number.as_str())
            .or_insert((record.invoice_total, 0.0));
        entry.1 += record.line_total;
    }

    let mut mismatched = 0;
    for (number, (declared, summed)) in &invoices {
        let summed = round_to(*summed, 2);
        if (declared - summed).abs() < 0.005 {
            println!("  {}: total {:.2} OK", number, declared);
        } else {
            warn!(invoice = number, declared, summed, "Invoice total mismatch");
            println!("  {}: declared {:.2}, lines sum to {:.2}", number, declared, summed);
            mismatched += 1;
        }
    }

    if mismatched > 0 {
        anyhow::bail!("{} invoice totals do not reconcile", mismatched);
    }

    Ok(())
}

fn run_entities(store: &impl EntityStore, action: EntityAction) -> Result<()> {
    match action {
        EntityAction::Add {
            kind,
            name,
            ext_id,
            environment,
        } => {
            let entity = store.upsert(kind, &name, &ext_id, &environment)?;
            println!("Saved {} ({}) as {}", entity.name, entity.ext_id, entity.id);
        }
        EntityAction::Update {
            id,
            name,
            ext_id,
            environment,
        } => {
            let entity = store.update(&id, &name, &ext_id, &environment)?;
            println!(
                "Updated {} ({}) in {}",
                entity.name, entity.ext_id, entity.environment
            );
        }
        EntityAction::List { kind, environment } => {
            let entities = store.list(kind, environment.as_deref())?;
            if entities.is_empty() {
                println!("No stored ids.");
                return Ok(());
            }

            let default = store.get_default(kind)?.map(|e| e.id);
            for entity in entities {
                let marker = if Some(entity.id) == default { "*" } else { " " };
                println!(
                    "{} {} - {} [{}]",
                    marker, entity.name, entity.ext_id, entity.environment
                );
                println!("    ID: {}", entity.id);
            }

            println!("\nEnvironments: {}", store.environments(kind)?.join(", "));
        }
        EntityAction::Remove { id } => {
            if store.delete(&id)? {
                println!("Removed {}", id);
            } else {
                println!("No entity with id {}", id);
            }
        }
        EntityAction::Default { kind, id } => {
            store.set_default(kind, &id)?;
            println!("Default {:?} set to {}", kind, id);
        }
    }

    Ok(())
}
