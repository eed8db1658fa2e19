use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};

use banana_reporter::{
    AnalysisSession, ColorBucket, ColorSampler, Config, EmailDraft, JsonFileStore, MasterData,
    RemoteClassifier, ReportForm, ReportRecord, RipenessLevel,
};

#[derive(Parser)]
#[command(name = "banana-reporter")]
#[command(about = "Banana ripeness color analysis and reporting")]
struct Cli {
    /// Configuration file (defaults to ./banana_reporter.toml; `analyze` and `chart` create it if missing)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the color histogram of a photo without classifying it
    Sample { image: PathBuf },
    /// Classify a photo and compare it with the visually chosen chart level
    Analyze {
        image: PathBuf,
        #[arg(long)]
        user: String,
        /// Chart level picked by eye
        #[arg(long)]
        level: u8,
        /// Write a CSV report to the export directory
        #[arg(long, default_value_t = false)]
        export: bool,
        /// Print a report mail draft
        #[arg(long, default_value_t = false)]
        email: bool,
        #[command(flatten)]
        form: FormArgs,
    },
    /// Show the reference color chart
    Chart,
    /// Manage chains, stores, products, claim types and code labels
    Master {
        #[command(subcommand)]
        command: MasterCommand,
    },
}

#[derive(clap::Args)]
struct FormArgs {
    #[arg(long, default_value = "")]
    chain: String,
    #[arg(long, default_value = "")]
    store: String,
    #[arg(long, default_value = "")]
    product: String,
    #[arg(long, default_value = "")]
    claim_type: String,
    #[arg(long, default_value = "")]
    delivery_date: String,
    #[arg(long, default_value = "")]
    capture_date: String,
    #[arg(long, default_value = "")]
    comment: String,
    /// Free-form code values, up to three
    #[arg(long = "code")]
    codes: Vec<String>,
}

impl FormArgs {
    fn into_form(self) -> ReportForm {
        let mut codes = self.codes.into_iter();
        ReportForm {
            chain: self.chain,
            store: self.store,
            product: self.product,
            claim_type: self.claim_type,
            delivery_date: self.delivery_date,
            capture_date: self.capture_date,
            comment: self.comment,
            codes: std::array::from_fn(|_| codes.next().unwrap_or_default()),
        }
    }
}

#[derive(Subcommand)]
enum MasterCommand {
    List,
    AddChain { name: String },
    RemoveChain { name: String },
    AddStore { chain: String, store: String },
    RemoveStore { chain: String, store: String },
    AddProduct { name: String },
    RemoveProduct { name: String },
    AddClaimType { name: String },
    RemoveClaimType { name: String },
    SetCodeLabel { index: usize, label: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("🍌 Starting banana reporter");

    let cli = Cli::parse();

    match cli.command {
        Commands::Sample { image } => run_sample(image).await,
        Commands::Analyze {
            image,
            user,
            level,
            export,
            email,
            form,
        } => {
            let config = classifier_config(cli.config.as_deref())?;
            run_analyze(&config, image, user, RipenessLevel(level), export, email, form.into_form()).await
        }
        Commands::Chart => run_chart(&classifier_config(cli.config.as_deref())?).await,
        Commands::Master { command } => run_master(&Config::load_or_default(cli.config.as_deref())?, command),
    }
}

/// Full configuration for commands that talk to the classifier; creates the
/// default file on first use.
fn classifier_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load()?,
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

async fn run_sample(image: PathBuf) -> Result<()> {
    let bytes = tokio::fs::read(&image)
        .await
        .with_context(|| format!("Failed to read image: {}", image.display()))?;
    let histogram = ColorSampler::new().sample_async(bytes).await?;

    for bucket in ColorBucket::all() {
        info!("{:>13}: {:5.1}%", bucket.name(), histogram.ratio(*bucket) * 100.0);
    }
    println!("{}", serde_json::to_string_pretty(&histogram)?);
    Ok(())
}

fn open_master_data(config: &Config) -> Result<MasterData<JsonFileStore>> {
    let store = JsonFileStore::open(&config.paths.store_file)
        .with_context(|| format!("Failed to open store: {}", config.paths.store_file.display()))?;
    Ok(MasterData::load(store)?)
}

async fn run_analyze(
    config: &Config,
    image: PathBuf,
    user: String,
    level: RipenessLevel,
    export: bool,
    email: bool,
    form: ReportForm,
) -> Result<()> {
    if config.is_unconfigured() {
        warn!("Classifier settings still hold template values; see {}", config.paths.config_file.display());
    }

    let classifier = RemoteClassifier::new(&config.classifier)?;
    let chart = classifier.color_chart_or_default().await;
    if !chart.contains(level) {
        warn!("Level {} is not on the reference chart", level);
    }

    let bytes = tokio::fs::read(&image)
        .await
        .with_context(|| format!("Failed to read image: {}", image.display()))?;

    let mut session = AnalysisSession::new(user);
    session.set_image(bytes);
    session.select_visual_level(level);

    let outcome = session
        .analyze(&ColorSampler::new(), &classifier, config.decode_timeout())
        .await?
        .clone();

    println!("Detected: {}", chart.display_name(outcome.detected_level));
    println!("Visual:   {}", chart.display_name(outcome.manual_level));
    println!("Result:   {}", outcome.match_label());
    println!("Sampled pixels: {}", outcome.histogram.total_sampled());

    if !(export || email) {
        return Ok(());
    }

    let mut master = open_master_data(config)?;
    let now = Local::now();

    if export {
        let record = ReportRecord::new(form.clone(), outcome.clone(), master.code_labels(), now);
        let path = record.write_csv(&config.paths.export_dir)?;
        println!("Exported: {}", path.display());
    }

    if email {
        let draft = EmailDraft::issue(master.store_mut(), session.user_id(), &form, &outcome, now)?;
        println!("Subject: {}\n\n{}", draft.subject, draft.body);
    }

    Ok(())
}

async fn run_chart(config: &Config) -> Result<()> {
    let classifier = RemoteClassifier::new(&config.classifier)?;
    let chart = classifier.color_chart_or_default().await;
    for entry in chart.entries() {
        println!("{:>2}  {}  {}", entry.level.value(), entry.color, chart.display_name(entry.level));
    }
    Ok(())
}

fn run_master(config: &Config, command: MasterCommand) -> Result<()> {
    let mut master = open_master_data(config)?;

    match command {
        MasterCommand::List => {
            for chain in master.chains() {
                println!("{}: {}", chain, master.stores(chain).join(", "));
            }
            println!("Products: {}", master.products().join(", "));
            println!("Claim types: {}", master.claim_types().join(", "));
            println!("Code labels: {}", master.code_labels().join(", "));
        }
        MasterCommand::AddChain { name } => master.add_chain(&name)?,
        MasterCommand::RemoveChain { name } => master.remove_chain(&name)?,
        MasterCommand::AddStore { chain, store } => master.add_store(&chain, &store)?,
        MasterCommand::RemoveStore { chain, store } => master.remove_store(&chain, &store)?,
        MasterCommand::AddProduct { name } => master.add_product(&name)?,
        MasterCommand::RemoveProduct { name } => master.remove_product(&name)?,
        MasterCommand::AddClaimType { name } => master.add_claim_type(&name)?,
        MasterCommand::RemoveClaimType { name } => master.remove_claim_type(&name)?,
        MasterCommand::SetCodeLabel { index, label } => master.set_code_label(index, &label)?,
    }

    Ok(())
}
