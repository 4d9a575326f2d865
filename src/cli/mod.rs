pub mod config;

pub use config::LeadflowConfig;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::agent::{CrmAssistant, ToolRegistry};
use crate::api::AppState;
use crate::crm::{self, LeadQuery, LeadStatus, NewLead};
use crate::engine::{LeadWorkflow, StepStatus, get_workflow_summary};
use crate::extraction::LlmExtraction;
use crate::llm::{ChatModel, OpenAiChat, OpenAiConfig, openai};
use crate::research::{FirecrawlScraper, OfflineResearch, Research, TavilyResearch, WebResearch, firecrawl, tavily};
use crate::stages::StageDeps;
use crate::storage::RecordStore;
use crate::storage::json_store::JsonRecordStore;
use crate::storage::sql_store::SqlRecordStore;

use config::{
    DEFAULT_ASSISTANT_MODEL, DEFAULT_DATA_DIR, DEFAULT_HOST, DEFAULT_MAX_BODY, DEFAULT_PORT,
    env_secret,
};

#[derive(Parser)]
#[command(name = "leadflow", version, about = "Lead processing workflow and CRM assistant")]
pub struct Cli {
    /// Path to a leadflow.yaml config file (default: auto-detect in cwd)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to a .env file to load (default: auto-detect .env in cwd)
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,

    /// JSON record store directory (used when no database URL is set)
    #[arg(long, global = true, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// sqlx database URL, e.g. sqlite://leads.db?mode=rwc
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server
    Serve {
        /// Host to bind to
        #[arg(long, env = "HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Maximum request body size in bytes (default: 1048576 = 1 MB)
        #[arg(long, env = "MAX_BODY")]
        max_body: Option<usize>,
    },

    /// Run the lead processing workflow for one or more leads
    Process {
        /// Lead IDs
        #[arg(required = true)]
        lead_ids: Vec<String>,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Manage leads
    Leads {
        #[command(subcommand)]
        command: LeadCommands,
    },

    /// List the CRM assistant's tools
    Tools,
}

#[derive(Subcommand)]
pub enum LeadCommands {
    /// Create a lead
    Add {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        linkedin: Option<String>,
        #[arg(long)]
        twitter: Option<String>,
    },

    /// List leads, newest first
    List {
        /// Filter by status (new, researching, qualified, contacted, engaged, nurturing, won, lost)
        #[arg(short, long)]
        status: Option<String>,

        /// Text search over name, company, title and research summary
        #[arg(short, long)]
        query: Option<String>,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show a lead with its recent activities
    Show {
        /// Lead ID
        id: String,
    },
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Load .env file
    load_dotenv(cli.dotenv.as_deref());

    let config = LeadflowConfig::load(cli.config.as_deref())?;
    let store = open_store(&config, cli.data_dir, cli.database_url).await?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            max_body,
        } => cmd_serve(&config, store, host, port, max_body).await,
        Commands::Process { lead_ids, format } => {
            cmd_process(&config, store, lead_ids, format).await
        }
        Commands::Leads { command } => match command {
            LeadCommands::Add {
                first_name,
                last_name,
                email,
                title,
                company,
                linkedin,
                twitter,
            } => {
                let new_lead = NewLead {
                    first_name,
                    last_name,
                    email,
                    title,
                    company_name: company,
                    linkedin_url: linkedin,
                    twitter_url: twitter,
                    ..NewLead::default()
                };
                cmd_leads_add(store, new_lead).await
            }
            LeadCommands::List {
                status,
                query,
                limit,
            } => cmd_leads_list(store, status, query, limit).await,
            LeadCommands::Show { id } => cmd_leads_show(store, id).await,
        },
        Commands::Tools => cmd_tools(&config, store),
    }
}

/// Load environment variables from a .env file.
/// If an explicit path is given, load from that path (error if missing).
/// Otherwise, auto-detect .env in the current working directory (silently skip if absent).
fn load_dotenv(explicit_path: Option<&Path>) {
    match explicit_path {
        Some(path) => match dotenvy::from_path(path) {
            Ok(()) => info!("Loaded env from {}", path.display()),
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load dotenv file '{}': {}",
                    path.display(),
                    e
                );
            }
        },
        None => match dotenvy::dotenv() {
            Ok(path) => info!("Loaded env from {}", path.display()),
            Err(dotenvy::Error::Io(_)) => {}
            Err(e) => {
                eprintln!("Warning: Failed to parse .env file: {}", e);
            }
        },
    }
}

// --- Wiring ---

/// SQL store when a database URL is configured, JSON files otherwise.
async fn open_store(
    config: &LeadflowConfig,
    data_dir: Option<PathBuf>,
    database_url: Option<String>,
) -> Result<Arc<dyn RecordStore>> {
    if let Some(url) = database_url.or_else(|| config.database_url.clone()) {
        let store = SqlRecordStore::connect(&url)
            .await
            .context("Failed to open database")?;
        return Ok(Arc::new(store));
    }

    let dir = data_dir
        .or_else(|| config.data_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    info!(data_dir = %dir.display(), "Using JSON record store");
    Ok(Arc::new(JsonRecordStore::new(dir)))
}

fn build_research(config: &LeadflowConfig) -> Result<Arc<dyn Research>> {
    let search = env_secret(&["TAVILY_API_KEY"])
        .map(|key| {
            let base = config
                .search
                .base_url
                .as_deref()
                .unwrap_or(tavily::DEFAULT_BASE_URL);
            TavilyResearch::new(base, key, config.search_results())
        })
        .transpose()?;
    let scraper = env_secret(&["FIRECRAWL_API_KEY"])
        .map(|key| {
            let base = config
                .scrape
                .base_url
                .as_deref()
                .unwrap_or(firecrawl::DEFAULT_BASE_URL);
            FirecrawlScraper::new(base, key)
        })
        .transpose()?;

    if search.is_none() && scraper.is_none() {
        info!("No research keys configured, using offline research");
        return Ok(Arc::new(OfflineResearch));
    }
    Ok(Arc::new(WebResearch::new(search, scraper)))
}

fn build_model(config: &LeadflowConfig, model: Option<&str>, default_model: &str) -> Result<Arc<dyn ChatModel>> {
    let api_key = env_secret(&["OPENAI_API_KEY", "LLM_API_KEY"]);
    let defaults = OpenAiConfig::default();
    let chat = OpenAiChat::new(OpenAiConfig {
        base_url: config
            .llm
            .base_url
            .clone()
            .unwrap_or(defaults.base_url),
        api_key,
        model: model.unwrap_or(default_model).to_string(),
        temperature_override: config.llm.temperature_override,
        timeout_s: config.llm.timeout_s.unwrap_or(defaults.timeout_s),
    })?;
    Ok(Arc::new(chat))
}

fn build_workflow(config: &LeadflowConfig, store: Arc<dyn RecordStore>) -> Result<Arc<LeadWorkflow>> {
    if env_secret(&["OPENAI_API_KEY", "LLM_API_KEY"]).is_none() {
        warn!("OPENAI_API_KEY not set; language model calls will fail and stages will degrade");
    }
    let model = build_model(config, config.llm.model.as_deref(), openai::DEFAULT_MODEL)?;
    let deps = StageDeps {
        store,
        research: build_research(config)?,
        extraction: Arc::new(LlmExtraction::new(model)),
    };
    Ok(Arc::new(LeadWorkflow::new(deps)))
}

fn build_assistant(
    config: &LeadflowConfig,
    store: Arc<dyn RecordStore>,
    workflow: Arc<LeadWorkflow>,
) -> Result<Arc<CrmAssistant>> {
    let model = build_model(
        config,
        config.llm.assistant_model.as_deref(),
        DEFAULT_ASSISTANT_MODEL,
    )?;
    let tools = ToolRegistry::with_crm_tools(store, workflow);
    Ok(Arc::new(CrmAssistant::new(model, tools)))
}

// --- Commands ---

async fn cmd_serve(
    config: &LeadflowConfig,
    store: Arc<dyn RecordStore>,
    host: Option<String>,
    port: Option<u16>,
    max_body: Option<usize>,
) -> Result<()> {
    let host = host
        .or_else(|| config.host.clone())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = port.or(config.port).unwrap_or(DEFAULT_PORT);
    let max_body = max_body.or(config.max_body).unwrap_or(DEFAULT_MAX_BODY);

    let workflow = build_workflow(config, store.clone())?;
    let assistant = build_assistant(config, store.clone(), workflow.clone())?;
    let state = Arc::new(AppState {
        store,
        workflow,
        assistant,
        workflow_timeout: config.workflow_timeout(),
    });

    crate::api::serve(state, &host, port, max_body).await
}

async fn cmd_process(
    config: &LeadflowConfig,
    store: Arc<dyn RecordStore>,
    lead_ids: Vec<String>,
    format: String,
) -> Result<()> {
    let workflow = build_workflow(config, store)?;

    let mut summaries = Vec::with_capacity(lead_ids.len());
    for lead_id in &lead_ids {
        let ctx = workflow
            .trigger(lead_id, config.workflow_timeout())
            .await?;
        summaries.push(get_workflow_summary(&ctx));
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    for summary in &summaries {
        println!("\nLead: {}", summary.lead_id);
        println!("Status: {} ({}s)", summary.status, summary.duration);
        for step in &summary.steps {
            let status_icon = match step.status {
                StepStatus::Completed => "✓",
                StepStatus::Failed => "✗",
                StepStatus::Running => "⟳",
                StepStatus::Pending => "○",
            };
            println!("  {} {}", status_icon, step.name);
            if let Some(ref err) = step.error {
                println!("    Error: {}", err);
            }
        }
        if let Some(score) = summary.final_score {
            println!("Score: {}", score);
        }
        if let Some(status) = summary.final_status {
            println!("New status: {}", status);
        }
        if let Some(ref err) = summary.error {
            println!("Error: {}", err);
        }
    }

    let failed = summaries
        .iter()
        .filter(|s| s.error.is_some())
        .count();
    println!("\nProcessed: {} lead(s), {} failed", summaries.len(), failed);
    Ok(())
}

async fn cmd_leads_add(store: Arc<dyn RecordStore>, new_lead: NewLead) -> Result<()> {
    let lead = crm::create_lead(store.as_ref(), new_lead).await?;
    println!("Created lead {} ({})", lead.id, lead.full_name());
    Ok(())
}

async fn cmd_leads_list(
    store: Arc<dyn RecordStore>,
    status: Option<String>,
    query: Option<String>,
    limit: usize,
) -> Result<()> {
    let status = status
        .as_deref()
        .map(str::parse::<LeadStatus>)
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))?;

    let leads = store
        .list_leads(&LeadQuery {
            query,
            status,
            min_score: None,
            limit: Some(limit),
        })
        .await?;

    if leads.is_empty() {
        println!("No leads found.");
        return Ok(());
    }

    println!(
        "{:<38} {:<24} {:<24} {:<12} {:>5}",
        "LEAD ID", "NAME", "COMPANY", "STATUS", "SCORE"
    );
    println!("{}", "-".repeat(107));

    for lead in &leads {
        println!(
            "{:<38} {:<24} {:<24} {:<12} {:>5}",
            lead.id,
            lead.full_name(),
            lead.company_name.as_deref().unwrap_or("-"),
            lead.status,
            lead.score
        );
    }

    println!("\nTotal: {} lead(s)", leads.len());
    Ok(())
}

async fn cmd_leads_show(store: Arc<dyn RecordStore>, id: String) -> Result<()> {
    let detail = crm::lead_detail(store.as_ref(), &id)
        .await?
        .with_context(|| format!("Lead '{}' not found", id))?;

    println!("{}", serde_json::to_string_pretty(&detail)?);
    Ok(())
}

fn cmd_tools(config: &LeadflowConfig, store: Arc<dyn RecordStore>) -> Result<()> {
    let workflow = build_workflow(config, store.clone())?;
    let registry = ToolRegistry::with_crm_tools(store, workflow);
    let tools = registry.list();

    println!("{:<22} DESCRIPTION", "TOOL");
    println!("{}", "-".repeat(80));

    for (name, desc) in &tools {
        println!("{:<22} {}", name, desc);
    }

    println!("\nTotal: {} tool(s)", tools.len());
    Ok(())
}
