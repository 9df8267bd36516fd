use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use orchestra_config::{AppConfig, WorkflowDef};
use orchestra_engine::{
  ChannelNotifier, ExecutionEngine, ExecutionEvent, InboundMessage, NodeRegistry, PublishError,
  PublishedWorkflow, Publisher, SessionRunner,
};
use orchestra_gateway::{
  CollaboratorError, HttpMessageSender, HttpPlatform, HttpWebhookCaller, MessageSender,
};
use orchestra_processes::{LeadInput, Processes, Services};
use orchestra_resilience::{BreakerRegistry, RetryPolicy};
use orchestra_saga::{SagaError, TransactionManager};
use orchestra_store::{MemoryStore, SqliteStore};

/// Orchestra - conversational workflows and business sagas
#[derive(Parser)]
#[command(name = "orchestra")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.orchestra)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Path to the configuration file (default: <data-dir>/orchestra.json)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Validate or run a workflow definition
  Workflow {
    #[command(subcommand)]
    action: WorkflowAction,
  },

  /// Run a business saga
  Saga {
    #[command(subcommand)]
    action: SagaAction,
  },
}

#[derive(Subcommand)]
enum WorkflowAction {
  /// Check a workflow file without running it
  Validate {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Run a workflow interactively, one stdin line per inbound message
  Run {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Initial session variables as a JSON object
    #[arg(long)]
    vars: Option<String>,

    /// Deliver outbound messages through the configured messaging provider
    /// instead of printing them
    #[arg(long)]
    deliver: bool,
  },
}

#[derive(Subcommand)]
enum SagaAction {
  /// Import a JSON array of leads into a segment
  ImportLeads {
    /// Path to the leads file (JSON array)
    leads_file: PathBuf,

    /// Target segment id
    #[arg(long)]
    segment: String,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".orchestra"),
  };
  let config_path = cli
    .config
    .unwrap_or_else(|| data_dir.join("orchestra.json"));
  let config = AppConfig::load(&config_path)
    .with_context(|| format!("failed to load config: {}", config_path.display()))?;

  let Some(command) = cli.command else {
    println!("orchestra - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    match command {
      Commands::Workflow { action } => match action {
        WorkflowAction::Validate { workflow_file } => validate_workflow(&workflow_file, &config),
        WorkflowAction::Run {
          workflow_file,
          vars,
          deliver,
        } => run_workflow(&workflow_file, vars.as_deref(), deliver, &config).await,
      },
      Commands::Saga { action } => match action {
        SagaAction::ImportLeads {
          leads_file,
          segment,
        } => import_leads(&leads_file, &segment, &data_dir, &config).await,
      },
    }
  })
}

/// Prints outbound messages instead of delivering them.
struct ConsoleSender;

#[async_trait]
impl MessageSender for ConsoleSender {
  async fn send(
    &self,
    _connection_id: &str,
    recipient: &str,
    content: &str,
  ) -> Result<(), CollaboratorError> {
    println!("[to {recipient}] {content}");
    Ok(())
  }
}

fn read_workflow(path: &Path) -> Result<WorkflowDef> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read workflow file: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse workflow file: {}", path.display()))
}

fn message_sender(config: &AppConfig, deliver: bool) -> Arc<dyn MessageSender> {
  if deliver {
    Arc::new(HttpMessageSender::new(&config.messaging))
  } else {
    Arc::new(ConsoleSender)
  }
}

fn publisher(config: &AppConfig, messages: Arc<dyn MessageSender>) -> Result<Publisher> {
  let registry = NodeRegistry::with_builtins(messages, Arc::new(HttpWebhookCaller::new()));
  let breakers =
    BreakerRegistry::from_settings(&config.breakers).context("invalid breaker configuration")?;
  Ok(Publisher::new(
    Arc::new(registry),
    Arc::new(breakers),
    RetryPolicy::from_settings(&config.retry),
  ))
}

fn validate_workflow(path: &Path, config: &AppConfig) -> Result<()> {
  let def = read_workflow(path)?;
  match publisher(config, message_sender(config, false))?.publish(def) {
    Ok(published) => {
      let workflow = published.workflow();
      println!(
        "workflow '{}' v{} is valid ({} nodes)",
        workflow.workflow_id,
        workflow.version,
        workflow.nodes.len()
      );
      Ok(())
    }
    Err(PublishError::Nodes { workflow_id, issues }) => {
      for issue in &issues {
        println!("{issue}");
      }
      bail!("workflow '{workflow_id}' has {} invalid node(s)", issues.len())
    }
    Err(e) => Err(e).context("workflow is invalid"),
  }
}

async fn run_workflow(
  path: &Path,
  vars: Option<&str>,
  deliver: bool,
  config: &AppConfig,
) -> Result<()> {
  let variables: Map<String, Value> = match vars {
    Some(raw) => serde_json::from_str(raw).context("--vars must be a JSON object")?,
    None => Map::new(),
  };
  let publisher = publisher(config, message_sender(config, deliver))?;
  let published: Arc<PublishedWorkflow> = Arc::new(publisher.publish(read_workflow(path)?)?);

  let (tx, mut events) = mpsc::unbounded_channel();
  let engine = Arc::new(ExecutionEngine::with_notifier(
    Arc::new(MemoryStore::new()),
    config.engine.clone(),
    ChannelNotifier::new(tx),
  ));

  let session = engine.start(&published, variables, None).await?;
  let session_id = session.session_id.clone();

  let runner = SessionRunner::new(engine.clone(), published.clone());
  let sender = runner.sender();
  let cancel = CancellationToken::new();
  let handle = tokio::spawn(runner.start(cancel.clone()));

  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  loop {
    let event = tokio::select! {
      event = events.recv() => event,
      _ = tokio::signal::ctrl_c() => None,
    };
    match event {
      Some(ExecutionEvent::SessionWaiting { .. }) => {
        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
          break;
        };
        sender
          .send(InboundMessage {
            session_id: session_id.clone(),
            input: Value::String(line),
          })
          .await
          .context("session runner stopped")?;
      }
      Some(
        ExecutionEvent::SessionCompleted { .. }
        | ExecutionEvent::SessionTransferred { .. }
        | ExecutionEvent::SessionFailed { .. },
      )
      | None => break,
      Some(_) => {}
    }
  }

  cancel.cancel();
  handle.await.context("session runner panicked")??;

  let session = engine.get_session(&session_id).await?;
  println!("{}", serde_json::to_string_pretty(&session)?);
  Ok(())
}

async fn import_leads(
  path: &Path,
  segment_id: &str,
  data_dir: &Path,
  config: &AppConfig,
) -> Result<()> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read leads file: {}", path.display()))?;
  let leads: Vec<LeadInput> = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse leads file: {}", path.display()))?;

  let database_url = match &config.database_url {
    Some(url) => url.clone(),
    None => {
      std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data dir: {}", data_dir.display()))?;
      format!("sqlite://{}", data_dir.join("orchestra.db").display())
    }
  };
  let store = Arc::new(
    SqliteStore::connect(&database_url)
      .await
      .with_context(|| format!("failed to open database: {database_url}"))?,
  );

  let breakers =
    BreakerRegistry::from_settings(&config.breakers).context("invalid breaker configuration")?;
  let services = Services::from_registry(
    store.clone(),
    Arc::new(HttpPlatform::new(&config.platform)),
    &breakers,
    RetryPolicy::from_settings(&config.retry),
  )?;
  let processes = Processes::new(TransactionManager::new(store), services);

  match processes.import_leads(segment_id, leads).await {
    Ok(run) => {
      println!("{}", serde_json::to_string_pretty(&run)?);
      Ok(())
    }
    Err(SagaError::Failed(failure)) => {
      let report = json!({
        "error": failure.to_string(),
        "compensated": failure.compensated,
        "uncompensated": failure.uncompensated,
        "run": failure.run,
      });
      println!("{}", serde_json::to_string_pretty(&report)?);
      bail!("lead import failed at step '{}'", failure.step)
    }
    Err(e) => Err(e.into()),
  }
}
