use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tenancy_api::{AppState, AuthorizationGate, OpenGate, ServerConfig, StaticTokenGate};
use tenancy_archive::{render_from, FileTemplate, SqliteArchive, StaticTemplate, TemplateSource};
use tenancy_core::{Cpu, Memory, NamespaceName, NamespaceStatusView, ProvisioningResult, QuotaPolicy, QuotaSnapshot, QuotaView};
use tenancy_kubehub::KubeCluster;
use tenancy_provision::{CallPolicy, Provisioner, ProvisionerConfig, RetryPolicy, StatusAggregator, DEFAULT_CONTAINER};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "tenancyctl", version, about = "Provision and inspect tenant namespaces")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(flatten)]
    policy: PolicyArgs,

    #[command(flatten)]
    archive: ArchiveArgs,

    #[command(flatten)]
    calls: CallArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

/// Quota applied to every new namespace.
#[derive(Args, Debug)]
struct PolicyArgs {
    #[arg(long, global = true, env = "TENANCY_MAX_PODS", default_value_t = 5)]
    max_pods: u32,
    #[arg(long, global = true, env = "TENANCY_REQUESTS_CPU", default_value = "1")]
    requests_cpu: Cpu,
    #[arg(long, global = true, env = "TENANCY_REQUESTS_MEMORY", default_value = "1Gi")]
    requests_memory: Memory,
    #[arg(long, global = true, env = "TENANCY_LIMITS_CPU", default_value = "5")]
    limits_cpu: Cpu,
    #[arg(long, global = true, env = "TENANCY_LIMITS_MEMORY", default_value = "5Gi")]
    limits_memory: Memory,
}

impl PolicyArgs {
    fn policy(&self) -> QuotaPolicy {
        QuotaPolicy {
            max_pods: self.max_pods,
            requests_cpu: self.requests_cpu,
            requests_memory: self.requests_memory,
            limits_cpu: self.limits_cpu,
            limits_memory: self.limits_memory,
        }
    }
}

#[derive(Args, Debug)]
struct ArchiveArgs {
    /// SQLite archive path (default: ~/.tenancy/archive.db)
    #[arg(long, global = true, env = "TENANCY_ARCHIVE_DB")]
    archive_db: Option<String>,
    #[arg(long, global = true, env = "TENANCY_ARCHIVE_CONTAINER", default_value = DEFAULT_CONTAINER)]
    archive_container: String,
    /// YAML template for archived documents (default: built-in)
    #[arg(long, global = true, env = "TENANCY_TEMPLATE")]
    template: Option<PathBuf>,
}

impl ArchiveArgs {
    fn template_source(&self) -> Arc<dyn TemplateSource> {
        match &self.template {
            Some(path) => Arc::new(FileTemplate::new(path.clone())),
            None => Arc::new(StaticTemplate::default()),
        }
    }

    fn open(&self) -> Result<SqliteArchive> {
        match &self.archive_db {
            Some(path) => SqliteArchive::open(path),
            None => SqliteArchive::open_default(),
        }
    }
}

#[derive(Args, Debug)]
struct CallArgs {
    /// Deadline per cluster/archive call
    #[arg(long, global = true, env = "TENANCY_STEP_TIMEOUT_SECS")]
    step_timeout_secs: Option<u64>,
    /// Attempts per call on transport errors (1 = no retry)
    #[arg(long, global = true, env = "TENANCY_RETRY_ATTEMPTS", default_value_t = 1)]
    retry_attempts: u32,
    #[arg(long, global = true, env = "TENANCY_RETRY_BACKOFF_MS", default_value_t = 200)]
    retry_backoff_ms: u64,
}

impl CallArgs {
    fn policy(&self) -> CallPolicy {
        CallPolicy {
            step_timeout: self.step_timeout_secs.map(Duration::from_secs),
            retry: RetryPolicy {
                max_attempts: self.retry_attempts.max(1),
                initial_backoff: Duration::from_millis(self.retry_backoff_ms),
                ..RetryPolicy::default()
            },
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long, env = "TENANCY_LISTEN", default_value = "0.0.0.0:3000")]
        listen: SocketAddr,
        /// Directory served at `/`
        #[arg(long, env = "TENANCY_STATIC_DIR", default_value = "./views")]
        static_dir: PathBuf,
        /// Shared bearer token; without it every request is allowed
        #[arg(long, env = "TENANCY_API_TOKEN", hide_env_values = true)]
        api_token: Option<String>,
    },
    /// List namespaces in the cluster
    List,
    /// Provision a namespace with its quota and archive its configuration
    Create { namespace: String },
    /// Report whether a namespace exists and its quota
    Status { namespace: String },
    /// Print the document that would be archived for a namespace
    Render { namespace: String },
}

fn init_tracing() {
    let env = std::env::var("TENANCY_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("TENANCY_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid TENANCY_METRICS_ADDR; expected host:port");
        }
    }
}

fn provisioner(cli: &Cli, cluster: Arc<KubeCluster>) -> Result<Provisioner> {
    let archive = cli.archive.open().context("opening archive")?;
    let config = ProvisionerConfig { container: cli.archive.archive_container.clone(), calls: cli.calls.policy() };
    Ok(Provisioner::new(cluster, Arc::new(archive), cli.archive.template_source(), cli.policy.policy(), config))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { listen, static_dir, api_token } => {
            let cluster = Arc::new(KubeCluster::connect().await?);
            let provisioner = provisioner(&cli, cluster.clone())?;
            let status = StatusAggregator::new(cluster, cli.calls.policy());
            let gate: Arc<dyn AuthorizationGate> = match api_token {
                Some(token) => Arc::new(StaticTokenGate::new(token.clone())),
                None => {
                    warn!("no --api-token configured; API is open to every caller");
                    Arc::new(OpenGate)
                }
            };
            let static_dir = if static_dir.is_dir() {
                Some(static_dir.clone())
            } else {
                warn!(dir = %static_dir.display(), "static dir not found; serving API only");
                None
            };
            let state = AppState::new(provisioner, status, gate);
            tenancy_api::serve(state, ServerConfig { listen: *listen, static_dir }).await?;
        }
        Commands::List => {
            let cluster = Arc::new(KubeCluster::connect().await?);
            let names = StatusAggregator::new(cluster, cli.calls.policy()).list_all().await?;
            match cli.output {
                Output::Human => names.iter().for_each(|n| println!("{}", n)),
                Output::Json => println!("{}", serde_json::to_string_pretty(&names)?),
            }
        }
        Commands::Create { namespace } => {
            let name = NamespaceName::parse(namespace)?;
            let cluster = Arc::new(KubeCluster::connect().await?);
            let result = provisioner(&cli, cluster)?.create(&name).await;
            match cli.output {
                Output::Human => println!("{}: {}", name, result),
                Output::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            }
            return Ok(exit_code(&result));
        }
        Commands::Status { namespace } => {
            let name = NamespaceName::parse(namespace)?;
            let cluster = Arc::new(KubeCluster::connect().await?);
            let view = StatusAggregator::new(cluster, cli.calls.policy()).get_status(&name).await?;
            match cli.output {
                Output::Human => println!("{}: {}", name, human_status(&view)),
                Output::Json => println!("{}", serde_json::to_string_pretty(&view)?),
            }
        }
        Commands::Render { namespace } => {
            let name = NamespaceName::parse(namespace)?;
            let doc = render_from(cli.archive.template_source().as_ref(), &name, &cli.policy.policy())?;
            match cli.output {
                Output::Human => print!("{}", doc),
                Output::Json => println!("{}", serde_json::json!({ "namespace": name, "document": doc })),
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn exit_code(result: &ProvisioningResult) -> ExitCode {
    match result {
        ProvisioningResult::Created | ProvisioningResult::AlreadyExists => ExitCode::SUCCESS,
        ProvisioningResult::Failed { .. } => ExitCode::from(1),
        ProvisioningResult::PartiallyFailed { .. } => ExitCode::from(2),
    }
}

fn human_status(view: &NamespaceStatusView) -> String {
    match view {
        NamespaceStatusView::NotFound => "not found".to_string(),
        NamespaceStatusView::Found { quota: QuotaView::Unavailable } => "found (quota unavailable)".to_string(),
        NamespaceStatusView::Found { quota: QuotaView::Present(q) } => format!("found ({})", human_quota(q)),
    }
}

fn human_quota(q: &QuotaSnapshot) -> String {
    fn show<T: ToString>(v: &Option<T>) -> String {
        v.as_ref().map(|x| x.to_string()).unwrap_or_else(|| "-".to_string())
    }
    format!(
        "pods={} requests.cpu={} requests.memory={} limits.cpu={} limits.memory={}",
        show(&q.max_pods),
        show(&q.requests_cpu),
        show(&q.requests_memory),
        show(&q.limits_cpu),
        show(&q.limits_memory)
    )
}
