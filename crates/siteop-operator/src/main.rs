use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow};
use clap::{Parser, Subcommand};
use kube::CustomResourceExt;
use siteop_core::{Dispatcher, DynClusterClient};
use siteop_db_postgres::{DynDatabaseClient, PgClient};
use siteop_operator::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use siteop_operator::controller::{self, Context, RequeuePolicy};
use siteop_operator::kube_client::KubeClusterClient;
use siteop_operator::{
    ClusterSecretResolver, DatabaseProvisioner, DatabaseReconciler, PostgresDatabase, Site,
    SiteReconciler, SubjectUrlSettings, observability,
};

#[derive(Parser)]
#[command(name = "siteop-operator")]
#[command(about = "Converges Site deployments and their PostgreSQL databases")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file
    #[arg(short, long, global = true, env = "SITEOP_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controllers (default)
    Run,
    /// Print the custom resource definitions as JSON
    Crds,
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&cli.config).await,
        Commands::Crds => print_crds(),
    };
    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(2);
    }
}

fn print_crds() -> Result<()> {
    for crd in [PostgresDatabase::crd(), Site::crd()] {
        println!("{}", serde_json::to_string_pretty(&crd)?);
    }
    Ok(())
}

async fn run(config_path: &str) -> Result<()> {
    observability::init_tracing();

    let cfg = load_config(Some(config_path)).map_err(|e| anyhow!("configuration error: {e}"))?;
    tracing::info!(path = %config_path, "Configuration loaded");
    observability::apply_logging_level(&cfg.logging.level);

    let main_url = cfg.main_url().map_err(|e| anyhow!(e))?;
    let client = kube::Client::try_default()
        .await
        .context("failed to build Kubernetes client")?;

    let cluster: DynClusterClient = Arc::new(KubeClusterClient::new(client.clone()));
    let database: DynDatabaseClient = Arc::new(PgClient::new(cfg.client_config()));
    let secrets = Arc::new(ClusterSecretResolver::new(cluster.clone()));

    let provisioner = DatabaseProvisioner::new(cluster.clone(), database, secrets, main_url.clone())
        .with_grant_subject_to_admin(cfg.database.grant_subject_to_admin);
    let requeue = RequeuePolicy {
        error_backoff: cfg.error_backoff(),
        resync: cfg.resync(),
    };

    let databases = Arc::new(Context {
        dispatcher: Dispatcher::new(
            cluster.clone(),
            DatabaseReconciler::new(Arc::new(provisioner)),
        )
        .with_deadline(cfg.reconcile_timeout()),
        requeue,
    });
    let sites = Arc::new(Context {
        dispatcher: Dispatcher::new(
            cluster.clone(),
            SiteReconciler::new(
                cluster,
                SubjectUrlSettings {
                    main_url,
                    ssl_mode: cfg.database.ssl_mode.clone(),
                },
            ),
        )
        .with_deadline(cfg.reconcile_timeout()),
        requeue,
    });

    controller::run(
        client,
        cfg.operator.watch_namespace.as_deref(),
        cfg.operator.concurrency,
        databases,
        sites,
    )
    .await;
    tracing::info!("Shutdown complete");
    Ok(())
}
