use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use clusterdeck::cli::{
    context_add, context_current, context_delete, context_list, context_use,
    format_cluster_detail, format_cluster_list, format_context_list, format_current_context,
    format_deployment_created, format_pod_list, load_onboard_request, load_workload_manifest,
    ApiClient, Cli, ClustersAction, Commands, ContextAction, ServeArgs,
};
use clusterdeck::cluster::{ClusterConnector, ClusterRegistry, InMemoryConnector, KubeConnector};
use clusterdeck::config::load_server_config;
use clusterdeck::context::{default_config_path, load_config_from, save_config_to};
use clusterdeck::server::{create_router, serve_with_shutdown, shutdown_signal, AppState};

#[tokio::main]
async fn main() {
    let mut cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Load .env file if specified, then re-parse so env-backed flags see it
    if let Some(ref env_file) = cli.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
        cli = Cli::parse();
    }

    let result = match cli.command {
        Commands::Serve(args) => serve(args).await,
        command => {
            let config_path = cli.config.unwrap_or_else(default_config_path);
            run_client(command, config_path, cli.cluster.as_deref()).await
        }
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = load_server_config(&args).context("invalid server configuration")?;

    let connector: Arc<dyn ClusterConnector> = if config.simulate {
        warn!("serving from an in-memory cluster backend; nothing reaches a real cluster");
        Arc::new(InMemoryConnector::new())
    } else {
        Arc::new(KubeConnector)
    };

    let registry = ClusterRegistry::bootstrap(config.default_cluster.clone(), connector)
        .await
        .context("failed to configure the default cluster")?;
    if config.default_domain.certificate.is_empty() {
        warn!(domain = %config.default_domain.domain, "no TLS pair configured for the default domain");
    }

    let state = AppState::new(registry, config.default_domain, config.auth_token);
    let app = create_router(state, &config.router);

    let listener = tokio::net::TcpListener::bind(config.listen_address)
        .await
        .with_context(|| format!("failed to bind to {}", config.listen_address))?;

    info!("clusterdeck listening on {}", config.listen_address);
    info!(cluster = %config.default_cluster, "default cluster");

    serve_with_shutdown(
        listener,
        app,
        config.termination_grace_period,
        shutdown_signal(),
    )
    .await
    .context("server error")?;

    info!("server stopped");
    Ok(())
}

async fn run_client(
    command: Commands,
    config_path: PathBuf,
    cluster: Option<&str>,
) -> anyhow::Result<()> {
    let mut config = load_config_from(&config_path)?;

    if let Commands::Context(args) = command {
        match args.action {
            ContextAction::List => print!("{}", format_context_list(&context_list(&config))),
            ContextAction::Current => {
                let current = context_current(&config)?;
                print!("{}", format_current_context(&current.name, &current.url));
            }
            ContextAction::Use { name } => {
                context_use(&mut config, &name)?;
                save_config_to(&config, &config_path)?;
                println!("Switched to context \"{}\"", name);
            }
            ContextAction::Add {
                name,
                url,
                token,
                cluster,
            } => {
                context_add(&mut config, &name, &url, token.as_deref(), cluster.as_deref())?;
                save_config_to(&config, &config_path)?;
                println!("Context \"{}\" added", name);
            }
            ContextAction::Delete { name } => {
                context_delete(&mut config, &name)?;
                save_config_to(&config, &config_path)?;
                println!("Context \"{}\" deleted", name);
            }
        }
        return Ok(());
    }

    let client = ApiClient::from_context(&config, cluster)?;
    match command {
        Commands::Clusters(args) => match args.action {
            ClustersAction::List => print!("{}", format_cluster_list(&client.list_clusters().await?)),
            ClustersAction::Get { name } => {
                print!("{}", format_cluster_detail(&client.get_cluster(&name).await?))
            }
            ClustersAction::Add(onboard) => {
                let request = load_onboard_request(&onboard)?;
                let info = client.onboard_cluster(&request).await?;
                print!("{}", format_cluster_detail(&info));
            }
        },
        Commands::Deploy(args) => {
            let workload = load_workload_manifest(&args.file)?;
            print!("{}", format_deployment_created(&client.deploy(&workload).await?));
        }
        Commands::Delete(target) => {
            client.delete_workload(&target.namespace, &target.name).await?;
            println!("workload {}/{} deleted", target.namespace, target.name);
        }
        Commands::Scale(args) => {
            let target = &args.workload;
            client
                .scale(&target.namespace, &target.name, args.replicas)
                .await?;
            println!(
                "workload {}/{} scaled to {} replicas",
                target.namespace, target.name, args.replicas
            );
        }
        Commands::Restart(target) => {
            println!("{}", client.restart(&target.namespace, &target.name).await?);
        }
        Commands::Pods(args) => print!("{}", format_pod_list(&client.list_pods(&args.namespace).await?)),
        Commands::Logs(args) => print!("{}", client.pod_logs(&args.namespace, &args.pod).await?),
        Commands::Serve(_) | Commands::Context(_) => {}
    }
    Ok(())
}
