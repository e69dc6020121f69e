//! `oam-controller` binary: either dumps the CustomResourceDefinition YAML
//! for every Kind this workspace defines, or runs the reconciler alongside
//! its admission webhook.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use kube::runtime::Controller;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, CustomResourceExt};
use oam_core::cli::ControllerOpts;
use oam_core::telemetry;
use oam_dispatch::{ClusterClientPool, Dispatcher, DispatchStrategy, KubeconfigClusterClientFactory};
use oam_policy::ClusterDirectory;
use oam_registry::DefinitionRegistry;
use oam_render::ReqwestProcessingClient;
use oam_types::{
    Application, ApplicationRevision, ComponentDefinition, ResourceTracker, TraitDefinition, WorkflowStepDefinition,
};
use oam_workflow::ReqwestHttpClient;

use oam_controller::cluster_directory::ConfigMapClusterDirectory;
use oam_controller::{definitions, reconcile, webhook, Context};

#[derive(Debug, Parser)]
#[command(name = "oam-controller", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Prints the CustomResourceDefinition YAML for every Kind this
    /// workspace defines and exits.
    Crd,
    /// Runs the Application reconciler and its admission webhook.
    Run(ControllerOpts),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Crd => print_crds(),
        Command::Run(opts) => run(opts).await?,
    }

    Ok(())
}

fn print_crds() {
    let crds = [
        serde_yaml::to_string(&Application::crd()),
        serde_yaml::to_string(&ComponentDefinition::crd()),
        serde_yaml::to_string(&TraitDefinition::crd()),
        serde_yaml::to_string(&WorkflowStepDefinition::crd()),
        serde_yaml::to_string(&ApplicationRevision::crd()),
        serde_yaml::to_string(&ResourceTracker::crd()),
    ];
    let rendered: Vec<String> = crds.into_iter().filter_map(std::result::Result::ok).collect();
    println!("{}", rendered.join("---\n"));
}

async fn run(opts: ControllerOpts) -> Result<(), Box<dyn std::error::Error>> {
    let _guard = telemetry::init("oam_controller", None);

    let client = kube::Client::try_default().await?;
    let namespace = client.default_namespace().to_owned();

    let registry = Arc::new(DefinitionRegistry::new());
    definitions::spawn_all(client.clone(), Arc::clone(&registry));

    let cluster_directory = ConfigMapClusterDirectory::new();
    cluster_directory.spawn_refresh(client.clone(), namespace.clone());

    let pool = ClusterClientPool::new(client.clone(), Arc::new(KubeconfigClusterClientFactory));
    let dispatcher = Arc::new(Dispatcher::new(pool, DispatchStrategy::Apply));

    let ctx = Arc::new(Context {
        client: client.clone(),
        registry: Arc::clone(&registry),
        dispatcher,
        cluster_directory: cluster_directory.clone() as Arc<dyn ClusterDirectory + Send + Sync>,
        processing_client: Arc::new(ReqwestProcessingClient::default()),
        http_client: Arc::new(ReqwestHttpClient::default()),
        opts: opts.clone(),
    });

    tokio::spawn(serve_webhook(Arc::clone(&registry)));

    let applications: Api<Application> = match &opts.watch_namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };

    Controller::new(applications, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile::reconcile, reconcile::error_policy, ctx)
        .filter_map(|result| async move { result.ok() })
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Serves the admission webhook on `:8443`. Left without TLS termination
/// here; a deployment terminates HTTPS at the `Service`/ingress in front of
/// this process, same as any other plain HTTP backend behind a cluster
/// proxy.
async fn serve_webhook(registry: Arc<DefinitionRegistry>) {
    let router = webhook::router(registry).layer(tower_http::trace::TraceLayer::new_for_http());
    let listener = match tokio::net::TcpListener::bind("0.0.0.0:8443").await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%err, "failed to bind admission webhook listener");
            return;
        }
    };
    if let Err(err) = axum::serve(listener, router).await {
        tracing::error!(%err, "admission webhook server exited");
    }
}
