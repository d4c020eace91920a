use clap::{Parser, Subcommand, ValueEnum};
use once_cell::sync::Lazy;
use platform_domain::{load_declaration, ApplicationDeclaration, ClusterDeclaration};
use platform_workflow::factory::FsPlatformService;
use platform_workflow::reconcilers::{APPLICATION_KIND, CLUSTER_KIND, DATABASE_KIND, DELEGATION_KIND, HOSTED_ZONE_KIND,
                                     VPC_KIND};
use platform_workflow::{PlatformConfig, PlatformFactory, SimulatedCloud};
use reconcile::{shutdown_signal, Declaration, StateStore, VersionGate};
use semver::Version;
use serde_json::{json, Map, Value};
use std::error::Error;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Versión del binario; es la que se compara contra `ClusterVersion`.
static BINARY_VERSION: Lazy<Version> =
    Lazy::new(|| Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or_else(|_| Version::new(0, 0, 0)));

/// kubeplat: aprovisiona clusters Kubernetes y aplicaciones a partir de
/// declaraciones YAML.
#[derive(Parser, Debug)]
#[command(name = "kubeplat")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crea o actualiza los recursos declarados
    Apply(Target),
    /// Borra los recursos declarados en orden inverso
    Delete(Target),
    /// Migra el estado del cluster a la versión de este binario
    Upgrade(Target),
    /// Muestra el estado registrado sin tomar el lock
    Show(Target),
}

#[derive(clap::Args, Debug)]
struct Target {
    kind: Kind,
    /// Fichero de declaración (`-` para stdin)
    #[arg(short = 'f', long = "file")]
    file: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Cluster,
    Application,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let cli = Cli::parse();
    let config = PlatformConfig::from_env()?;
    let service = PlatformFactory::service(&config, BINARY_VERSION.clone());
    // La nube simulada vive en el directorio remoto para que cada proceso vea
    // lo que crearon los anteriores.
    let cloud = Arc::new(SimulatedCloud::persistent(config.simulated_cloud_path())
                             .with_readiness_polls(config.readiness_polls));

    let target = match &cli.command {
        Command::Apply(t) | Command::Delete(t) | Command::Upgrade(t) | Command::Show(t) => t,
    };
    match target.kind {
        Kind::Cluster => {
            let declaration: ClusterDeclaration = load_declaration(&target.file)?;
            let reconcilers = PlatformFactory::cluster_reconcilers(cloud.clone());
            run(&cli.command, &service, &declaration, reconcilers, &cloud).await
        }
        Kind::Application => {
            let declaration: ApplicationDeclaration = load_declaration(&target.file)?;
            let reconcilers = PlatformFactory::application_reconcilers(cloud.clone());
            run(&cli.command, &service, &declaration, reconcilers, &cloud).await
        }
    }
}

async fn run<D>(command: &Command,
                service: &FsPlatformService,
                declaration: &D,
                reconcilers: Vec<Box<dyn reconcile::Reconciler<D>>>,
                cloud: &Arc<SimulatedCloud>)
                -> Result<(), Box<dyn Error>>
    where D: Declaration
{
    let migrations = PlatformFactory::migrations();
    match command {
        Command::Apply(_) => {
            let report = service.apply(declaration, reconcilers, &migrations, &**cloud, shutdown_signal()).await?;
            if !report.migrated.is_empty() {
                println!("Migraciones aplicadas: {}", join(&report.migrated));
            }
            println!("{} convergió en {} generaciones (versión {})",
                     report.identity, report.run.generations, report.cluster_version);
        }
        Command::Delete(_) => {
            let report = service.purge(declaration, reconcilers, shutdown_signal()).await?;
            println!("{} eliminado en {} generaciones", report.identity, report.run.generations);
            if let Some(backup) = report.backup {
                println!("Copia del estado en {}", backup.display());
            }
        }
        Command::Upgrade(_) => {
            let report = service.upgrade(declaration, &migrations, &**cloud, shutdown_signal()).await?;
            let from = report.from.map(|v| v.to_string()).unwrap_or_else(|| "-".into());
            println!("{}: {} -> {}", report.identity, from, report.to);
            if report.migrated.is_empty() {
                println!("Sin migraciones pendientes");
            } else {
                println!("Migraciones aplicadas: {}", join(&report.migrated));
            }
        }
        Command::Show(_) => {
            let identity = declaration.identity();
            let binary = service.binary_version().clone();
            let summary = service.show(declaration, shutdown_signal(), |store| summarize(store, &identity, &binary))
                                 .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}

fn summarize(store: &dyn StateStore,
             identity: &reconcile::ClusterIdentity,
             binary: &Version)
             -> reconcile::Result<Value> {
    let gate = VersionGate::new(store, identity, binary);
    let mut resources = Map::new();
    for kind in [VPC_KIND, HOSTED_ZONE_KIND, DELEGATION_KIND, CLUSTER_KIND, DATABASE_KIND, APPLICATION_KIND] {
        let records = store.enumerate(kind)?;
        if records.is_empty() {
            continue;
        }
        let entries = records.into_iter().map(|r| (r.key, r.attributes)).collect::<Map<String, Value>>();
        resources.insert(kind.to_string(), Value::Object(entries));
    }
    Ok(json!({
        "cluster": identity.to_string(),
        "cluster_version": gate.cluster_version()?.map(|v| v.to_string()),
        "original_version": gate.original_version()?.map(|v| v.to_string()),
        "resources": resources,
    }))
}

fn join(versions: &[Version]) -> String {
    versions.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
}

