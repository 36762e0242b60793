// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! tenantplane control CLI
//!
//! Operator tool for the tenant application plane: previews listener rules
//! and lifecycle fingerprints, manages priority blocks and exports, and
//! deploys or destroys tenant stacks.
//!
//! Every command prints JSON on stdout. Errors go to stderr and the process
//! exits non-zero.
//!
//! Environment:
//!   TENANTPLANE_DATABASE_PATH       SQLite state file (default: .data/tenantplane.db)
//!   TENANTPLANE_LIFECYCLE_COMMAND   Executable standing in for the backend function
//!   TENANT_ID / PRIORITY_BASE       Defaults for --tenant / --priority-base
//!   RUST_LOG                        Log filter (default: tenantplane=info)

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{debug, warn};

use tenantplane_core::{
    Config, ConfigError, CoreError, LifecycleInvocation, Persistence, ServiceKind,
    SqlitePersistence, TenantContext, TenantState, allocate_rules,
};
use tenantplane_deployer::runner::{
    CommandFunction, FunctionError, InvokeRequest, InvokeResponse, LifecycleFunction,
};
use tenantplane_deployer::{ControlPlaneEvent, DeployError, DeployRequest, DeploymentDriver};

#[derive(Debug, Parser)]
#[command(name = "tenantplane-ctl", version, about = "Manage tenant stacks on the shared application plane")]
struct Cli {
    /// SQLite state file, overriding TENANTPLANE_DATABASE_PATH
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the listener rules a tenant stack declares
    Rules {
        #[arg(long)]
        service: ServiceKind,
        #[arg(long, env = "TENANT_ID")]
        tenant: String,
        #[arg(long, env = "PRIORITY_BASE")]
        priority_base: u32,
    },
    /// Print the payload and physical id of a lifecycle invocation
    Fingerprint {
        #[arg(long, env = "TENANT_ID")]
        tenant: String,
        /// PROVISION or DE-PROVISION
        #[arg(long, default_value = "PROVISION")]
        state: TenantState,
        /// Secret name (default: <tenant>Credentials)
        #[arg(long)]
        secret: Option<String>,
        /// Stack id used as the physical id prefix
        #[arg(long)]
        stack: Option<String>,
        #[arg(long, default_value = "$LATEST")]
        function_version: String,
    },
    /// Reserve a priority block on a listener for a tenant's service stack
    Reserve {
        #[arg(long)]
        listener: String,
        #[arg(long, env = "TENANT_ID")]
        tenant: String,
        #[arg(long)]
        service: ServiceKind,
        /// Explicit block base
        #[arg(long)]
        base: Option<u32>,
    },
    /// Release a tenant service stack's priority block
    Release {
        #[arg(long)]
        listener: String,
        #[arg(long, env = "TENANT_ID")]
        tenant: String,
        #[arg(long)]
        service: ServiceKind,
    },
    /// List reserved priority blocks
    Reservations {
        #[arg(long)]
        listener: Option<String>,
    },
    /// Manage cross-stack exports
    Export {
        #[command(subcommand)]
        action: ExportAction,
    },
    /// Print the stack plan without reserving or invoking anything
    Plan {
        #[arg(long)]
        service: ServiceKind,
        #[arg(long, env = "TENANT_ID")]
        tenant: String,
        #[arg(long)]
        priority_base: Option<u32>,
    },
    /// Deploy a tenant stack
    Deploy {
        #[arg(long)]
        service: ServiceKind,
        #[arg(long, env = "TENANT_ID")]
        tenant: String,
        #[arg(long)]
        priority_base: Option<u32>,
    },
    /// Destroy a tenant stack
    Destroy {
        #[arg(long)]
        service: ServiceKind,
        #[arg(long, env = "TENANT_ID")]
        tenant: String,
    },
    /// Handle an onboardingRequest event (file path, or stdin when omitted)
    Onboard { event: Option<PathBuf> },
    /// Handle an offboardingRequest event (file path, or stdin when omitted)
    Offboard { event: Option<PathBuf> },
}

#[derive(Debug, Subcommand)]
enum ExportAction {
    /// Publish an export on behalf of a stack
    Set {
        name: String,
        value: String,
        #[arg(long)]
        stack: String,
    },
    /// Resolve one export
    Get { name: String },
    /// List exports
    List {
        #[arg(long)]
        stack: Option<String>,
    },
}

/// Stand-in used when no lifecycle command is configured.
struct UnconfiguredFunction;

#[async_trait]
impl LifecycleFunction for UnconfiguredFunction {
    fn function_type(&self) -> &'static str {
        "unconfigured"
    }

    async fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResponse, FunctionError> {
        Err(FunctionError::StartFailed(format!(
            "cannot call {}: TENANTPLANE_LIFECYCLE_COMMAND is not set",
            request.function_name
        )))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenantplane=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dotenvy::dotenv() {
        debug!("No .env file loaded: {}", e);
    }

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match error_code(&e) {
                Some(code) => eprintln!("error [{}]: {:#}", code, e),
                None => eprintln!("error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

/// Stable code of a typed error anywhere in the chain.
fn error_code(e: &anyhow::Error) -> Option<&'static str> {
    if let Some(deploy) = e.downcast_ref::<DeployError>() {
        return Some(deploy.error_code());
    }
    if let Some(core) = e.downcast_ref::<CoreError>() {
        return Some(core.error_code());
    }
    if e.downcast_ref::<ConfigError>().is_some() {
        return Some("CONFIG_ERROR");
    }
    None
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(path) = cli.database {
        config.database_path = path;
    }

    match cli.command {
        Command::Rules {
            service,
            tenant,
            priority_base,
        } => {
            let context = TenantContext::new(tenant, priority_base)?;
            let rules = allocate_rules(
                context.priority_base(),
                context.tenant_id(),
                &service.target_group(context.tenant_id()),
                &service.routes(),
            )?;
            print_json(&rules)
        }

        Command::Fingerprint {
            tenant,
            state,
            secret,
            stack,
            function_version,
        } => {
            let invocation = match secret {
                Some(secret) => LifecycleInvocation::new(&tenant, state, &secret)?,
                None => LifecycleInvocation::for_tenant(&tenant, state)?,
            };
            let stack = stack
                .unwrap_or_else(|| ServiceKind::ProductReview.stack_name(invocation.tenant_id()));
            print_json(&json!({
                "resource": invocation.resource_name(),
                "payload": invocation.payload_json(),
                "payloadHash": invocation.payload_hash_prefix(),
                "physicalId": invocation.physical_id(&stack, &function_version),
            }))
        }

        Command::Reserve {
            listener,
            tenant,
            service,
            base,
        } => {
            let driver = open_driver(&config).await?;
            let record = match base {
                Some(base) => {
                    driver
                        .registry()
                        .reserve_explicit(&listener, &tenant, service, base)
                        .await?
                }
                None => driver.registry().reserve(&listener, &tenant, service).await?,
            };
            print_json(&record)
        }

        Command::Release {
            listener,
            tenant,
            service,
        } => {
            let driver = open_driver(&config).await?;
            let released = driver
                .registry()
                .release(&listener, &tenant, service)
                .await?;
            print_json(&json!({ "released": released }))
        }

        Command::Reservations { listener } => {
            let driver = open_driver(&config).await?;
            print_json(&driver.registry().list(listener.as_deref()).await?)
        }

        Command::Export { action } => {
            let driver = open_driver(&config).await?;
            match action {
                ExportAction::Set { name, value, stack } => {
                    print_json(&driver.exports().publish(&stack, &name, &value).await?)
                }
                ExportAction::Get { name } => {
                    let value = driver.exports().import(&name).await?;
                    print_json(&json!({ "name": name, "value": value }))
                }
                ExportAction::List { stack } => {
                    print_json(&driver.exports().list(stack.as_deref()).await?)
                }
            }
        }

        Command::Plan {
            service,
            tenant,
            priority_base,
        } => {
            let driver = open_driver(&config).await?;
            let plan = driver
                .plan(&DeployRequest {
                    service,
                    tenant_id: tenant,
                    priority_base,
                })
                .await?;
            print_json(&plan)
        }

        Command::Deploy {
            service,
            tenant,
            priority_base,
        } => {
            let driver = open_driver(&config).await?;
            let report = driver
                .deploy(&DeployRequest {
                    service,
                    tenant_id: tenant,
                    priority_base,
                })
                .await?;
            print_json(&report)
        }

        Command::Destroy { service, tenant } => {
            let driver = open_driver(&config).await?;
            print_json(&driver.destroy(service, &tenant).await?)
        }

        Command::Onboard { event } => {
            handle_event(&config, event, TenantState::Provision).await
        }

        Command::Offboard { event } => {
            handle_event(&config, event, TenantState::Deprovision).await
        }
    }
}

async fn handle_event(
    config: &Config,
    source: Option<PathBuf>,
    expected: TenantState,
) -> anyhow::Result<()> {
    let raw = read_event(source)?;
    let event = ControlPlaneEvent::parse(&raw)?;
    let requested = event.requested_state()?;
    if requested != expected {
        bail!(
            "event {:?} requests {}, expected {}",
            event.detail_type,
            requested,
            expected
        );
    }

    let driver = open_driver(config).await?;
    let reply = driver.handle_event(&event, &ServiceKind::ALL).await?;
    print_json(&reply)
}

fn read_event(source: Option<PathBuf>) -> anyhow::Result<String> {
    match source {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read event from {}", path.display())),
        _ => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("failed to read event from stdin")?;
            Ok(raw)
        }
    }
}

async fn open_driver(config: &Config) -> anyhow::Result<DeploymentDriver> {
    let persistence: Arc<dyn Persistence> =
        Arc::new(SqlitePersistence::from_path(&config.database_path).await?);

    let function: Arc<dyn LifecycleFunction> = match config
        .lifecycle_command
        .as_deref()
        .and_then(CommandFunction::from_command_line)
    {
        Some(command) => {
            debug!(program = %command.program(), "Using command lifecycle function");
            Arc::new(command)
        }
        None => {
            warn!("TENANTPLANE_LIFECYCLE_COMMAND is not set; lifecycle calls will fail");
            Arc::new(UnconfiguredFunction)
        }
    };

    Ok(DeploymentDriver::new(persistence, function, config))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
