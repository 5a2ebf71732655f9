use std::{collections::HashMap, path::PathBuf, sync::Arc};

use chrono::{SecondsFormat, Utc};
use clap::Parser;
use serde::Serialize;

use crate::{
    api::{ClientRepository, SealApi, SealStatus},
    cli::{
        command::{self, CommandExecutor},
        config::{load_config, Config},
    },
    context::Context,
    errors::AuError,
    metrics::{MetricsManager, UnsealMetrics},
    unseal::{ParallelStrategy, UnsealStrategy, UnsealTarget},
    BUILD_TIME, VERSION,
};

#[derive(Parser)]
#[command(
    author,
    version,
    about = r#"Unseals every Vault instance listed in a configuration file. With --watch the pass is
repeated every `interval` until the process is interrupted.

  $ vault-autounseal run --config=/etc/vault-autounseal/config.hcl --watch"#
)]
pub struct Run {
    #[arg(
        long,
        next_line_help = true,
        value_name = "string",
        long_help = r#"Path to a configuration file or directory of configuration files. If the path is
a directory, all files which end in .hcl or .json are loaded and merged."#
    )]
    config: PathBuf,

    #[arg(long, next_line_help = true, help = "Keep running and unseal again every configured interval.")]
    watch: bool,

    #[arg(long, next_line_help = true, help = "Print Prometheus metrics before exiting.")]
    print_metrics: bool,

    #[command(flatten, next_help_heading = "Command Options")]
    command_options: command::CommandOptions,

    #[command(flatten, next_help_heading = "Output Options")]
    output: command::OutputOptions,
}

/// Outcome of the latest pass for one configured instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstanceStatus {
    pub name: String,
    pub endpoint: String,
    pub sealed: bool,
    pub progress: usize,
    pub threshold: usize,
    pub version: String,
    pub last_unsealed: Option<String>,
    pub error: Option<String>,
}

impl InstanceStatus {
    /// Folds the result of a pass into the previous report of the same instance. `last_unsealed` is stamped
    /// when the instance goes from sealed (or unknown) to unsealed and kept otherwise.
    pub fn update(
        previous: Option<&InstanceStatus>,
        name: &str,
        endpoint: &str,
        result: &Result<SealStatus, AuError>,
    ) -> Self {
        let last_unsealed = previous.and_then(|p| p.last_unsealed.clone());

        match result {
            Ok(status) => {
                let was_unsealed = previous.is_some_and(|p| !p.sealed && p.error.is_none());
                let last_unsealed = if !status.sealed && (!was_unsealed || last_unsealed.is_none()) {
                    Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
                } else {
                    last_unsealed
                };

                InstanceStatus {
                    name: name.to_string(),
                    endpoint: endpoint.to_string(),
                    sealed: status.sealed,
                    progress: status.progress,
                    threshold: status.threshold,
                    version: status.version.clone(),
                    last_unsealed,
                    error: None,
                }
            }
            Err(e) => InstanceStatus {
                name: name.to_string(),
                endpoint: endpoint.to_string(),
                sealed: previous.map_or(true, |p| p.sealed),
                threshold: previous.map_or(0, |p| p.threshold),
                version: previous.map(|p| p.version.clone()).unwrap_or_default(),
                last_unsealed,
                error: Some(e.to_string()),
                ..Default::default()
            },
        }
    }
}

/// True when every instance is unsealed.
pub fn ready(statuses: &[InstanceStatus]) -> bool {
    !statuses.is_empty() && statuses.iter().all(|s| !s.sealed && s.error.is_none())
}

/// Unseals all configured instances once, in parallel, reusing cached clients.
pub async fn unseal_pass(
    ctx: &Context,
    config: &Config,
    repository: &ClientRepository,
    strategy: &ParallelStrategy,
    metrics: Option<Arc<dyn UnsealMetrics>>,
    previous: &HashMap<String, InstanceStatus>,
) -> Vec<InstanceStatus> {
    let mut targets = Vec::with_capacity(config.instance.len());
    let mut failed = Vec::new();

    for (name, instance) in &config.instance {
        let client = repository.get_or_create(name, || {
            let mut client_config = config.client_config(instance);
            client_config.metrics = metrics.clone();
            client_config
        });

        match client {
            Ok(client) => {
                let client: Arc<dyn SealApi> = client;
                targets.push(UnsealTarget {
                    name: name.clone(),
                    client,
                    keys: instance.unseal_keys.clone(),
                    threshold: instance.threshold,
                })
            }
            Err(e) => {
                log::error!("cannot create client for instance {}: {}", name, e);
                failed.push((name.clone(), Err(e)));
            }
        }
    }

    let mut results = strategy.unseal_all(ctx, targets).await;
    results.extend(failed);

    let mut statuses: Vec<InstanceStatus> = results
        .iter()
        .map(|(name, result)| {
            let endpoint = config.instance.get(name).map(|i| i.endpoint.as_str()).unwrap_or_default();
            if let Err(e) = result {
                log::warn!("instance {} ({}) not unsealed: {}", name, endpoint, e);
            }
            InstanceStatus::update(previous.get(name), name, endpoint, result)
        })
        .collect();
    statuses.sort_by(|a, b| a.name.cmp(&b.name));
    statuses
}

impl Run {
    fn report(&self, statuses: &[InstanceStatus]) -> Result<(), AuError> {
        self.output.print_value(&serde_json::to_value(statuses)?)?;
        if self.output.format == command::Format::Table {
            println!("Ready: {}", ready(statuses));
        }
        Ok(())
    }
}

impl CommandExecutor for Run {
    fn main(&self) -> Result<(), AuError> {
        let config_path = self.config.to_string_lossy().into_owned();
        let config = load_config(&config_path)?;

        let log_level =
            if config.log_level.is_empty() { self.command_options.log_level.as_str() } else { config.log_level.as_str() };
        command::init_logger(log_level);
        log::info!("vault-autounseal {} (built {})", VERSION, BUILD_TIME);
        log::info!("loaded {} instance(s) from {}", config.instance.len(), config_path);

        let manager = MetricsManager::new();
        let metrics: Arc<dyn UnsealMetrics> = manager.unseal_metrics.clone();
        let inner = UnsealStrategy::default_for(
            config.validator(),
            Some(metrics.clone()),
            config.max_retries.max(0) as usize,
            config.retry_delay,
        );
        let strategy = ParallelStrategy::new(inner, config.max_concurrency);
        let repository = ClientRepository::new();
        let (config, repository_ref, strategy) = (&config, &repository, &strategy);

        let statuses = command::block_on(|ctx| async move {
            let mut previous: HashMap<String, InstanceStatus> = HashMap::new();
            loop {
                let statuses =
                    unseal_pass(&ctx, config, repository_ref, strategy, Some(metrics.clone()), &previous).await;
                self.report(&statuses)?;

                if !self.watch || ctx.is_cancelled() {
                    return Ok(statuses);
                }

                previous = statuses.iter().map(|s| (s.name.clone(), s.clone())).collect();
                if ctx.sleep(config.interval).await.is_err() {
                    log::info!("stopping watch loop");
                    return Ok(statuses);
                }
            }
        });
        repository.close_all();

        if self.print_metrics {
            print!("{}", manager.encode()?);
        }

        let statuses = statuses?;
        if !self.watch && !ready(&statuses) {
            let sealed = statuses.iter().filter(|s| s.sealed || s.error.is_some()).count();
            return Err(AuError::ErrOther(anyhow::anyhow!(
                "{} of {} instance(s) are not unsealed",
                sealed,
                statuses.len()
            )));
        }
        Ok(())
    }
}
