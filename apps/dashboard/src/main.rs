use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use client_core::{
    BackendJob, ControllerEvent, ControllerOptions, DeriveStats, HttpResourceEndpoint,
    ListSnapshot, ResourceListController, StatValue,
};
use shared::{
    domain::{
        CryptoMessage, CryptoMessageDraft, CryptoMetrics, Holding, HoldingDraft,
        InvestmentReport, ResourceKind, ResourceRow, RowId, Sentiment,
    },
    protocol::{QueryParams, Sort},
};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, normalize_api_base_url, Settings};

#[derive(Parser, Debug)]
#[command(name = "dashboard", about = "Crypto desk back-office client")]
struct Args {
    /// Backend API base, e.g. http://localhost:8080/api
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one page and print rows and stats.
    List {
        resource: Resource,
        #[command(flatten)]
        query: QueryArgs,
    },
    Show {
        resource: Resource,
        id: RowId,
    },
    AddHolding {
        #[arg(long)]
        coin: String,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        usdt_value: Option<f64>,
        #[arg(long)]
        cost_price: Option<f64>,
    },
    /// Load a holding, change the given fields and save it back.
    EditHolding {
        id: RowId,
        #[arg(long)]
        coin: Option<String>,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        usdt_value: Option<f64>,
        #[arg(long)]
        cost_price: Option<f64>,
    },
    AddMessage {
        #[arg(long)]
        coin: String,
        #[arg(long)]
        content: String,
        #[arg(long, value_parser = parse_sentiment)]
        sentiment: Option<Sentiment>,
        #[arg(long)]
        source: Option<String>,
    },
    Delete {
        resource: Resource,
        #[arg(required = true)]
        ids: Vec<RowId>,
    },
    Approve {
        id: RowId,
    },
    Reject {
        id: RowId,
        #[arg(long)]
        reason: String,
    },
    /// Start a collection job and wait for the follow-up refresh.
    Collect {
        target: CollectTarget,
    },
    GenerateReport {
        message_id: i64,
    },
    /// Keep a page on screen, refreshing it periodically until Ctrl-C.
    Watch {
        resource: Resource,
        /// Seconds between refreshes; defaults to `auto_refresh_secs`.
        #[arg(long)]
        interval: Option<u64>,
        #[command(flatten)]
        query: QueryArgs,
    },
}

#[derive(ClapArgs, Debug, Clone, Default)]
struct QueryArgs {
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    page_size: Option<u32>,
    /// Repeatable `field=value` filter.
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,
    /// `field`, `field:asc` or `field:desc`.
    #[arg(long)]
    sort: Option<Sort>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Resource {
    Holdings,
    Messages,
    Reports,
    Metrics,
}

impl From<Resource> for ResourceKind {
    fn from(value: Resource) -> Self {
        match value {
            Resource::Holdings => ResourceKind::Holdings,
            Resource::Messages => ResourceKind::Messages,
            Resource::Reports => ResourceKind::Reports,
            Resource::Metrics => ResourceKind::Metrics,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum CollectTarget {
    Messages,
    Metrics,
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected field=value, got '{raw}'")),
    }
}

fn parse_sentiment(raw: &str) -> Result<Sentiment, String> {
    match raw.to_ascii_uppercase().as_str() {
        "POSITIVE" => Ok(Sentiment::Positive),
        "NEGATIVE" => Ok(Sentiment::Negative),
        "NEUTRAL" => Ok(Sentiment::Neutral),
        _ => Err(format!("unknown sentiment '{raw}'")),
    }
}

/// Runs `$run::<Row>(args..)` for the row type behind a `Resource`.
macro_rules! with_resource {
    ($resource:expr, $run:ident($($arg:expr),* $(,)?)) => {
        match $resource {
            Resource::Holdings => $run::<Holding>($($arg),*).await,
            Resource::Messages => $run::<CryptoMessage>($($arg),*).await,
            Resource::Reports => $run::<InvestmentReport>($($arg),*).await,
            Resource::Metrics => $run::<CryptoMetrics>($($arg),*).await,
        }
    };
}

struct Dashboard {
    settings: Settings,
    http: reqwest::Client,
}

impl Dashboard {
    fn new(settings: Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .context("failed to build http client")?;
        Ok(Self { settings, http })
    }

    fn controller<R: ResourceRow + DeriveStats>(&self) -> Result<Arc<ResourceListController<R>>> {
        let endpoint =
            HttpResourceEndpoint::new(self.http.clone(), &self.settings.api_base_url, R::KIND)
                .with_context(|| format!("invalid endpoint for {}", R::KIND))?;
        Ok(ResourceListController::new_with_options(
            Arc::new(endpoint),
            ControllerOptions {
                page_size: Some(self.settings.page_size),
                ..ControllerOptions::default()
            },
        ))
    }

    fn params(&self, query: &QueryArgs) -> QueryParams {
        let mut params = QueryParams::default()
            .with_page_size(query.page_size.unwrap_or(self.settings.page_size));
        if let Some(page) = query.page {
            params = params.with_page(page);
        }
        for (field, value) in &query.filters {
            params = params.with_filter(field.clone(), value.clone());
        }
        if let Some(sort) = &query.sort {
            params = params.with_sorter(sort.clone());
        }
        params
    }

    fn job_refetch_delay(&self) -> Duration {
        Duration::from_secs(self.settings.job_refetch_delay_secs)
    }
}

fn format_stat(value: &StatValue) -> String {
    match value {
        StatValue::Number(v) => format!("{v:.2}"),
        StatValue::Count(v) => v.to_string(),
        StatValue::Breakdown(parts) => parts
            .iter()
            .map(|(k, v)| format!("{k}={v:.2}"))
            .collect::<Vec<_>>()
            .join(", "),
        StatValue::Tally(parts) => parts
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn print_snapshot<R: ResourceRow>(snapshot: &ListSnapshot<R>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&snapshot.data)?);
    println!("total: {} (showing {})", snapshot.total, snapshot.data.len());
    for (name, value) in snapshot.stats.iter() {
        println!("  {name:<20} {}", format_stat(value));
    }
    Ok(())
}

async fn list<R: ResourceRow + DeriveStats>(dash: &Dashboard, query: &QueryArgs) -> Result<()> {
    let controller = dash.controller::<R>()?;
    controller.fetch(dash.params(query)).await?;
    print_snapshot(&*controller.snapshot().await)
}

async fn show<R: ResourceRow + DeriveStats>(dash: &Dashboard, id: &RowId) -> Result<()> {
    let row = dash.controller::<R>()?.get(id).await?;
    println!("{}", serde_json::to_string_pretty(&row)?);
    Ok(())
}

async fn delete<R: ResourceRow + DeriveStats>(dash: &Dashboard, ids: &[RowId]) -> Result<()> {
    let controller = dash.controller::<R>()?;
    controller.delete_many(ids).await?;
    println!("deleted {} {}", ids.len(), R::KIND);
    Ok(())
}

async fn watch<R: ResourceRow + DeriveStats>(
    dash: &Dashboard,
    interval: Duration,
    query: &QueryArgs,
) -> Result<()> {
    let controller = dash.controller::<R>()?;
    let mut events = controller.subscribe();
    controller.fetch(dash.params(query)).await?;
    let _refresh = controller.spawn_auto_refresh(interval);
    info!(resource = %R::KIND, interval_secs = interval.as_secs(), "watching");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ControllerEvent::SnapshotUpdated(snapshot)) => print_snapshot(&snapshot)?,
                Ok(ControllerEvent::MalformedResponse { resource }) => {
                    eprintln!("{resource}: unrecognized list payload, showing an empty page");
                }
                Ok(ControllerEvent::OperationFailed { operation, message }) => {
                    eprintln!("{operation} failed: {message}");
                }
                Err(RecvError::Lagged(skipped)) => {
                    eprintln!("skipped {skipped} updates");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

/// Triggers `job` and waits for the delayed refresh it schedules.
async fn run_job<R: ResourceRow + DeriveStats>(dash: &Dashboard, job: BackendJob) -> Result<()> {
    let controller = dash.controller::<R>()?;
    let mut events = controller.subscribe();
    controller.trigger_job(&job, dash.job_refetch_delay()).await?;
    println!("{} job queued for {}", job.action(), R::KIND);

    let wait = dash.job_refetch_delay() + Duration::from_secs(dash.settings.request_timeout_secs);
    let refreshed = tokio::time::timeout(wait, async {
        loop {
            match events.recv().await {
                Ok(ControllerEvent::SnapshotUpdated(snapshot)) => return Ok(snapshot),
                Ok(ControllerEvent::OperationFailed { message, .. }) => bail!(message),
                Ok(ControllerEvent::MalformedResponse { .. }) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => bail!("controller closed"),
            }
        }
    })
    .await
    .context("timed out waiting for the refresh after the job")??;
    print_snapshot(&refreshed)
}

async fn run(dash: Dashboard, command: Command) -> Result<()> {
    match command {
        Command::List { resource, query } => with_resource!(resource, list(&dash, &query)),
        Command::Show { resource, id } => with_resource!(resource, show(&dash, &id)),
        Command::Delete { resource, ids } => with_resource!(resource, delete(&dash, &ids)),
        Command::Watch {
            resource,
            interval,
            query,
        } => {
            let interval =
                Duration::from_secs(interval.unwrap_or(dash.settings.auto_refresh_secs).max(1));
            with_resource!(resource, watch(&dash, interval, &query))
        }
        Command::AddHolding {
            coin,
            amount,
            usdt_value,
            cost_price,
        } => {
            let controller = dash.controller::<Holding>()?;
            controller
                .create(&HoldingDraft {
                    coin,
                    amount,
                    usdt_value,
                    cost_price,
                })
                .await?;
            print_snapshot(&*controller.snapshot().await)
        }
        Command::EditHolding {
            id,
            coin,
            amount,
            usdt_value,
            cost_price,
        } => {
            let controller = dash.controller::<Holding>()?;
            let mut row = controller.get(&id).await?;
            if let Some(coin) = coin {
                row.coin = coin;
            }
            row.amount = amount.or(row.amount);
            row.usdt_value = usdt_value.or(row.usdt_value);
            row.cost_price = cost_price.or(row.cost_price);
            let saved = controller.update(&row).await?;
            println!("{}", serde_json::to_string_pretty(&saved)?);
            Ok(())
        }
        Command::AddMessage {
            coin,
            content,
            sentiment,
            source,
        } => {
            let controller = dash.controller::<CryptoMessage>()?;
            controller
                .create(&CryptoMessageDraft {
                    coin,
                    content,
                    origin_id: None,
                    sentiment,
                    impact_score: None,
                    source,
                    publish_time: None,
                })
                .await?;
            print_snapshot(&*controller.snapshot().await)
        }
        Command::Approve { id } => {
            let controller = dash.controller::<InvestmentReport>()?;
            controller.reload().await?;
            controller.approve(&id, &dash.settings.auditor).await?;
            println!("report {id} approved by {}", dash.settings.auditor);
            Ok(())
        }
        Command::Reject { id, reason } => {
            let controller = dash.controller::<InvestmentReport>()?;
            controller.reload().await?;
            controller
                .reject(&id, &dash.settings.auditor, reason)
                .await?;
            println!("report {id} rejected by {}", dash.settings.auditor);
            Ok(())
        }
        Command::Collect { target } => match target {
            CollectTarget::Messages => {
                run_job::<CryptoMessage>(&dash, BackendJob::CollectMessages).await
            }
            CollectTarget::Metrics => {
                run_job::<CryptoMetrics>(&dash, BackendJob::CollectMetrics).await
            }
        },
        Command::GenerateReport { message_id } => {
            run_job::<InvestmentReport>(&dash, BackendJob::GenerateReport { message_id }).await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(api_url) = &args.api_url {
        settings.api_base_url = normalize_api_base_url(api_url)?;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
    info!(api_base_url = %settings.api_base_url, "dashboard starting");

    run(Dashboard::new(settings)?, args.command).await
}
