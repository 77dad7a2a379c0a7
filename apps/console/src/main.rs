mod config;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use client_core::{
    AlertEventsResource, AlertRulesResource, AlwaysOnline, ApiClient, AsyncListController, Entity,
    Filters, InstancesResource, ListResource, ListState, ListStatus, LoadOutcome, Mutation,
    MutationOutcome, RecommendationsResource, ToastQueue, Tone, OFFLINE_MESSAGE,
};
use shared::domain::{AlertEvent, AlertRule, Instance, Recommendation};
use tracing_subscriber::EnvFilter;

use crate::config::{load_settings, normalize_base_url, Settings, CONFIG_FILE};

#[derive(Parser, Debug)]
#[command(name = "pm-console", about = "Browse and manage database monitoring lists")]
struct Args {
    /// Overrides `api_base_url` from the config file and environment.
    #[arg(long, global = true)]
    base_url: Option<String>,
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitored database instances.
    Instances {
        #[command(subcommand)]
        action: ToggleAction,
    },
    /// Alert rules.
    Rules {
        #[command(subcommand)]
        action: ToggleAction,
    },
    /// Fired alert events.
    Events {
        #[command(subcommand)]
        action: EventAction,
    },
    /// Tuning recommendations.
    Recs {
        #[command(subcommand)]
        action: RecAction,
    },
}

#[derive(ClapArgs, Debug)]
struct ListArgs {
    /// Keep loading pages until the server reports no more.
    #[arg(long)]
    all: bool,
    /// Extra `key=value` filter sent with every page request.
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,
    /// Reload attempts after a connectivity failure.
    #[arg(long, default_value_t = 0)]
    retries: u32,
}

#[derive(Subcommand, Debug)]
enum ToggleAction {
    List(ListArgs),
    Enable { id: String },
    Disable { id: String },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum EventAction {
    List {
        #[arg(long)]
        severity: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[command(flatten)]
        list: ListArgs,
    },
    Ack { id: String },
    Resolve { id: String },
}

#[derive(Subcommand, Debug)]
enum RecAction {
    List {
        #[arg(long)]
        status: Option<String>,
        #[command(flatten)]
        list: ListArgs,
    },
    Apply { id: String },
    Dismiss { id: String },
    Restore { id: String },
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

/// One terminal line per list item.
trait Render {
    fn render(&self) -> String;
}

impl Render for Instance {
    fn render(&self) -> String {
        let state = if self.enabled { "enabled" } else { "disabled" };
        format!("{}\t{state}\t{}\t{}", self.id, self.name, self.uri)
    }
}

impl Render for AlertRule {
    fn render(&self) -> String {
        let state = if self.enabled { "enabled" } else { "disabled" };
        let threshold = self
            .threshold
            .map(|value| value.to_string())
            .unwrap_or_default();
        format!(
            "{}\t{state}\t{}\t{}\t{} {} {threshold}",
            self.id,
            self.severity.as_str(),
            self.name,
            self.metric,
            self.comparator
        )
    }
}

impl Render for AlertEvent {
    fn render(&self) -> String {
        let triggered = self
            .triggered_at
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_default();
        format!(
            "{}\t{}\t{}\t{triggered}\t{}",
            self.id,
            self.severity.as_str(),
            self.status,
            self.message
        )
    }
}

impl Render for Recommendation {
    fn render(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.id,
            self.status.as_str(),
            self.severity.as_str(),
            self.title
        )
    }
}

struct Console {
    settings: Settings,
    toasts: Arc<ToastQueue>,
}

impl Console {
    fn controller<R: ListResource>(&self, resource: R, filters: Filters) -> AsyncListController<R> {
        AsyncListController::new_with_dependencies(
            resource,
            self.toasts.clone(),
            Arc::new(AlwaysOnline),
            self.settings.controller_options(),
        )
        .with_filters(filters)
    }

    async fn list<R>(&self, resource: R, filters: Filters, args: &ListArgs) -> Result<()>
    where
        R: ListResource + 'static,
        R::Item: Render,
    {
        let label = resource.label();
        let mut filters = filters;
        filters.extend(args.filters.iter().cloned());
        let controller = Arc::new(self.controller(resource, filters));

        controller.load(true).await;
        let retry = controller.debounced_retry(self.settings.retry_quiet());
        let mut attempts = 0;
        while controller.snapshot().await.is_offline() && attempts < args.retries {
            attempts += 1;
            tracing::info!(resource = label, attempt = attempts, "console: retrying load");
            let mut runs = retry.subscribe();
            retry.call();
            if runs.changed().await.is_err() {
                break;
            }
        }

        while args.all && controller.snapshot().await.has_more {
            if controller.load_more().await != LoadOutcome::Committed {
                break;
            }
        }

        let state = controller.snapshot().await;
        for item in &state.items {
            println!("{}", item.render());
        }
        if state.is_empty() {
            println!("No {label}s found.");
        }
        if state.has_more && state.status == ListStatus::Ready {
            println!("More {label}s available; pass --all to load them.");
        }
        self.flush_toasts();

        if state.status == ListStatus::Error {
            bail!(describe_failure(&state));
        }
        Ok(())
    }

    async fn mutate<R: ListResource>(&self, resource: R, id: &str, mutation: Mutation) -> Result<()> {
        let label = resource.label();
        let controller = self.controller(resource, Filters::new());

        // The item has to be listed before it can be edited.
        controller.load(true).await;
        while controller.snapshot().await.get(id).is_none()
            && controller.snapshot().await.has_more
        {
            if controller.load_more().await != LoadOutcome::Committed {
                break;
            }
        }

        let state = controller.snapshot().await;
        if state.status == ListStatus::Error {
            self.flush_toasts();
            bail!(describe_failure(&state));
        }

        let outcome = controller.mutate(id, mutation).await;
        self.flush_toasts();
        match outcome {
            MutationOutcome::Committed => Ok(()),
            MutationOutcome::Skipped => bail!("no {label} with id '{id}'"),
            MutationOutcome::Unsupported => bail!("that change does not apply to a {label}"),
            other => bail!("{label} '{id}' was not changed ({other:?})"),
        }
    }

    /// Prints queued notifications oldest first.
    fn flush_toasts(&self) {
        for toast in self.toasts.drain().into_iter().rev() {
            let tone = match toast.tone {
                Tone::Success => "ok",
                Tone::Error => "error",
                Tone::Default => "info",
            };
            match toast.message {
                Some(message) => eprintln!("[{tone}] {}: {message}", toast.title),
                None => eprintln!("[{tone}] {}", toast.title),
            }
        }
    }
}

fn describe_failure<T: Entity>(state: &ListState<T>) -> String {
    if state.is_offline() {
        return OFFLINE_MESSAGE.to_string();
    }
    state
        .error
        .clone()
        .unwrap_or_else(|| "Request failed".to_string())
}

fn filter(key: &str, value: Option<String>) -> Filters {
    value
        .map(|value| Filters::from([(key.to_string(), value)]))
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config)?;
    if let Some(base_url) = &args.base_url {
        settings.api_base_url = normalize_base_url(base_url);
    }
    tracing::debug!(base_url = %settings.api_base_url, "console: settings loaded");

    let api = ApiClient::with_options(settings.api_base_url.clone(), settings.api_client_options())?;
    let console = Console {
        settings,
        toasts: Arc::new(ToastQueue::new()),
    };

    match args.command {
        Command::Instances { action } => {
            let resource = InstancesResource::new(api);
            match action {
                ToggleAction::List(list) => console.list(resource, Filters::new(), &list).await,
                ToggleAction::Enable { id } => console.mutate(resource, &id, Mutation::Enable).await,
                ToggleAction::Disable { id } => {
                    console.mutate(resource, &id, Mutation::Disable).await
                }
                ToggleAction::Delete { id } => console.mutate(resource, &id, Mutation::Delete).await,
            }
        }
        Command::Rules { action } => {
            let resource = AlertRulesResource::new(api);
            match action {
                ToggleAction::List(list) => console.list(resource, Filters::new(), &list).await,
                ToggleAction::Enable { id } => console.mutate(resource, &id, Mutation::Enable).await,
                ToggleAction::Disable { id } => {
                    console.mutate(resource, &id, Mutation::Disable).await
                }
                ToggleAction::Delete { id } => console.mutate(resource, &id, Mutation::Delete).await,
            }
        }
        Command::Events { action } => {
            let resource = AlertEventsResource::new(api);
            match action {
                EventAction::List {
                    severity,
                    status,
                    list,
                } => {
                    let mut filters = filter("severity", severity);
                    filters.extend(filter("status", status));
                    console.list(resource, filters, &list).await
                }
                EventAction::Ack { id } => {
                    let mutation = Mutation::SetStatus("acknowledged".into());
                    console.mutate(resource, &id, mutation).await
                }
                EventAction::Resolve { id } => {
                    let mutation = Mutation::SetStatus("resolved".into());
                    console.mutate(resource, &id, mutation).await
                }
            }
        }
        Command::Recs { action } => {
            let resource = RecommendationsResource::new(api);
            match action {
                RecAction::List { status, list } => {
                    console.list(resource, filter("status", status), &list).await
                }
                RecAction::Apply { id } => {
                    let mutation = Mutation::SetStatus("applied".into());
                    console.mutate(resource, &id, mutation).await
                }
                RecAction::Dismiss { id } => {
                    let mutation = Mutation::SetStatus("dismissed".into());
                    console.mutate(resource, &id, mutation).await
                }
                RecAction::Restore { id } => {
                    let mutation = Mutation::SetStatus("open".into());
                    console.mutate(resource, &id, mutation).await
                }
            }
        }
    }
}
