use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{probe_source, source_for_location, ContentView, FlowSource, FlowViewer};
use shared::{
    domain::{FlowId, Theme},
    protocol::flow_fragment,
};
use storage::{ProgressStore, Storage};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

mod browse;
mod clipboard;
mod config;

use clipboard::SystemClipboard;
use config::{load_settings, Settings};

type Viewer = FlowViewer<dyn FlowSource, Storage>;

#[derive(Parser, Debug)]
#[command(name = "viewer", about = "Browse procedural checklists and track step completion")]
struct Cli {
    /// Base URL or directory holding flows/index.json.
    #[arg(long)]
    source: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    namespace: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List catalog flows, optionally filtered by title or tag.
    List {
        #[arg(long)]
        search: Option<String>,
    },
    /// Render one flow with its stored progress.
    Show {
        id: String,
        #[arg(long)]
        html: bool,
    },
    /// Mark a step (1-based) as done, or not done with --undo.
    Check {
        id: String,
        step: usize,
        #[arg(long)]
        undo: bool,
    },
    /// Flip the completion of a step (1-based).
    Toggle { id: String, step: usize },
    /// Write all stored progress to the export file.
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete stored progress for every catalog flow.
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// Show or change the theme preference: light, dark or toggle.
    Theme { mode: Option<String> },
    /// Probe the flow source and report what it serves.
    Diagnose,
    /// Interactive session starting at the given fragment.
    Browse {
        #[arg(default_value = "")]
        fragment: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = apply_cli_overrides(load_settings(), &cli);

    match cli.command {
        Command::Diagnose => {
            let source = source_for_location(&settings.source)?;
            for line in probe_source(source.as_ref()).await.lines() {
                println!("{line}");
            }
        }
        Command::List { search } => {
            let mut viewer = open_viewer(&settings).await?;
            viewer.start("").await;
            viewer.require_catalog()?;
            let sidebar = viewer.set_search_term(search.as_deref().unwrap_or_default());
            print!("{}", sidebar.to_text());
        }
        Command::Show { id, html } => {
            let viewer = open_flow(&settings, &id).await?;
            let view = viewer.present_content(Instant::now());
            if html {
                println!("{}", view.to_html());
            } else {
                print!("{}", view.to_text());
            }
        }
        Command::Check { id, step, undo } => {
            let mut viewer = open_flow(&settings, &id).await?;
            ensure_flow_displayed(&viewer)?;
            let index = step_index(step)?;
            viewer
                .toggle_step(index, !undo, &mut SystemClipboard::default())
                .await?;
            print!("{}", viewer.content_view().to_text());
        }
        Command::Toggle { id, step } => {
            let mut viewer = open_flow(&settings, &id).await?;
            ensure_flow_displayed(&viewer)?;
            viewer
                .flip_step(step_index(step)?, &mut SystemClipboard::default())
                .await?;
            print!("{}", viewer.content_view().to_text());
        }
        Command::Export { out } => {
            let mut viewer = open_viewer(&settings).await?;
            viewer.start("").await;
            let path = write_export(&viewer, &settings, out).await?;
            println!("exported progress to {}", path.display());
        }
        Command::Reset { yes } => {
            let mut viewer = open_viewer(&settings).await?;
            viewer.start("").await;
            let outcome = viewer
                .reset_progress(|prompt| yes || confirm_on_stdin(prompt))
                .await?;
            match outcome {
                Some(removed) => println!("removed progress for {removed} flows"),
                None => println!("reset cancelled"),
            }
        }
        Command::Theme { mode } => {
            let mut viewer = open_viewer(&settings).await?;
            viewer.start("").await;
            let theme = match mode.as_deref() {
                None => viewer.state().theme,
                Some("toggle") => viewer.toggle_theme().await?,
                Some(other) => {
                    let theme: Theme = other.parse().map_err(anyhow::Error::msg)?;
                    viewer.set_theme(theme).await?
                }
            };
            println!("{}", theme.as_str());
        }
        Command::Browse { fragment } => {
            let mut viewer = open_viewer(&settings).await?;
            browse::run(&mut viewer, &settings, &fragment).await?;
        }
    }

    Ok(())
}

fn apply_cli_overrides(mut settings: Settings, cli: &Cli) -> Settings {
    if let Some(source) = &cli.source {
        settings.source = source.clone();
    }
    if let Some(database_url) = &cli.database_url {
        settings.database_url = database_url.clone();
    }
    if let Some(namespace) = &cli.namespace {
        settings.set_namespace(namespace);
    }
    settings
}

async fn open_viewer(settings: &Settings) -> Result<Viewer> {
    let source = source_for_location(&settings.source)?;
    let storage = Storage::new(&settings.database_url)
        .await
        .with_context(|| format!("failed to open progress store at '{}'", settings.database_url))?;
    let progress = ProgressStore::new(storage, settings.namespace.clone())?;
    Ok(FlowViewer::new(source, progress))
}

async fn open_flow(settings: &Settings, id: &str) -> Result<Viewer> {
    let mut viewer = open_viewer(settings).await?;
    viewer.start(&flow_fragment(&FlowId::from(id))).await;
    Ok(viewer)
}

fn ensure_flow_displayed(viewer: &Viewer) -> Result<()> {
    match viewer.content() {
        ContentView::Flow(_) => Ok(()),
        ContentView::Diagnostic(diagnostic) => {
            anyhow::bail!("{}: {}", diagnostic.title, diagnostic.message)
        }
        ContentView::Home => anyhow::bail!("no flow selected"),
    }
}

fn step_index(step: usize) -> Result<usize> {
    step.checked_sub(1)
        .context("steps are numbered from 1")
}

pub(crate) async fn write_export(
    viewer: &Viewer,
    settings: &Settings,
    out: Option<PathBuf>,
) -> Result<PathBuf> {
    let dir = out.unwrap_or_else(|| PathBuf::from("."));
    let path = dir.join(&settings.export_filename);
    let json = viewer.export_progress_json().await?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

pub(crate) fn confirm_on_stdin(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
