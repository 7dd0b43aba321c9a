//! Line-driven host for an interactive session. Fragments entered at the
//! prompt play the role of external navigation events.

use std::{future::Future, pin::Pin};

use anyhow::Result;
use client_core::{
    CopyField, DispatchOutcome, Intent, Interaction, NavigationStatus, ResolvedNavigation,
};
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    time::Instant,
};
use tracing::{debug, warn};

use crate::{clipboard::SystemClipboard, config::Settings, write_export, Viewer};

const HELP: &str = "\
commands:
  #flow=<id> | go <id>     open a flow
  # | home                 back to the landing view
  toggle <step>            flip completion of a step
  copy <step> where|inputs copy a field to the clipboard
  search <term>            filter the flow list (empty term clears)
  list                     show the flow list
  export                   write progress to the export file
  reset                    delete all stored progress (asks first)
  theme                    switch between light and dark
  quit";

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Fragment(String),
    Toggle(usize),
    Copy(usize, CopyField),
    Search(String),
    List,
    Export,
    Reset,
    Theme,
    Help,
    Quit,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.starts_with('#') {
        return Input::Fragment(line.to_string());
    }
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let step = || rest.split_whitespace().next().and_then(|n| n.parse::<usize>().ok());
    match command {
        "go" if !rest.is_empty() => Input::Fragment(shared::protocol::flow_fragment(
            &shared::domain::FlowId::from(rest),
        )),
        "home" => Input::Fragment("#".to_string()),
        "toggle" => match step() {
            Some(n) if n > 0 => Input::Toggle(n - 1),
            _ => Input::Unknown(line.to_string()),
        },
        "copy" => {
            let field = match rest.split_whitespace().nth(1) {
                Some("where") => Some(CopyField::Where),
                Some("inputs") => Some(CopyField::Inputs),
                _ => None,
            };
            match (step(), field) {
                (Some(n), Some(field)) if n > 0 => Input::Copy(n - 1, field),
                _ => Input::Unknown(line.to_string()),
            }
        }
        "search" => Input::Search(rest.to_string()),
        "list" => Input::List,
        "export" => Input::Export,
        "reset" => Input::Reset,
        "theme" => Input::Theme,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}

/// A flow load the session is waiting on. Input keeps being handled while it runs.
type InFlightLoad = Pin<Box<dyn Future<Output = ResolvedNavigation>>>;

pub async fn run(viewer: &mut Viewer, settings: &Settings, fragment: &str) -> Result<()> {
    let mut clipboard = SystemClipboard::default();
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut in_flight: Option<InFlightLoad> = None;

    viewer.start(fragment).await;
    print!("{}", viewer.sidebar_view().to_text());
    print!("{}", viewer.present_content(Instant::now()).to_text());
    println!("(type 'help' for commands)");

    loop {
        tokio::select! {
            resolved = settle(&mut in_flight) => {
                in_flight = None;
                if viewer.finish_navigation(resolved).await == NavigationStatus::Applied {
                    print!("{}", viewer.present_content(Instant::now()).to_text());
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_input(&line) {
                    Input::Fragment(fragment) => {
                        let pending = viewer.begin_navigation(&fragment);
                        debug!(token = pending.token().0, fragment = %fragment, "navigation started");
                        in_flight = Some(Box::pin(pending.resolve()));
                    }
                    Input::Toggle(step_index) => {
                        match viewer.flip_step(step_index, &mut clipboard).await {
                            Ok(_) => print!("{}", viewer.present_content(Instant::now()).to_text()),
                            Err(error) => println!("{error:#}"),
                        }
                    }
                    Input::Copy(step_index, field) => {
                        let Some(intent) = find_intent(viewer, |intent| {
                            matches!(intent, Intent::CopyText { target, .. }
                                if target.step_index == step_index && target.field == field)
                        }) else {
                            println!("step {} has no {} field", step_index + 1, field.as_str());
                            continue;
                        };
                        if let Some(DispatchOutcome::Copied(_)) =
                            dispatch(viewer, &intent, Interaction::Activated, &mut clipboard).await
                        {
                            print!("{}", viewer.present_content(Instant::now()).to_text());
                        }
                    }
                    Input::Search(term) => {
                        print!("{}", viewer.set_search_term(&term).to_text());
                    }
                    Input::List => {
                        print!("{}", viewer.sidebar_view().to_text());
                    }
                    Input::Export => match write_export(viewer, settings, None).await {
                        Ok(path) => println!("exported progress to {}", path.display()),
                        Err(error) => println!("export failed: {error:#}"),
                    },
                    Input::Reset => {
                        let flows = match viewer.require_catalog() {
                            Ok(catalog) => catalog.len(),
                            Err(error) => {
                                println!("reset unavailable: {error:#}");
                                continue;
                            }
                        };
                        println!("Reset progress for all {flows} flows? This cannot be undone. [y/N]");
                        let answer = lines.next_line().await?.unwrap_or_default();
                        let accepted = matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes");
                        match viewer.reset_progress(|_| accepted).await {
                            Ok(Some(removed)) => println!("removed progress for {removed} flows"),
                            Ok(None) => println!("reset cancelled"),
                            Err(error) => println!("reset failed: {error:#}"),
                        }
                    }
                    Input::Theme => match viewer.toggle_theme().await {
                        Ok(theme) => println!("theme: {}", theme.as_str()),
                        Err(error) => println!("theme change failed: {error:#}"),
                    },
                    Input::Help => println!("{HELP}"),
                    Input::Quit => break,
                    Input::Unknown(line) => println!("unrecognized input '{line}' (type 'help')"),
                }
            }
        }
    }

    Ok(())
}

/// Resolves the in-flight load, or never completes when there is none.
async fn settle(in_flight: &mut Option<InFlightLoad>) -> ResolvedNavigation {
    match in_flight {
        Some(load) => load.await,
        None => std::future::pending().await,
    }
}

fn find_intent(viewer: &Viewer, predicate: impl Fn(&Intent) -> bool) -> Option<Intent> {
    viewer
        .content_view()
        .intents()
        .into_iter()
        .find(|intent| predicate(intent))
        .cloned()
}

async fn dispatch(
    viewer: &mut Viewer,
    intent: &Intent,
    interaction: Interaction,
    clipboard: &mut SystemClipboard,
) -> Option<DispatchOutcome> {
    match viewer
        .handle(intent, interaction, clipboard, Instant::now())
        .await
    {
        Ok(outcome) => Some(outcome),
        Err(error) => {
            warn!(error = %format!("{error:#}"), "interaction failed");
            println!("{error:#}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use client_core::{NavigationToken, RouteOutcome};
    use std::time::Duration;

    #[tokio::test]
    async fn settle_waits_only_while_a_load_is_in_flight() {
        let mut idle: Option<InFlightLoad> = None;
        let waited = tokio::time::timeout(Duration::from_millis(20), settle(&mut idle)).await;
        assert!(waited.is_err());

        let mut busy: Option<InFlightLoad> = Some(Box::pin(async {
            ResolvedNavigation {
                token: NavigationToken(3),
                outcome: RouteOutcome::Home,
            }
        }));
        let resolved = settle(&mut busy).await;
        assert_eq!(resolved.token, NavigationToken(3));
        assert!(matches!(resolved.outcome, RouteOutcome::Home));
    }

    #[test]
    fn parses_fragments_and_commands() {
        assert_eq!(parse_input("#flow=a"), Input::Fragment("#flow=a".into()));
        assert_eq!(parse_input("go create user"), Input::Fragment("#flow=create%20user".into()));
        assert_eq!(parse_input("home"), Input::Fragment("#".into()));
        assert_eq!(parse_input("toggle 2"), Input::Toggle(1));
        assert_eq!(parse_input("copy 1 inputs"), Input::Copy(0, CopyField::Inputs));
        assert_eq!(parse_input("search  users "), Input::Search("users".into()));
        assert_eq!(parse_input("search"), Input::Search(String::new()));
    }

    #[test]
    fn rejects_step_zero_and_unknown_fields() {
        assert!(matches!(parse_input("toggle 0"), Input::Unknown(_)));
        assert!(matches!(parse_input("copy 1 notes"), Input::Unknown(_)));
        assert!(matches!(parse_input("frobnicate"), Input::Unknown(_)));
    }
}
