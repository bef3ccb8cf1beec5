//! CLI entry point for runwire.

mod build_info;
mod cli;
mod render;

use clap::{CommandFactory, Parser};
use render::{chat_line, step_line, Renderer};
use runwire::breakpoint::normalize;
use runwire::config::{
    initialize_default_global_config, load_config_with_diagnostics, Config,
    GlobalConfigInitResult,
};
use runwire::protocol::step::ControlCode;
use runwire::protocol::ControlAction;
use runwire::session::{FrameOutcome, Inbound, RunSession};
use runwire::transport::{TransportEvent, WsTransport};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_logging();
    let args = cli::Args::parse();
    if args.version {
        println!("{}", build_info::cli_version_text());
        return;
    }
    let renderer = Renderer::new(!args.no_color);

    let result = match args.command {
        Some(cli::Command::Connect { url, step }) => {
            match load_config(args.config.as_deref(), &renderer) {
                Ok(mut config) => {
                    if let Some(url) = url {
                        config.connection.url = url;
                    }
                    run_connect(config, step, renderer).await
                }
                Err(msg) => Err(msg),
            }
        }
        Some(cli::Command::Breakpoint { spec }) => {
            let breakpoint = normalize(spec.as_str());
            println!("{}", breakpoint.serialize());
            println!("{}", breakpoint.display_name());
            Ok(())
        }
        Some(cli::Command::Init { force }) => run_init(force, &renderer),
        None => {
            let _ = cli::Args::command().print_help();
            Ok(())
        }
    };

    if let Err(msg) = result {
        renderer.error(&msg);
        std::process::exit(1);
    }
}

/// Logs go to stderr so stdout carries only messages.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("runwire=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&std::path::Path>, renderer: &Renderer) -> Result<Config, String> {
    let loaded = load_config_with_diagnostics(path).map_err(|e| e.to_string())?;
    for warning in &loaded.diagnostics.warnings {
        renderer.warn(warning);
    }
    if let Some(source) = &loaded.source {
        debug!(path = %source.display(), "loaded config");
    }
    Ok(loaded.config)
}

fn run_init(force: bool, renderer: &Renderer) -> Result<(), String> {
    match initialize_default_global_config(force).map_err(|e| e.to_string())? {
        GlobalConfigInitResult::Created { path } => {
            renderer.activity(&format!("wrote {}", path.display()));
        }
        GlobalConfigInitResult::AlreadyInitialized { path } => {
            renderer.activity(&format!(
                "{} already exists; pass --force to replace it",
                path.display()
            ));
        }
        GlobalConfigInitResult::Overwritten { path, backup_path } => {
            renderer.activity(&format!(
                "wrote {} (previous file saved as {})",
                path.display(),
                backup_path.display()
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// connect
// ---------------------------------------------------------------------------

async fn run_connect(config: Config, step: bool, renderer: Renderer) -> Result<(), String> {
    let url = config.connection.url.clone();
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        return Err(format!("`{url}` is not a ws:// or wss:// URL"));
    }
    let (transport, mut events) = WsTransport::spawn(config.transport_options());
    let mut session =
        RunSession::new(transport.clone(), config.session_options()).map_err(|e| e.to_string())?;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    renderer.activity(&format!("connecting to {url}"));

    let result = loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break Ok(());
                };
                announce(&renderer, &event, &url);
                let gave_up = matches!(event, TransportEvent::GaveUp { .. });
                match session.handle_event(event) {
                    Ok(outcome) => {
                        show(&renderer, &outcome);
                        if outcome.control == Some(ControlAction::FocusInput) {
                            focus_input(&mut session, &renderer).await;
                        }
                        if outcome.is_workflow_end && !step {
                            renderer.activity("run finished");
                            break Ok(());
                        }
                    }
                    Err(err) => debug!(error = %err, "frame dropped"),
                }
                if gave_up {
                    break Err("unable to reach the runner".to_string());
                }
            }
            line = stdin.next_line() => match line {
                Ok(Some(line)) => handle_line(&mut session, &renderer, step, line.trim()),
                Ok(None) => break Ok(()),
                Err(err) => break Err(format!("reading stdin: {err}")),
            },
        }
    };

    session.disconnect();
    transport.disconnect();
    result
}

fn announce(renderer: &Renderer, event: &TransportEvent, url: &str) {
    match event {
        TransportEvent::Connected => renderer.activity(&format!("connected to {url}")),
        TransportEvent::Disconnected { reason } => {
            renderer.warn(&format!("connection lost: {reason}"));
        }
        TransportEvent::GaveUp { attempts } => {
            renderer.error(&format!("gave up after {attempts} reconnect attempts"));
        }
        TransportEvent::Error(_) | TransportEvent::Frame(_) => {}
    }
}

fn show(renderer: &Renderer, outcome: &FrameOutcome) {
    match &outcome.inbound {
        Some(Inbound::Chat(entry)) => renderer.message(&chat_line(entry)),
        Some(Inbound::Step(entry)) => renderer.message(&step_line(entry)),
        Some(Inbound::Reply { id }) => debug!(id = %id, "reply received"),
        None => {}
    }
}

/// React to a new prompt: read passwords without echo, flush a staged control
/// code, or show the prompt marker.
async fn focus_input(session: &mut RunSession<WsTransport>, renderer: &Renderer) {
    if let Some(request) = session.conversation().active_request.clone() {
        if request.password {
            let prompt = format!("{} ", request.prompt);
            let read =
                tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt)).await;
            match read {
                Ok(Ok(secret)) => {
                    if let Err(err) = session.respond(&secret, None) {
                        renderer.error(&err.to_string());
                    }
                }
                Ok(Err(err)) => renderer.error(&format!("reading password: {err}")),
                Err(err) => renderer.error(&format!("reading password: {err}")),
            }
            return;
        }
        renderer.prompt(&request.prompt);
        return;
    }
    if let Some(staged) = session.step_debug().pending_control_input.clone() {
        send_control(session, renderer, &staged);
        return;
    }
    if let Some(request) = &session.step_debug().active_request {
        renderer.prompt(&request.prompt);
    }
}

fn handle_line(session: &mut RunSession<WsTransport>, renderer: &Renderer, step: bool, line: &str) {
    if step && session.step_debug().active_request.is_some() {
        send_control(session, renderer, line);
    } else if session.conversation().active_request.is_some() {
        if let Err(err) = session.respond(line, None) {
            renderer.error(&err.to_string());
        }
    } else if step && !line.is_empty() {
        renderer.activity("queued for the next debugger prompt");
        session.stage_control_input(line);
    } else if !line.is_empty() {
        renderer.warn("the runner is not waiting for input");
    }
}

fn send_control(session: &mut RunSession<WsTransport>, renderer: &Renderer, input: &str) {
    let code = match input.parse::<ControlCode>() {
        Ok(code) => code,
        Err(err) => {
            renderer.warn(&format!("{err}; try h for help"));
            return;
        }
    };
    match session.send_control(&code) {
        Ok(ack) => {
            let renderer = *renderer;
            tokio::spawn(async move {
                if let Err(err) = ack.await {
                    renderer.warn(&format!("`{code}` not acknowledged: {err}"));
                }
            });
        }
        Err(err) => renderer.error(&err.to_string()),
    }
}
