mod cli;
mod terminal;
mod tools;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use parley_core::{load_dotenv, ClientConfig};
use parley_runtime::{ChatClient, CompletionOptions, Message, ToolLoop};

use crate::cli::CliArgs;
use crate::terminal::Terminal;
use crate::tools::{builtin_registry, ReportingExecutor};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    load_dotenv();

    let mut config = match args.profile.as_deref() {
        Some(profile) => ClientConfig::for_profile(profile),
        None => ClientConfig::from_env(),
    };
    if let Some(model) = &args.model {
        config = config.with_default_model(model.clone());
    }
    config.log_summary();

    let transport = parley_llm::create_transport(&config).context("failed to create transport")?;
    let client = ChatClient::new(transport, config.clone());

    let registry = builtin_registry().context("failed to register built-in tools")?;
    let options = CompletionOptions::new().streaming(!args.no_stream).with_usage();

    let mut session = client.session(registry.declarations(), options);
    if let Some(prompt) = &args.system_prompt {
        session = session.with_history(vec![Message::system(prompt.clone())]);
    }

    let tool_loop = match args.max_rounds {
        Some(max) => ToolLoop::new().with_max_rounds(max),
        None => ToolLoop::new(),
    };

    let terminal = Terminal::new();
    let executor = ReportingExecutor::new(&registry, &terminal);
    terminal.print_banner(client.transport_name(), &config.default_model)?;

    // REPL loop
    loop {
        let input = match terminal.read_input()? {
            Some(text) => text,
            None => {
                terminal.print_info("Goodbye.")?;
                break;
            }
        };

        if input.is_empty() {
            continue;
        }

        terminal.begin_reply()?;
        let turn = tool_loop.run_with(&mut session, vec![Message::user(input)], &executor, |partial| {
            terminal.print_delta(&partial.content_delta(0))
        });

        let outcome = tokio::select! {
            result = turn => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };

        match outcome {
            Some(Ok(response)) => terminal.finish_reply(&response)?,
            Some(Err(e)) => {
                error!(error = %e, "turn failed");
                session.cancel_pending();
                terminal.print_error(&e.to_string())?;
            }
            None => {
                session.cancel_pending();
                terminal.print_info("\n[cancelled]")?;
            }
        }
        info!(messages = session.history().len(), state = %session.state(), "turn finished");
    }

    Ok(())
}
