mod cli;

use answer_stream::logging::{setup_logging, setup_logging_to_file};
use answer_stream::{
    ChatSessionStore, ClientConfig, DocumentScope, FileChatStore, InMemoryChatStore,
    Orchestrator, SubmitError, TextRenderer, TurnState,
};
use anyhow::Result;
use cli::Args;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match &args.log_file {
        Some(path) => setup_logging_to_file(args.verbose, path),
        None => setup_logging(args.verbose, false),
    }

    let mut config = match &args.config {
        Some(path) => ClientConfig::load_from_path(path)?,
        None => ClientConfig::load()?,
    };
    if let Some(base_url) = &args.base_url {
        config.transport.base_url = base_url.clone();
    }

    let store: Arc<dyn ChatSessionStore> = match &args.history {
        Some(path) => Arc::new(FileChatStore::new(path)?),
        None => Arc::new(InMemoryChatStore::new()),
    };
    let renderer = Arc::new(TextRenderer::new(std::io::stdout()));
    let orchestrator = Orchestrator::with_http(&config, renderer, store)?;

    // Ctrl-C abandons the turn
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let scope: DocumentScope = args.documents.iter().cloned().collect();
    match orchestrator.submit(&args.query_text(), scope, &cancel).await {
        Ok(turn) => {
            debug!(
                "Turn {} finished as {} after {:?}",
                turn.id,
                turn.state(),
                turn.transitions()
            );
            if turn.state() == TurnState::Failed {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(SubmitError::Cancelled { .. }) => {
            eprintln!("Cancelled");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
