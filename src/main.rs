use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event, KeyEventKind};
use tokio::sync::watch;

use candle_stream::backend::rest::HistoryClient;
use candle_stream::backend::ws::StreamClient;
use candle_stream::config::Config;
use candle_stream::input::{parse_main_command, UiCommand};
use candle_stream::session::StreamSession;
use candle_stream::ui::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (required by rustls 0.23+)
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Load config
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Make sure config/default.toml exists or CANDLE_CONFIG points at a config file");
            std::process::exit(1);
        }
    };

    // Init tracing (log to file so it doesn't interfere with TUI)
    let log_file = std::fs::File::create(&config.logging.file)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(&config.logging.level)
            }),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .json()
        .init();

    tracing::info!(
        symbol = %config.chart.symbol,
        interval = %config.chart.interval,
        stream_url = %config.backend.stream_url,
        rest_url = %config.backend.rest_base_url,
        "Starting candle-stream"
    );

    let history = Arc::new(HistoryClient::new(
        &config.backend.rest_base_url,
        Duration::from_millis(config.backend.connect_timeout_ms),
    )?);
    let stream = Arc::new(StreamClient::new(&config)?);
    let mut app_state = AppState::from_config(&config)?;
    let mut session = StreamSession::spawn(&config, history.clone(), stream.clone());

    // Ctrl+C handler
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Ctrl+C received");
        let _ = shutdown_tx.send(true);
    });

    app_state.push_log(format!(
        "candle-stream started | {} | {} candles | {}",
        app_state.symbol,
        app_state.timeframe,
        stream.endpoint().ws_url
    ));

    // TUI main loop
    let mut terminal = ratatui::init();
    let refresh = Duration::from_millis(config.ui.refresh_rate_ms);
    let result: Result<()> = loop {
        while let Some(event) = session.try_recv() {
            app_state.apply(event);
        }

        if let Err(e) = terminal.draw(|frame| ui::render(frame, &app_state)) {
            break Err(e.into());
        }

        // Handle input (non-blocking with timeout)
        match crossterm::event::poll(refresh) {
            Ok(true) => match crossterm::event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    match parse_main_command(&key.code) {
                        Some(UiCommand::Quit) => {
                            tracing::info!("User quit");
                            break Ok(());
                        }
                        Some(UiCommand::Reconnect) => {
                            tracing::info!("Explicit reconnect requested");
                            let _ = session.stop();
                            app_state.reset_session();
                            session = StreamSession::spawn(&config, history.clone(), stream.clone());
                        }
                        None => {}
                    }
                }
                Ok(_) => {}
                Err(e) => break Err(e.into()),
            },
            Ok(false) => {}
            Err(e) => break Err(e.into()),
        }

        if *shutdown_rx.borrow() {
            break Ok(());
        }
    };

    let _ = session.stop();
    ratatui::restore();
    tracing::info!("Shutdown complete");
    println!("Goodbye! Check {} for details.", config.logging.file);
    result
}
