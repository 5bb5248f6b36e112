use clap::Parser;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use serplot::device::Ingestor;
use serplot::port::{Connector, UrlConnector};
use serplot::ui::{self, ChannelEvents, ViewState};
use serplot::Session;
use serplot_tools::{forward_events, init_logging, MonitorOpts, Tui};
use std::io;
use std::sync::Arc;

fn run_ui(session: &Arc<Session>) -> anyhow::Result<()> {
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    terminal.clear()?;
    let mut view = ViewState::new(&session.config);
    let mut events = ChannelEvents::spawn();
    ui::run(session, &mut view, &mut terminal, &mut events)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let opts = MonitorOpts::parse();
    let config = opts.build_config()?;
    let _log_guard = init_logging(opts.log_file.as_deref())?;

    let mut connector = UrlConnector::new(&opts.device)?;
    let stream = match connector.open() {
        Ok(stream) => Some(stream),
        Err(e) if opts.wait => {
            tracing::warn!("cannot open {} yet: {}", opts.device, e);
            None
        }
        Err(e) => anyhow::bail!("cannot open {}: {}", opts.device, e),
    };

    let session = Session::new(config, &opts.device)?;
    tracing::info!("monitoring {}", opts.device);

    let ingest = {
        let session = session.clone();
        std::thread::Builder::new()
            .name("ingest".to_string())
            .spawn(move || Ingestor::new(session, Box::new(connector), stream).run())?
    };

    let events = {
        let session = session.clone();
        std::thread::Builder::new()
            .name("events".to_string())
            .spawn(move || forward_events(&session))?
    };

    let mut tui = Tui::setup()?;
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        Tui::restore();
        original_hook(panic_info);
    }));

    let result = run_ui(&session);
    session.request_shutdown();
    tui.teardown();
    if ingest.join().is_err() {
        tracing::error!("ingestion thread panicked");
    }
    if events.join().is_err() {
        tracing::error!("event thread panicked");
    }
    result
}
