//! Course Catalog - subjects, terms, chapters and content in the terminal.
//!
//! Features:
//! - Primary and High School subjects with six terms, Tertiary courses
//! - Chapters and pdf/video/exercise content with uploads
//! - Running total of study time per term or course
//! - Cascading deletes that clean up uploaded files
//! - Live lists driven by store snapshots

mod app;
mod config;
mod form;
mod logging;
mod ui;

use anyhow::{Context, Result};
use app::App;
use config::Config;
use content_tree::{Catalog, FsBlobStore, SqliteStore};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{io, sync::Arc, time::Duration};

fn open_catalog(config: &Config) -> Result<Catalog> {
    let db_path = config.db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("opening {}", db_path.display()))?;

    let blob_root = config.blob_root();
    std::fs::create_dir_all(&blob_root)?;
    let mut blobs = FsBlobStore::new(blob_root);
    if let Some(base_url) = &config.storage.blob_base_url {
        blobs = blobs.with_base_url(base_url.as_str());
    }

    tracing::info!(db = %db_path.display(), blobs = %blobs.root().display(), "catalog opened");
    Ok(Catalog::new(Arc::new(store), Arc::new(blobs)))
}

fn main() -> Result<()> {
    let config = Config::load();
    logging::init(&config.logging, &config.log_path())?;
    if Config::config_path().is_some_and(|p| !p.exists()) {
        if let Err(e) = config.save() {
            tracing::warn!(error = %e, "could not write default config");
        }
    }
    let catalog = open_catalog(&config)?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run app
    let mut app = App::new(catalog, config);
    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = &result {
        tracing::error!(error = %e, "course catalog exited with an error");
    }
    result
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        app.poll();
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if app.can_quit() && key.code == KeyCode::Char('q') {
                    return Ok(());
                }
                app.handle_key(key);
            }
        }
    }
}
