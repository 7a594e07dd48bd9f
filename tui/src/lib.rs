pub mod app;
mod scroll_state;
mod status_bar;

pub use app::ChecklistApp;

use anyhow::Result;
use crossterm::{
    event::{Event, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::prelude::*;
use sopcheck_common::SyncConfig;
use sopcheck_core::{ChecklistSyncWidget, Connection};
use std::io;

/// Connect to the dispatcher and run the checklist UI until the user quits.
pub async fn run_checklist(config: &SyncConfig) -> Result<()> {
    let session_id = config.require_session_id()?;
    let mut conn = Connection::connect(&config.server_url).await?;
    let widget = ChecklistSyncWidget::new(session_id, conn.sender.clone());
    let mut app = ChecklistApp::new(widget);

    enable_raw_mode()?;
    let mut terminal = setup_or_restore(
        || {
            let mut stdout = io::stdout();
            execute!(stdout, EnterAlternateScreen)?;
            Ok(Terminal::new(CrosstermBackend::new(stdout))?)
        },
        || {
            let mut stdout = io::stdout();
            let _ = execute!(stdout, LeaveAlternateScreen);
            let _ = disable_raw_mode();
        },
    )?;

    let result = event_loop(&mut terminal, &mut app, &mut conn).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Run `setup`, calling `restore` before returning its error so a failed
/// setup never leaves the terminal in raw mode.
fn setup_or_restore<T>(setup: impl FnOnce() -> Result<T>, restore: impl FnOnce()) -> Result<T> {
    setup().inspect_err(|_| restore())
}

async fn event_loop<B, S>(
    terminal: &mut Terminal<B>,
    app: &mut ChecklistApp<S>,
    conn: &mut Connection,
) -> Result<()>
where
    B: Backend,
    S: sopcheck_core::EventSink,
{
    let mut keys = EventStream::new();

    while app.is_running() {
        terminal.draw(|f| app.draw(f))?;

        tokio::select! {
            event = conn.next_event(), if app.is_connected() => {
                app.handle_inbound(event);
            }
            key = keys.next() => match key {
                Some(Ok(Event::Key(key))) => app.handle_key(key),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }
    }

    Ok(())
}
