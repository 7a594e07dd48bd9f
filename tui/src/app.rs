use crate::scroll_state::ScrollState;
use crate::status_bar::StatusBar;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};
use sopcheck_core::widget::CHECKED_CLASS;
use sopcheck_core::{ChecklistSyncWidget, EventSink, StepRow, UpdateOutcome};
use sopcheck_protocol::InboundEvent;

const HINTS: &str = "↑/↓ move · space toggle · q quit";

pub struct ChecklistApp<S> {
    widget: ChecklistSyncWidget<S>,
    selection: ScrollState,
    connected: bool,
    running: bool,
}

impl<S: EventSink> ChecklistApp<S> {
    pub fn new(widget: ChecklistSyncWidget<S>) -> Self {
        Self {
            widget,
            selection: ScrollState::new(),
            connected: true,
            running: true,
        }
    }

    pub fn widget(&self) -> &ChecklistSyncWidget<S> {
        &self.widget
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn selected(&self) -> Option<usize> {
        self.selection.selected_idx
    }

    /// `None` means the transport closed.
    pub fn handle_inbound(&mut self, event: Option<InboundEvent>) {
        match event {
            Some(event) => {
                if self.widget.handle_event(event) == UpdateOutcome::Applied {
                    self.selection.clamp_selection(self.widget.container().len());
                }
            }
            None => {
                if self.connected {
                    tracing::warn!("dispatcher connection lost");
                }
                self.connected = false;
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        let len = self.widget.container().len();
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.running = false;
            }
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Up | KeyCode::Char('k') => self.selection.move_up_wrap(len),
            KeyCode::Down | KeyCode::Char('j') => self.selection.move_down_wrap(len),
            KeyCode::Char(' ') | KeyCode::Enter => self.toggle_selected(),
            _ => {}
        }
    }

    fn toggle_selected(&mut self) {
        let Some(idx) = self.selection.selected_idx else { return };
        let Some(step_id) = self
            .widget
            .container()
            .rows()
            .get(idx)
            .map(|row| row.step_id().to_string())
        else {
            return;
        };
        self.widget.toggle(&step_id);
    }

    fn status_line(&self) -> String {
        let container = self.widget.container();
        let mut status = format!(
            "session {} · {}/{} checked",
            self.widget.session_id(),
            container.checked_count(),
            container.len()
        );
        if let Some(service) = self.widget.service() {
            status.push_str(&format!(" · {service}"));
            if let Some(confidence) = self.widget.confidence() {
                status.push_str(&format!(" ({:.0}%)", confidence * 100.0));
            }
        }
        status
    }

    pub fn draw(&self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(3)])
            .split(f.area());

        let container = self.widget.container();
        let block = Block::default().title(container.id()).borders(Borders::ALL);

        if container.is_empty() {
            let waiting = Paragraph::new(Line::from(Span::styled(
                "Waiting for checklist…",
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )))
            .block(block);
            f.render_widget(waiting, chunks[0]);
        } else {
            let items: Vec<ListItem> = container.rows().iter().map(row_item).collect();
            let list = List::new(items).block(block).highlight_style(
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::LightYellow)
                    .add_modifier(Modifier::BOLD),
            );
            let mut state = ListState::default().with_selected(self.selection.selected_idx);
            f.render_stateful_widget(list, chunks[0], &mut state);
        }

        let status = self.status_line();
        f.render_widget(StatusBar::new(self.connected, &status, HINTS), chunks[1]);
    }
}

fn row_item(row: &StepRow) -> ListItem<'_> {
    let mark = if row.checkbox.checked { "[x] " } else { "[ ] " };
    let label_style = if row.label.has_class(CHECKED_CLASS) {
        Style::default().fg(Color::Green).add_modifier(Modifier::CROSSED_OUT)
    } else {
        Style::default()
    };
    let mut spans = vec![
        Span::raw(mark),
        Span::styled(row.label.text.as_str(), label_style),
    ];
    if let Some(at) = &row.checked_at {
        spans.push(Span::styled(
            format!("  {at}"),
            Style::default().fg(Color::DarkGray),
        ));
    }
    ListItem::new(Line::from(spans))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use sopcheck_core::{Connection, LoopbackPeer};
    use sopcheck_protocol::{OutboundEvent, SessionId, SopUpdate, Step};

    fn new_app() -> (ChecklistApp<sopcheck_core::EventSender>, Connection, LoopbackPeer) {
        let (conn, peer) = Connection::loopback();
        let widget = ChecklistSyncWidget::new(SessionId::new("abc"), conn.sender.clone());
        (ChecklistApp::new(widget), conn, peer)
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn sop(steps: Vec<Step>) -> Option<InboundEvent> {
        Some(InboundEvent::SopUpdate(SopUpdate::new("abc", steps)))
    }

    fn screen(app: &ChecklistApp<sopcheck_core::EventSender>) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 10)).expect("terminal");
        terminal.draw(|f| app.draw(f)).expect("draw");
        let buffer = terminal.backend().buffer();
        let width = buffer.area.width as usize;
        buffer
            .content
            .chunks(width)
            .map(|line| line.iter().map(|c| c.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn space_toggles_selected_step() {
        let (mut app, _conn, mut peer) = new_app();
        app.handle_inbound(sop(vec![
            Step::new("s1", "Open valve", false),
            Step::new("s2", "Check pressure", false),
        ]));
        assert_eq!(app.selected(), Some(0));

        app.handle_key(press(KeyCode::Down));
        app.handle_key(press(KeyCode::Char(' ')));

        let OutboundEvent::ChecklistUpdate(update) = peer.outbound.try_recv().expect("emitted");
        assert_eq!(update.step_id, "s2");
        assert!(update.checked);
        assert!(peer.outbound.try_recv().is_err());
        assert!(app.widget().container().rows()[1].checkbox.checked);
    }

    #[test]
    fn toggle_with_empty_checklist_does_nothing() {
        let (mut app, _conn, mut peer) = new_app();
        app.handle_key(press(KeyCode::Enter));
        assert!(peer.outbound.try_recv().is_err());
    }

    #[test]
    fn quit_keys_stop_the_app() {
        let (mut app, _conn, _peer) = new_app();
        app.handle_key(press(KeyCode::Char('q')));
        assert!(!app.is_running());

        let (mut app, _conn, _peer) = new_app();
        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(!app.is_running());
    }

    #[test]
    fn closed_transport_marks_disconnected() {
        let (mut app, _conn, _peer) = new_app();
        app.handle_inbound(sop(vec![Step::new("s1", "Open valve", true)]));
        app.handle_inbound(None);
        assert!(!app.is_connected());
        assert_eq!(app.widget().container().len(), 1);
        assert!(screen(&app).contains("disconnected"));
    }

    #[test]
    fn selection_follows_shrinking_checklist() {
        let (mut app, _conn, _peer) = new_app();
        app.handle_inbound(sop(vec![
            Step::new("s1", "a", false),
            Step::new("s2", "b", false),
            Step::new("s3", "c", false),
        ]));
        app.handle_key(press(KeyCode::Up));
        assert_eq!(app.selected(), Some(2));
        app.handle_inbound(sop(vec![Step::new("s1", "a", false)]));
        assert_eq!(app.selected(), Some(0));
        app.handle_inbound(sop(Vec::new()));
        assert_eq!(app.selected(), None);
    }

    #[test]
    fn renders_rows_and_status() {
        let (mut app, _conn, _peer) = new_app();
        assert!(screen(&app).contains("Waiting for checklist"));

        let mut update = SopUpdate::new(
            "abc",
            vec![Step::new("s1", "Open valve", false), Step::new("s2", "Purge line", true)],
        );
        update.service = Some("Valve service".to_string());
        update.confidence = Some(0.75);
        app.handle_inbound(Some(InboundEvent::SopUpdate(update)));

        let text = screen(&app);
        assert!(text.contains("checklist-container"));
        assert!(text.contains("[ ] Open valve"));
        assert!(text.contains("[x] Purge line"));
        assert!(text.contains("1/2 checked"));
        assert!(text.contains("Valve service (75%)"));
    }

    #[test]
    fn other_session_updates_do_not_render() {
        let (mut app, _conn, _peer) = new_app();
        app.handle_inbound(Some(InboundEvent::SopUpdate(SopUpdate::new(
            "xyz",
            vec![Step::new("s1", "Not mine", false)],
        ))));
        assert!(app.widget().container().is_empty());
        assert!(!screen(&app).contains("Not mine"));
    }
}
