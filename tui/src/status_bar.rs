use ratatui::{
    layout::Alignment,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};

pub struct StatusBar<'a> {
    connected: bool,
    status: &'a str,
    hints: &'a str,
}

impl<'a> StatusBar<'a> {
    pub fn new(connected: bool, status: &'a str, hints: &'a str) -> Self {
        Self { connected, status, hints }
    }
}

impl Widget for StatusBar<'_> {
    fn render(self, area: ratatui::layout::Rect, buf: &mut ratatui::buffer::Buffer) {
        let (mode, bg) = if self.connected {
            ("connected", Color::Cyan)
        } else {
            ("disconnected", Color::Red)
        };
        let line = Line::from(vec![
            Span::styled(
                format!(" {mode} "),
                Style::default().fg(Color::Black).bg(bg).add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(self.status, Style::default().fg(Color::Yellow)),
            Span::raw("  |  "),
            Span::styled(self.hints, Style::default().fg(Color::Gray)),
        ]);
        Paragraph::new(line)
            .block(Block::default().borders(Borders::ALL))
            .alignment(Alignment::Left)
            .render(area, buf);
    }
}
