use chrono::{DateTime, Local};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};

use super::CandleStats;
use crate::event::WsConnectionStatus;

pub struct StatusBar<'a> {
    pub symbol: &'a str,
    pub timeframe: &'a str,
    pub connection: &'a WsConnectionStatus,
    pub stalled: bool,
    pub current_price: Option<f64>,
    pub update_count: u64,
    pub error: Option<&'a str>,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let conn_status = match self.connection {
            WsConnectionStatus::Connected if self.stalled => {
                Span::styled("STALLED", Style::default().fg(Color::Yellow))
            }
            WsConnectionStatus::Connected => Span::styled(
                "LIVE",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ),
            WsConnectionStatus::Connecting => {
                Span::styled("CONNECTING", Style::default().fg(Color::Yellow))
            }
            WsConnectionStatus::Reconnecting { attempt, .. } => Span::styled(
                format!("RECONNECTING #{}", attempt),
                Style::default().fg(Color::Yellow),
            ),
            WsConnectionStatus::Disconnected | WsConnectionStatus::Failed(_) => {
                Span::styled("DISCONNECTED", Style::default().fg(Color::Red))
            }
        };

        let price = self
            .current_price
            .map(|p| format!("${:.2}", p))
            .unwrap_or_else(|| "---".to_string());

        let mut spans = vec![
            Span::styled(
                " candle-stream ",
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled("| ", Style::default().fg(Color::DarkGray)),
            Span::styled(self.symbol, Style::default().fg(Color::Cyan)),
            Span::styled(
                format!(" {}", self.timeframe),
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled(" | ", Style::default().fg(Color::DarkGray)),
            conn_status,
            Span::styled(" | ", Style::default().fg(Color::DarkGray)),
            Span::styled(price, Style::default().fg(Color::Yellow)),
            Span::styled(
                format!(" (#{})", self.update_count),
                Style::default().fg(Color::DarkGray),
            ),
        ];
        if let Some(error) = self.error {
            spans.push(Span::styled(" | ", Style::default().fg(Color::DarkGray)));
            spans.push(Span::styled(error, Style::default().fg(Color::Red)));
        }

        buf.set_line(area.x, area.y, &Line::from(spans), area.width);
    }
}

pub struct StatsPanel {
    pub stats: Option<CandleStats>,
    pub candle_count: usize,
    pub max_candles: usize,
    pub rejected: u64,
    pub last_update: Option<DateTime<Local>>,
}

impl Widget for StatsPanel {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let label = |s: &'static str| Span::styled(s, Style::default().fg(Color::DarkGray));
        let value = |s: String, color: Color| Span::styled(s, Style::default().fg(color));

        let mut lines = match &self.stats {
            Some(stats) => {
                let change_color = if stats.is_positive() {
                    Color::Green
                } else {
                    Color::Red
                };
                let sign = if stats.is_positive() { "+" } else { "" };
                vec![
                    Line::from(vec![
                        label("Open:   "),
                        value(format!("{:.2}", stats.open), Color::White),
                    ]),
                    Line::from(vec![
                        label("High:   "),
                        value(format!("{:.2}", stats.high), Color::Green),
                    ]),
                    Line::from(vec![
                        label("Low:    "),
                        value(format!("{:.2}", stats.low), Color::Red),
                    ]),
                    Line::from(vec![
                        label("Change: "),
                        value(format!("{}{:.2}%", sign, stats.change_pct), change_color),
                    ]),
                ]
            }
            None => vec![Line::from(label("Waiting for data..."))],
        };

        lines.push(Line::from(vec![
            label("Candles:"),
            value(
                format!(" {}/{}", self.candle_count, self.max_candles),
                Color::White,
            ),
        ]));
        if self.rejected > 0 {
            lines.push(Line::from(vec![
                label("Stale:  "),
                value(format!("{}", self.rejected), Color::Yellow),
            ]));
        }
        let updated = self
            .last_update
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "---".to_string());
        lines.push(Line::from(vec![label("Updated:"), value(format!(" {}", updated), Color::White)]));

        let block = Block::default()
            .title(" Latest Candle ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray));

        Paragraph::new(lines).block(block).render(area, buf);
    }
}

pub struct LogPanel<'a> {
    messages: &'a [String],
}

impl<'a> LogPanel<'a> {
    pub fn new(messages: &'a [String]) -> Self {
        Self { messages }
    }
}

impl Widget for LogPanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let visible_rows = area.height.saturating_sub(2) as usize;
        let start = self.messages.len().saturating_sub(visible_rows);
        let lines: Vec<Line> = self.messages[start..]
            .iter()
            .map(|msg| {
                let color = if msg.starts_with("[ERR]") {
                    Color::Red
                } else if msg.starts_with("[WARN]") {
                    Color::Yellow
                } else {
                    Color::Gray
                };
                Line::from(Span::styled(msg.as_str(), Style::default().fg(color)))
            })
            .collect();

        let block = Block::default()
            .title(" System Log ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray));

        Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: true })
            .render(area, buf);
    }
}

pub struct KeybindBar;

impl Widget for KeybindBar {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let line = Line::from(vec![
            Span::styled(" [Q]", Style::default().fg(Color::Yellow)),
            Span::styled("uit  ", Style::default().fg(Color::DarkGray)),
            Span::styled("[R]", Style::default().fg(Color::Yellow)),
            Span::styled("econnect  ", Style::default().fg(Color::DarkGray)),
        ]);

        buf.set_line(area.x, area.y, &line, area.width);
    }
}
