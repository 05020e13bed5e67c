use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::{Block, Borders, Widget},
};

use crate::model::candle::Candle;

const WICK: &str = "│";
const BODY: &str = "┃";
const FLAT_BODY: &str = "━";

pub struct CandleChart<'a> {
    candles: &'a [Candle],
    symbol: &'a str,
    timeframe: &'a str,
}

impl<'a> CandleChart<'a> {
    pub fn new(candles: &'a [Candle], symbol: &'a str, timeframe: &'a str) -> Self {
        Self {
            candles,
            symbol,
            timeframe,
        }
    }
}

/// Map a price onto a row offset from the top of a `rows`-tall plot.
fn price_row(price: f64, min_price: f64, range: f64, rows: usize) -> usize {
    let normalized = ((price - min_price) / range).clamp(0.0, 1.0);
    let from_bottom = (normalized * (rows - 1) as f64).round() as usize;
    rows - 1 - from_bottom.min(rows - 1)
}

impl Widget for CandleChart<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .title(format!(" {} · {} candles ", self.symbol, self.timeframe))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray));
        let inner = block.inner(area);
        block.render(area, buf);

        if self.candles.is_empty() || inner.height < 3 || inner.width < 4 {
            return;
        }

        let chart_height = inner.height.saturating_sub(1) as usize; // leave 1 row for axis labels
        let chart_width = inner.width as usize;

        // Newest candles that fit, one column each
        let visible = if self.candles.len() > chart_width {
            &self.candles[self.candles.len() - chart_width..]
        } else {
            self.candles
        };

        let min_price = visible.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let max_price = visible
            .iter()
            .map(|c| c.high)
            .fold(f64::NEG_INFINITY, f64::max);
        let range = max_price - min_price;
        let range = if range < 0.01 { 1.0 } else { range };

        for (i, candle) in visible.iter().enumerate() {
            let x = inner.x + i as u16;
            let color = if candle.is_bullish() {
                Color::Green
            } else {
                Color::Red
            };
            let style = Style::default().fg(color);

            let high_row = price_row(candle.high, min_price, range, chart_height);
            let low_row = price_row(candle.low, min_price, range, chart_height);
            let open_row = price_row(candle.open, min_price, range, chart_height);
            let close_row = price_row(candle.close, min_price, range, chart_height);
            let (body_top, body_bottom) = if open_row <= close_row {
                (open_row, close_row)
            } else {
                (close_row, open_row)
            };

            for row in high_row..=low_row {
                let symbol = if body_top == body_bottom && row == body_top {
                    FLAT_BODY
                } else if row >= body_top && row <= body_bottom {
                    BODY
                } else {
                    WICK
                };
                buf.set_string(x, inner.y + row as u16, symbol, style);
            }
        }

        // Axis labels
        let label_y = inner.y + inner.height - 1;
        buf.set_string(
            inner.x,
            inner.y,
            format!("{:.2}", max_price),
            Style::default().fg(Color::DarkGray),
        );
        buf.set_string(
            inner.x,
            label_y,
            format!("{:.2}", min_price),
            Style::default().fg(Color::DarkGray),
        );
    }
}
