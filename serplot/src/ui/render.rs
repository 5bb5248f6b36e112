//! Render engine
//!
//! A frame is produced in two steps. `FrameData::capture` copies what is
//! needed out of the session (the only step that takes locks), then
//! `draw` lays the frame out and paints it into a ratatui `Buffer`. `draw`
//! depends only on its arguments, so a frame can be redrawn or tested
//! without a live session.

use super::downsample;
use super::view::ViewState;
use crate::data::{Channel, ChannelKind, LogKind, LogView, SampleValue, StatusLevel, TimeRange, Timestamp};
use crate::session::{Diagnostics, LinkState, Session};
use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph, Widget};

pub const MIN_GRAPH_WIDTH: u16 = 12;
pub const MIN_GRAPH_HEIGHT: u16 = 4;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("pane {width}x{height} is smaller than {min_width}x{min_height}")]
    PaneTooSmall {
        width: u16,
        height: u16,
        min_width: u16,
        min_height: u16,
    },
}

fn check_size(area: Rect, min_width: u16, min_height: u16) -> Result<(), RenderError> {
    if area.width < min_width || area.height < min_height {
        Err(RenderError::PaneTooSmall {
            width: area.width,
            height: area.height,
            min_width,
            min_height,
        })
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub channel: Channel,
    pub visible: bool,
    pub selected: bool,
    pub latest: Option<SampleValue>,
}

/// Points of one visible numeric channel inside the time window.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub channel: Channel,
    pub points: Vec<(f64, f64)>,
    pub selected: bool,
}

/// Everything one frame shows, copied out of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameData {
    pub source: String,
    pub link: LinkState,
    /// Right edge of the time axis.
    pub end: Timestamp,
    pub paused: bool,
    pub time_window: Option<f64>,
    pub legend: Vec<LegendEntry>,
    pub series: Vec<Series>,
    pub log: LogView,
    pub diagnostics: Diagnostics,
    /// Line being typed for the device, while the editor is open.
    pub input: Option<String>,
}

impl FrameData {
    pub fn capture(session: &Session, view: &ViewState) -> FrameData {
        let end = view.end_time(session.now());
        let range = match view.time_window {
            Some(w) => TimeRange::window(end - w, end),
            None => TimeRange::until(end),
        };
        let mut legend = vec![];
        let mut series = vec![];
        for channel in session.registry.channels() {
            let visible = view.is_visible(&channel);
            let selected = view.selected == Some(channel.id);
            if visible && channel.kind == ChannelKind::Numeric {
                let points = session
                    .store
                    .snapshot(channel.id, range)
                    .iter()
                    .filter_map(|s| s.value.try_as_f64().map(|v| (s.timestamp, v)))
                    .collect();
                series.push(Series {
                    channel: channel.clone(),
                    points,
                    selected,
                });
            }
            legend.push(LegendEntry {
                latest: session
                    .store
                    .latest_until(channel.id, end)
                    .map(|s| s.value),
                channel,
                visible,
                selected,
            });
        }
        FrameData {
            source: session.source().to_string(),
            link: session.link_state(),
            end,
            paused: view.is_paused(),
            time_window: view.time_window,
            legend,
            series,
            log: view.log_view(&session.store),
            diagnostics: session.diagnostics(),
            input: view
                .is_editing()
                .then(|| view.editor.text().to_string()),
        }
    }
}

/// Areas of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    pub status: Rect,
    pub legend: Rect,
    pub log: Rect,
    pub graphs: Vec<Rect>,
    pub input: Option<Rect>,
}

impl FrameLayout {
    /// Log entries that fit in the log pane.
    pub fn log_rows(&self) -> usize {
        self.log.height.saturating_sub(2) as usize
    }
}

pub fn layout(area: Rect, data: &FrameData) -> FrameLayout {
    let input_rows = if data.input.is_some() { 1 } else { 0 };
    let [status, legend, body, input] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(input_rows),
    ])
    .areas(area);
    let input = data.input.as_ref().map(|_| input);
    if data.series.is_empty() {
        return FrameLayout {
            status,
            legend,
            log: body,
            graphs: vec![],
            input,
        };
    }
    let [graph_area, log] =
        Layout::vertical([Constraint::Percentage(65), Constraint::Percentage(35)]).areas(body);
    let n = data.series.len() as u32;
    let graphs = Layout::vertical(vec![Constraint::Ratio(1, n); n as usize])
        .split(graph_area)
        .to_vec();
    FrameLayout {
        status,
        legend,
        log,
        graphs,
        input,
    }
}

/// Paints a whole frame into `buf`.
pub fn draw(data: &FrameData, view: &ViewState, area: Rect, buf: &mut Buffer) {
    let layout = layout(area, data);
    draw_status(data, view, layout.status, buf);
    draw_legend(data, layout.legend, buf);
    for (series, rect) in data.series.iter().zip(layout.graphs.iter()) {
        if let Err(e) = draw_graph(data, series, *rect, buf) {
            draw_placeholder(&series.channel, &e, *rect, buf);
        }
    }
    // A log pane without a single row is simply left out.
    let _ = draw_log(data, layout.log, buf);
    if let (Some(text), Some(rect)) = (&data.input, layout.input) {
        draw_input(text, rect, buf);
    }
}

/// Compact decimal form: at most four decimals, no trailing zeros.
pub fn format_number(x: f64) -> String {
    let abs = x.abs();
    if abs != 0.0 && !(1e-3..1e6).contains(&abs) {
        return format!("{:.3e}", x);
    }
    let s = format!("{:.4}", x);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn format_value(v: &SampleValue) -> String {
    match v {
        SampleValue::Number(x) => format_number(*x),
        SampleValue::Text(s) => s.clone(),
    }
}

fn link_style(link: LinkState) -> Style {
    match link {
        LinkState::Connected | LinkState::Reading => Style::default().fg(Color::Green),
        LinkState::Reconnecting => Style::default().fg(Color::Yellow),
        LinkState::Disconnected => Style::default().fg(Color::Red),
    }
}

fn draw_status(data: &FrameData, view: &ViewState, area: Rect, buf: &mut Buffer) {
    let d = &data.diagnostics;
    let mut spans = vec![
        Span::styled(
            " serplot ",
            Style::default().add_modifier(Modifier::REVERSED | Modifier::BOLD),
        ),
        Span::raw(format!(" {} ", data.source)),
        Span::styled(data.link.to_string(), link_style(data.link)),
    ];
    if view.is_paused() {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            " PAUSED ",
            Style::default().fg(Color::Black).bg(Color::Yellow),
        ));
    }
    spans.push(Span::raw(match data.time_window {
        Some(w) => format!(" | window {}s", format_number(w)),
        None => " | window all".to_string(),
    }));
    spans.push(Span::styled(
        format!(
            " | lines {} samples {} malformed {} evicted {} reconnects {} forced {} clamped {}",
            d.lines,
            d.store.samples,
            d.malformed_fields,
            d.store.evicted_samples,
            d.reconnects,
            d.forced_lines,
            d.store.clamped_timestamps
        ),
        Style::default().fg(Color::DarkGray),
    ));
    Paragraph::new(Line::from(spans)).render(area, buf);
}

fn draw_legend(data: &FrameData, area: Rect, buf: &mut Buffer) {
    if data.legend.is_empty() {
        Paragraph::new(Span::styled(
            "waiting for data",
            Style::default().fg(Color::DarkGray),
        ))
        .render(area, buf);
        return;
    }
    let mut spans = vec![];
    for (i, entry) in data.legend.iter().enumerate() {
        let mut text = format!("{}:{}", i + 1, entry.channel.display_name);
        if let Some(v) = &entry.latest {
            text.push('=');
            text.push_str(&format_value(v));
            if let Some(unit) = &entry.channel.unit {
                text.push_str(unit);
            }
        }
        let mut style = if entry.visible {
            Style::default().fg(entry.channel.color)
        } else {
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::CROSSED_OUT)
        };
        if entry.selected {
            style = style.add_modifier(Modifier::REVERSED);
        }
        spans.push(Span::styled(text, style));
        spans.push(Span::raw("  "));
    }
    Paragraph::new(Line::from(spans)).render(area, buf);
}

fn x_bounds(data: &FrameData, points: &[(f64, f64)]) -> [f64; 2] {
    if let Some(w) = data.time_window {
        return [data.end - w, data.end];
    }
    match (points.first(), points.last()) {
        (Some(first), Some(last)) if last.0 > first.0 => [first.0, last.0],
        (Some(first), Some(_)) => [first.0 - 0.5, first.0 + 0.5],
        _ => [0.0, data.end.max(1.0)],
    }
}

fn y_bounds(points: &[(f64, f64)]) -> [f64; 2] {
    if points.is_empty() {
        return [0.0, 1.0];
    }
    let lo = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let hi = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
    let pad = if hi > lo {
        (hi - lo) * 0.1
    } else {
        (hi.abs() * 0.1).max(1.0)
    };
    [lo - pad, hi + pad]
}

fn draw_graph(data: &FrameData, series: &Series, area: Rect, buf: &mut Buffer) -> Result<(), RenderError> {
    check_size(area, MIN_GRAPH_WIDTH, MIN_GRAPH_HEIGHT)?;
    let channel = &series.channel;
    let inner_width = area.width.saturating_sub(2) as usize;
    let points = downsample::min_max(&series.points, 2 * inner_width);

    let mut title = format!(" {} ", channel.label());
    if let Some(last) = series.points.last() {
        title.push_str(&format!("= {} ", format_number(last.1)));
    }
    let mut border = Style::default().fg(channel.color);
    if series.selected {
        border = border.add_modifier(Modifier::BOLD);
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title(Span::styled(title, Style::default().fg(channel.color)));

    if points.is_empty() {
        Paragraph::new(Span::styled(
            "no data in window",
            Style::default().fg(Color::DarkGray),
        ))
        .block(block)
        .render(area, buf);
        return Ok(());
    }

    let xb = x_bounds(data, &points);
    let yb = y_bounds(&points);
    let axis_style = Style::default().fg(Color::DarkGray);
    let dataset = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(channel.color))
        .data(&points);
    Chart::new(vec![dataset])
        .block(block)
        .x_axis(
            Axis::default()
                .style(axis_style)
                .bounds(xb)
                .labels(vec![
                    Span::raw(format!("{}s", format_number(xb[0]))),
                    Span::raw(format!("{}s", format_number(xb[1]))),
                ]),
        )
        .y_axis(
            Axis::default()
                .style(axis_style)
                .bounds(yb)
                .labels(vec![
                    Span::raw(format_number(yb[0])),
                    Span::raw(format_number((yb[0] + yb[1]) / 2.0)),
                    Span::raw(format_number(yb[1])),
                ]),
        )
        .render(area, buf);
    Ok(())
}

fn draw_placeholder(channel: &Channel, err: &RenderError, area: Rect, buf: &mut Buffer) {
    if area.width == 0 || area.height == 0 {
        return;
    }
    let text = match err {
        RenderError::PaneTooSmall { .. } => format!("{} (too small)", channel.display_name),
    };
    Paragraph::new(Span::styled(text, Style::default().fg(channel.color))).render(area, buf);
}

fn log_line(entry: &crate::data::LogEntry) -> Line<'_> {
    let stamp = Span::styled(
        format!("{} ", entry.stamp.format("%H:%M:%S%.3f")),
        Style::default().fg(Color::DarkGray),
    );
    let text = match entry.kind {
        LogKind::Data => Span::raw(entry.text.as_str()),
        LogKind::Sent => Span::styled(
            format!("> {}", entry.text),
            Style::default().fg(Color::Green),
        ),
        LogKind::Status(level) => {
            let color = match level {
                StatusLevel::Info => Color::Cyan,
                StatusLevel::Warn => Color::Yellow,
                StatusLevel::Error => Color::Red,
            };
            Span::styled(
                format!("-- {}", entry.text),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )
        }
    };
    Line::from(vec![stamp, text])
}

fn draw_log(data: &FrameData, area: Rect, buf: &mut Buffer) -> Result<(), RenderError> {
    check_size(area, 3, 3)?;
    let rows = area.height.saturating_sub(2) as usize;
    let mut title = format!(" log ({} lines) ", data.log.total);
    if data.paused {
        title.push_str("[paused] ");
    }
    if data.log.offset > 0 {
        title.push_str(&format!("[-{}] ", data.log.offset));
    }
    let entries = &data.log.entries;
    let skip = entries.len().saturating_sub(rows);
    let lines: Vec<Line> = entries[skip..].iter().map(log_line).collect();
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title))
        .render(area, buf);
    Ok(())
}

static INPUT_PROMPT: &str = "send> ";

/// Prompt, the typed text and a block cursor. Text wider than the row
/// shows its tail.
fn draw_input(text: &str, area: Rect, buf: &mut Buffer) {
    let room = (area.width as usize).saturating_sub(INPUT_PROMPT.len() + 1);
    let skip = text.chars().count().saturating_sub(room);
    let shown: String = text.chars().skip(skip).collect();
    let line = Line::from(vec![
        Span::styled(
            INPUT_PROMPT,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(shown),
        Span::styled(" ", Style::default().add_modifier(Modifier::REVERSED)),
    ]);
    Paragraph::new(line).render(area, buf);
}
