use ratatui::{prelude::*, widgets::*};
use warehouse_core::{
    Position,
    environment::{AgentStatus, Environment},
    map::Tile,
};

use crate::App;

pub(crate) const LEADERBOARD_ROWS: usize = 10;

/// Renders the user interface.
pub(crate) fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(2)])
        .split(frame.area());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(main_layout[0]);

    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(11),
            Constraint::Percentage(40),
            Constraint::Min(0),
        ])
        .split(columns[1]);

    render_map(frame, columns[0], app);
    render_status(frame, side[0], app);
    render_customers(frame, side[1], app);
    render_leaderboard(frame, side[2], app);

    let help = "q quit | p pause | ←/→ customer | Enter assign | PgUp/PgDn scores | Space new run";
    let help_text = Paragraph::new(help)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[1]);
}

/// Renders the warehouse floor onto the frame.
fn render_map(frame: &mut Frame, area: Rect, app: &App) {
    let environment = app.simulation.environment();
    let bounds = environment.bounds();
    let selected = app.selected_customer();

    let mut lines: Vec<Line> = Vec::with_capacity(bounds.height);
    for y in 0..bounds.height {
        let mut spans: Vec<Span> = Vec::with_capacity(bounds.width * 2);
        for x in 0..bounds.width {
            spans.push(cell_span(environment, Position::new(x, y), selected));
            spans.push(Span::raw(" "));
        }
        lines.push(Line::from(spans));
    }

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Warehouse").borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(map_paragraph, area);
}

/// Topmost thing on a cell wins: agent, intruder, customer, target, then the floor.
fn cell_span(
    environment: &Environment,
    position: Position,
    selected: Option<Position>,
) -> Span<'static> {
    let agent = environment.agent();
    if agent.position == position {
        let color = match agent.status {
            AgentStatus::Active => Color::Yellow,
            _ => Color::Red,
        };
        let glyph = if agent.carrying { "&" } else { "@" };
        return Span::styled(glyph, Style::default().fg(color).bold());
    }
    if environment.crowd().intruder_at(position) {
        return Span::styled("X", Style::default().fg(Color::Red).bold());
    }
    if let Some(customer) = environment.crowd().customer_at(position) {
        let mut style = Style::default().fg(patience_color(customer.patience_ratio()));
        if Some(position) == selected {
            style = style.reversed();
        }
        return Span::styled("C", style);
    }
    if environment.delivery_target() == Some(position) {
        return Span::styled("D", Style::default().fg(Color::Green).bold());
    }
    if environment.home() == position {
        return Span::styled("H", Style::default().fg(Color::Blue));
    }

    match environment.tiles().get(position) {
        Some(Tile::Shelf) => match environment.stock().get(&position).copied().unwrap_or(0) {
            0 => Span::styled("#", Style::default().fg(Color::DarkGray)),
            stock => Span::styled(stock.min(9).to_string(), Style::default().fg(Color::Cyan)),
        },
        Some(Tile::Charger) => Span::styled("+", Style::default().fg(Color::LightBlue)),
        Some(Tile::Penalty) => Span::styled("~", Style::default().fg(Color::Magenta)),
        Some(Tile::Floor) | None => Span::styled(".", Style::default().fg(Color::DarkGray)),
    }
}

fn patience_color(ratio: f32) -> Color {
    if ratio > 0.5 {
        Color::Green
    } else if ratio > 0.25 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let simulation = &app.simulation;
    let environment = simulation.environment();
    let session = simulation.session();
    let agent = environment.agent();

    let state = match simulation.outcome() {
        Some(outcome) => {
            let color = if outcome.is_success() { Color::Green } else { Color::Red };
            Span::styled(outcome.describe().to_uppercase(), Style::default().fg(color).bold())
        }
        None if app.paused => Span::styled("PAUSED", Style::default().fg(Color::Yellow)),
        None => Span::raw("running"),
    };

    let mut lines = vec![
        Line::from(vec![Span::raw("State: "), state]),
        Line::from(format!("Run {} | Tick {}", app.runs, simulation.tick())),
        Line::from(format!(
            "Score {} | Deliveries {} | Level {}",
            session.score(),
            session.deliveries(),
            session.difficulty()
        )),
        Line::from(format!("Reputation {}", session.reputation())),
        Line::from(format!(
            "Agent ({}, {}) {}",
            agent.position.x,
            agent.position.y,
            if agent.carrying { "carrying" } else { "empty-handed" }
        )),
        Line::from(format!("Mode {:?}", simulation.agent().mode())),
        Line::from(format!("Stock left {}", environment.remaining_stock())),
    ];
    if let Some(level) = agent.battery {
        lines.push(Line::from(format!("Battery {level}")));
    }
    if let Some(target) = environment.delivery_target() {
        lines.push(Line::from(format!("Target ({}, {})", target.x, target.y)));
    }

    let status =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"));
    frame.render_widget(status, area);
}

fn render_customers(frame: &mut Frame, area: Rect, app: &App) {
    let crowd = app.simulation.environment().crowd();
    let selected = app.selected_customer();

    let items: Vec<ListItem> = app
        .waiting_customers()
        .into_iter()
        .filter_map(|position| crowd.customer_at(position))
        .map(|customer| {
            let text = format!(
                "x={:<2} patience {:>3}/{}",
                customer.position.x, customer.patience, customer.max_patience
            );
            let mut style = Style::default().fg(patience_color(customer.patience_ratio()));
            if Some(customer.position) == selected {
                style = style.reversed();
            }
            ListItem::new(Line::styled(text, style))
        })
        .collect();

    let title = format!("Customers ({}) | Intruders {}", items.len(), crowd.intruders.len());
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(list, area);
}

fn render_leaderboard(frame: &mut Frame, area: Rect, app: &App) {
    let first_rank = app.leaderboard_page * LEADERBOARD_ROWS;
    let items: Vec<ListItem> = app
        .leaderboard
        .page(app.leaderboard_page, LEADERBOARD_ROWS)
        .iter()
        .enumerate()
        .map(|(offset, entry)| {
            ListItem::new(format!(
                "{:>2}. {:<12} {:>6} ({} delivered)",
                first_rank + offset + 1,
                entry.name,
                entry.score,
                entry.deliveries
            ))
        })
        .collect();

    let title = format!(
        "Leaderboard {}/{}",
        app.leaderboard_page + 1,
        app.leaderboard_pages()
    );
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(list, area);
}
