use crate::app::{App, CurrentScreen};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Row, Table, Wrap},
};

pub fn render(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Min(0),
                Constraint::Length(3),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(f.area());

    let main_area = chunks[0];
    let status_area = chunks[1];
    let help_area = chunks[2];

    match app.current_screen {
        CurrentScreen::Home => render_home(f, app, main_area),
        CurrentScreen::DeviceList => render_device_list(f, app, main_area),
        CurrentScreen::DeviceInfo => render_registers(f, app, main_area),
        CurrentScreen::WriteInput => {
            render_registers(f, app, main_area);
            render_write_popup(f, app, main_area);
        }
        CurrentScreen::Loading => render_loading_popup(f, app, main_area),
        CurrentScreen::Exiting => {}
    }

    render_status_bar(f, app, status_area);
    render_help(f, app, help_area);
}

fn render_help(f: &mut Frame, app: &App, area: Rect) {
    let msg = match app.current_screen {
        CurrentScreen::Home => "Enter: Connect | Esc: Quit | Type endpoint URL",
        CurrentScreen::DeviceList => {
            "↑/↓: Nav | PgDn/PgUp: Page | Enter: Open | Esc: Back | q: Quit"
        }
        CurrentScreen::DeviceInfo => {
            "t: Toggle | p: Press | r: Release | b: Press+Release | c: Count | o/f: Light on/off | w: Write | Esc: Back | q: Quit"
        }
        CurrentScreen::WriteInput => "Type value | Enter: Write | Esc: Cancel",
        CurrentScreen::Loading => "Please wait... | Esc: Cancel",
        CurrentScreen::Exiting => "Exiting...",
    };

    let span = Span::styled(msg, Style::default().fg(Color::DarkGray));
    f.render_widget(Paragraph::new(span), area);
}

fn render_home(f: &mut Frame, app: &App, area: Rect) {
    let display_text = format!("> {}_", app.endpoint_input);
    let input = Paragraph::new(display_text)
        .style(Style::default().fg(Color::Yellow))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Connect to OPC UA Server ")
                .border_style(Style::default().fg(Color::Cyan)),
        );

    let vertical_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Length(3),
            Constraint::Percentage(40),
        ])
        .split(area);

    let horizontal_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(15),
            Constraint::Percentage(70),
            Constraint::Percentage(15),
        ])
        .split(vertical_chunks[1]);

    f.render_widget(input, horizontal_chunks[1]);
}

fn render_device_list(f: &mut Frame, app: &mut App, area: Rect) {
    let items: Vec<ListItem> = app
        .devices
        .iter()
        .map(|d| ListItem::new(Line::from(vec![Span::raw(d)])))
        .collect();

    let title = format!(
        " Devices on {} ",
        app.endpoint.as_deref().unwrap_or("(not connected)")
    );
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .bg(Color::Blue)
                .fg(Color::White),
        )
        .highlight_symbol(">> ");

    f.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_registers(f: &mut Frame, app: &mut App, area: Rect) {
    let header = Row::new(vec!["Register", "Value", "Type", "Quality", "Timestamp"]).style(
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    );

    let rows: Vec<Row> = app
        .registers
        .iter()
        .map(|r| {
            let style = if r.quality.starts_with("Bad") {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            Row::new(vec![
                r.register.clone(),
                r.value.to_string(),
                r.value.kind_name().to_string(),
                r.quality.clone(),
                r.timestamp.clone(),
            ])
            .style(style)
        })
        .collect();

    let widths = [
        Constraint::Percentage(20),
        Constraint::Percentage(30),
        Constraint::Percentage(10),
        Constraint::Percentage(15),
        Constraint::Percentage(25),
    ];

    let title = format!(
        " {} ",
        app.current_device.as_deref().unwrap_or("Registers")
    );
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .row_highlight_style(Style::default().bg(Color::Blue).fg(Color::White))
        .highlight_symbol(">> ");

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn render_write_popup(f: &mut Frame, app: &App, area: Rect) {
    let register = app.write_register.as_deref().unwrap_or("?");
    let kind = app
        .registers
        .iter()
        .find(|r| r.register == register)
        .map_or("Null", |r| r.value.kind_name());

    let block = Block::default()
        .title(format!(" Write {register} ({kind}) "))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let area = centered_rect(50, 20, area);
    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(format!("> {}_", app.write_value_input))
            .style(Style::default().fg(Color::Yellow))
            .block(block),
        area,
    );
}

fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let display_messages: Vec<Line> = app
        .messages
        .last()
        .map(|m| {
            vec![Line::from(vec![
                Span::styled("- ", Style::default().fg(Color::DarkGray)),
                Span::raw(m),
            ])]
        })
        .unwrap_or_default();

    let paragraph = Paragraph::new(display_messages)
        .block(Block::default().borders(Borders::ALL).title(" Status Log "))
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn render_loading_popup(f: &mut Frame, app: &App, area: Rect) {
    let msg = app
        .messages
        .last()
        .cloned()
        .unwrap_or_else(|| "Communicating with OPC UA server...".to_string());

    let block = Block::default()
        .title(" Loading ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let area = centered_rect(60, 20, area);
    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(msg).block(block).wrap(Wrap { trim: true }),
        area,
    );
}

/// Centered rect using `percent_x` by `percent_y` of `r`.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
