use ratatui::style::{Color, Modifier, Style};

pub struct Theme;

impl Theme {
    // Dracula palette
    pub const BG: Color = Color::Rgb(40, 42, 54);
    pub const FG: Color = Color::Rgb(248, 248, 242);
    pub const COMMENT: Color = Color::Rgb(98, 114, 164);
    pub const CYAN: Color = Color::Rgb(139, 233, 253);
    pub const GREEN: Color = Color::Rgb(80, 250, 123);
    pub const PINK: Color = Color::Rgb(255, 121, 198);
    pub const RED: Color = Color::Rgb(255, 85, 85);
    pub const YELLOW: Color = Color::Rgb(241, 250, 140);

    pub fn header(focused: bool) -> Style {
        if focused {
            Style::default().fg(Self::FG).bg(Self::BG).add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Self::FG).bg(Self::BG).add_modifier(Modifier::BOLD)
        }
    }

    pub fn input(editing: bool) -> Style {
        if editing { Style::default().fg(Self::YELLOW) } else { Style::default().fg(Self::FG) }
    }

    pub fn table_header() -> Style { Style::default().fg(Self::CYAN).add_modifier(Modifier::BOLD) }
    pub fn row() -> Style { Style::default().fg(Self::FG) }
    pub fn latest_row() -> Style { Style::default().fg(Self::PINK).add_modifier(Modifier::BOLD) }
    pub fn gauge() -> Style { Style::default().fg(Self::GREEN).bg(Self::BG) }
    pub fn activity() -> Style { Style::default().fg(Self::GREEN) }
    pub fn hint() -> Style { Style::default().fg(Self::COMMENT) }
    pub fn status() -> Style { Style::default().fg(Self::FG) }
    pub fn error() -> Style { Style::default().fg(Self::RED).add_modifier(Modifier::BOLD) }
}
