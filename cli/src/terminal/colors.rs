use colored::Color;

pub const PRIMARY: Color = Color::BrightGreen;
pub const ACCENT: Color = Color::Cyan;
pub const SEPARATOR: Color = Color::BrightBlack;
pub const TEXT_DEFAULT: Color = Color::White;

pub const PORT_OPEN: Color = Color::Green;
pub const PORT_CLOSED: Color = Color::Red;
pub const PORT_OTHER: Color = Color::Yellow;
