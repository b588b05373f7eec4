use crate::plugins::catalog::RenderedMessage;
use colored::Colorize;
use std::env;

const MIN_BOX_WIDTH: usize = 40;
const MAX_BOX_WIDTH: usize = 72;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoxStyle {
    Info,
    Success,
    Warning,
    Error,
    Story,
}

pub fn terminal_width() -> usize {
    env::var("TERM_WIDTH")
        .ok()
        .and_then(|w| w.parse().ok())
        .or_else(|| env::var("COLUMNS").ok().and_then(|c| c.parse().ok()))
        .unwrap_or(80)
}

fn effective_width() -> usize {
    terminal_width().clamp(MIN_BOX_WIDTH, MAX_BOX_WIDTH)
}

pub fn box_top(width: usize) -> String {
    format!("╔{}╗", "═".repeat(width.saturating_sub(2)))
}

pub fn box_bottom(width: usize) -> String {
    format!("╚{}╝", "═".repeat(width.saturating_sub(2)))
}

/// Left-aligned row padded to `width` including the borders.
pub fn box_row(content: &str, width: usize) -> String {
    let inner = width.saturating_sub(4);
    let len = content.chars().count();
    format!("║ {}{} ║", content, " ".repeat(inner.saturating_sub(len)))
}

/// Greedy word wrap; blank lines in the input are kept.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > width {
                out.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        out.push(line);
    }
    out
}

fn paint(text: String, style: BoxStyle) -> colored::ColoredString {
    match style {
        BoxStyle::Info => text.bright_cyan(),
        BoxStyle::Success => text.bright_green(),
        BoxStyle::Warning => text.bright_yellow(),
        BoxStyle::Error => text.bright_red(),
        BoxStyle::Story => text.bright_magenta(),
    }
}

pub fn render_box(title: &str, body: &str, style: BoxStyle) {
    let width = effective_width();
    println!("{}", paint(box_top(width), style));
    println!("{}", paint(box_row(title, width), style).bold());
    if !body.is_empty() {
        println!("{}", paint(box_row("", width), style));
        for line in wrap(body, width - 4) {
            println!("{}", paint(box_row(&line, width), style));
        }
    }
    println!("{}", paint(box_bottom(width), style));
}

pub fn render_mail(message: &RenderedMessage) {
    let title = format!("From: {}  Subject: {}", message.from, message.subject);
    render_box(&title, &message.body, BoxStyle::Info);
}

pub fn render_cutscene(text: &str) {
    render_box("* * *", text, BoxStyle::Story);
}

pub fn render_notice(text: &str) {
    println!("{} {}", "!".bright_yellow().bold(), text.yellow());
}

pub fn render_error(text: &str) {
    println!("{} {}", "x".bright_red().bold(), text.red());
}
