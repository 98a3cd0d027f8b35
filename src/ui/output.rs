use crate::storable::StorableKind;
use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::BOOK, text.style(theme().header.clone()));
}

pub fn status(icon: &str, label: &str, value: &str) {
    println!("{} {}: {}", icon, label.style(theme().dim.clone()), value);
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().error.clone()));
}

pub fn dim(text: &str) -> String {
    text.style(theme().dim.clone()).to_string()
}

pub fn muted(text: &str) -> String {
    text.style(theme().muted.clone()).to_string()
}

/// Kind name colored by schema/instance
pub fn kind_label(kind: StorableKind) -> String {
    let style = if kind.is_type() {
        theme().schema.clone()
    } else {
        theme().instance.clone()
    };
    kind.as_str().style(style).to_string()
}

/// One line of an indented node tree
pub fn tree_line(depth: usize, icon: &str, text: &str) {
    println!("{}{} {}", "  ".repeat(depth), icon, text);
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().dim.clone()), value);
}
