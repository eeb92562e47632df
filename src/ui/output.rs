use crate::location::Diagnostic;
use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::ROCKET, text.style(theme().header.clone()));
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

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warn.clone()));
}

pub fn info(label: &str, value: &str) {
    println!(
        "{} {}: {}",
        Icons::INFO.style(theme().info.clone()),
        label.style(theme().dim.clone()),
        value
    );
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

pub fn muted(text: &str) -> String {
    text.style(theme().muted.clone()).to_string()
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().dim.clone()), value);
}

/// One diagnostic line: severity icon, kind, where, message.
pub fn diagnostic(diag: &Diagnostic) {
    let (icon, style) = if diag.fatal {
        (Icons::FATAL, theme().error.clone())
    } else {
        (Icons::ERROR, theme().warn.clone())
    };
    let place = diag
        .location
        .as_ref()
        .map(|l| l.short_form())
        .or_else(|| diag.path.clone())
        .unwrap_or_default();
    println!(
        "{} {} {} {}",
        icon,
        format!("[{}]", diag.kind).style(style),
        place.style(theme().muted.clone()),
        diag.message
    );
}
