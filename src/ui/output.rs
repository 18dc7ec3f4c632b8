use crate::money::Money;
use crate::photo::PhotoWarning;
use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::BOOK, text.style(theme().title.clone()));
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().added.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().failure.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warning.clone()));
}

/// Photo problems go to stderr; the row change itself succeeded
pub fn photo_warning(warning: &PhotoWarning) {
    eprintln!(
        "{} {} {}",
        Icons::PHOTO,
        warning.reason.style(theme().warning.clone()),
        warning.path.style(theme().muted.clone())
    );
}

pub fn info(label: &str, value: &str) {
    println!("{} {}: {}", Icons::INFO, label.style(theme().label.clone()), value);
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().title.clone()));
}

pub fn muted(text: &str) -> String {
    text.style(theme().muted.clone()).to_string()
}

pub fn record_added(kind: &str, id: i64) {
    println!("{} {} #{}", Icons::NEW.style(theme().added.clone()), kind, id);
}

pub fn record_updated(kind: &str, id: i64) {
    println!("{} {} #{}", Icons::MOD.style(theme().changed.clone()), kind, id);
}

pub fn record_deleted(kind: &str, id: i64) {
    println!("{} {} #{}", Icons::DEL.style(theme().removed.clone()), kind, id);
}

pub fn archive_closed(name: &str, label: &str) {
    println!(
        "{} {} {}",
        Icons::ARCHIVE,
        label.style(theme().archive.clone()),
        name.style(theme().muted.clone())
    );
}

pub fn amount_row(label: &str, amount: Money) {
    println!("  {} {}", label.style(theme().label.clone()), amount.to_string().style(theme().amount.clone()));
}
