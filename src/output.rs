//! Diagnostics for the proxy.
//!
//! Stdout carries the SSH byte stream once the plugin runs, so everything here
//! goes to stderr.

use colored::*;

/// Enables color only when stderr is attached to a terminal.
pub fn init_color() {
    colored::control::set_override(atty::is(atty::Stream::Stderr));
}

pub fn print_info(message: &str) {
    eprintln!("{} {}", "[INFO]".blue().bold(), message);
}

pub fn print_debug(message: &str, verbose: bool) {
    if verbose {
        eprintln!("{} {}", "[DEBUG]".cyan().bold(), message);
    }
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", "[WARNING]".yellow().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}
