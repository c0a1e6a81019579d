//! Custom panic handler for daemon crash diagnostics.
//!
//! A spawned daemon has no terminal, so panics are also appended to
//! `crash.log` in the data directory.

use crate::config::Config;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::panic::{self, PanicHookInfo};
use std::path::PathBuf;

/// Install the custom panic handler.
///
/// Call first thing in `main`, before logging is set up.
pub fn install() {
    panic::set_hook(Box::new(|info| {
        handle_panic(info);
    }));
}

fn crash_report_path() -> Option<PathBuf> {
    Config::data_dir().ok().map(|dir| dir.join("crash.log"))
}

fn handle_panic(info: &PanicHookInfo) {
    let crash_report = format_crash_report(info);

    eprintln!("{}", crash_report);

    if let Some(path) = crash_report_path() {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        // Append so earlier reports survive
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) {
            let _ = file.write_all(b"\n\n========================================\n\n");
            let _ = file.write_all(crash_report.as_bytes());
            let _ = file.flush();
            eprintln!("\nCrash report appended to: {}", path.display());
        }
    }
}

fn format_crash_report(info: &PanicHookInfo) -> String {
    let location = info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_else(|| "unknown".to_string());

    let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    };

    render_report(
        &chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        std::thread::current().name().unwrap_or("<unnamed>"),
        &location,
        &payload,
        &std::backtrace::Backtrace::force_capture().to_string(),
    )
}

fn render_report(time: &str, thread: &str, location: &str, message: &str, backtrace: &str) -> String {
    format!(
        r"
================================================================================
CLIPOCR CRASH REPORT
================================================================================
Time:     {}
PID:      {}
Thread:   {}
Location: {}
Message:  {}

Backtrace:
{}
================================================================================
",
        time,
        std::process::id(),
        thread,
        location,
        message,
        backtrace,
    )
}
