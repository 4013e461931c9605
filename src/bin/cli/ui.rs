use std::fmt::Display;
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use nu_ansi_term::{Color, Style};
use strudex::check::{sink::SinkError, ProgressSink, ProgressSnapshot};

const TICKS: &str = "⠁⠂⠄⡀⢀⠠⠐⠈";
const TICK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum Theme {
    Auto,
    Light,
    Dark,
    Plain,
}

impl Theme {
    fn palette(self) -> Palette {
        match self {
            Theme::Plain => Palette::default(),
            Theme::Light => Palette {
                heading: Color::Blue.bold(),
                key: Color::DarkGray.bold(),
                accent: Color::Blue.normal(),
                ok: Color::Green.bold(),
                caution: Color::Red.bold(),
            },
            Theme::Dark | Theme::Auto => Palette {
                heading: Color::LightPurple.bold(),
                key: Color::LightCyan.bold(),
                accent: Color::Cyan.normal(),
                ok: Color::LightGreen.bold(),
                caution: Color::Yellow.bold(),
            },
        }
    }
}

#[derive(Default)]
struct Palette {
    heading: Style,
    key: Style,
    accent: Style,
    ok: Style,
    caution: Style,
}

#[derive(Clone, Copy)]
enum Tone {
    Info,
    Success,
    Warning,
}

impl Tone {
    fn marker(self) -> &'static str {
        match self {
            Tone::Info => "·",
            Tone::Success => "✓",
            Tone::Warning => "!",
        }
    }
}

/// Terminal output for the text format. Quiet mode drops decoration and
/// progress bars but keeps every message.
pub struct Ui {
    palette: Palette,
    paint: bool,
    quiet: bool,
}

impl Ui {
    pub fn new(theme: Theme, quiet: bool) -> Self {
        let paint = !quiet && theme != Theme::Plain && std::io::stdout().is_terminal();
        #[cfg(windows)]
        if paint {
            let _ = nu_ansi_term::enable_ansi_support();
        }
        Self {
            palette: theme.palette(),
            paint,
            quiet,
        }
    }

    pub fn spacer(&self) {
        if !self.quiet {
            println!();
        }
    }

    /// Prints `rows` as right-aligned `key: value` pairs under `title`.
    pub fn section<'a, I, V>(&self, title: &str, rows: I)
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Display,
    {
        let rows: Vec<(&str, String)> = rows
            .into_iter()
            .map(|(key, value)| (key, value.to_string()))
            .collect();
        let Some(width) = rows.iter().map(|(key, _)| key.len()).max() else {
            return;
        };
        self.heading(title);
        for (key, value) in rows {
            let key = format!("{key:>width$}:");
            println!("  {} {value}", self.paint(&self.palette.key, &key));
        }
    }

    pub fn list<I>(&self, title: &str, entries: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut entries = entries.into_iter().peekable();
        if entries.peek().is_none() {
            return;
        }
        self.heading(title);
        let bullet = self.paint(&self.palette.accent, "-");
        for entry in entries {
            println!("  {bullet} {entry}");
        }
    }

    pub fn info(&self, message: &str) {
        self.status(Tone::Info, message);
    }

    pub fn success(&self, message: &str) {
        self.status(Tone::Success, message);
    }

    pub fn warn(&self, message: &str) {
        self.status(Tone::Warning, message);
    }

    /// Spinner shown until [`Task::finish`]; dropping it unfinished reports
    /// the interruption.
    pub fn task(&self, label: impl Into<String>) -> Task<'_> {
        let label = label.into();
        let bar = (!self.quiet).then(|| {
            let bar = self.spinner("{prefix} {spinner} {msg}");
            bar.set_message(label.clone());
            bar
        });
        Task {
            ui: self,
            label,
            started: Instant::now(),
            bar,
            done: false,
        }
    }

    /// Live counter fed by checker snapshots.
    pub fn check_progress(&self, checker: &str) -> CheckProgress {
        if self.quiet {
            return CheckProgress {
                bar: ProgressBar::hidden(),
            };
        }
        let bar = self.spinner("{prefix} {spinner} {pos} items, {msg} [{elapsed}]");
        bar.set_prefix(self.paint(&self.palette.heading, checker));
        CheckProgress { bar }
    }

    fn spinner(&self, template: &str) -> ProgressBar {
        let style = ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars(TICKS);
        let bar = ProgressBar::new_spinner().with_style(style);
        bar.enable_steady_tick(TICK_INTERVAL);
        bar
    }

    fn heading(&self, title: &str) {
        println!("{}", self.paint(&self.palette.heading, title));
    }

    fn status(&self, tone: Tone, message: &str) {
        let line = if self.quiet {
            message.to_string()
        } else {
            let style = match tone {
                Tone::Info => &self.palette.accent,
                Tone::Success => &self.palette.ok,
                Tone::Warning => &self.palette.caution,
            };
            format!("{} {message}", self.paint(style, tone.marker()))
        };
        match tone {
            Tone::Warning => eprintln!("{line}"),
            Tone::Info | Tone::Success => println!("{line}"),
        }
    }

    fn paint(&self, style: &Style, text: &str) -> String {
        if self.paint {
            style.paint(text).to_string()
        } else {
            text.to_string()
        }
    }
}

pub struct Task<'a> {
    ui: &'a Ui,
    label: String,
    started: Instant,
    bar: Option<ProgressBar>,
    done: bool,
}

impl Task<'_> {
    pub fn finish(mut self) -> Duration {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        self.done = true;
        self.started.elapsed()
    }
}

impl Drop for Task<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let message = format!(
            "{} interrupted after {}",
            self.label,
            format_duration(self.started.elapsed())
        );
        match self.bar.take() {
            Some(bar) => bar.abandon_with_message(message),
            None => self.ui.warn(&message),
        }
    }
}

pub struct CheckProgress {
    bar: ProgressBar,
}

impl ProgressSink for CheckProgress {
    fn push(&self, snapshot: &ProgressSnapshot) -> Result<(), SinkError> {
        let issues: u64 = snapshot.category_totals.values().sum();
        self.bar.set_position(snapshot.processed);
        self.bar
            .set_message(format!("{issues} issues, {} failed", snapshot.failed));
        if snapshot.final_flush {
            self.bar.finish_and_clear();
        }
        Ok(())
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 1.0 {
        format!("{secs:.2}s")
    } else {
        format!("{:.0}ms", secs * 1_000.0)
    }
}
