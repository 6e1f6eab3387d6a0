//! Coloured operator output for crawl sessions

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};
use termcolor::{Buffer, Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tracing::debug;

use crate::fields::PRESET_NAMES;
use crate::session::options::SessionOptions;
use crate::validator::{Finding, Severity};

enum Target {
    Stream(StandardStream),
    Buffer(Buffer),
}

/// Line-oriented console reporter. Write failures are logged and never
/// interrupt a crawl.
pub struct Console {
    target: Mutex<Target>,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

impl Console {
    /// Report to stdout, coloured when `color` is set and the terminal allows it
    pub fn stdout(color: bool) -> Self {
        let choice = if color {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        };
        Self {
            target: Mutex::new(Target::Stream(StandardStream::stdout(choice))),
        }
    }

    /// Collect output in memory without colours
    pub fn buffer() -> Self {
        Self {
            target: Mutex::new(Target::Buffer(Buffer::no_color())),
        }
    }

    /// Everything written so far to an in-memory console
    pub fn contents(&self) -> String {
        match &*self.target.lock().unwrap_or_else(PoisonError::into_inner) {
            Target::Buffer(buffer) => String::from_utf8_lossy(buffer.as_slice()).into_owned(),
            Target::Stream(_) => String::new(),
        }
    }

    pub fn print(&self, text: &str) {
        self.write_line(&[(None, text)]);
    }

    pub fn warn(&self, text: &str) {
        self.write_line(&[(Some(Color::Yellow), text)]);
    }

    pub fn error(&self, text: &str) {
        self.write_line(&[(Some(Color::Red), text)]);
    }

    /// Print validation findings as `name: message`, coloured by severity
    pub fn findings(&self, findings: &BTreeMap<String, Finding>) {
        if findings.is_empty() {
            return;
        }
        let labels: Vec<String> = findings.keys().map(|name| format!("{}: ", name)).collect();
        let mut segments: Vec<(Option<Color>, &str)> = Vec::new();
        for (i, (label, finding)) in labels.iter().zip(findings.values()).enumerate() {
            if i > 0 {
                segments.push((None, ", "));
            }
            segments.push((None, label.as_str()));
            segments.push((Some(severity_color(finding.severity)), finding.message.as_str()));
        }
        self.write_line(&segments);
    }

    /// Print the options summary shown before the first crawl
    pub fn brief(&self, options: &SessionOptions) {
        let yes_no = |flag: bool| String::from(if flag { "yes" } else { "no" });
        let hint = |show: bool, flag: &str| if show { flag.to_string() } else { String::new() };

        let lines = [
            (
                "Preset",
                options.preset.clone(),
                format!("--preset [{}]", PRESET_NAMES.join(", ")),
            ),
            (
                "Threads",
                options.max_concurrency.to_string(),
                "-c threads".to_string(),
            ),
            ("Delay", options.delay_ms.to_string(), "--delay ms".to_string()),
            (
                "Ignore robots.txt",
                yes_no(!options.obey_robots_txt),
                hint(options.obey_robots_txt, "--ignore-robots-txt"),
            ),
            (
                "Follow sitemap.xml",
                yes_no(options.follow_sitemap),
                hint(!options.follow_sitemap, "--follow-xml-sitemap"),
            ),
            ("Max depth", options.max_depth.to_string(), "-d 8".to_string()),
            (
                "Max requests",
                options
                    .max_requests
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "unlimited".to_string()),
                "-m 123".to_string(),
            ),
            (
                "Headless",
                yes_no(options.headless),
                hint(options.headless, "--no-headless"),
            ),
            (
                "Save as XLSX",
                yes_no(options.export.xlsx),
                hint(!options.export.xlsx, "--xlsx"),
            ),
            (
                "Save as JSON",
                yes_no(options.export.json),
                hint(options.export.json, "--no-json"),
            ),
            (
                "Docs extensions",
                options.docs_extensions.join(","),
                "--docs-extensions zip,rar".to_string(),
            ),
        ];

        self.print("");
        for (name, value, comment) in lines {
            let columns = format!("{:<20}{:<10}", name, value);
            let comment = if comment.is_empty() {
                comment
            } else {
                format!(" {}", comment)
            };
            self.write_line(&[(Some(Color::White), columns.as_str()), (None, comment.as_str())]);
        }
        self.print("");
    }

    fn write_line(&self, segments: &[(Option<Color>, &str)]) {
        let mut target = self.target.lock().unwrap_or_else(PoisonError::into_inner);
        let result = match &mut *target {
            Target::Stream(stream) => write_segments(stream, segments),
            Target::Buffer(buffer) => write_segments(buffer, segments),
        };
        if let Err(e) = result {
            debug!("Console write failed: {}", e);
        }
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Warning => Color::Yellow,
        Severity::Error => Color::Red,
    }
}

fn write_segments<W: WriteColor>(out: &mut W, segments: &[(Option<Color>, &str)]) -> io::Result<()> {
    for (color, text) in segments {
        match color {
            Some(color) => {
                let mut spec = ColorSpec::new();
                spec.set_fg(Some(*color));
                out.set_color(&spec)?;
                write!(out, "{}", text)?;
                out.reset()?;
            }
            None => write!(out, "{}", text)?,
        }
    }
    writeln!(out)?;
    out.flush()
}
