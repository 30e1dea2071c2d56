//! Output formatter for human-readable and JSON output
//!
//! Ensures consistent output formatting across all commands.

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use super::OutputConfig;

/// Color theme for styled output
#[derive(Debug, Clone)]
pub struct Theme {
    /// Bucket names - bold
    pub name: Style,
    /// File names - default
    pub file: Style,
    /// Folder entries - blue + bold
    pub folder: Style,
    /// Sizes - green
    pub size: Style,
    /// Timestamps - dim
    pub date: Style,
    /// Success messages - green
    pub success: Style,
    /// Error messages - red
    pub error: Style,
    /// Warning messages - yellow
    pub warning: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            name: Style::new().bold(),
            file: Style::new(),
            folder: Style::new().blue().bold(),
            size: Style::new().green(),
            date: Style::new().dim(),
            success: Style::new().green(),
            error: Style::new().red(),
            warning: Style::new().yellow(),
        }
    }
}

impl Theme {
    /// Returns a theme with no styling (for no-color mode)
    pub fn plain() -> Self {
        Self {
            name: Style::new(),
            file: Style::new(),
            folder: Style::new(),
            size: Style::new(),
            date: Style::new(),
            success: Style::new(),
            error: Style::new(),
            warning: Style::new(),
        }
    }
}

/// Formatter for CLI output
///
/// When JSON mode is enabled, all output is strict JSON without colors or
/// progress bars.
#[derive(Debug, Clone)]
pub struct Formatter {
    config: OutputConfig,
    theme: Theme,
}

impl Formatter {
    pub fn new(config: OutputConfig) -> Self {
        let theme = if config.no_color || config.json {
            Theme::plain()
        } else {
            Theme::default()
        };
        Self { config, theme }
    }

    pub fn is_json(&self) -> bool {
        self.config.json
    }

    pub fn is_quiet(&self) -> bool {
        self.config.quiet
    }

    pub fn is_verbose(&self) -> bool {
        self.config.verbose && !self.config.quiet && !self.config.json
    }

    pub fn colors_enabled(&self) -> bool {
        !self.config.no_color && !self.config.json
    }

    // ========== Style helper methods ==========

    /// Style a bucket name (bold)
    pub fn style_name(&self, text: &str) -> String {
        self.theme.name.apply_to(text).to_string()
    }

    pub fn style_file(&self, text: &str) -> String {
        self.theme.file.apply_to(text).to_string()
    }

    /// Style a folder entry of a delimited listing (blue + bold)
    pub fn style_folder(&self, text: &str) -> String {
        self.theme.folder.apply_to(text).to_string()
    }

    /// Style a size (green)
    pub fn style_size(&self, text: &str) -> String {
        self.theme.size.apply_to(text).to_string()
    }

    /// Style a timestamp (dim)
    pub fn style_date(&self, text: &str) -> String {
        self.theme.date.apply_to(text).to_string()
    }

    // ========== Output methods ==========

    /// Output a success message
    pub fn success(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }

        let checkmark = self.theme.success.apply_to("✓");
        println!("{checkmark} {message}");
    }

    /// Output an error message
    ///
    /// Errors are always printed, even in quiet mode.
    pub fn error(&self, message: &str) {
        if self.config.json {
            let error = serde_json::json!({
                "error": message
            });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&error).unwrap_or_else(|_| message.to_string())
            );
        } else {
            let cross = self.theme.error.apply_to("✗");
            eprintln!("{cross} {message}");
        }
    }

    /// Output a warning message
    pub fn warning(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }

        let warn_icon = self.theme.warning.apply_to("⚠");
        eprintln!("{warn_icon} {message}");
    }

    /// Output JSON directly
    pub fn json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error serializing output: {e}"),
        }
    }

    /// Print a line of text (respects quiet mode)
    pub fn println(&self, message: &str) {
        if self.config.quiet {
            return;
        }
        println!("{message}");
    }

    /// Print a table with the given header row (respects quiet mode)
    pub fn table(&self, header: &[&str], rows: Vec<Vec<String>>) {
        if self.config.quiet {
            return;
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(header.to_vec());
        if !self.colors_enabled() {
            table.force_no_tty();
        }
        for row in rows {
            table.add_row(row);
        }
        println!("{table}");
    }

    /// Progress bar counting finished files
    ///
    /// Hidden in JSON and quiet mode.
    pub fn progress_bar(&self, total: u64, action: &str) -> ProgressBar {
        if self.is_json() || self.is_quiet() {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new(total);
        let template = format!("{action} [{{bar:30}}] {{pos}}/{{len}} files, {{msg}}");
        if let Ok(style) = ProgressStyle::with_template(&template) {
            bar.set_style(style.progress_chars("=> "));
        }
        bar
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(OutputConfig::default())
    }
}

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Human-readable upload timestamp
pub fn format_timestamp(ts: Option<jiff::Timestamp>) -> String {
    ts.map(|t| t.strftime("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
