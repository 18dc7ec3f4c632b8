use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Styles for each kind of line the CLI prints
#[derive(Debug, Clone)]
pub struct Theme {
    pub title: Style,
    pub added: Style,
    pub changed: Style,
    pub removed: Style,
    pub failure: Style,
    pub warning: Style,
    pub label: Style,
    /// Rupiah amounts in summaries
    pub amount: Style,
    /// Archive display labels
    pub archive: Style,
    /// Raw archive table names, paths
    pub muted: Style,
}

impl Theme {
    /// Colored on a terminal unless `NO_COLOR`/`CLICOLOR=0` says otherwise
    pub fn detect() -> Self {
        if console::Term::stdout().is_term() && console::colors_enabled() {
            Self::colored()
        } else {
            Self::plain()
        }
    }

    pub fn colored() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            added: Style::new().green().bold(),
            changed: Style::new().yellow(),
            removed: Style::new().red(),
            failure: Style::new().red().bold(),
            warning: Style::new().yellow().bold(),
            label: Style::new().white().dimmed(),
            amount: Style::new().green(),
            archive: Style::new().magenta().bold(),
            muted: Style::new().bright_black(),
        }
    }

    pub fn plain() -> Self {
        Self {
            title: Style::new(),
            added: Style::new(),
            changed: Style::new(),
            removed: Style::new(),
            failure: Style::new(),
            warning: Style::new(),
            label: Style::new(),
            amount: Style::new(),
            archive: Style::new(),
            muted: Style::new(),
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}
