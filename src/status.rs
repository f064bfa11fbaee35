use crate::storage::entities::SessionSummary;

/// Where status text ends up. The host editor owns the actual status bar
/// widget; the tracker only pushes strings at it.
#[cfg_attr(test, mockall::automock)]
pub trait StatusSink: Send {
    fn show_status(&mut self, text: &str, tooltip: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusText {
    pub text: String,
    pub tooltip: String,
}

/// Short status-bar line: wall clock time, with a rocket when today already
/// beats the server-side daily average.
pub fn build_status_text(summary: &SessionSummary, humanized_wc_time: &str) -> StatusText {
    let in_flow = summary.current_day_minutes > summary.average_daily_minutes;
    let icon = if in_flow { "🚀 " } else { "" };
    StatusText {
        text: format!("{icon}{humanized_wc_time}"),
        tooltip: format!(
            "Code time today: {:.0} min (average {:.0} min)",
            summary.current_day_minutes, summary.average_daily_minutes
        ),
    }
}
