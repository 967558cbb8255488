//! Ratatui widgets for the session UI.

mod activity_gauge;
mod session_view;

pub use activity_gauge::ActivityGauge;
pub use session_view::{SessionFocus, SessionKeyAction, SessionView};
