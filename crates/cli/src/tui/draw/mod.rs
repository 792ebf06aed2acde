pub mod theme;
mod activity;
mod calls;
mod events;
mod footer;
mod header;
mod overlay;
mod overview;

pub use activity::draw_activity;
pub use calls::draw_calls;
pub use events::draw_events;
pub use footer::draw_footer;
pub use header::draw_header_tabs;
pub use overlay::{draw_detail, draw_overlay};
pub use overview::draw_overview;

pub use theme::{get_theme, ThemeColors, ThemeKind};
