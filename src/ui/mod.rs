pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{error, header, info, is_quiet, section, skipped_row, success, warn};
pub use table::{foreign_key_table, load_table, stats_table};
pub use theme::{theme, Theme};
