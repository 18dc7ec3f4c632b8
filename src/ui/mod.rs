pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{
    amount_row, archive_closed, error, header, info, muted, photo_warning, record_added, record_deleted,
    record_updated, section, success, warn,
};
pub use table::{grid, TableBuilder};
pub use theme::{theme, Theme};
