pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{
    dim, error, header, kind_label, muted, status, success, summary_row, tree_line,
};
pub use table::{stats_table, types_table, TableBuilder, TypeRow};
pub use theme::{theme, Theme};
