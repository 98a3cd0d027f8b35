use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Rows")]
    pub rows: String,
}

/// One schema node in the `types` listing
#[derive(Tabled)]
pub struct TypeRow {
    #[tabled(rename = "Id")]
    pub id: i64,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Children")]
    pub children: String,
    #[tabled(rename = "Constraints")]
    pub constraints: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            kind: label.to_string(),
            rows: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn stats_table(stats: &[(&str, usize)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, count) in stats {
        builder.add_row(label, &count.to_string());
    }
    builder.build()
}

pub fn types_table(rows: &[TypeRow]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}
