use tabled::builder::Builder;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Default)]
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

/// Table with a header row and arbitrary columns
pub fn grid(headers: &[String], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let mut builder = Builder::default();
    builder.push_record(headers.iter().cloned());
    for row in rows {
        builder.push_record(row.iter().cloned());
    }
    builder.build().with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_contains_cells() {
        let out = grid(
            &["ID".to_string(), "Nama".to_string()],
            &[vec!["1".to_string(), "Andi".to_string()]],
        );
        assert!(out.contains("Nama"));
        assert!(out.contains("Andi"));
        assert!(grid(&["ID".to_string()], &[]).is_empty());
    }

    #[test]
    fn test_builder_skips_empty() {
        let mut builder = TableBuilder::new();
        assert!(builder.build().is_empty());
        builder.add_row("Total Komisi", "Rp 750.000");
        assert!(builder.build().contains("Total Komisi"));
    }
}
