use crate::models::{Collection, Record};
use colored::Colorize;
use prettytable::{format, Cell, Row, Table};

pub struct DisplayFormatter;

impl DisplayFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn format_header(&self, text: &str) -> String {
        format!("\n=== {} ===", text.bright_white().bold())
    }

    /// Columns shown when listing each kind of record.
    pub fn columns(&self, collection: Collection) -> &'static [&'static str] {
        match collection {
            Collection::Craftsmen => &["name", "specialty", "phone", "address"],
            Collection::Machines => &["name", "type", "phone", "price"],
            Collection::Shops => &["name", "phone", "address", "status"],
            Collection::Offers => &["title", "shop_id", "price"],
            Collection::Ads => &["title", "description"],
            Collection::News => &["title", "content"],
            Collection::Emergency => &["name", "phone"],
        }
    }

    pub fn format_record_table(&self, collection: Collection, records: &[Record]) -> String {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);

        let columns = self.columns(collection);
        let mut headers: Vec<Cell> = vec![Cell::new("id").style_spec("b")];
        headers.extend(columns.iter().map(|c| Cell::new(c).style_spec("b")));
        if collection.is_approvable() {
            headers.push(Cell::new("review").style_spec("b"));
        }
        table.add_row(Row::new(headers));

        for record in records {
            let mut cells = vec![Cell::new(&short_id(&record.id))];
            cells.extend(columns.iter().map(|c| {
                Cell::new(&truncate(&record.get_str(c).unwrap_or_default(), 40))
            }));
            if collection.is_approvable() {
                cells.push(Cell::new(&self.format_review_state(record)));
            }
            table.add_row(Row::new(cells));
        }

        table.to_string()
    }

    pub fn format_review_state(&self, record: &Record) -> String {
        if record.is_approved() {
            "approved".green().to_string()
        } else if record.is_rejected() {
            "rejected".red().to_string()
        } else {
            "pending".yellow().to_string()
        }
    }

    pub fn format_record(&self, collection: Collection, record: &Record) -> String {
        let mut output = Vec::new();
        output.push(self.format_header(&format!("{} {}", collection, record.id)));
        for (key, value) in &record.fields {
            if key == "password" {
                continue;
            }
            let shown = match value.as_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            };
            output.push(format!("{:<12} {}", format!("{}:", key), shown));
        }
        output.push(format!("{:<12} {}", "created:", record.created_at.format("%Y-%m-%d %H:%M")));
        output.push(format!("{:<12} {}", "updated:", record.updated_at.format("%Y-%m-%d %H:%M")));

        output.join("\n")
    }
}

impl Default for DisplayFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_hides_passwords_and_shows_review_state() {
        colored::control::set_override(false);
        let display = DisplayFormatter::new();
        let mut offer = Record::new(json!({"title": "Half price", "shop_id": "s1"}).as_object().cloned().unwrap());
        offer.set("approved", true);

        let table = display.format_record_table(Collection::Offers, &[offer]);
        assert!(table.contains("Half price"));
        assert!(table.contains("approved"));

        let shop = Record::new(
            json!({"name": "Corner", "phone": "0599", "password": "hash"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let detail = display.format_record(Collection::Shops, &shop);
        assert!(detail.contains("Corner"));
        assert!(!detail.contains("hash"));
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate("مرحبا بالعالم", 5), "مرحب…");
        assert_eq!(truncate("short", 40), "short");
    }
}
