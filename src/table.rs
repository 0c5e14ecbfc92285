use std::borrow::Cow;
use std::fmt::Write as _;

/// Plain-text table for the diagnostic commands. Columns whose cells are all
/// numeric are right-aligned.
#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Table {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row = cells.into_iter().map(Into::into).collect::<Vec<_>>();
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let mut widths = self
            .headers
            .iter()
            .map(|h| display_width(h).max(3))
            .collect::<Vec<_>>();
        for row in &self.rows {
            for (idx, cell) in row.iter().enumerate() {
                widths[idx] = widths[idx].max(display_width(cell));
            }
        }
        let numeric = (0..self.headers.len())
            .map(|idx| {
                self.rows.iter().any(|r| !r[idx].is_empty())
                    && self
                        .rows
                        .iter()
                        .all(|r| r[idx].is_empty() || is_numeric(&r[idx]))
            })
            .collect::<Vec<_>>();

        let mut output = String::new();
        let _ = writeln!(output, "{}", format_row(&self.headers, &widths, &[]));
        let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
        let _ = writeln!(output, "{}", format_row(&rule, &widths, &[]));
        for row in &self.rows {
            let _ = writeln!(output, "{}", format_row(row, &widths, &numeric));
        }
        output
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }
}

fn is_numeric(cell: &str) -> bool {
    cell.trim_end_matches('%').parse::<f64>().is_ok()
}

fn format_row(values: &[String], widths: &[usize], right_align: &[bool]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(idx, (value, width))| {
            let cell = sanitize_cell(value);
            let padding = " ".repeat(width.saturating_sub(display_width(&cell)));
            if right_align.get(idx).copied().unwrap_or(false) {
                format!("{padding}{cell}")
            } else {
                format!("{cell}{padding}")
            }
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_columns_align_right() {
        let mut table = Table::new(["Source", "Rows"]);
        table.push_row(["SalesTrend", "12"]);
        table.push_row(["TopBrandsBySales", "3"]);
        let rendered = table.render();
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "Source            Rows");
        assert_eq!(lines[2], "SalesTrend          12");
        assert_eq!(lines[3], "TopBrandsBySales     3");
    }

    #[test]
    fn short_rows_are_padded_and_newlines_flattened() {
        let mut table = Table::new(["A", "B"]);
        table.push_row(["x\ny"]);
        let rendered = table.render();
        assert!(rendered.lines().nth(2).is_some_and(|l| l == "x y"));
    }
}
