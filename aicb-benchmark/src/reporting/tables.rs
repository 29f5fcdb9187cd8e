//! Flat tables and their CSV, JSON and Markdown encodings

use std::io::Write;

use serde_json::{Map, Value};

use crate::config::OutputFormat;

/// Decimal places for every score written to a report
pub const SCORE_DECIMALS: usize = 6;

/// Round to [`SCORE_DECIMALS`] places
pub fn round_score(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// A single table cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Count(usize),
    Score(f64),
}

impl Cell {
    fn render(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Count(n) => n.to_string(),
            Cell::Score(x) => format!("{:.*}", SCORE_DECIMALS, x),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Cell::Text(s) => Value::String(s.clone()),
            Cell::Count(n) => Value::from(*n),
            Cell::Score(x) => Value::from(round_score(*x)),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

/// Header plus rows, in output order
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(headers: Vec<&'static str>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.headers.len());
        self.rows.push(row);
    }

    pub fn write<W: Write>(&self, out: &mut W, format: OutputFormat) -> std::io::Result<()> {
        match format {
            OutputFormat::Csv => self.write_csv(out),
            OutputFormat::Json => self.write_json(out),
            OutputFormat::Markdown => self.write_markdown(out),
        }
    }

    fn write_csv<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "{}", self.headers.join(","))?;
        for row in &self.rows {
            let fields: Vec<String> = row.iter().map(|c| csv_field(&c.render())).collect();
            writeln!(out, "{}", fields.join(","))?;
        }
        Ok(())
    }

    /// Array of objects keyed by header, keys in column order
    fn write_json<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        let records: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                let object: Map<String, Value> = self
                    .headers
                    .iter()
                    .zip(row)
                    .map(|(header, cell)| (header.to_string(), cell.to_json()))
                    .collect();
                Value::Object(object)
            })
            .collect();

        serde_json::to_writer_pretty(&mut *out, &records)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(out)
    }

    fn write_markdown<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "| {} |", self.headers.join(" | "))?;
        let separator: Vec<&str> = self.headers.iter().map(|_| "---").collect();
        writeln!(out, "| {} |", separator.join(" | "))?;
        for row in &self.rows {
            let fields: Vec<String> = row.iter().map(|c| markdown_field(&c.render())).collect();
            writeln!(out, "| {} |", fields.join(" | "))?;
        }
        Ok(())
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn markdown_field(value: &str) -> String {
    value
        .replace('|', "\\|")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}
