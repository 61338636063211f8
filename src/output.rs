//! Output formatting for query results.
//!
//! Supports multiple output formats: table (human-readable), JSON, and toon.

use clap::ValueEnum;
use serde::Serialize;

use crate::db::{Column, Row};

/// Output format for command results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// Token-efficient toon format
    Toon,
}

/// Trait for types that can be formatted for output
pub trait Outputable: Serialize {
    /// Format as a human-readable table
    fn to_table(&self) -> String;

    /// Format according to the specified output format
    fn format(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Table => self.to_table(),
            OutputFormat::Json => serde_json::to_string_pretty(self).unwrap_or_default(),
            OutputFormat::Toon => {
                let json_value = serde_json::to_value(self).unwrap_or_default();
                toon::encode(&json_value, None)
            }
        }
    }
}

/// Rows fetched by one query, with the columns of the last row.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryOutput {
    pub query: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    /// Set when the row limit was reached; further rows may exist.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl QueryOutput {
    /// Column names in result order, without repeats; falls back to the row
    /// keys when no column description is available.
    fn headers(&self) -> Vec<String> {
        let mut headers: Vec<String> = Vec::new();
        for column in &self.columns {
            if !headers.contains(&column.name) {
                headers.push(column.name.clone());
            }
        }
        if headers.is_empty() {
            if let Some(first) = self.rows.first() {
                headers.extend(first.keys().cloned());
            }
        }
        headers
    }
}

impl Outputable for QueryOutput {
    fn to_table(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Query: {}", self.query));
        lines.push(String::new());

        if self.rows.is_empty() {
            lines.push("No rows.".to_string());
            return lines.join("\n");
        }

        let headers = self.headers();
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                headers
                    .iter()
                    .map(|name| row.get(name).map(|v| v.to_string()).unwrap_or_default())
                    .collect()
            })
            .collect();

        let widths: Vec<usize> = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                cells
                    .iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let render = |values: &[String]| {
            values
                .iter()
                .zip(&widths)
                .map(|(value, width)| format!("{:<width$}", value, width = *width))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };

        lines.push(render(&headers));
        lines.push(
            widths
                .iter()
                .map(|width| "-".repeat(*width))
                .collect::<Vec<_>>()
                .join("-+-"),
        );
        for row in &cells {
            lines.push(render(row));
        }

        lines.push(String::new());
        let noun = if self.rows.len() == 1 { "row" } else { "rows" };
        let suffix = if self.truncated { " (limit reached)" } else { "" };
        lines.push(format!("{} {}{}", self.rows.len(), noun, suffix));

        lines.join("\n")
    }
}
