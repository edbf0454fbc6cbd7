// streamctl - CLI for the Stream activity log
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::record::FlatRecord;
use anyhow::{Context, Result};
use std::io::Write;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Table,
    Count,
    Json,
    JsonPretty,
    Csv,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown output format `{0}` (expected table, count, json, json_pretty or csv)")]
pub struct UnknownFormat(pub String);

impl FromStr for Format {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(Format::Table),
            "count" => Ok(Format::Count),
            "json" => Ok(Format::Json),
            "json_pretty" => Ok(Format::JsonPretty),
            "csv" => Ok(Format::Csv),
            other => Err(UnknownFormat(other.to_string())),
        }
    }
}

pub fn new_table(headers: Vec<&str>) -> comfy_table::Table {
    let mut table = comfy_table::Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
        .apply_modifier(comfy_table::modifiers::UTF8_SOLID_INNER_BORDERS);

    table.set_header(headers);
    table
}

/// Writes `rows` to `out` in the given format.
///
/// `fields` only scopes the table; json and csv emit every key a row carries.
pub fn render<W: Write>(
    out: &mut W,
    format: Format,
    rows: &[FlatRecord],
    fields: &[String],
) -> Result<()> {
    match format {
        Format::Table => render_table(out, rows, fields),
        Format::Count => writeln!(out, "{}", rows.len()).context("writing count"),
        Format::Json => {
            serde_json::to_writer(&mut *out, rows).context("serializing records")?;
            writeln!(out).context("writing output")
        }
        Format::JsonPretty => {
            serde_json::to_writer_pretty(&mut *out, rows).context("serializing records")?;
            writeln!(out).context("writing output")
        }
        Format::Csv => render_csv(out, rows),
    }
}

fn render_table<W: Write>(out: &mut W, rows: &[FlatRecord], fields: &[String]) -> Result<()> {
    if rows.is_empty() {
        writeln!(out, "No records found.")?;
        return Ok(());
    }

    let mut table = new_table(fields.iter().map(String::as_str).collect());
    for row in rows {
        table.add_row(
            fields
                .iter()
                .map(|field| row.get(field).map(|v| v.to_string()).unwrap_or_default()),
        );
    }

    writeln!(out, "{table}").context("writing table")
}

fn render_csv<W: Write>(out: &mut W, rows: &[FlatRecord]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        // rows carry whatever keys their record had
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);

    // a row of one empty value comes out as `""`, never as a blank line
    for row in rows {
        writer
            .write_record(row.values().map(|v| v.to_string()))
            .context("writing csv row")?;
    }
    writer.flush().context("flushing csv output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Scalar;

    fn row(pairs: &[(&str, Scalar)]) -> FlatRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn text(s: &str) -> Scalar {
        Scalar::String(s.into())
    }

    fn rendered(format: Format, rows: &[FlatRecord], fields: &[&str]) -> String {
        let fields: Vec<String> = fields.iter().map(|s| s.to_string()).collect();
        let mut out = Vec::new();
        render(&mut out, format, rows, &fields).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn parses_the_five_known_formats() {
        assert_eq!("table".parse::<Format>(), Ok(Format::Table));
        assert_eq!("count".parse::<Format>(), Ok(Format::Count));
        assert_eq!("json".parse::<Format>(), Ok(Format::Json));
        assert_eq!("json_pretty".parse::<Format>(), Ok(Format::JsonPretty));
        assert_eq!("csv".parse::<Format>(), Ok(Format::Csv));
        assert_eq!(
            "xml".parse::<Format>(),
            Err(UnknownFormat("xml".to_string()))
        );
    }

    #[test]
    fn count_emits_only_the_number() {
        let rows = vec![row(&[("ip", text("a"))]), row(&[("ip", text("b"))])];
        assert_eq!(rendered(Format::Count, &rows, &["ip"]), "2\n");
        assert_eq!(rendered(Format::Count, &[], &["ip"]), "0\n");
    }

    #[test]
    fn csv_has_no_header_and_follows_key_order() {
        let rows = vec![row(&[
            ("created", text("2024-01-01")),
            ("ip", text("1.2.3.4")),
        ])];
        assert_eq!(
            rendered(Format::Csv, &rows, &["ip"]),
            "2024-01-01,1.2.3.4\n"
        );
    }

    #[test]
    fn csv_quotes_delimiters_and_allows_ragged_rows() {
        let rows = vec![
            row(&[("summary", text("said \"hi\", then left")), ("ip", Scalar::Null)]),
            row(&[("summary", text("plain"))]),
        ];
        assert_eq!(
            rendered(Format::Csv, &rows, &[]),
            "\"said \"\"hi\"\", then left\",\nplain\n"
        );
    }

    #[test]
    fn csv_row_of_one_null_is_quoted() {
        let rows = vec![
            row(&[("ip", Scalar::Null)]),
            row(&[("ip", text("a b"))]),
        ];
        assert_eq!(rendered(Format::Csv, &rows, &["ip"]), "\"\"\na b\n");
    }

    #[test]
    fn json_round_trips() {
        let rows = vec![
            row(&[("created", text("2024-01-01")), ("user_id", Scalar::Number(1.into()))]),
            row(&[("created", text("2024-01-02")), ("author_meta.user_login", Scalar::Null)]),
        ];
        for format in [Format::Json, Format::JsonPretty] {
            let text = rendered(format, &rows, &["created"]);
            let parsed: Vec<FlatRecord> = serde_json::from_str(&text).unwrap();
            assert_eq!(parsed, rows);
        }
        assert_eq!(rendered(Format::Json, &rows, &[]).lines().count(), 1);
        assert!(rendered(Format::JsonPretty, &rows, &[]).lines().count() > 1);
    }

    #[test]
    fn table_shows_only_requested_fields() {
        let rows = vec![row(&[
            ("created", text("2024-01-01")),
            ("ip", text("1.2.3.4")),
            ("summary", text("hidden column")),
        ])];
        let out = rendered(Format::Table, &rows, &["created", "ip"]);
        assert!(out.contains("created"));
        assert!(out.contains("1.2.3.4"));
        assert!(!out.contains("hidden column"));
    }

    #[test]
    fn empty_table_says_so() {
        assert_eq!(
            rendered(Format::Table, &[], &["created"]),
            "No records found.\n"
        );
    }
}
