use clap::{Args, ValueEnum};
use prettytable::{format::FormatBuilder, Cell, Row, Table};
use serde_json::Value;

use crate::errors::AuError;

#[derive(Args)]
#[group(required = false, multiple = true)]
pub struct OutputOptions {
    #[arg(
        long,
        next_line_help = true,
        value_name = "string",
        num_args = 0..=1,
        env = "VAULT_FORMAT",
        default_value_t = Format::Table,
        default_missing_value = "table",
        long_help = r#"Print the output in the given format.  This can also be specified via the
VAULT_FORMAT environment variable."#,
        value_enum
    )]
    pub format: Format,
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format {
    Table,
    Json,
    Yaml,
}

pub trait Formatter: Send + Sync {
    fn output(&self, data: &Value) -> Result<(), AuError> {
        let b = self.format(data)?;
        print!("{}", String::from_utf8_lossy(&b));
        Ok(())
    }

    fn format(&self, data: &Value) -> Result<Vec<u8>, AuError>;
}

pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, data: &Value) -> Result<Vec<u8>, AuError> {
        let mut b = serde_json::to_vec_pretty(data)?;
        b.push(b'\n');
        Ok(b)
    }
}

pub struct YamlFormatter;

impl Formatter for YamlFormatter {
    fn format(&self, data: &Value) -> Result<Vec<u8>, AuError> {
        Ok(serde_yaml::to_string(data)?.into_bytes())
    }
}

/// Prints an object as `Key  Value` rows, and an array of objects as one row per element under a header
/// built from the first element's keys.
pub struct TableFormatter;

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => "n/a".to_string(),
        Value::String(s) if s.is_empty() => "n/a".to_string(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

impl Formatter for TableFormatter {
    fn format(&self, data: &Value) -> Result<Vec<u8>, AuError> {
        let mut table = Table::new();

        match data {
            Value::Object(objs) => {
                table.add_row(Row::new(vec![Cell::new("Key"), Cell::new("Value")]));
                table.add_row(Row::new(vec![Cell::new("---"), Cell::new("-----")]));
                for (k, v) in objs.iter() {
                    table.add_row(Row::new(vec![Cell::new(k), Cell::new(&cell_text(v))]));
                }
            }
            Value::Array(rows) => {
                let headers: Vec<String> = match rows.first() {
                    Some(Value::Object(first)) => first.keys().cloned().collect(),
                    _ => Vec::new(),
                };

                if !headers.is_empty() {
                    table.add_row(Row::new(headers.iter().map(|h| Cell::new(h)).collect()));
                    table.add_row(Row::new(headers.iter().map(|h| Cell::new(&"-".repeat(h.len()))).collect()));
                }

                for row in rows.iter() {
                    let cells = match row {
                        Value::Object(obj) => {
                            headers.iter().map(|h| Cell::new(&cell_text(obj.get(h).unwrap_or(&Value::Null)))).collect()
                        }
                        other => vec![Cell::new(&cell_text(other))],
                    };
                    table.add_row(Row::new(cells));
                }
            }
            other => {
                table.add_row(Row::new(vec![Cell::new(&cell_text(other))]));
            }
        }

        table.set_format(FormatBuilder::new().padding(0, 4).build());

        Ok(table.to_string().into_bytes())
    }
}

impl OutputOptions {
    pub fn formatter(&self) -> Box<dyn Formatter> {
        match self.format {
            Format::Table => Box::new(TableFormatter),
            Format::Json => Box::new(JsonFormatter),
            Format::Yaml => Box::new(YamlFormatter),
        }
    }

    pub fn print_value(&self, value: &Value) -> Result<(), AuError> {
        self.formatter().output(value)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_table_formatter_object() {
        let data = json!({"sealed": false, "progress": 0, "version": "1.15.2", "cluster_name": ""});
        let out = String::from_utf8(TableFormatter.format(&data).unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("Key"));
        assert!(out.contains("sealed"));
        assert!(out.contains("1.15.2"));
        assert!(out.contains("n/a"));
    }

    #[test]
    fn test_table_formatter_array() {
        let data = json!([
            {"name": "vault-0", "sealed": false},
            {"name": "vault-1", "sealed": true},
        ]);
        let out = String::from_utf8(TableFormatter.format(&data).unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("name") && lines[0].contains("sealed"));
        assert!(lines[3].contains("vault-1") && lines[3].contains("true"));
    }

    #[test]
    fn test_json_and_yaml_formatter() {
        let data = json!({"sealed": true});
        let out = String::from_utf8(JsonFormatter.format(&data).unwrap()).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&out).unwrap(), data);

        let out = String::from_utf8(YamlFormatter.format(&data).unwrap()).unwrap();
        assert_eq!(out.trim(), "sealed: true");
    }
}
