use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "kiosk-reconcile")]
#[command(about = "Resolve kiosk order references and maintain the RMA sheets")]
pub struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, global = true, default_value = "kiosk-reconcile.toml")]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit JSON logs instead of the compact format
    #[arg(long, global = true)]
    pub json: bool,

    /// Retry transport failures this many extra times
    #[arg(long, global = true, default_value = "0")]
    pub retries: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve an order reference (several may be separated by ';')
    Resolve { reference: String },

    /// Look up open orders for a customer
    Customer {
        #[arg(long)]
        first: Option<String>,
        #[arg(long)]
        last: Option<String>,
        #[arg(long)]
        username: Option<String>,
    },

    /// List records of a table, newest first
    List {
        table: String,
        #[arg(long)]
        status: Option<String>,
        #[arg(short, long)]
        q: Option<String>,
        #[arg(long)]
        page: Option<usize>,
        #[arg(long)]
        page_size: Option<usize>,
        /// Write the page as CSV to stdout
        #[arg(long)]
        csv: bool,
    },

    /// Set one field on the first record whose key matches
    Update {
        table: String,
        key: String,
        field: String,
        value: String,
    },

    /// Append a record given as FIELD=VALUE pairs
    Append {
        table: String,
        #[arg(short, long = "field", value_parser = parse_field, required = true)]
        fields: Vec<(String, String)>,
    },

    /// Re-sort a table by its timestamp column
    Resort { table: String },

    /// Show used and available rows
    Capacity { table: String },

    /// Add rows to the sheet behind a table
    Expand { table: String, rows: usize },

    /// List the configured tables
    Tables,
}

/// 解析 `FIELD=VALUE`
pub fn parse_field(raw: &str) -> Result<(String, String), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{}'", raw))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in '{}'", raw));
    }
    Ok((field.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_update_with_global_flags() {
        let cli = Cli::try_parse_from([
            "kiosk-reconcile",
            "update",
            "returns",
            "N100",
            "Status",
            "Refunded",
            "--retries",
            "2",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.retries, 2);
        assert_eq!(cli.config, "kiosk-reconcile.toml");
        match cli.command {
            Command::Update { table, key, .. } => {
                assert_eq!(table, "returns");
                assert_eq!(key, "N100");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_append_fields() {
        let cli = Cli::try_parse_from([
            "kiosk-reconcile",
            "append",
            "returns",
            "--field",
            "Name=Ann Lee",
            "-f",
            "Notes=a=b",
        ])
        .unwrap();

        match cli.command {
            Command::Append { fields, .. } => {
                assert_eq!(fields[0], ("Name".to_string(), "Ann Lee".to_string()));
                assert_eq!(fields[1], ("Notes".to_string(), "a=b".to_string()));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_field_rejects_missing_name() {
        assert!(parse_field("=x").is_err());
        assert!(parse_field("novalue").is_err());
    }
}
