use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tablegate::client::DEFAULT_PROXY_URL;
use tablegate::models::table::TableKind;

/// tablegate: credential proxy and ledger client for Feishu Bitable
#[derive(Parser)]
#[command(name = "tablegate", version, about)]
pub struct Cli {
    /// Base URL of the credential proxy, route prefix included
    #[arg(long, global = true, env = "TABLEGATE_PROXY_URL", default_value = DEFAULT_PROXY_URL)]
    pub proxy_url: String,

    /// Client settings file
    #[arg(long, global = true, env = "TABLEGATE_SETTINGS", default_value = "tablegate.json")]
    pub settings: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the credential proxy
    Serve {
        /// Port to bind (overrides TABLEGATE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show or change the stored client settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },

    /// Create any missing ledger tables and remember their ids
    Setup,

    /// Raw record access by table
    Records {
        #[command(subcommand)]
        command: RecordCommands,
    },

    /// Record a material purchase
    Purchase {
        #[arg(long)]
        material: String,
        #[arg(long, default_value = "")]
        spec: String,
        #[arg(long)]
        quantity: f64,
        #[arg(long, default_value = "")]
        unit: String,
        /// Total price paid
        #[arg(long)]
        total: f64,
        /// YYYY-MM-DD
        #[arg(long)]
        date: String,
        #[arg(long, default_value = "")]
        supplier: String,
    },

    /// Record a product formula; material prices come from purchases
    Formula {
        #[arg(long)]
        product: String,
        /// Units produced per batch
        #[arg(long)]
        quantity: f64,
        /// Material usage as name=amount, repeatable
        #[arg(long = "material")]
        materials: Vec<String>,
        #[arg(long, default_value_t = 0.0)]
        packaging: f64,
        #[arg(long, default_value_t = 0.0)]
        utility: f64,
    },

    /// Record a sale; unit cost comes from the product's formula
    Sale {
        /// YYYY-MM-DD
        #[arg(long)]
        date: String,
        #[arg(long)]
        product: String,
        #[arg(long)]
        quantity: f64,
        /// Total amount received
        #[arg(long)]
        amount: f64,
    },

    /// Latest unit price per material
    Materials,

    /// Recorded sales, newest first
    Sales {
        /// Show at most this many
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Profit statistics over the sales table
    Stats {
        #[arg(long, value_enum, default_value = "month")]
        range: RangeArg,
        /// Start day for --range custom (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// End day for --range custom (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Print the settings with the secret masked
    Show,
    /// Store app credentials and the sheet token
    Set {
        #[arg(long)]
        app_id: String,
        #[arg(long)]
        app_secret: String,
        #[arg(long)]
        sheet_token: String,
    },
}

#[derive(Subcommand)]
pub enum RecordCommands {
    /// List every record of a table
    List { table: TableKind },
    /// Create a record from name=value pairs
    Create {
        table: TableKind,
        #[arg(long = "field", required = true)]
        fields: Vec<String>,
    },
    /// Update a record from name=value pairs
    Update {
        table: TableKind,
        id: String,
        #[arg(long = "field", required = true)]
        fields: Vec<String>,
    },
    /// Delete a record
    Delete { table: TableKind, id: String },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum RangeArg {
    Today,
    Week,
    Month,
    Custom,
}
