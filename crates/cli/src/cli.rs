use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use stockroom_core::{Money, StoreId};
use stockroom_infra::ReportKind;
use stockroom_inventory::MovementKind;
use stockroom_products::ProductId;
use stockroom_purchasing::PurchaseOrderId;

#[derive(Debug, Parser)]
#[command(name = "stockroom", author, version, about = "Store inventory: products, stock movements, purchase orders")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the JSON event log
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    /// Store to operate on (defaults to the configured one, or the only open store)
    #[arg(long, global = true)]
    pub store: Option<StoreId>,

    /// Name recorded on movements and orders
    #[arg(long, global = true)]
    pub operator: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage stores
    Store {
        #[command(subcommand)]
        command: StoreCommands,
    },

    /// Manage the product catalog
    Product {
        #[command(subcommand)]
        command: ProductCommands,
    },

    /// Record and list stock movements
    Stock {
        #[command(subcommand)]
        command: StockCommands,
    },

    /// Manage purchase orders
    Order {
        #[command(subcommand)]
        command: OrderCommands,
    },

    /// List products at or below their minimum quantity
    Alerts,

    /// Write a JSON report
    Report(ReportArgs),
}

#[derive(Debug, Subcommand)]
pub enum StoreCommands {
    /// Register a new store
    Add(StoreFields),
    /// List open stores
    List,
    /// Change the selected store's name or contact details
    Update(StoreUpdateArgs),
    /// Close the selected store
    Close,
}

#[derive(Debug, Args)]
pub struct StoreFields {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub address: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
}

#[derive(Debug, Args)]
pub struct StoreUpdateArgs {
    #[arg(long)]
    pub name: Option<String>,
    /// New address; an empty value clears it
    #[arg(long)]
    pub address: Option<String>,
    /// New phone; an empty value clears it
    #[arg(long)]
    pub phone: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ProductCommands {
    /// Add a product, optionally with opening stock
    Add(ProductAddArgs),
    /// List products, optionally filtered by name or code
    List {
        #[arg(long)]
        search: Option<String>,
    },
    /// Show one product
    Show { product: ProductId },
    /// Change catalog fields; omitted fields keep their value
    Update(ProductUpdateArgs),
    /// Remove a product from the catalog
    Delete { product: ProductId },
}

#[derive(Debug, Args)]
pub struct ProductAddArgs {
    #[arg(long)]
    pub code: String,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub description: Option<String>,
    /// Cost price, e.g. 12.50
    #[arg(long, default_value = "0")]
    pub cost: Money,
    /// Sell price, e.g. 19.90
    #[arg(long, default_value = "0")]
    pub price: Money,
    /// Alert threshold
    #[arg(long, default_value_t = 0)]
    pub min: u64,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub supplier: Option<String>,
    /// Opening stock, recorded as an entry
    #[arg(long, default_value_t = 0)]
    pub quantity: u64,
}

#[derive(Debug, Args)]
pub struct ProductUpdateArgs {
    pub product: ProductId,
    #[arg(long)]
    pub code: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
    /// New description; an empty value clears it
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub cost: Option<Money>,
    #[arg(long)]
    pub price: Option<Money>,
    #[arg(long)]
    pub min: Option<u64>,
    /// New category; an empty value clears it
    #[arg(long)]
    pub category: Option<String>,
    /// New supplier; an empty value clears it
    #[arg(long)]
    pub supplier: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum StockCommands {
    /// Receive goods
    Entry(MovementArgs),
    /// Take goods out
    Exit(MovementArgs),
    /// Movement history, newest first
    Movements(MovementQueryArgs),
}

#[derive(Debug, Args)]
pub struct MovementArgs {
    pub product: ProductId,
    pub quantity: u64,
    /// Unit price (defaults to cost price for entries, sell price for exits)
    #[arg(long)]
    pub price: Option<Money>,
    #[arg(long)]
    pub reason: Option<String>,
    /// Invoice or receipt number
    #[arg(long)]
    pub document: Option<String>,
}

#[derive(Debug, Args)]
pub struct MovementQueryArgs {
    /// entry | exit
    #[arg(long)]
    pub kind: Option<MovementKind>,
    #[arg(long)]
    pub product: Option<ProductId>,
    #[command(flatten)]
    pub range: RangeArgs,
}

#[derive(Debug, Clone, Copy, Args)]
pub struct RangeArgs {
    /// First day, YYYY-MM-DD (inclusive)
    #[arg(long)]
    pub from: Option<NaiveDate>,
    /// Last day, YYYY-MM-DD (inclusive)
    #[arg(long)]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Subcommand)]
pub enum OrderCommands {
    /// Place a purchase order
    Place(OrderPlaceArgs),
    /// List orders, newest first
    List,
    /// Show one order
    Show { order: PurchaseOrderId },
    Approve { order: PurchaseOrderId },
    Cancel { order: PurchaseOrderId },
    /// Mark delivered and receive the items into stock
    Deliver { order: PurchaseOrderId },
}

#[derive(Debug, Args)]
pub struct OrderPlaceArgs {
    #[arg(long)]
    pub supplier: String,
    /// <product-id>:<quantity>, repeatable
    #[arg(long = "line", required = true, value_parser = parse_line)]
    pub lines: Vec<(ProductId, u64)>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// stock | entries | exits | movements | orders | alerts
    pub kind: ReportKind,
    #[command(flatten)]
    pub range: RangeArgs,
    /// Output directory (defaults to the configured reports dir)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

fn parse_line(s: &str) -> Result<(ProductId, u64), String> {
    let (product, quantity) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected <product-id>:<quantity>, got '{s}'"))?;
    let product = product.parse::<ProductId>().map_err(|e| e.to_string())?;
    let quantity = quantity
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid quantity '{quantity}': {e}"))?;
    Ok((product, quantity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_line_splits_product_and_quantity() {
        let id = ProductId::new(stockroom_core::AggregateId::new());
        assert_eq!(parse_line(&format!("{id}:12")).unwrap(), (id, 12));
        assert!(parse_line(&id.to_string()).is_err());
        assert!(parse_line(&format!("{id}:-1")).is_err());
        assert!(parse_line("nope:1").is_err());
    }

    #[test]
    fn global_flags_work_after_subcommands() {
        let cli = Cli::try_parse_from(["stockroom", "alerts", "--data", "/tmp/x.json", "-vv"]).unwrap();
        assert_eq!(cli.data, Some(PathBuf::from("/tmp/x.json")));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Alerts));
    }
}
