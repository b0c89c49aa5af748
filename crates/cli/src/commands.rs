use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::json;

use stockroom_core::{Actor, StoreId};
use stockroom_infra::projections::MovementFilter;
use stockroom_infra::{write_report, DateRange, MovementInput, Stockroom, StockroomConfig};
use stockroom_products::ProductDetails;
use stockroom_stores::ContactInfo;

use crate::cli::{
    Commands, MovementArgs, OrderCommands, ProductAddArgs, ProductCommands, ProductUpdateArgs, RangeArgs,
    StockCommands, StoreCommands, StoreUpdateArgs,
};

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{out}");
    Ok(())
}

/// Merge an optional edit: omitted keeps `current`, blank clears.
fn edit_optional(edit: Option<String>, current: Option<String>) -> Option<String> {
    match edit {
        Some(v) if v.trim().is_empty() => None,
        Some(v) => Some(v),
        None => current,
    }
}

impl From<RangeArgs> for DateRange {
    fn from(r: RangeArgs) -> Self {
        DateRange { from: r.from, to: r.to }
    }
}

struct Session<'a> {
    room: Stockroom,
    config: &'a StockroomConfig,
}

impl Session<'_> {
    fn actor(&self) -> Result<Actor> {
        Actor::named(self.config.operator.name.as_str()).context("invalid operator name")
    }

    /// Configured store, or the only open one.
    fn store(&self) -> Result<StoreId> {
        if let Some(id) = self.config.default_store {
            return Ok(id);
        }
        match self.room.list_stores().as_slice() {
            [only] => Ok(only.store_id),
            [] => bail!("no store registered yet; run `stockroom store add --name <NAME>` first"),
            _ => bail!("several stores are open; pick one with --store <ID>"),
        }
    }
}

pub fn run(command: Commands, config: &StockroomConfig) -> Result<()> {
    let path = &config.storage.data_file;
    let room = Stockroom::open_file(path).with_context(|| format!("failed to open {}", path.display()))?;
    let session = Session { room, config };

    match command {
        Commands::Store { command } => store(&session, command),
        Commands::Product { command } => product(&session, command),
        Commands::Stock { command } => stock(&session, command),
        Commands::Order { command } => order(&session, command),
        Commands::Alerts => print_json(&session.room.alerts(session.store()?)),
        Commands::Report(args) => {
            let store = session.store()?;
            let report = session.room.report(store, args.kind, args.range.into())?;
            let dir = args.out.unwrap_or_else(|| config.reports.dir.clone());
            let written = write_report(&dir, &report)
                .with_context(|| format!("failed to write report to {}", dir.display()))?;
            print_json(&json!({
                "kind": report.kind,
                "rows": report.row_count(),
                "path": written,
            }))
        }
    }
}

fn store(s: &Session<'_>, command: StoreCommands) -> Result<()> {
    match command {
        StoreCommands::Add(f) => {
            let contact = ContactInfo {
                address: f.address,
                phone: f.phone,
            };
            print_json(&s.room.register_store(&f.name, contact)?)
        }
        StoreCommands::List => print_json(&s.room.list_stores()),
        StoreCommands::Update(StoreUpdateArgs { name, address, phone }) => {
            let id = s.store()?;
            let current = s.room.get_store(id)?;
            let contact = ContactInfo {
                address: edit_optional(address, current.address),
                phone: edit_optional(phone, current.phone),
            };
            let name = name.unwrap_or(current.name);
            print_json(&s.room.update_store(id, &name, contact)?)
        }
        StoreCommands::Close => print_json(&s.room.close_store(s.store()?)?),
    }
}

fn product(s: &Session<'_>, command: ProductCommands) -> Result<()> {
    let store = s.store()?;
    match command {
        ProductCommands::Add(ProductAddArgs {
            code,
            name,
            description,
            cost,
            price,
            min,
            category,
            supplier,
            quantity,
        }) => {
            let details = ProductDetails {
                code,
                name,
                description,
                cost_price: cost,
                sell_price: price,
                min_quantity: min,
                category,
                supplier,
            };
            print_json(&s.room.add_product(store, details, quantity, &s.actor()?)?)
        }
        ProductCommands::List { search } => match search {
            Some(term) => print_json(&s.room.search_products(store, &term)),
            None => print_json(&s.room.list_products(store)),
        },
        ProductCommands::Show { product } => print_json(&s.room.get_product(store, product)?),
        ProductCommands::Update(args) => {
            let current = s.room.get_product(store, args.product)?.details();
            let ProductUpdateArgs {
                product,
                code,
                name,
                description,
                cost,
                price,
                min,
                category,
                supplier,
            } = args;
            let details = ProductDetails {
                code: code.unwrap_or(current.code),
                name: name.unwrap_or(current.name),
                description: edit_optional(description, current.description),
                cost_price: cost.unwrap_or(current.cost_price),
                sell_price: price.unwrap_or(current.sell_price),
                min_quantity: min.unwrap_or(current.min_quantity),
                category: edit_optional(category, current.category),
                supplier: edit_optional(supplier, current.supplier),
            };
            print_json(&s.room.update_product(store, product, details)?)
        }
        ProductCommands::Delete { product } => print_json(&s.room.delete_product(store, product)?),
    }
}

fn movement_input(args: &MovementArgs) -> MovementInput {
    MovementInput {
        quantity: args.quantity,
        unit_price: args.price,
        reason: args.reason.clone(),
        document_number: args.document.clone(),
    }
}

fn stock(s: &Session<'_>, command: StockCommands) -> Result<()> {
    let store = s.store()?;
    match command {
        StockCommands::Entry(args) => {
            let movement = s.room.record_entry(store, args.product, movement_input(&args), &s.actor()?)?;
            print_json(&movement)
        }
        StockCommands::Exit(args) => {
            let movement = s.room.record_exit(store, args.product, movement_input(&args), &s.actor()?)?;
            print_json(&movement)
        }
        StockCommands::Movements(q) => {
            let filter = MovementFilter {
                kind: q.kind,
                product_id: q.product,
                from: q.range.from,
                to: q.range.to,
            };
            print_json(&s.room.list_movements(store, &filter))
        }
    }
}

fn order(s: &Session<'_>, command: OrderCommands) -> Result<()> {
    let store = s.store()?;
    match command {
        OrderCommands::Place(args) => {
            let view = s
                .room
                .place_order(store, &args.supplier, &args.lines, args.notes, &s.actor()?)?;
            print_json(&view)
        }
        OrderCommands::List => print_json(&s.room.list_orders(store)),
        OrderCommands::Show { order } => print_json(&s.room.get_order(store, order)?),
        OrderCommands::Approve { order } => print_json(&s.room.approve_order(store, order)?),
        OrderCommands::Cancel { order } => print_json(&s.room.cancel_order(store, order)?),
        OrderCommands::Deliver { order } => print_json(&s.room.deliver_order(store, order, &s.actor()?)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_edits_keep_replace_or_clear() {
        let current = Some("Hardware".to_string());
        assert_eq!(edit_optional(None, current.clone()), current);
        assert_eq!(edit_optional(Some("Tools".into()), current.clone()), Some("Tools".to_string()));
        assert_eq!(edit_optional(Some("  ".into()), current), None);
    }
}
