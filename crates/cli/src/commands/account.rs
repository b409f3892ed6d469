//! Account, order and checkout commands.

use std::io::Write;

use ojas_client::Storefront;
use ojas_client::account::BookingSummary;
use ojas_core::OrderId;

use super::CliError;

/// List orders, or show one order with its items.
pub async fn orders(storefront: &Storefront, id: Option<i32>) -> Result<(), CliError> {
    if let Some(id) = id {
        let order = storefront.order(OrderId::new(id)).await?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "Order {} ({})", order.order_id, order.status)?;
        for item in &order.items {
            let price = item.price.map(|p| p.to_string()).unwrap_or_default();
            writeln!(out, "  {} x {} {}", item.quantity, item.name, price)?;
        }
        if let Some(amount) = order.final_amount {
            writeln!(out, "Total: ₹{amount}")?;
        }
        return Ok(());
    }

    let orders = storefront.orders().await?;
    let mut out = std::io::stdout().lock();
    if orders.is_empty() {
        writeln!(out, "No orders")?;
    }
    for order in orders {
        let amount = order
            .final_amount
            .map(|a| format!("₹{a}"))
            .unwrap_or_default();
        let placed = order
            .created_at
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        writeln!(
            out,
            "{:>6}  {:<14} {:>12}  {:<10} {}",
            order.id, order.order_id, amount, order.status, placed
        )?;
    }
    Ok(())
}

/// List consultation bookings with a status summary.
pub async fn bookings(storefront: &Storefront) -> Result<(), CliError> {
    let bookings = storefront.bookings().await?;
    let summary = BookingSummary::from_bookings(&bookings);

    let mut out = std::io::stdout().lock();
    for booking in &bookings {
        let date = booking
            .scheduled_date
            .map(|d| d.to_string())
            .unwrap_or_default();
        writeln!(
            out,
            "{:>6}  {:<24} {} {}  {}",
            booking.id,
            booking.consultation_type,
            date,
            booking.scheduled_time.as_deref().unwrap_or(""),
            booking.status
        )?;
    }
    writeln!(
        out,
        "{} active, {} completed",
        summary.active, summary.completed
    )?;
    Ok(())
}

/// Pre-book the cart and print the receipt reference.
pub async fn checkout(storefront: &Storefront) -> Result<(), CliError> {
    let total = storefront.cart().snapshot().total();
    let receipt = storefront.place_prebooking().await?;

    let mut out = std::io::stdout().lock();
    writeln!(out, "Pre-booked {total}. Receipt: {}", receipt.reference)?;
    Ok(())
}

/// Print the profile.
pub async fn profile(storefront: &Storefront) -> Result<(), CliError> {
    let profile = storefront.profile().await?;

    let mut out = std::io::stdout().lock();
    writeln!(out, "{} {}", profile.first_name, profile.last_name)?;
    if let Some(email) = &profile.email {
        writeln!(out, "Email: {email}")?;
    }
    if !profile.phone.is_empty() {
        writeln!(out, "Phone: {}", profile.phone)?;
    }
    if !profile.bio.is_empty() {
        writeln!(out, "{}", profile.bio)?;
    }
    Ok(())
}
