//! Cart commands.

use std::io::Write;

use ojas_client::{AppError, Storefront};
use ojas_core::{Cart, Product, ProductId, Quantity};
use rust_decimal::Decimal;

use super::CliError;

/// Print the current cart.
pub fn show(storefront: &Storefront) -> Result<(), CliError> {
    print_cart(&storefront.cart().snapshot())
}

/// Add units of a product and print the confirmed cart.
pub async fn add(
    storefront: &Storefront,
    product_id: i32,
    quantity: u32,
    price: Decimal,
    name: Option<String>,
) -> Result<(), CliError> {
    let quantity = Quantity::new(quantity)
        .ok_or_else(|| CliError::InvalidArgument("quantity must be at least 1".to_string()))?;
    let product = Product {
        id: ProductId::new(product_id),
        slug: String::new(),
        name: name.unwrap_or_else(|| format!("Product {product_id}")),
        price,
        discount_price: None,
        image: None,
    };

    let cart = storefront
        .cart()
        .add_item(&product, quantity)
        .await
        .map_err(AppError::from)?;
    print_cart(&cart)
}

/// Set a line's quantity and print the confirmed cart.
pub async fn set(storefront: &Storefront, product_id: i32, quantity: u32) -> Result<(), CliError> {
    let cart = storefront
        .cart()
        .update_quantity(ProductId::new(product_id), quantity)
        .await
        .map_err(AppError::from)?;
    print_cart(&cart)
}

/// Remove a line and print the confirmed cart.
pub async fn remove(storefront: &Storefront, product_id: i32) -> Result<(), CliError> {
    let cart = storefront
        .cart()
        .remove_item(ProductId::new(product_id))
        .await
        .map_err(AppError::from)?;
    print_cart(&cart)
}

fn print_cart(cart: &Cart) -> Result<(), CliError> {
    let mut out = std::io::stdout().lock();
    if cart.is_empty() {
        writeln!(out, "Your cart is empty")?;
        return Ok(());
    }

    for line in &cart.lines {
        writeln!(
            out,
            "{:>6}  {:<32} {:>4} x {:>10} = {:>10}",
            line.product_id,
            line.name,
            line.quantity,
            line.effective_price(),
            line.line_total()
        )?;
    }
    writeln!(out, "{} items, total {}", cart.total_count(), cart.total())?;
    Ok(())
}
