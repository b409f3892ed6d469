//! Ojasritu Wellness CLI - drive the storefront client against a backend.
//!
//! # Usage
//!
//! ```bash
//! # Who is signed in (OJAS_PASSWORD holds the password)
//! ojas-cli --email asha@ojasritu.in whoami
//!
//! # Guest cart
//! ojas-cli cart show
//! ojas-cli cart add 12 --quantity 2 --price 500 --name "Triphala Churna"
//!
//! # Signed-in cart and checkout
//! ojas-cli --email asha@ojasritu.in cart set 12 3
//! ojas-cli --email asha@ojasritu.in checkout
//! ```
//!
//! # Commands
//!
//! - `whoami` - Show the session's user
//! - `cart` - Show or change the cart
//! - `orders` - List orders or show one
//! - `bookings` - List consultation bookings
//! - `checkout` - Pre-book everything in the cart
//! - `profile` - Show the account profile

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use ojas_client::{ClientConfig, telemetry};

mod commands;

#[derive(Parser)]
#[command(name = "ojas-cli")]
#[command(author, version, about = "Ojasritu Wellness storefront CLI")]
struct Cli {
    /// Sign in as this user; the password is read from `OJAS_PASSWORD`
    #[arg(short, long, global = true)]
    email: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the session's user
    Whoami,
    /// Show or change the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// List orders, or show one
    Orders {
        /// Order ID to show
        id: Option<i32>,
    },
    /// List consultation bookings
    Bookings,
    /// Pre-book everything in the cart
    Checkout,
    /// Show the account profile
    Profile,
}

#[derive(Subcommand)]
enum CartAction {
    /// Print the cart
    Show,
    /// Add units of a product
    Add {
        /// Product ID
        product_id: i32,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,

        /// Unit price shown until the backend confirms
        #[arg(short, long, default_value = "0")]
        price: Decimal,

        /// Product name shown until the backend confirms
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Set a line's quantity (0 removes it)
    Set {
        /// Product ID
        product_id: i32,
        /// New quantity
        quantity: u32,
    },
    /// Remove a line
    Remove {
        /// Product ID
        product_id: i32,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            telemetry::init_tracing(cli.log_json);
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Sentry before the subscriber so the tracing layer has a client
    let _sentry_guard = telemetry::init_sentry(&config);
    telemetry::init_tracing(cli.log_json);

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: ClientConfig) -> Result<(), commands::CliError> {
    let storefront = commands::session::connect(config, cli.email.as_deref()).await?;

    match cli.command {
        Commands::Whoami => commands::session::whoami(&storefront).await?,
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&storefront)?,
            CartAction::Add {
                product_id,
                quantity,
                price,
                name,
            } => commands::cart::add(&storefront, product_id, quantity, price, name).await?,
            CartAction::Set {
                product_id,
                quantity,
            } => commands::cart::set(&storefront, product_id, quantity).await?,
            CartAction::Remove { product_id } => {
                commands::cart::remove(&storefront, product_id).await?;
            }
        },
        Commands::Orders { id } => commands::account::orders(&storefront, id).await?,
        Commands::Bookings => commands::account::bookings(&storefront).await?,
        Commands::Checkout => commands::account::checkout(&storefront).await?,
        Commands::Profile => commands::account::profile(&storefront).await?,
    }
    Ok(())
}
