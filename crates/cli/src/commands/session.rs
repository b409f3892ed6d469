//! Sign-in and identity commands.
//!
//! # Environment Variables
//!
//! - `OJAS_PASSWORD` - Password for `--email`

use std::io::Write;

use ojas_client::session::Credentials;
use ojas_client::{ClientConfig, Storefront};

use super::CliError;

/// Build the client and establish the session for this invocation.
///
/// With an email the user is signed in (which also fetches their cart);
/// otherwise the guest cart is fetched.
pub async fn connect(config: ClientConfig, email: Option<&str>) -> Result<Storefront, CliError> {
    let storefront = Storefront::new(config)?;

    match email {
        Some(email) => {
            let password = std::env::var("OJAS_PASSWORD")
                .map_err(|_| CliError::MissingEnvVar("OJAS_PASSWORD"))?;
            let credentials = Credentials::new(email, password)?;
            let user = storefront.login(&credentials).await?;
            tracing::info!("Signed in as {}", user.display_name());
        }
        None => {
            if let Err(e) = storefront.cart().refresh().await {
                tracing::warn!("Could not load the guest cart: {e}");
            }
        }
    }

    Ok(storefront)
}

/// Print the session's user, re-validated against the backend.
pub async fn whoami(storefront: &Storefront) -> Result<(), CliError> {
    let user = storefront.check_auth().await;
    let mut out = std::io::stdout().lock();
    match user {
        Some(user) => writeln!(
            out,
            "{} <{}> (id {})",
            user.display_name(),
            user.email,
            user.id
        )?,
        None => writeln!(
            out,
            "Not signed in ({})",
            storefront.session().status().as_str()
        )?,
    }
    Ok(())
}
