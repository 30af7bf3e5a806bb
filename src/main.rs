//! Entry point for the F29 engine binary.
//!
//! Running this binary starts an HTTP server exposing the resolution
//! API.  The tax rules file may be specified via the `F29_RULES_FILE`
//! environment variable; if unset the server looks for
//! `f29_rules.json` in the current working directory and falls back to
//! the built-in rules when it is absent.  Log verbosity follows
//! `RUST_LOG`.

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let rules_path = PathBuf::from(
        std::env::var("F29_RULES_FILE").unwrap_or_else(|_| "f29_rules.json".to_string()),
    );
    let addr = std::env::var("F29_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());

    let rules = match f29_engine::tax::load_tax_rules(&rules_path) {
        Ok(rules) => rules,
        Err(err) => {
            tracing::error!("failed to load tax rules: {err:#}");
            std::process::exit(1);
        }
    };
    if let Err(err) = f29_engine::api::serve(&addr, rules).await {
        tracing::error!("error running server: {err:#}");
        std::process::exit(1);
    }
}
