//! Interactive mode for the server.
//!
//! Prompts for bind address, port and inference service URL before
//! starting the server.

use dialoguer::{Confirm, Input};
use quake_map_risk::DEFAULT_INFERENCE_URL;

fn prompt(label: &str, var: &str, default: &str) -> String {
    let default = std::env::var(var).unwrap_or_else(|_| default.to_string());

    Input::new()
        .with_prompt(label)
        .default(default.clone())
        .interact_text()
        .unwrap_or(default)
}

/// Runs the server in interactive mode, prompting for configuration.
///
/// Sets `BIND_ADDR`, `PORT` and `INFERENCE_API_URL` from the answers and
/// delegates to [`super::run_server`].
///
/// # Errors
///
/// Returns an `std::io::Result` error if the underlying server fails to
/// start.
#[allow(clippy::future_not_send)]
pub async fn run() -> std::io::Result<()> {
    println!("Quake Map Server");
    println!();

    let bind_addr = prompt("Bind address", "BIND_ADDR", "127.0.0.1");
    let port = prompt("Port", "PORT", "8080");
    let inference_url = prompt(
        "Inference service URL",
        "INFERENCE_API_URL",
        DEFAULT_INFERENCE_URL,
    );

    // SAFETY: no other threads exist yet; the server reads these once
    // while building its state.
    unsafe {
        std::env::set_var("BIND_ADDR", &bind_addr);
        std::env::set_var("PORT", &port);
        std::env::set_var("INFERENCE_API_URL", &inference_url);
    }

    if !Confirm::new()
        .with_prompt(format!("Start server on {bind_addr}:{port}?"))
        .default(true)
        .interact()
        .unwrap_or(true)
    {
        println!("Cancelled.");
        return Ok(());
    }

    super::run_server().await
}
