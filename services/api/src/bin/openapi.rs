//! services/api/src/bin/openapi.rs
//!
//! This binary generates the OpenAPI 3.0 specification for the REST API
//! and saves it to a file named `openapi.json`, the input for client SDK
//! generation.

use api_lib::{config::normalize_prefix, web::api_doc};

/// Generates the OpenAPI specification and writes it to a file.
fn generate_spec(
    api_doc: utoipa::openapi::OpenApi,
    path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let spec_json = api_doc.to_pretty_json()?;
    std::fs::write(path, spec_json)?;
    println!("OpenAPI specification generated at {}", path);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Servers carry the same prefix the running service nests its routes under.
    let prefix = normalize_prefix(&std::env::var("APP_PREFIX").unwrap_or_else(|_| "/api".to_string()));

    generate_spec(api_doc(&prefix), "openapi.json")?;
    Ok(())
}
