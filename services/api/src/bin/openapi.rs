//! services/api/src/bin/openapi.rs
//!
//! Writes the booking API's OpenAPI document, caller security schemes
//! included. The output path is the first argument, `openapi.json` by default.

use api_lib::web::rest::ApiDoc;
use std::path::PathBuf;
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    let doc = ApiDoc::openapi();
    std::fs::write(&output, doc.to_pretty_json()?)?;
    println!(
        "Wrote {} documented paths to {}",
        doc.paths.paths.len(),
        output.display()
    );
    Ok(())
}
