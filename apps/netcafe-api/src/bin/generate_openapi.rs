//! Write the OpenAPI document to `specs/netcafe-api.json` at the repo root.

use std::path::Path;
use std::process::ExitCode;

use utoipa::OpenApi;

fn main() -> ExitCode {
    let doc = match netcafe_api::routes::ApiDoc::openapi().to_pretty_json() {
        Ok(doc) => doc,
        Err(err) => {
            eprintln!("Failed to serialize OpenAPI document: {err}");
            return ExitCode::FAILURE;
        }
    };

    let out = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../specs/netcafe-api.json");
    let written = out
        .parent()
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|()| std::fs::write(&out, doc));

    match written {
        Ok(()) => {
            println!("Wrote {}", out.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Failed to write {}: {err}", out.display());
            ExitCode::FAILURE
        }
    }
}
