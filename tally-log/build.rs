use std::fmt::Write as _;
use std::path::Path;
use std::{env, fs};

// Generates `CRATE_NAMES`, the tracing targets of all `tally-*` workspace members.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR")?;
    let workspace = Path::new(&manifest_dir)
        .parent()
        .ok_or("crate is not inside a workspace")?;

    let mut targets: Vec<String> = fs::read_dir(workspace)?
        .filter_map(Result::ok)
        .filter(|entry| entry.path().join("Cargo.toml").is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with("tally-"))
        .map(|name| name.replace('-', "_"))
        .collect();
    targets.sort();

    let mut source = String::from("const CRATE_NAMES: &[&str] = &[");
    for target in &targets {
        write!(source, "{target:?}, ")?;
    }
    source.push_str("];\n");

    let out_dir = env::var("OUT_DIR")?;
    fs::write(Path::new(&out_dir).join("constants.gen.rs"), source)?;

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
