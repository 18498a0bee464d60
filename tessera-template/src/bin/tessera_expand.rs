/// Template Expander - Shows a main.json-style file after expansion
///
/// Usage: cargo run --bin tessera-expand <template-file>

use std::path::{Path, PathBuf};
use tessera_core::manifest::read_json_file;
use tessera_core::{parse_transaction, transaction_to_value};
use tessera_template::{expand_transaction, to_canonical_pretty, TemplateContext};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: cargo run --bin tessera-expand <template-file>");
        eprintln!();
        eprintln!("Example:");
        eprintln!("  cargo run --bin tessera-expand schema/roles/main.json");
        std::process::exit(1);
    }

    let path = PathBuf::from(&args[1]);
    let component_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let document = match read_json_file(&path) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    let templates = match parse_transaction(document) {
        Ok(tx) => tx,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    let pending = templates.iter().filter(|op| !op.is_expanded()).count();
    eprintln!(
        "📝 {} operations, {} to expand (component dir: {})",
        templates.len(),
        pending,
        component_dir.display()
    );

    match expand_transaction(templates, &TemplateContext::new(component_dir)) {
        Ok(expanded) => {
            println!("{}", to_canonical_pretty(&transaction_to_value(&expanded)));
        }
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    }
}
