use anyhow::{Context, Result};

use freedns_bot_registration::extract_activation_code;

pub fn run(file: &str) -> Result<()> {
    let body = std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file))?;

    match extract_activation_code(&body) {
        Some(code) => println!("{}", code),
        None => {
            eprintln!("No activation code found in {}", file);
            std::process::exit(1);
        }
    }

    Ok(())
}
