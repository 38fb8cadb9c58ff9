use std::env;
use std::process::ExitCode;

use ggmp::client::keygen::{parse_keygen_args, write_key_file, KeygenCommand, USAGE};
use ggmp::errors::ServiceResult;
use ggmp::license_key::KeyFile;

/// Generate license keys for local GGMP servers.
fn run() -> ServiceResult<()> {
    let args: Vec<String> = env::args().collect();
    let options = match parse_keygen_args(&args)? {
        KeygenCommand::Generate(options) => options,
        KeygenCommand::Help => {
            println!("GGMP Keymaster Key Generator v1.0");
            println!();
            println!("{USAGE}");
            return Ok(());
        }
    };

    println!("GGMP Keymaster Key Generator v1.0");
    println!();
    println!(
        "Generating {} key(s) for: {}",
        options.count, options.server_name
    );
    println!();

    let file = KeyFile::generate(options.count, &options.server_name);
    for (i, generated) in file.keys.iter().enumerate() {
        println!("Generated key {}/{}: {}", i + 1, options.count, generated.key);
    }

    write_key_file(&file, &options.output)?;

    println!();
    println!("Keys saved to: {}", options.output.display());
    if let Some(first) = file.keys.first() {
        println!();
        println!("Add to your server.cfg:");
        println!("  set sv_customLicenseKey \"{}\"", first.key);
        println!();
        println!("Or use environment variable:");
        println!("  export GGMP_LICENSE_KEY=\"{}\"", first.key);
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error generating keys: {e}");
            eprintln!("{USAGE}");
            ExitCode::FAILURE
        }
    }
}
