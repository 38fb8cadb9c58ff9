//! Key file generation for `ggmp_keygen`.
//!
//! ```text
//! ggmp_keygen
//! ggmp_keygen --output server-keys.json
//! ggmp_keygen --count 5 --name "My GGMP Server"
//! ggmp_keygen --help
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{ServiceError, ServiceResult};
use crate::license_key::{KeyFile, DEFAULT_SERVER_NAME};

/// Default output file.
pub const DEFAULT_OUTPUT: &str = "keymaster-keys.json";

pub const USAGE: &str = "Usage: ggmp_keygen [--count N] [--name NAME] [--output FILE] [--help]";

/// What the command line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeygenCommand {
    Generate(KeygenOptions),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeygenOptions {
    pub count: usize,
    pub server_name: String,
    pub output: PathBuf,
}

impl Default for KeygenOptions {
    fn default() -> Self {
        Self {
            count: 1,
            server_name: DEFAULT_SERVER_NAME.to_string(),
            output: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

/// Parse CLI arguments. `args[0]` is the program name.
///
/// `--help` / `-h` wins over every other argument.
pub fn parse_keygen_args(args: &[String]) -> ServiceResult<KeygenCommand> {
    let mut options = KeygenOptions::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = args.get(i + 1);
        match (flag, value) {
            ("--help" | "-h", _) => return Ok(KeygenCommand::Help),
            ("--count" | "-c", Some(v)) => {
                options.count = v
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| {
                        ServiceError::InvalidParameter(format!(
                            "--count must be a positive integer, got '{v}'"
                        ))
                    })?;
                i += 2;
            }
            ("--name" | "-n", Some(v)) => {
                options.server_name = v.clone();
                i += 2;
            }
            ("--output" | "-o", Some(v)) => {
                options.output = PathBuf::from(v);
                i += 2;
            }
            ("--count" | "-c" | "--name" | "-n" | "--output" | "-o", None) => {
                return Err(ServiceError::InvalidParameter(format!(
                    "{flag} requires a value"
                )));
            }
            _ => {
                return Err(ServiceError::InvalidParameter(format!(
                    "unknown argument '{flag}'"
                )));
            }
        }
    }

    Ok(KeygenCommand::Generate(options))
}

/// Write `file` as pretty-printed JSON.
pub fn write_key_file(file: &KeyFile, path: &Path) -> ServiceResult<()> {
    let json = serde_json::to_string_pretty(file)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn options(list: &[&str]) -> KeygenOptions {
        match parse_keygen_args(&args(list)).unwrap() {
            KeygenCommand::Generate(options) => options,
            KeygenCommand::Help => panic!("expected generate for {list:?}"),
        }
    }

    #[test]
    fn defaults_without_arguments() {
        let options = options(&["ggmp_keygen"]);
        assert_eq!(options, KeygenOptions::default());
        assert_eq!(options.output, PathBuf::from("keymaster-keys.json"));
    }

    #[test]
    fn parses_all_flags() {
        let options = options(&[
            "ggmp_keygen",
            "--count",
            "5",
            "--name",
            "My GGMP Server",
            "-o",
            "out.json",
        ]);
        assert_eq!(options.count, 5);
        assert_eq!(options.server_name, "My GGMP Server");
        assert_eq!(options.output, PathBuf::from("out.json"));
    }

    #[test]
    fn rejects_bad_count_and_unknown_flags() {
        assert!(parse_keygen_args(&args(&["ggmp_keygen", "--count", "0"])).is_err());
        assert!(parse_keygen_args(&args(&["ggmp_keygen", "--count", "ten"])).is_err());
        assert!(parse_keygen_args(&args(&["ggmp_keygen", "--name"])).is_err());
        assert!(parse_keygen_args(&args(&["ggmp_keygen", "--force"])).is_err());
    }

    #[test]
    fn help_flag_requests_usage() {
        for flag in ["--help", "-h"] {
            assert_eq!(
                parse_keygen_args(&args(&["ggmp_keygen", flag])).unwrap(),
                KeygenCommand::Help
            );
        }
        // Even alongside otherwise invalid arguments.
        assert_eq!(
            parse_keygen_args(&args(&["ggmp_keygen", "--count", "5", "-h", "--force"])).unwrap(),
            KeygenCommand::Help
        );
    }

    #[test]
    fn writes_readable_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        let file = KeyFile::generate(2, "Test");

        write_key_file(&file, &path).unwrap();

        let read: KeyFile = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read.total_keys, 2);
        assert_eq!(read.keys[0].key, file.keys[0].key);
    }
}
