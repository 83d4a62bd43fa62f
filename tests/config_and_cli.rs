use std::io::Write;

use clap::Parser;
use echofluent::cli::Args;
use echofluent::config::{read_app_config, AppConfig};

#[test]
fn partial_config_file_fills_remaining_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[vad]\naggressiveness = 3\n").unwrap();

    let cfg = read_app_config(file.path()).unwrap();
    assert_eq!(cfg.vad.aggressiveness, 3);
    assert_eq!(cfg.queues.asr_input_capacity, AppConfig::default().queues.asr_input_capacity);
}

#[test]
fn missing_config_file_falls_back_to_defaults() {
    let cfg = read_app_config(std::path::Path::new("/nonexistent/path/echofluent.toml")).unwrap();
    assert_eq!(cfg.vad.aggressiveness, AppConfig::default().vad.aggressiveness);
}

#[test]
fn malformed_config_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "this is not valid toml {{{{").unwrap();
    assert!(read_app_config(file.path()).is_err());
}

#[test]
fn src_equal_dst_fails_validation() {
    let args = Args::parse_from(["echofluent", "--src", "en", "--dst", "en"]);
    assert!(args.validate().is_err());
}

#[test]
fn distinct_src_dst_passes_validation() {
    let args = Args::parse_from(["echofluent", "--src", "es", "--dst", "en"]);
    assert!(args.validate().is_ok());
}
