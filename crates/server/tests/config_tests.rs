use std::fs;
use xero_export::config::{ConfigError, load_config_from};

#[test]
fn loads_lower_case_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.ini");
    fs::write(
        &path,
        "[app]\n\
         xero_consumer_key = key\n\
         xero_consumer_secret = secret\n\
         callback_url = http://localhost:8000/oauth\n\
         accounts_and_vendors_files_path = out\n\
         vendors_file_name = v.json\n\
         accounts_file_name = a.json\n",
    )
    .unwrap();

    let cfg = load_config_from(&path).expect("config");
    assert_eq!(cfg.consumer_key, "key");
    assert_eq!(cfg.vendors_file(), "out/v.json");
    assert_eq!(cfg.accounts_file(), "out/a.json");
}

#[test]
fn missing_file_is_a_build_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config_from(dir.path().join("absent.ini")).unwrap_err();
    assert!(matches!(err, ConfigError::Build(_)), "{err:?}");
}

#[test]
fn credentials_are_checked_before_file_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.ini");
    fs::write(&path, "[APP]\nCALLBACK_URL = http://localhost:8000/oauth\n").unwrap();

    let err = load_config_from(&path).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Please define both XERO_CONSUMER_KEY and XERO_CONSUMER_SECRET variables in config.ini file (missing XERO_CONSUMER_KEY)"
    );
}

#[test]
fn loads_mixed_case_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.ini");
    fs::write(
        &path,
        "[APP]\n\
         Xero_Consumer_Key = key\n\
         Xero_Consumer_Secret = secret\n\
         Callback_URL = http://localhost:8000/oauth\n\
         Accounts_And_Vendors_Files_Path = out\n\
         Vendors_File_Name = v.json\n\
         Accounts_File_Name = a.json\n",
    )
    .unwrap();

    let cfg = load_config_from(&path).expect("config");
    assert_eq!(cfg.consumer_key, "key");
    assert_eq!(cfg.consumer_secret, "secret");
    assert_eq!(cfg.accounts_file(), "out/a.json");
}
