// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

use std::env;
use std::fs;

use crate::config::DEFAULT_CONF_NAME;
use crate::tests::*;

use serial_test::{parallel, serial};

#[test]
#[parallel]
fn test_config_defaults() {
    let conf = ret_or_panic!(Config::from_str(""));
    assert_eq!(conf.raw_buffer_size, DEFAULT_RAW_BUFFER_SIZE);
    assert!(conf.deny_mechanisms.is_empty());
    assert!(!conf.strict_pss_salt);
    assert!(ret_or_panic!(conf.denied_mechanisms()).is_empty());
}

#[test]
#[parallel]
fn test_config_parse() {
    let conf = ret_or_panic!(Config::from_str(
        r#"
raw_buffer_size = 2048
deny_mechanisms = ["CKM_RSA_X_509", "CKM_ECDSA"]
strict_pss_salt = true
"#
    ));
    assert_eq!(conf.raw_buffer_size, 2048);
    assert!(conf.strict_pss_salt);
    assert_eq!(
        ret_or_panic!(conf.denied_mechanisms()),
        vec![CKM_RSA_X_509, CKM_ECDSA]
    );
}

#[test]
#[parallel]
fn test_config_rejects() {
    /* unknown keys */
    let ret = Config::from_str("slot = 3\n");
    assert_eq!(ret_rv(ret), CKR_GENERAL_ERROR);

    /* out of range buffer sizes */
    let ret = Config::from_str("raw_buffer_size = 16\n");
    assert_eq!(ret_rv(ret), CKR_GENERAL_ERROR);
    let ret = Config::from_str("raw_buffer_size = 1048576\n");
    assert_eq!(ret_rv(ret), CKR_GENERAL_ERROR);

    /* names that are not mechanisms */
    let ret = Config::from_str("deny_mechanisms = [\"CKM_FOO\"]\n");
    assert_eq!(ret_rv(ret), CKR_GENERAL_ERROR);

    let ret = Config::from_str("raw_buffer_size = \"big\"\n");
    assert_eq!(ret_rv(ret), CKR_GENERAL_ERROR);
}

#[test]
#[serial]
fn test_config_from_env() {
    let confname = env::temp_dir().join(format!(
        "pivmech-test-{}.conf",
        std::process::id()
    ));
    ret_or_panic!(fs::write(&confname, "raw_buffer_size = 128\n"));
    let confname = ret_or_panic!(confname.to_str().ok_or("bad path"));

    env::set_var("PIVMECH_CONF", confname);
    let found = Config::find_conf();
    let loaded = Config::load();
    env::remove_var("PIVMECH_CONF");
    let _ = fs::remove_file(confname);

    assert_eq!(ret_or_panic!(found), confname);
    assert_eq!(ret_or_panic!(loaded).raw_buffer_size, 128);
}

fn restore_var(name: &str, saved: Option<String>) {
    match saved {
        Some(v) => env::set_var(name, v),
        None => env::remove_var(name),
    }
}

#[test]
#[serial]
fn test_config_not_found() {
    let saved_xdg = env::var("XDG_CONFIG_HOME").ok();
    let saved_home = env::var("HOME").ok();
    env::remove_var("PIVMECH_CONF");
    env::set_var("XDG_CONFIG_HOME", "/nonexistent/pivmech-test");
    env::set_var("HOME", "/nonexistent/pivmech-home");

    let found = Config::find_conf();
    let loaded = Config::load();

    restore_var("XDG_CONFIG_HOME", saved_xdg);
    restore_var("HOME", saved_home);

    match found {
        Ok(_) => panic!("no configuration file should be found"),
        Err(e) => assert!(e.is_not_found()),
    }
    /* a missing file means defaults */
    assert_eq!(
        ret_or_panic!(loaded).raw_buffer_size,
        DEFAULT_RAW_BUFFER_SIZE
    );
}

#[test]
#[serial]
fn test_config_home_fallback() {
    let home = env::temp_dir()
        .join(format!("pivmech-home-{}", std::process::id()));
    let confdir = home.join(".config").join("pivmech");
    ret_or_panic!(fs::create_dir_all(&confdir));
    let confname = confdir.join(DEFAULT_CONF_NAME);
    ret_or_panic!(fs::write(&confname, "raw_buffer_size = 256\n"));

    let saved_xdg = env::var("XDG_CONFIG_HOME").ok();
    let saved_home = env::var("HOME").ok();
    env::remove_var("PIVMECH_CONF");
    /* set but empty of configuration, so the search moves on */
    env::set_var("XDG_CONFIG_HOME", "/nonexistent/pivmech-test");
    env::set_var("HOME", &home);

    let found = Config::find_conf();
    let loaded = Config::load();

    restore_var("XDG_CONFIG_HOME", saved_xdg);
    restore_var("HOME", saved_home);
    let _ = fs::remove_dir_all(&home);

    let expected = ret_or_panic!(confname.to_str().ok_or("bad path"));
    assert_eq!(ret_or_panic!(found), expected);
    assert_eq!(ret_or_panic!(loaded).raw_buffer_size, 256);
}
