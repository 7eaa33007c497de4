use std::path::PathBuf;

fn write_config(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn renders_configured_duid_and_defaults() {
    let path = write_config(
        "dhcp6d-it-duid.conf",
        "[server]\nduid = 0003000108002742a8f0\n\n[handler]\nmodule = demo\nclass = Handler\n",
    );

    let rendered = dhcp6d::render_config(&path, 0).expect("config should resolve");
    std::fs::remove_file(&path).ok();

    assert!(rendered.contains("duid = 0003000108002742a8f0"));
    assert!(rendered.contains("module = demo"));
    assert!(rendered.contains("class = Handler"));
    assert!(rendered.contains("threads = 10"));
}

#[test]
fn missing_config_file_is_reported_as_an_error() {
    let err = dhcp6d::render_config("/nonexistent/path/dhcp6d.conf", 0).unwrap_err();
    assert!(matches!(err, dhcp6d::Error::ConfigOpen { .. }));
}

#[test]
fn unknown_interface_is_rejected() {
    let path = write_config(
        "dhcp6d-it-unknown-iface.conf",
        "[server]\nduid = 0003000108002742a8f0\n\n[interface definitely-not-a-real-interface-0]\nglobal-addresses = all\n",
    );

    let err = dhcp6d::render_config(&path, 0).unwrap_err();
    std::fs::remove_file(&path).ok();

    assert!(matches!(err, dhcp6d::Error::InterfaceNotFound(_)));
}

#[test]
fn rejects_malformed_duid_hex() {
    let path = write_config("dhcp6d-it-bad-duid.conf", "[server]\nduid = zzz\n");
    let err = dhcp6d::render_config(&path, 0).unwrap_err();
    std::fs::remove_file(&path).ok();
    assert!(matches!(err, dhcp6d::Error::InvalidDuidHex(_)));
}
