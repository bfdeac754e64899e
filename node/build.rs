fn main() -> anyhow::Result<()> {
    for var in ["WIFI_SSID", "WIFI_PASS", "SERVER_URL"] {
        println!("cargo:rerun-if-env-changed={var}");
    }

    // esp-idf-sys only exports its cfg and link args for the firmware build.
    if std::env::var_os("CARGO_FEATURE_ESP32").is_some() {
        embuild::build::CfgArgs::output_propagated("ESP_IDF")?;
        embuild::build::LinkArgs::output_propagated("ESP_IDF")?;
    }

    Ok(())
}
