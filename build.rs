use std::fs;
use std::path::Path;

fn main() -> anyhow::Result<()> {
    // Necessary for ESP-IDF
    embuild::espidf::sysenv::output();

    println!("cargo:rerun-if-changed=wifi_config.h");

    // Station credentials come from wifi_config.h so they stay out of git
    let wifi_config_path = "wifi_config.h";
    if Path::new(wifi_config_path).exists() {
        let contents = fs::read_to_string(wifi_config_path)?;

        for key in ["WIFI_SSID", "WIFI_PASSWORD"] {
            let define = format!("#define {}", key);
            let value = contents
                .lines()
                .find(|l| l.contains(&define))
                .and_then(|l| l.split('"').nth(1))
                .unwrap_or_default();
            println!("cargo:rustc-env={}={}", key, value);
        }
    } else {
        println!("cargo:rustc-env=WIFI_SSID=");
        println!("cargo:rustc-env=WIFI_PASSWORD=");
        println!("cargo:warning=wifi_config.h not found! Copy wifi_config.h.example to wifi_config.h and add your credentials.");
    }

    Ok(())
}
