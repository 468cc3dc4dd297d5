//! Forwards `TICKER_*` settings from a `.env` file into the firmware build.
//!
//! The firmware reads them with `option_env!`, so every key is optional and
//! the core defaults apply when no `.env` file exists.

const FORWARDED: [&str; 4] = [
    "TICKER_PORTAL_SSID",
    "TICKER_PORTAL_ADDRESS",
    "TICKER_PORTAL_TIMEOUT_SECS",
    "TICKER_SCROLL_SPEED_MS",
];

fn main() {
    println!("cargo:rerun-if-changed=.env");
    for key in FORWARDED {
        println!("cargo:rerun-if-env-changed={key}");
    }

    let Ok(entries) = dotenvy::dotenv_iter() else {
        return;
    };

    for entry in entries {
        match entry {
            Ok((key, value)) if FORWARDED.contains(&key.as_str()) => {
                println!("cargo:rustc-env={key}={value}");
            }
            Ok(_) => {}
            Err(e) => println!("cargo:warning=Ignoring malformed .env line: {e}"),
        }
    }
}
