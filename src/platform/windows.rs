use std::env;
use std::path::PathBuf;

fn app_root() -> PathBuf {
    let appdata =
        env::var("APPDATA").unwrap_or_else(|_| String::from("C:\\Users\\Default\\AppData\\Roaming"));
    PathBuf::from(appdata).join("Linkshelf")
}

pub fn config_dir() -> PathBuf {
    app_root().join("config")
}

pub fn data_dir() -> PathBuf {
    app_root().join("data")
}
