use std::env;
use std::fs;
use std::path::Path;

/// Compiled in when no level path is supplied. An empty platform list makes
/// the runtime loader fall through to the built-in development level.
const FALLBACK_LEVEL: &str = r#"{
  "platforms": [],
  "player_spawn": [0.0, 40.0],
  "checkpoint": null
}
"#;

fn embedded_level_source() -> String {
    let Ok(path) = env::var("AETHERFALL_EMBED_LEVEL_PATH") else {
        return FALLBACK_LEVEL.to_string();
    };
    println!("cargo:rerun-if-changed={path}");
    match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) => {
            println!("cargo:warning=unreadable level at '{path}' ({err}), embedding fallback");
            FALLBACK_LEVEL.to_string()
        }
    }
}

fn main() {
    println!("cargo:rerun-if-env-changed=AETHERFALL_EMBED_LEVEL_PATH");

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    let out_path = Path::new(&out_dir).join("aetherfall_embedded_level.json");
    fs::write(out_path, embedded_level_source()).expect("failed to write embedded level data");
}
