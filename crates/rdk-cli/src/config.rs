//! Robot config loading – reads a TOML robot description from disk.

use std::fs;
use std::path::Path;

use rdk_runtime::RobotConfig;

/// Load the config at `path` and apply environment overrides.
pub fn load_from(path: &Path) -> Result<RobotConfig, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: RobotConfig = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config at {}: {}", path.display(), e))?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Apply `RDK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `RDK_LISTEN` | `network.listen` |
/// | `RDK_PARTIAL_START` | `partial_start` (`true`/`false`/`1`/`0`) |
pub fn apply_env_overrides(cfg: &mut RobotConfig) {
    if let Ok(v) = std::env::var("RDK_LISTEN")
        && !v.is_empty()
    {
        cfg.network.listen = v;
    }
    if let Ok(v) = std::env::var("RDK_PARTIAL_START")
        && let Some(flag) = parse_flag(&v)
    {
        cfg.partial_start = flag;
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdk_runtime::config::DEFAULT_LISTEN;

    fn write(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("robot.toml");
        fs::write(&path, body).expect("write config");
        path
    }

    #[test]
    fn loads_components_from_disk() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(
            &dir,
            r#"
[[components]]
name = "g1"
api = "acme:component:gizmo"
model = "acme:demo:mygizmo"
attributes = { arg1 = "foo" }
"#,
        );
        let cfg = load_from(&path).expect("load");
        assert_eq!(cfg.components.len(), 1);
        assert_eq!(cfg.components[0].attributes["arg1"], "foo");
        assert_eq!(cfg.network.listen, DEFAULT_LISTEN);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = load_from(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.contains("Failed to read"));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(&dir, "[[components]]\nname = ");
        assert!(load_from(&path).unwrap_err().contains("Failed to parse"));
    }

    #[test]
    fn env_overrides_listen_and_partial_start() {
        // SAFETY: the only test in this crate touching these variables.
        unsafe {
            std::env::set_var("RDK_LISTEN", "0.0.0.0:9999");
            std::env::set_var("RDK_PARTIAL_START", "yes");
        }
        let mut cfg = RobotConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.network.listen, "0.0.0.0:9999");
        assert!(cfg.partial_start);

        // Unparseable flags leave the field alone.
        unsafe { std::env::set_var("RDK_PARTIAL_START", "maybe") };
        apply_env_overrides(&mut cfg);
        assert!(cfg.partial_start);

        unsafe {
            std::env::remove_var("RDK_LISTEN");
            std::env::remove_var("RDK_PARTIAL_START");
        }
    }

    #[test]
    fn flags_parse_loosely() {
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag(""), None);
    }
}
