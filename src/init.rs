use crate::config::Config;
use crate::logi;
use crate::prompt::GenerationSpec;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Creates the output directory and the snapshot's parent directory.
pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    let mut dirs: Vec<&Path> = vec![cfg.output_dir.as_path()];
    if let Some(parent) = cfg.snapshot_path.parent() {
        if !parent.as_os_str().is_empty() {
            dirs.push(parent);
        }
    }

    for dir in dirs {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create dir {}", dir.display()))?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

/// `script_<format>_<duration>_<timestamp>[_partial].txt`
pub fn script_file_name(spec: &GenerationSpec, at: DateTime<Utc>, partial: bool) -> String {
    let duration: String = spec
        .duration
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    let format = serde_json::to_value(spec.format)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "script".to_string());
    format!(
        "script_{}_{}_{}{}.txt",
        format,
        if duration.is_empty() { "default" } else { &duration },
        at.format("%Y%m%d_%H%M%S"),
        if partial { "_partial" } else { "" }
    )
}

pub async fn write_script(dir: &Path, file_name: &str, script: &str) -> Result<PathBuf> {
    let path = dir.join(file_name);
    fs::write(&path, script)
        .await
        .with_context(|| format!("write script: {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::TargetFormat;
    use chrono::TimeZone;

    #[test]
    fn test_script_file_name() {
        let spec = GenerationSpec::new(TargetFormat::Long, "10 m", "senior-expert");
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(script_file_name(&spec, at, false), "script_long_10m_20250304_050607.txt");
        assert_eq!(
            script_file_name(&spec, at, true),
            "script_long_10m_20250304_050607_partial.txt"
        );
    }

    #[tokio::test]
    async fn test_directories_and_write() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = Config {
            output_dir: dir.path().join("out"),
            snapshot_path: dir.path().join("state/snap.json"),
            ..Config::default()
        };
        ensure_directories(&cfg).await?;
        assert!(cfg.output_dir.is_dir());
        assert!(dir.path().join("state").is_dir());
        ensure_directories(&cfg).await?;

        let path = write_script(&cfg.output_dir, "a.txt", "Body.").await?;
        assert_eq!(std::fs::read_to_string(path)?, "Body.");
        Ok(())
    }
}
