//! External renderers: Manim for video, Graphviz for scene diagrams.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use scenescope_core::{RenderConfig, ScopeError, ScopeResult};

fn program_available(program: &str, version_flag: &str) -> bool {
    Command::new(program)
        .arg(version_flag)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Runs the `manim` command line on a script.
pub struct ManimRenderer<'a> {
    config: &'a RenderConfig,
}

impl<'a> ManimRenderer<'a> {
    pub fn new(config: &'a RenderConfig) -> Self {
        Self { config }
    }

    /// Check if the configured manim program can be started.
    pub fn is_available(&self) -> bool {
        program_available(&self.config.program, "--version")
    }

    /// A fresh media directory for one render, `<media_root>/run_<8 hex>`.
    pub fn run_dir(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Path::new(&self.config.media_root).join(format!("run_{}", &id[..8]))
    }

    fn args(&self, script: &Path, scene: &str, run_dir: &Path) -> Vec<OsString> {
        vec![
            format!("-q{}", self.config.quality).into(),
            "--media_dir".into(),
            run_dir.as_os_str().to_owned(),
            script.as_os_str().to_owned(),
            scene.into(),
        ]
    }

    /// Render `scene` from `script` into its own run directory and return the
    /// first video found there, if any.
    pub fn render(&self, script: &Path, scene: &str) -> ScopeResult<Option<PathBuf>> {
        let run_dir = self.run_dir();
        tracing::info!(
            scene,
            script = %script.display(),
            media_dir = %run_dir.display(),
            "rendering"
        );

        // Keep our stdout for machine-readable output.
        let status = Command::new(&self.config.program)
            .args(self.args(script, scene, &run_dir))
            .stdout(std::io::stderr())
            .status()
            .map_err(|e| {
                ScopeError::Render(format!("failed to start {}: {}", self.config.program, e))
            })?;

        if !status.success() {
            return Err(ScopeError::Render(format!(
                "{} failed with status {}",
                self.config.program, status
            )));
        }

        Ok(find_first_mp4(&run_dir))
    }
}

/// First `.mp4` under `dir`, searching recursively in name order.
pub fn find_first_mp4(dir: &Path) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in &entries {
        if path.is_file() && path.extension().is_some_and(|ext| ext == "mp4") {
            return Some(path.clone());
        }
    }
    entries
        .iter()
        .filter(|p| p.is_dir())
        .find_map(|p| find_first_mp4(p))
}

/// Graphviz `dot`, used to turn exported diagrams into images.
pub struct Graphviz;

impl Graphviz {
    pub fn is_available() -> bool {
        program_available("dot", "-V")
    }

    pub fn render_png(dot_file: &Path, png_file: &Path) -> ScopeResult<()> {
        let output = Command::new("dot")
            .arg("-Tpng")
            .arg(dot_file)
            .arg("-o")
            .arg(png_file)
            .output()
            .map_err(|e| ScopeError::Render(format!("failed to start dot: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScopeError::Render(format!(
                "dot failed with status {}: {}",
                output.status, stderr
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("scenescope-{}-{}", tag, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_run_dir_layout() {
        let config = RenderConfig::default();
        let renderer = ManimRenderer::new(&config);
        let dir = renderer.run_dir();
        assert_eq!(dir.parent(), Some(Path::new("media/videos")));
        let name = dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("run_"));
        assert_eq!(name.len(), "run_".len() + 8);
        assert!(name["run_".len()..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(dir, renderer.run_dir());
    }

    #[test]
    fn test_manim_arguments() {
        let config = RenderConfig {
            quality: "h".to_string(),
            ..RenderConfig::default()
        };
        let renderer = ManimRenderer::new(&config);
        let args = renderer.args(Path::new("scene.py"), "Intro", Path::new("out/run_1"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(args, ["-qh", "--media_dir", "out/run_1", "scene.py", "Intro"]);
    }

    #[test]
    fn test_find_first_mp4_recursive() {
        let dir = scratch_dir("mp4");
        let nested = dir.join("videos").join("scene").join("720p30");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.join("notes.txt"), "x").unwrap();
        std::fs::write(nested.join("Intro.mp4"), "").unwrap();

        assert_eq!(find_first_mp4(&dir), Some(nested.join("Intro.mp4")));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_find_first_mp4_missing() {
        let dir = scratch_dir("empty");
        assert_eq!(find_first_mp4(&dir), None);
        assert_eq!(find_first_mp4(&dir.join("does-not-exist")), None);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let config = RenderConfig {
            program: "scenescope-no-such-renderer".to_string(),
            ..RenderConfig::default()
        };
        let renderer = ManimRenderer::new(&config);
        assert!(!renderer.is_available());
        let err = renderer.render(Path::new("x.py"), "X").unwrap_err();
        assert!(matches!(err, ScopeError::Render(_)));
    }
}
