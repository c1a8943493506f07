use anyhow::{anyhow, bail, Context, Result};
use radaptive::*;
use std::fs;
use std::ops::ControlFlow;
use std::path::{Path as FsPath, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

struct Options {
    scene: String,
    json: bool,
    config: Option<PathBuf>,
    save_config: Option<PathBuf>,
}

/// Load a planner config. Missing files yield the defaults.
fn load_config(path: &FsPath) -> Result<AdaptiveConfig> {
    if !path.exists() {
        return Ok(AdaptiveConfig::default());
    }

    let data = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: AdaptiveConfig =
        serde_json::from_slice(&data).context("deserialize adaptive config")?;
    config
        .validate()
        .with_context(|| format!("validate config {}", path.display()))?;
    Ok(config)
}

/// Persist a planner config, ensuring the directory exists.
fn save_config(config: &AdaptiveConfig, path: &FsPath) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create config directory {}", parent.display()))?;
    }

    let data = serde_json::to_vec_pretty(config).context("serialize config to JSON bytes")?;
    fs::write(path, data).with_context(|| format!("write config {}", path.display()))
}

/// Resolve the default config path (`~/.radaptive/config.json`).
fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
    Ok(home.join(".radaptive").join("config.json"))
}

fn parse_args() -> Result<Options> {
    let mut options = Options {
        scene: "island".to_string(),
        json: false,
        config: None,
        save_config: None,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json" => options.json = true,
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                options.config = Some(PathBuf::from(path));
            }
            "--save-config" => {
                let path = args.next().context("--save-config needs a path")?;
                options.save_config = Some(PathBuf::from(path));
            }
            "square" | "island" | "nested" | "profile" => options.scene = arg,
            other => bail!("unknown argument {other}"),
        }
    }
    Ok(options)
}

fn print_usage() {
    println!(
        "Usage: radaptive [square|island|nested|profile] [--json] [--config PATH] [--save-config PATH]"
    );
    println!("  square   - Clear a 100mm square pocket");
    println!("  island   - Clear a square pocket around a reversed island (default)");
    println!("  nested   - Three nested rings with nesting limit 1");
    println!("  profile  - Profile the inside of a square pocket");
    println!("Without --config, ~/.radaptive/config.json is used when present.");
}

fn square(min: f64, max: f64) -> Path {
    vec![
        Point2D::new(min, min),
        Point2D::new(max, min),
        Point2D::new(max, max),
        Point2D::new(min, max),
    ]
}

fn scene(name: &str, config: AdaptiveConfig) -> (Vec<Path>, AdaptiveConfig) {
    match name {
        "square" => (vec![square(0.0, 100.0)], config),
        "nested" => (
            vec![square(0.0, 100.0), square(20.0, 80.0), square(40.0, 60.0)],
            config.with_nesting_limit(1),
        ),
        "profile" => (
            vec![square(0.0, 100.0)],
            config.with_operation(OperationType::ProfilingInside),
        ),
        _ => {
            let mut island = square(30.0, 70.0);
            island.reverse();
            (vec![square(0.0, 100.0), island], config.with_nesting_limit(1))
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = match parse_args() {
        Ok(options) => options,
        Err(err) => {
            print_usage();
            return Err(err);
        }
    };

    let base = match &options.config {
        Some(path) => load_config(path)?,
        None => match default_config_path() {
            Ok(path) => load_config(&path)?,
            Err(err) => {
                tracing::debug!(%err, "no default config location");
                AdaptiveConfig::default()
            }
        },
    };
    let (paths, config) = scene(&options.scene, base);
    if let Some(path) = &options.save_config {
        save_config(&config, path)?;
        tracing::info!(path = %path.display(), "saved config");
    }

    let steps = Arc::new(AtomicUsize::new(0));
    let primitives = Arc::new(AtomicUsize::new(0));

    let mut planner = Adaptive2d::new(config);
    let counter = Arc::clone(&steps);
    planner.set_progress_callback(move |event| {
        counter.store(event.step, Ordering::Relaxed);
        if event.step % 1000 == 0 {
            tracing::debug!(
                step = event.step,
                x = event.tool_pos.x,
                y = event.tool_pos.y,
                engagement = event.engagement_angle.to_degrees(),
                "progress"
            );
        }
        ControlFlow::Continue(())
    });
    let counter = Arc::clone(&primitives);
    planner.set_draw_circle_callback(move |_, _, _| {
        counter.fetch_add(1, Ordering::Relaxed);
    });
    let counter = Arc::clone(&primitives);
    planner.set_draw_path_callback(move |_, _| {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    let output = planner
        .execute(&paths)
        .with_context(|| format!("plan scene {}", options.scene))?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&output).context("serialize plan output")?);
        return Ok(());
    }

    println!("radaptive - Adaptive Clearing ({})", options.scene);
    println!("====================================\n");
    println!("State:            {:?}", output.final_state);
    println!("Regions planned:  {}", output.outputs.len());
    println!("Regions skipped:  {}", output.skipped_regions);
    println!("Dropped polygons: {}", output.nesting.dropped_count());
    println!("Steps:            {}", steps.load(Ordering::Relaxed));
    println!("Debug primitives: {}", primitives.load(Ordering::Relaxed));
    println!(
        "Max engagement:   {:.1} deg",
        output.max_engagement_angle().to_degrees()
    );
    for (index, region) in output.outputs.iter().enumerate() {
        let cutting: f64 = region.cutting_segments().map(ToolpathSegment::length).sum();
        let links = region.segments.iter().filter(|s| s.motion.is_link()).count();
        println!(
            "\nRegion {index}: helix at ({:.2}, {:.2}), {} segments, {links} links, {cutting:.1} mm cutting, return {:?}",
            region.helix_center.x,
            region.helix_center.y,
            region.segments.len(),
            region.return_motion,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_round_trip() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");

        let config = AdaptiveConfig {
            tool_diameter: 6.0,
            helix_ramp_diameter: 4.0,
            stepover_factor: 0.3,
            max_engagement_angle: Some(1.2),
            poly_tree_nesting_limit: 2,
            tolerance: 0.05,
            operation_type: OperationType::ProfilingOutside,
        };
        save_config(&config, &path).expect("save");
        assert_eq!(load_config(&path).expect("load"), config);
    }

    #[test]
    fn test_missing_config_yields_defaults() {
        let dir = tempdir().expect("tempdir");
        let loaded = load_config(&dir.path().join("absent.json")).expect("load");
        assert_eq!(loaded, AdaptiveConfig::default());
    }

    #[test]
    fn test_invalid_config_file_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"tool_diameter": -2.0}"#).expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("tool diameter"));

        fs::write(&path, "not json").expect("write");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_default_config_path() {
        if let Ok(path) = default_config_path() {
            assert!(path.ends_with(".radaptive/config.json"));
        }
    }

    #[test]
    fn test_scene_selection() {
        let (paths, config) = scene("nested", AdaptiveConfig::default());
        assert_eq!(paths.len(), 3);
        assert_eq!(config.poly_tree_nesting_limit, 1);
        let (paths, config) = scene("profile", AdaptiveConfig::default());
        assert_eq!(paths.len(), 1);
        assert_eq!(config.operation_type, OperationType::ProfilingInside);
    }
}
