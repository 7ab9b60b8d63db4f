//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use anyhow::Context;
use std::path::{Path, PathBuf};
use wrnzoo_core::dataset::{self, Split, TransformConfig};
use wrnzoo_core::evaluation::{embeddings_path, evaluation_csv_path};
use wrnzoo_core::hierarchy::{COARSE_CLASSES, FINE_CLASSES, FINE_TO_COARSE};
use wrnzoo_core::identity::{self, ModelIdentity};
use wrnzoo_core::persistence;
use wrnzoo_core::{
    Granularity, ModelFilter, ModelProfile, ProfileWriter, ZooConfig, coarse_index_of,
    find_model_files,
};

/// Handle a CLI subcommand.
pub fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Parse { names } => handle_parse(&names),
        Commands::Encode {
            granularity,
            superclass,
            crop,
            kernel,
            width,
            depth,
            named,
        } => {
            let id = ModelIdentity::new(granularity, superclass, crop, kernel, width, depth)?;
            if named {
                println!("{}", id.file_name_with_superclass_name());
            } else {
                println!("{}", id.file_name());
            }
            Ok(())
        }
        Commands::Scan {
            root,
            pattern,
            superclass,
            granularity,
            limit,
            output,
        } => {
            let config = load(workspace)?;
            let filter = ModelFilter {
                pattern,
                superclass,
                granularity,
            };
            handle_scan(&config, workspace, root, filter, limit, output)
        }
        Commands::Layout { name } => {
            let config = load(workspace)?;
            handle_layout(&config, workspace, &name)
        }
        Commands::Classes { granularity } => {
            handle_classes(granularity);
            Ok(())
        }
        Commands::Remap { fine } => handle_remap(&fine),
        Commands::ProfileGrid { filename } => {
            let config = load(workspace)?;
            handle_profile_grid(&config, workspace, filename)
        }
        Commands::SampleValidation { targets, output } => {
            let config = load(workspace)?;
            handle_sample_validation(&config, &targets, &output)
        }
        Commands::Config { action } => handle_config(action, workspace),
    }
}

/// Canonical workspace directory. Output paths resolve against it, so a
/// missing directory is an error rather than a fallback to the current one.
pub fn resolve_workspace(workspace: &Path) -> anyhow::Result<PathBuf> {
    let resolved = workspace
        .canonicalize()
        .with_context(|| format!("workspace '{}' cannot be resolved", workspace.display()))?;
    if !resolved.is_dir() {
        anyhow::bail!("workspace '{}' is not a directory", workspace.display());
    }
    Ok(resolved)
}

fn load(workspace: &Path) -> anyhow::Result<ZooConfig> {
    wrnzoo_core::load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

/// Names given explicitly by the user must all decode.
fn handle_parse(names: &[String]) -> anyhow::Result<()> {
    for name in names {
        let id = identity::parse(name).with_context(|| format!("cannot decode '{name}'"))?;
        let report = serde_json::json!({
            "file": name,
            "identity": id,
            "superclass_name": id.superclass.name(),
            "num_labels": id.num_labels(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn handle_scan(
    config: &ZooConfig,
    workspace: &Path,
    root: Option<PathBuf>,
    filter: ModelFilter,
    limit: Option<usize>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let paths = config.paths.resolve(workspace);
    let root = root.unwrap_or(paths.models_dir);
    let limit = match limit.unwrap_or(config.evaluation.limit) {
        0 => usize::MAX,
        n => n,
    };
    let output = output.unwrap_or_else(|| paths.evaluations_dir.join("model_profiles.csv"));

    let files = find_model_files(&root, filter)?;
    let mut writer = ProfileWriter::append(&output)?;
    let mut skipped = 0usize;
    let mut decoded = 0usize;
    for entry in files {
        if decoded >= limit {
            break;
        }
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable directory entry");
                skipped += 1;
                continue;
            }
        };
        match identity::parse_path(&path) {
            Ok(id) => {
                writer.write(&ModelProfile::from_identity(&id))?;
                println!("{}  {}", id, path.display());
                decoded += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), stage = %e.stage(), error = %e, "Skipping model file");
                skipped += 1;
            }
        }
    }
    writer.finish()?;

    tracing::info!(decoded, skipped, output = %output.display(), "Scan complete");
    println!("{decoded} model(s) profiled, {skipped} skipped -> {}", output.display());
    Ok(())
}

fn handle_layout(config: &ZooConfig, workspace: &Path, name: &str) -> anyhow::Result<()> {
    let id = identity::parse(name).with_context(|| format!("cannot decode '{name}'"))?;
    let paths = config.paths.resolve(workspace);

    println!("model:        {id}");
    println!("labels:       {}", id.num_labels());
    for split in [Split::Train, Split::Test] {
        let transform = TransformConfig::for_identity(&id, split);
        let file = dataset::dataset_file_path(
            &paths.datasets_dir,
            split,
            id.granularity,
            id.superclass,
            transform.crop_size(),
        )?;
        println!(
            "{:<13} {} (crop {}, flip {})",
            format!("{split} data:"),
            file.display(),
            transform.crop_size(),
            transform.horizontal_flip()
        );
    }
    println!(
        "validation:   {}",
        dataset::validation_dataset_path(&paths.datasets_dir).display()
    );
    for split in [Split::Validation, Split::Test] {
        println!(
            "{:<13} {}",
            format!("{split} eval:"),
            evaluation_csv_path(&paths.evaluations_dir, &id, split).display()
        );
        println!(
            "{:<13} {}",
            format!("{split} embeds:"),
            embeddings_path(&paths.evaluations_dir, &id, split).display()
        );
    }
    Ok(())
}

fn handle_classes(granularity: Option<Granularity>) {
    if granularity != Some(Granularity::Fine) {
        println!("Coarse classes ({}):", COARSE_CLASSES.len());
        for (idx, name) in COARSE_CLASSES.iter().enumerate() {
            println!("  {idx:>3}  {name}");
        }
    }
    if granularity != Some(Granularity::Coarse) {
        println!("Fine classes ({}):", FINE_CLASSES.len());
        for (idx, name) in FINE_CLASSES.iter().enumerate() {
            let coarse = FINE_TO_COARSE[idx];
            println!("  {idx:>3}  {name:<16} -> {coarse:>2} {}", COARSE_CLASSES[coarse]);
        }
    }
}

fn handle_remap(fine: &[i64]) -> anyhow::Result<()> {
    for label in fine {
        let coarse = coarse_index_of(*label)?;
        println!("{label} -> {coarse} ({})", COARSE_CLASSES[coarse]);
    }
    Ok(())
}

fn handle_profile_grid(
    config: &ZooConfig,
    workspace: &Path,
    filename: Option<String>,
) -> anyhow::Result<()> {
    let paths = config.paths.resolve(workspace);
    let filename = filename.unwrap_or_else(|| config.profiling.filename.clone());
    let output = paths.evaluations_dir.join(format!("{filename}.csv"));

    let space = &config.profiling.space;
    if space.is_empty() {
        anyhow::bail!("profiling.space is empty; nothing to profile");
    }
    let identities = space.identities();
    for id in &identities {
        id.validate()?;
    }
    let mut writer = ProfileWriter::create(&output)?;
    for id in identities {
        tracing::debug!(architecture = %id, "Profiling");
        writer.write(&ModelProfile::for_architecture(&id))?;
    }
    let rows = writer.finish()?;
    println!("Wrote {rows} architecture row(s) to {}", output.display());
    Ok(())
}

fn handle_sample_validation(config: &ZooConfig, targets: &Path, output: &Path) -> anyhow::Result<()> {
    let labels: Vec<i64> = persistence::read_json(targets)?
        .with_context(|| format!("targets file {} not found", targets.display()))?;
    let indices = dataset::sample_validation_indices(
        &labels,
        config.validation.per_class,
        config.validation.seed,
    )?;
    persistence::write_json_atomic(output, &indices)?;
    println!(
        "Sampled {} of {} indices ({} per class, seed {}) -> {}",
        indices.len(),
        labels.len(),
        config.validation.per_class,
        config.validation.seed,
        output.display()
    );
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = wrnzoo_core::config::workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let toml_str = toml::to_string_pretty(&ZooConfig::default())?;
            persistence::write_atomic(&config_path, toml_str.as_bytes())?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace)?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_scan_skips_undecodable_files() {
        let dir = TempDir::new().unwrap();
        let models = dir.path().join("models");
        touch(&models.join("model_coarse_all_crop32_kernel8_width4_depth16.pt"));
        touch(&models.join("model_coarse_vehicles_1_crop32_kernel8_width6_depth22.pt"));
        touch(&models.join("model_unlabelled_crop32.pt"));

        let output = dir.path().join("profiles.csv");
        handle_scan(
            &ZooConfig::default(),
            dir.path(),
            None,
            ModelFilter::default(),
            Some(0),
            Some(output.clone()),
        )
        .unwrap();

        let content = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("coarse,all,32,8,4,16"));
        assert!(lines[2].starts_with("coarse,18,32,8,6,22"));
    }

    #[test]
    fn test_scan_respects_limit() {
        let dir = TempDir::new().unwrap();
        let models = dir.path().join("models");
        for depth in [8, 16, 28] {
            touch(&models.join(format!("model_coarse_all_crop32_kernel8_width4_depth{depth}.pt")));
        }
        let output = dir.path().join("profiles.csv");
        handle_scan(
            &ZooConfig::default(),
            dir.path(),
            Some(models),
            ModelFilter::default(),
            Some(2),
            Some(output.clone()),
        )
        .unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap().lines().count(), 3);
    }

    #[test]
    fn test_scan_missing_root_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("evaluations/model_profiles.csv");
        let result = handle_scan(
            &ZooConfig::default(),
            dir.path(),
            Some(dir.path().join("absent")),
            ModelFilter::default(),
            None,
            Some(output.clone()),
        );
        assert!(result.is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_resolve_workspace_rejects_missing_dir() {
        let dir = TempDir::new().unwrap();
        let err = resolve_workspace(&dir.path().join("typo")).unwrap_err();
        assert!(format!("{err:#}").contains("typo"));

        let file = dir.path().join("config.toml");
        std::fs::write(&file, b"").unwrap();
        assert!(resolve_workspace(&file).is_err());

        assert_eq!(
            resolve_workspace(dir.path()).unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_encode_rejects_zero_parameters() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Encode {
            granularity: Granularity::Coarse,
            superclass: wrnzoo_core::Superclass::All,
            crop: 0,
            kernel: 8,
            width: 4,
            depth: 16,
            named: false,
        };
        assert!(handle_command(command, dir.path()).is_err());
    }

    #[test]
    fn test_profile_grid_rejects_zero_width() {
        let dir = TempDir::new().unwrap();
        let mut config = ZooConfig::default();
        config.profiling.space.widths = vec![0];
        assert!(handle_profile_grid(&config, dir.path(), Some("grid".into())).is_err());
        assert!(!dir.path().join("evaluations/grid.csv").exists());
    }

    #[test]
    fn test_parse_fails_on_explicit_bad_name() {
        let err = handle_parse(&["model_coarse_all_crop32.pt".to_string()]).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("cannot decode"));
        assert!(message.contains("model_coarse_all_crop32.pt"));
    }

    #[test]
    fn test_profile_grid_writes_configured_space() {
        let dir = TempDir::new().unwrap();
        let mut config = ZooConfig::default();
        config.profiling.space.widths = vec![4];
        config.profiling.space.depths = vec![16, 28];
        handle_profile_grid(&config, dir.path(), Some("grid".into())).unwrap();

        let content = std::fs::read_to_string(dir.path().join("evaluations/grid.csv")).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "coarse,N/A,32,8,4,16,N/A,N/A,N/A,N/A");
    }

    #[test]
    fn test_sample_validation_roundtrip() {
        let dir = TempDir::new().unwrap();
        let targets = dir.path().join("targets.json");
        let labels: Vec<i64> = (0..40).map(|i| i % 4).collect();
        persistence::write_json_atomic(&targets, &labels).unwrap();

        let mut config = ZooConfig::default();
        config.validation.per_class = 3;
        let output = dir.path().join("indices.json");
        handle_sample_validation(&config, &targets, &output).unwrap();

        let indices: Vec<usize> = persistence::read_json(&output).unwrap().unwrap();
        assert_eq!(indices.len(), 12);
    }

    #[test]
    fn test_remap_rejects_out_of_range() {
        assert!(handle_remap(&[0, 99]).is_ok());
        assert!(handle_remap(&[100]).is_err());
    }

    #[test]
    fn test_config_init_creates_file_once() {
        let dir = TempDir::new().unwrap();
        handle_config(ConfigAction::Init, dir.path()).unwrap();
        let path = wrnzoo_core::config::workspace_config_path(dir.path());
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("batch_size = 1024"));
        handle_config(ConfigAction::Init, dir.path()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), written);
    }
}
