//! Writes reference artifacts and expected predictions

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tabex_fixtures::{generate, FixtureConfig};

#[derive(Parser, Debug)]
#[command(name = "tabex-fixtures")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Write reference artifacts and expected predictions", long_about = None)]
struct Args {
    /// Directory the fixtures are written into
    out_dir: PathBuf,

    /// Optional JSON fixture configuration
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabex=info,tabex_fixtures=info".into()),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => FixtureConfig::from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => FixtureConfig::default(),
    };

    let generated = generate(&config, &args.out_dir)
        .with_context(|| format!("failed to generate fixtures in {}", args.out_dir.display()))?;

    for fixture in &generated {
        println!("{}", fixture.name);
        for file in &fixture.files {
            println!("  {}", file.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_with_config() {
        let args = Args::try_parse_from(["tabex-fixtures", "out", "fixtures.json"]).unwrap();
        assert_eq!(args.out_dir, PathBuf::from("out"));
        assert_eq!(args.config, Some(PathBuf::from("fixtures.json")));
    }

    #[test]
    fn test_config_is_optional() {
        let args = Args::try_parse_from(["tabex-fixtures", "out"]).unwrap();
        assert!(args.config.is_none());
    }

    #[test]
    fn test_out_dir_is_required() {
        assert!(Args::try_parse_from(["tabex-fixtures"]).is_err());
        assert!(Args::try_parse_from(["tabex-fixtures", "a", "b", "c"]).is_err());
    }
}
