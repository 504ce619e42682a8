//! The `hazardscan taxonomy` command.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand, ValueEnum};
use hazardscan_core::{Config, Taxonomy};

/// Arguments for the `taxonomy` command.
#[derive(Args, Debug)]
pub struct TaxonomyArgs {
    #[command(subcommand)]
    pub command: TaxonomyCommand,
}

#[derive(Subcommand, Debug)]
pub enum TaxonomyCommand {
    /// Print the taxonomy a scan would use
    Show {
        /// Output style
        #[arg(long, value_enum, default_value = "text")]
        format: TaxonomyFormat,

        /// Taxonomy file to show instead of the configured one
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum TaxonomyFormat {
    /// Categories with their members, then uncategorized tags
    Text,
    /// A taxonomy file that can be edited and passed to `--taxonomy`
    Toml,
}

pub async fn execute(args: TaxonomyArgs) -> anyhow::Result<()> {
    match args.command {
        TaxonomyCommand::Show { format, file } => {
            let path = match file {
                Some(path) => Some(path),
                None => Config::load()?.taxonomy_path(),
            };
            let taxonomy = Taxonomy::load(path.as_deref())?;
            let rendered = match format {
                TaxonomyFormat::Text => render_text(&taxonomy),
                TaxonomyFormat::Toml => toml::to_string_pretty(&taxonomy.to_definition())
                    .context("Failed to serialize taxonomy")?,
            };
            print!("{rendered}");
        }
    }
    Ok(())
}

fn render_text(taxonomy: &Taxonomy) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} candidate tags\n", taxonomy.tags().len());
    for category in taxonomy.categories() {
        let _ = writeln!(out, "{}:", category.name());
        for tag in category.tags() {
            let _ = writeln!(out, "  - {tag}");
        }
    }

    let uncategorized: Vec<&str> = taxonomy
        .tags()
        .iter()
        .filter(|tag| taxonomy.categories_of(tag).next().is_none())
        .map(String::as_str)
        .collect();
    if !uncategorized.is_empty() {
        let _ = writeln!(out, "Uncategorized (scored, never reported):");
        for tag in uncategorized {
            let _ = writeln!(out, "  - {tag}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_lists_categories_in_order() {
        let text = render_text(&Taxonomy::builtin());
        assert!(text.starts_with("25 candidate tags"));
        let xeno = text.find("Xenoestrogens:").unwrap();
        let safe = text.find("Safe Items:").unwrap();
        assert!(xeno < safe);
        assert!(text.contains("  - kitty litter"));
    }

    #[test]
    fn text_lists_uncategorized_tags() {
        let text = render_text(&Taxonomy::builtin());
        let section = text.split("Uncategorized").nth(1).unwrap();
        assert!(section.contains("candle"));
        assert!(!section.contains("bleach"));
    }

    #[test]
    fn toml_round_trips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy.toml");
        let toml = toml::to_string_pretty(&Taxonomy::builtin().to_definition()).unwrap();
        std::fs::write(&path, toml).unwrap();

        let loaded = Taxonomy::load(Some(&path)).unwrap();
        assert_eq!(loaded.tags(), Taxonomy::builtin().tags());
        assert_eq!(loaded.categories().len(), 5);
    }
}
