//! List OFX Plugins
//!
//! Scans the configured plugin directories and lists every image effect
//! found, optionally refreshing the plugin cache.

use std::path::PathBuf;

use clap::Parser;
use ofx_host::plugin_host::{mock_plugin, HostConfig, PluginRegistry, PluginSource};

#[derive(Parser)]
#[command(name = "list_ofx_plugins")]
#[command(about = "List installed OpenFX image effects", long_about = None)]
struct Cli {
    /// Host config file (defaults to the per-user config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra directory to scan (repeatable)
    #[arg(short, long = "path")]
    paths: Vec<PathBuf>,

    /// Ignore the cache and rescan every bundle
    #[arg(short, long)]
    refresh: bool,

    /// Write the scan results to this cache file
    #[arg(long)]
    write_cache: Option<PathBuf>,

    /// Include builtin effects
    #[arg(short, long)]
    builtins: bool,

    /// Only list effects whose id, label or grouping contains this
    filter: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut config = match cli.config.clone().or_else(HostConfig::default_path) {
        Some(path) => HostConfig::load(&path)?,
        None => HostConfig::default(),
    };
    config.plugin_paths.extend(cli.paths);

    let registry = PluginRegistry::from_config(&config);
    if cli.builtins {
        mock_plugin::register_builtins(&registry);
    }
    if cli.refresh {
        registry.refresh();
    }

    let plugins = match &cli.filter {
        Some(pattern) => registry.search(pattern),
        None => registry.list_available(),
    };

    if plugins.is_empty() {
        println!("No OFX plugins found.");
        println!("\nSearched paths:");
        for path in registry.search_paths() {
            println!("  - {}", path.display());
        }
    } else {
        println!("Found {} OFX plugin(s):\n", plugins.len());
        for (i, plugin) in plugins.iter().enumerate() {
            let contexts: Vec<String> = plugin.contexts.iter().map(|c| c.to_string()).collect();
            println!("{}. {} v{} ({})", i + 1, plugin.label, plugin.version, plugin.grouping);
            println!("   ID: {}", plugin.id);
            println!("   Contexts: {}", contexts.join(", "));
            match &plugin.source {
                PluginSource::Bundle { path, index } => {
                    println!("   Bundle: {} #{}", path.display(), index)
                }
                PluginSource::Builtin => println!("   Builtin"),
            }
            println!();
        }
    }

    if let Some(path) = &cli.write_cache {
        registry.save_cache(path)?;
        println!("Wrote cache to {}", path.display());
    }
    Ok(())
}
