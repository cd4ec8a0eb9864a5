use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use config_engine::AuthEngineConfig;
use ops_cli::{
    cli::{Cli, Commands, PluginCommands},
    commands::{self, Engine},
    seed::Seed,
};
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AuthEngineConfig::load(cli.config.as_deref()).context("cannot load engine configuration")?;
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging = logging.with_level("debug");
    }
    logger_redacted::init_tracing(&logging)?;

    let mut seed = match &cli.seed {
        Some(path) => Seed::load(path)?,
        None => Seed::default(),
    };
    let engine = Engine::build(&config, &seed).await?;

    let mutated = match cli.command {
        Commands::Authenticate {
            username,
            password,
            channel,
            headers,
            skip_missing,
        } => {
            match commands::authenticate(&engine, &username, &password, &channel, headers, skip_missing).await? {
                Some(identity) => {
                    println!("{} {}", "✓".green(), "authenticated".bold());
                    println!("{}", serde_json::to_string_pretty(&identity)?);
                }
                None => bail!("invalid user name or password"),
            }
            false
        }
        Commands::Plugins { command } => run_plugin_command(&engine, &mut seed, command).await?,
    };

    if mutated {
        match &cli.seed {
            Some(path) => seed.save(path)?,
            None => debug!("No seed file given, changes are not persisted"),
        }
    }
    Ok(())
}

async fn run_plugin_command(engine: &Engine, seed: &mut Seed, command: PluginCommands) -> Result<bool> {
    match command {
        PluginCommands::List { json } => {
            let rows = commands::list_plugins(engine).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(false);
            }
            println!("{:<12} {:<22} {:<8} {:<8}", "ID".bold(), "NAME".bold(), "ENABLED".bold(), "ACTIVE".bold());
            for row in rows {
                println!(
                    "{:<12} {:<22} {:<8} {:<8}",
                    row.id,
                    row.display_name,
                    flag(row.enabled),
                    flag(row.active)
                );
            }
            Ok(false)
        }
        PluginCommands::Settings { plugin_id } => {
            for row in commands::plugin_settings(engine, &plugin_id).await? {
                println!("{:<20} {}", row.name.cyan(), serde_json::to_string(&row.value)?);
            }
            Ok(false)
        }
        PluginCommands::Set { plugin_id, name, value } => {
            commands::set_setting(engine, seed, &plugin_id, &name, &value).await?;
            println!("{} {plugin_id}.{name} updated", "✓".green());
            Ok(true)
        }
        PluginCommands::Enable { plugin_ids } => {
            commands::enable_plugins(engine, seed, plugin_ids.clone()).await?;
            println!("{} authentication order: {}", "✓".green(), plugin_ids.join(" → "));
            Ok(true)
        }
    }
}

fn flag(value: bool) -> String {
    if value {
        "yes".green().to_string()
    } else {
        "no".dimmed().to_string()
    }
}
