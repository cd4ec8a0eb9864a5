use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "authchain",
    version,
    about = "Inspect, configure and exercise the authentication plugin chain",
    after_help = "EXAMPLES:\n  List plugins in display order:  authchain --seed seed.yaml plugins list\n  Set the authentication order:   authchain --seed seed.yaml plugins enable rhodecode ldap\n  Try a VCS login:                authchain --seed seed.yaml authenticate -u alice -p tok --channel vcs"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Static engine configuration (YAML or TOML); AUTHCHAIN__* variables override it
    #[arg(short, long, env = "AUTHCHAIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seed file for users and plugin settings; updated by mutating commands
    #[arg(short, long, env = "AUTHCHAIN_SEED")]
    pub seed: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one authentication attempt through the chain
    Authenticate {
        #[arg(short, long, default_value = "")]
        username: String,

        #[arg(short, long, default_value = "", env = "AUTHCHAIN_PASSWORD", hide_env_values = true)]
        password: String,

        /// Channel of the attempt: http or vcs
        #[arg(long, default_value = "http")]
        channel: String,

        /// Request environment entry, e.g. REMOTE_USER=bob
        #[arg(long = "header", value_name = "KEY=VALUE", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Ignore enabled plugin ids that are not registered
        #[arg(long)]
        skip_missing: bool,
    },

    /// Plugin inspection and configuration
    Plugins {
        #[command(subcommand)]
        command: PluginCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum PluginCommands {
    /// List registered plugins by display name
    List {
        #[arg(long)]
        json: bool,
    },

    /// Show the settings of one plugin
    Settings { plugin_id: String },

    /// Store one plugin setting
    Set {
        plugin_id: String,
        name: String,
        value: String,
    },

    /// Replace the enabled plugin list; the order given is the authentication order
    Enable {
        #[arg(required = true)]
        plugin_ids: Vec<String>,
    },
}

/// Parse `KEY=VALUE`.
pub fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("REMOTE_USER=bob@CORP").unwrap(),
            ("REMOTE_USER".to_string(), "bob@CORP".to_string())
        );
        assert_eq!(parse_header("X=a=b").unwrap().1, "a=b");
        assert!(parse_header("no-separator").is_err());
        assert!(parse_header("=value").is_err());
    }

    #[test]
    fn test_parse_enable_keeps_order() {
        let cli = Cli::try_parse_from(["authchain", "plugins", "enable", "ldap", "rhodecode"]).unwrap();
        match cli.command {
            Commands::Plugins {
                command: PluginCommands::Enable { plugin_ids },
            } => assert_eq!(plugin_ids, vec!["ldap", "rhodecode"]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_authenticate_headers() {
        let cli = Cli::try_parse_from([
            "authchain",
            "authenticate",
            "--header",
            "REMOTE_USER=bob",
            "--channel",
            "vcs",
        ])
        .unwrap();
        match cli.command {
            Commands::Authenticate { headers, channel, username, .. } => {
                assert_eq!(headers, vec![("REMOTE_USER".to_string(), "bob".to_string())]);
                assert_eq!(channel, "vcs");
                assert!(username.is_empty());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
