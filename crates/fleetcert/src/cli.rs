use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "fleetcert",
    version,
    about = "Issue and rotate device certificates"
)]
pub struct Cli {
    /// Data directory; every stored path is relative to it
    #[arg(long, env = "FLEETCERT_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// JSON config file (default: <data-dir>/fleetcert.json)
    #[arg(long, env = "FLEETCERT_CONFIG", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Active device certificate, relative to the data directory
    #[arg(long, env = "FLEETCERT_DEVICE_CERT", global = true)]
    pub device_cert: Option<PathBuf>,

    /// Active device key, relative to the data directory
    #[arg(long, env = "FLEETCERT_DEVICE_KEY", global = true)]
    pub device_key: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "FLEETCERT_LOG", default_value = "info", global = true)]
    pub log_level: String,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs to file (in addition to stderr)
    #[arg(long, env = "FLEETCERT_LOG_FILE", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Certificate authority
    Ca(CaCommand),
    /// Device certificate store
    Device(DeviceCommand),
    /// Request, issue, stage, verify, and promote a new device certificate
    Rotate(RotateArgs),
}

#[derive(Args, Debug)]
pub struct CaCommand {
    #[command(subcommand)]
    pub command: CaSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum CaSubcommand {
    /// Load the CA, creating it on first use
    Init {
        /// Common name for a newly created CA
        #[arg(long)]
        subject: Option<String>,
        /// Lifetime of a newly created CA, in days
        #[arg(long)]
        validity_days: Option<u32>,
    },
    /// Sign a CSR
    Issue {
        /// PEM CSR file
        #[arg(long, value_name = "PATH")]
        csr: PathBuf,
        /// Write the certificate here instead of stdout
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
        #[command(flatten)]
        leaf: LeafArgs,
    },
    /// Print the CA trust bundle
    Bundle {
        /// Write the bundle here instead of stdout
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
}

/// Leaf certificate knobs shared by `ca issue` and `rotate`.
#[derive(Args, Debug, Default)]
pub struct LeafArgs {
    /// Leaf lifetime in days
    #[arg(long)]
    pub validity_days: Option<u32>,
    /// Extended key usage (serverAuth, clientAuth, ...); repeatable
    #[arg(long = "usage", value_name = "USAGE")]
    pub usages: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DeviceCommand {
    #[command(subcommand)]
    pub command: DeviceSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum DeviceSubcommand {
    /// Show slot state and the active certificate
    Status,
    /// Write a certificate and key directly to the active slot
    Install(PairArgs),
    /// Stage a certificate and key for promotion
    Stage(PairArgs),
    /// Promote the staged pair to active
    Promote,
    /// Restore the previous pair from backup and drop anything staged
    Rollback {
        #[arg(long, default_value = "operator request")]
        reason: String,
    },
    /// Drop the staged pair
    Discard,
    /// Resolve files left behind by an interrupted promotion
    Recover,
    /// Remove the active pair
    Delete,
    /// Generate a new key and CSR
    Request {
        #[command(flatten)]
        identity: IdentityArgs,
        /// Where to write the CSR
        #[arg(long, value_name = "PATH")]
        csr_out: PathBuf,
        /// Where to write the private key
        #[arg(long, value_name = "PATH")]
        key_out: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct PairArgs {
    /// PEM certificate file
    #[arg(long, value_name = "PATH")]
    pub cert: PathBuf,
    /// Private key file
    #[arg(long, value_name = "PATH")]
    pub key: PathBuf,
}

#[derive(Args, Debug, Default)]
pub struct IdentityArgs {
    /// Subject common name (default: from config)
    #[arg(long)]
    pub cn: Option<String>,
    /// Subject alternative name (DNS name or IP); repeatable
    #[arg(long = "san", value_name = "NAME")]
    pub sans: Vec<String>,
}

#[derive(Args, Debug)]
pub struct RotateArgs {
    #[command(flatten)]
    pub identity: IdentityArgs,
    #[command(flatten)]
    pub leaf: LeafArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_device_command_with_globals() {
        let cli = Cli::try_parse_from([
            "fleetcert",
            "device",
            "stage",
            "--cert",
            "new.crt",
            "--key",
            "new.key",
            "--json",
            "-vv",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Device(DeviceCommand {
                command: DeviceSubcommand::Stage(pair),
            }) => {
                assert_eq!(pair.cert, PathBuf::from("new.crt"));
                assert_eq!(pair.key, PathBuf::from("new.key"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rotate_collects_repeated_flags() {
        let cli = Cli::try_parse_from([
            "fleetcert",
            "rotate",
            "--cn",
            "stone-05",
            "--san",
            "stone-05.local",
            "--san",
            "10.0.0.5",
            "--usage",
            "clientAuth",
            "--validity-days",
            "7",
        ])
        .unwrap();

        let Command::Rotate(args) = cli.command else {
            panic!("expected rotate");
        };
        assert_eq!(args.identity.cn.as_deref(), Some("stone-05"));
        assert_eq!(args.identity.sans, ["stone-05.local", "10.0.0.5"]);
        assert_eq!(args.leaf.usages, ["clientAuth"]);
        assert_eq!(args.leaf.validity_days, Some(7));
    }

    #[test]
    fn rollback_reason_has_default() {
        let cli = Cli::try_parse_from(["fleetcert", "device", "rollback"]).unwrap();
        match cli.command {
            Command::Device(DeviceCommand {
                command: DeviceSubcommand::Rollback { reason },
            }) => assert_eq!(reason, "operator request"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
