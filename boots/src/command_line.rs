use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[clap(name = env!("CARGO_BIN_NAME"))]
pub(crate) struct Options {
    #[clap(long, default_value = "false", help = "Print version number and exit")]
    pub version: bool,

    #[clap(short, long, action = clap::ArgAction::Count, help = "Increase debug level")]
    pub debug: u8,

    #[clap(
        long,
        env = "CARBIDE_BOOTS_CONFIG",
        required_unless_present = "version",
        help = "TOML configuration file"
    )]
    pub config: Option<PathBuf>,
}

impl Options {
    pub fn load() -> Self {
        Self::parse()
    }
}
