use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Video wall control plane: camera callups and PTZ over ONVIF")]
pub struct Args {
    /// JSON settings file
    #[arg(long, default_value = "wall-control.json")]
    pub settings: PathBuf,

    /// Camera definition XML (overrides the settings file)
    #[arg(long)]
    pub cameras: Option<PathBuf>,

    /// Camera definition schema (overrides the settings file)
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Callup command file (overrides the settings file)
    #[arg(long)]
    pub command_file: Option<PathBuf>,

    /// Validate the settings and camera file, then exit
    #[arg(long)]
    pub check: bool,
}
