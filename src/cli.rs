use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "jsonfs", about = "Mount a JSON document as a POSIX filesystem")]
pub struct Cli {
    /// JSON document to mount
    pub json_file: PathBuf,

    /// Directory to mount the filesystem on
    pub mount_point: PathBuf,

    /// Allow other users to access the mount
    #[arg(long)]
    pub allow_other: bool,

    /// Unmount automatically when the process exits
    #[arg(long)]
    pub auto_unmount: bool,
}
