use super::*;

#[derive(Parser, Debug)]
#[command(
    name = "git-synchronizer",
    author,
    version,
    about = "Mirror git repositories from one remote to another",
    long_about = "Synchronizes every configured source repository to its destination: \
all branches and tags are pushed, refs that no longer exist on the source are removed."
)]
pub(super) struct Cli {
    #[arg(
        short = 'c',
        long,
        env = "GITSYNCHRONIZER_CONFIG",
        value_name = "FILE",
        help = "Config file (default is $HOME/.git-synchronizer.yaml)"
    )]
    pub(super) config: Option<PathBuf>,
    #[arg(
        short = 'l',
        long = "logLevel",
        env = "GITSYNCHRONIZER_LOGLEVEL",
        value_name = "LEVEL",
        help = "Log level: trace, debug, info, warn or error"
    )]
    pub(super) log_level: Option<String>,
    #[arg(
        short = 'w',
        long = "workingDirectory",
        env = "GITSYNCHRONIZER_WORKINGDIRECTORY",
        value_name = "DIR",
        help = "Directory for temporary clones (default is /tmp/git-synchronizer)"
    )]
    pub(super) working_directory: Option<PathBuf>,
}
