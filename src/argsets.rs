use std::path::PathBuf;

pub struct RunArgs {
    /// Stop when stdin closes instead of on SIGINT/SIGTERM
    pub stop_on_stdin_eof: bool,
    pub config_path: PathBuf,
}

pub struct CheckConfigArgs {
    pub config_path: PathBuf,
}
