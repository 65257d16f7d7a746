use std::path::PathBuf;

use clap::Parser;
use co_o2_collector_lib::RunOptions;

#[derive(Parser, Debug)]
#[command(name = "co-o2-collector")]
#[command(about = "Polls a CO/O2 analyser and records measurement sessions")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Directory holding the databases, session files and status log
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Use the simulated instrument regardless of the config file
    #[arg(long)]
    simulate: bool,

    /// Import the instrument's tag list before collection starts
    #[arg(long)]
    import_taglist: bool,

    /// Close sessions left open by a previous run, then exit
    #[arg(long)]
    fix_sessions: bool,

    /// Start a session of this many minutes once collection is running
    #[arg(long, value_name = "MINUTES")]
    start_session: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    co_o2_collector_lib::run(RunOptions {
        config_path: args.config,
        data_dir: args.data_dir,
        simulate: args.simulate,
        import_taglist: args.import_taglist,
        fix_sessions: args.fix_sessions,
        start_session: args.start_session,
    })
    .await
}
