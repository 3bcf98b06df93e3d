use clap::Parser;

use clicktrail::cli::{Cli, Commands};
use clicktrail::config::{get_config, init_config_from};
use clicktrail::runtime::modes;
use clicktrail::system::logging::init_logging;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_config_from(cli.config.as_deref());
    let config = get_config();

    match cli.command {
        None | Some(Commands::Serve) => {
            // guard 必须存活到进程结束，否则缓冲中的日志会丢失
            let _guard = init_logging(&config.logging)?;
            modes::run_server(config).await
        }
        Some(cmd) => {
            if let Err(e) = modes::run_cli(cmd, &config).await {
                eprintln!("{}", e.format_colored());
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
