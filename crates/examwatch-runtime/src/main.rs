//! examwatch: proctoring monitor binary.

use clap::Parser;

mod cli;
mod cmd_run;
mod cmd_status;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);

    match args.command {
        cli::Command::Run(opts) => {
            let filter = std::env::var("EXAMWATCH_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .with_writer(std::io::stderr)
                .init();

            tracing::info!("examwatch session starting");
            cmd_run::cmd_run(opts, &socket_path).await?;
        }
        cli::Command::Status(opts) => {
            cmd_status::cmd_status(&socket_path, opts.json, &opts.color).await?;
        }
        cli::Command::Watch(opts) => {
            cmd_status::cmd_watch(&socket_path, opts.interval, &opts.color).await?;
        }
    }

    Ok(())
}
