use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod auth;
mod catalog;
mod cli;
mod client;
mod config;
mod embedding;
mod programs;
mod ranking;
mod search;
mod storage;
#[cfg(test)]
mod tests;
mod users;
mod web;

use app::AppFactory;
use cli::{Command, VectorsArgs};
use client::LocalApi;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "wf=info,tower_http=info,warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = cli::Args::parse();

    let paths = AppFactory::get_paths()?;
    let config = AppFactory::create_config(&paths)?;

    let command = match args.command {
        Command::Daemon {} => {
            let service = Arc::new(AppFactory::create_service(&paths, &config)?);
            return web::start_daemon(service, config);
        }

        Command::Vectors {
            action: VectorsArgs::Import { path },
        } => {
            let count = AppFactory::import_vectors(&paths, &config, &path)?;
            println!("{count} embeddings imported");
            return Ok(());
        }

        command => command,
    };

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

    match AppFactory::create_remote(&config)? {
        Some(remote) => runtime.block_on(cli::run(remote, &config.client, command)),
        None => {
            let service = Arc::new(AppFactory::create_service(&paths, &config)?);
            let api = LocalApi::new(service, &AppFactory::local_user());
            runtime.block_on(cli::run(api, &config.client, command))
        }
    }
}
