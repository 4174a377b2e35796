mod cli;
mod config;
mod engine;
mod gestures;
mod ipc;
mod landmarks;
mod logging;
mod window;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
