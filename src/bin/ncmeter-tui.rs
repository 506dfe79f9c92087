use clap::Parser;

use ncmeter::cli::CommonOpts;
use ncmeter::config::load_settings;

#[path = "ncmeter-tui/app.rs"] mod app;
#[path = "ncmeter-tui/ui.rs"] mod ui;
#[path = "ncmeter-tui/theme.rs"] mod theme;

/// Interactive terminal front-end: pick a file, send or receive it, watch the metrics table
#[derive(Parser, Debug)]
#[command(author, version)]
struct Opts {
    #[command(flatten)]
    common: CommonOpts,
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    let config_path = opts.common.config_path();
    let mut settings = load_settings(&config_path)?;
    opts.common.apply(&mut settings);
    app::run(settings, config_path)
}
