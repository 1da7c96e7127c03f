use herald_core::config::Config;

#[tokio::main]
async fn main() {
    // Missing configuration should read as a diagnostic, not a backtrace.
    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("herald: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = herald_core::logging::init("herald") {
        eprintln!("herald: failed to initialize logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = herald_discord::run(cfg).await {
        tracing::error!(%e, "bot terminated");
        std::process::exit(1);
    }
}
