use derep::cli;

// --------------------------------------------------
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("derep=info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = cli::run(std::env::args_os()) {
        if let Some(usage) = e.downcast_ref::<clap::Error>() {
            let _ = usage.print();
            std::process::exit(usage.exit_code());
        }
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}
